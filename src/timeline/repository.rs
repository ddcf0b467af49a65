// Post persistence: payload tables, threading and timelines
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;

use crate::accounts::UserId;
use crate::db::{self, DbPool};
use crate::error::{ModelError, ModelResult};
use crate::graph::BondState;
use crate::places::repository::load_place;
use crate::places::PlaceId;
use crate::timeline::domain::*;
use crate::validation::{is_blank, ErrorKind, ValidationErrors};

const POST_COLUMNS: &str = "id, user_id, postable_type, postable_id, thread_id, created_at";

/// A `posts` row before its payload is resolved.
struct PostRow {
    id: PostId,
    user_id: UserId,
    kind: PostableKind,
    postable_id: String,
    thread_id: Option<PostId>,
    created_at: String,
}

fn post_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: PostId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        kind: row.get(2)?,
        postable_id: row.get(3)?,
        thread_id: row.get::<_, Option<String>>(4)?.map(PostId),
        created_at: row.get(5)?,
    })
}

fn load_postable(conn: &Connection, kind: PostableKind, id: &str) -> ModelResult<Postable> {
    match kind {
        PostableKind::Status => {
            let text: String = conn
                .query_row("SELECT text FROM statuses WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or_else(|| ModelError::not_found("status", id))?;
            Ok(Postable::Status(Status {
                id: id.to_string(),
                text,
            }))
        }
        PostableKind::Sight => {
            let (place_id, activity_type): (String, ActivityType) = conn
                .query_row(
                    "SELECT place_id, activity_type FROM sights WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| ModelError::not_found("sight", id))?;
            let place = load_place(conn, &PlaceId(place_id.clone()))?
                .ok_or_else(|| ModelError::not_found("place", place_id))?;
            Ok(Postable::Sight(Sight {
                id: id.to_string(),
                place,
                activity_type,
            }))
        }
    }
}

fn resolve(conn: &Connection, row: PostRow) -> ModelResult<Post> {
    let postable = load_postable(conn, row.kind, &row.postable_id)?;
    Ok(Post {
        id: row.id,
        user_id: row.user_id,
        postable,
        thread_id: row.thread_id,
        created_at: row.created_at,
    })
}

fn load_post(conn: &Connection, id: &PostId) -> ModelResult<Post> {
    let row = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            params![id.as_str()],
            post_row,
        )
        .optional()?
        .ok_or_else(|| ModelError::not_found("post", id.as_str()))?;
    resolve(conn, row)
}

fn load_posts(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> ModelResult<Vec<Post>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, post_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| resolve(conn, row)).collect()
}

fn exists(conn: &Connection, table: &str, id: &str) -> ModelResult<bool> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) > 0 FROM {table} WHERE id = ?1"),
        params![id],
        |row| row.get(0),
    )?)
}

fn validate(conn: &Connection, post: &NewPost) -> ModelResult<ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if !exists(conn, "users", post.user_id.as_str())? {
        errors.add("user", ErrorKind::MustExist);
    }
    match &post.postable {
        NewPostable::Status { text } => {
            if is_blank(text) {
                errors.add("text", ErrorKind::Blank);
            }
        }
        NewPostable::Sight { place_id, .. } => {
            if !exists(conn, "places", place_id.as_str())? {
                errors.add("place", ErrorKind::MustExist);
            }
        }
    }
    if let Some(thread) = &post.thread_id {
        if !exists(conn, "posts", thread.as_str())? {
            errors.add("thread", ErrorKind::MustExist);
        }
    }
    Ok(errors)
}

/// Stores the payload and the post in one transaction. The thread parent
/// must already exist, so reply chains always end at a root.
pub fn create_post(pool: &DbPool, new_post: NewPost) -> ModelResult<Post> {
    let mut conn = pool.get()?;
    validate(&conn, &new_post)?.into_result()?;

    let tx = conn.transaction()?;
    let postable_id = db::new_id();
    match &new_post.postable {
        NewPostable::Status { text } => {
            tx.execute(
                "INSERT INTO statuses (id, text) VALUES (?1, ?2)",
                params![postable_id, text],
            )?;
        }
        NewPostable::Sight {
            place_id,
            activity_type,
        } => {
            tx.execute(
                "INSERT INTO sights (id, place_id, activity_type) VALUES (?1, ?2, ?3)",
                params![postable_id, place_id.as_str(), activity_type],
            )?;
        }
    }

    let id = PostId::new(db::new_id());
    tx.execute(
        "INSERT INTO posts (id, user_id, postable_type, postable_id, thread_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id.as_str(),
            new_post.user_id.as_str(),
            new_post.postable.kind(),
            postable_id,
            new_post.thread_id.as_ref().map(PostId::as_str),
        ],
    )?;
    tx.commit()?;

    tracing::info!(
        post_id = %id,
        user_id = %new_post.user_id,
        kind = new_post.postable.kind().as_str(),
        reply = new_post.thread_id.is_some(),
        "Created post"
    );
    load_post(&conn, &id)
}

pub fn find_post(pool: &DbPool, id: &PostId) -> ModelResult<Post> {
    let conn = pool.get()?;
    load_post(&conn, id)
}

/// Direct replies to `post`, oldest first.
pub fn replies(pool: &DbPool, post: &PostId) -> ModelResult<Vec<Post>> {
    let conn = pool.get()?;
    load_posts(
        &conn,
        &format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE thread_id = ?1 ORDER BY created_at, rowid"
        ),
        params![post.as_str()],
    )
}

/// Follows `thread` links up to the post that started the conversation.
pub fn thread_root(pool: &DbPool, post: &PostId) -> ModelResult<Post> {
    let conn = pool.get()?;
    let mut current = load_post(&conn, post)?;
    let mut seen = HashSet::from([current.id.clone()]);

    while let Some(parent) = current.thread_id.clone() {
        if !seen.insert(parent.clone()) {
            tracing::warn!(post_id = %current.id, "Thread chain loops back on itself");
            break;
        }
        current = load_post(&conn, &parent)?;
    }
    Ok(current)
}

/// Posts written by `user`, newest first.
pub fn posts_by_user(pool: &DbPool, user: &UserId) -> ModelResult<Vec<Post>> {
    let conn = pool.get()?;
    load_posts(
        &conn,
        &format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ),
        params![user.as_str()],
    )
}

/// Posts by `user` and by everyone `user` follows, newest first.
pub fn home_timeline(pool: &DbPool, user: &UserId, limit: usize) -> ModelResult<Vec<Post>> {
    let conn = pool.get()?;
    load_posts(
        &conn,
        &format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE user_id = ?1
                OR user_id IN (SELECT friend_id FROM bonds WHERE user_id = ?1 AND state = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ),
        params![user.as_str(), BondState::Following, limit as i64],
    )
}
