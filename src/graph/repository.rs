// Bond persistence and the directed follower/following queries
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::accounts::repository::{load_user, user_from_row, USER_COLUMNS};
use crate::accounts::{User, UserId};
use crate::db::{self, DbPool};
use crate::error::{ModelError, ModelResult};
use crate::graph::domain::*;
use crate::validation::{ErrorKind, ValidationErrors};

const BOND_COLUMNS: &str = "id, user_id, friend_id, state, created_at, updated_at";

fn bond_from_row(row: &Row<'_>) -> rusqlite::Result<Bond> {
    Ok(Bond {
        id: BondId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        friend_id: UserId(row.get(2)?),
        state: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Which end of the edge the queried user sits on.
#[derive(Debug, Clone, Copy)]
enum Direction {
    /// Edges the user created; returns the friends.
    Outgoing,
    /// Edges pointing at the user; returns the initiators.
    Incoming,
}

fn users_by_bond(
    conn: &Connection,
    user: &UserId,
    direction: Direction,
    state: BondState,
) -> ModelResult<Vec<User>> {
    let (join_on, filter_on) = match direction {
        Direction::Outgoing => ("b.friend_id", "b.user_id"),
        Direction::Incoming => ("b.user_id", "b.friend_id"),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM bonds b
         JOIN users u ON u.id = {join_on}
         WHERE {filter_on} = ?1 AND b.state = ?2
         ORDER BY b.created_at, b.rowid"
    ))?;
    let users = stmt
        .query_map(params![user.as_str(), state], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(user_id = %user, ?direction, %state, count = users.len(), "Loaded bonded users");
    Ok(users)
}

fn load_bond(conn: &Connection, user: &UserId, friend: &UserId) -> ModelResult<Option<Bond>> {
    Ok(conn
        .query_row(
            &format!("SELECT {BOND_COLUMNS} FROM bonds WHERE user_id = ?1 AND friend_id = ?2"),
            params![user.as_str(), friend.as_str()],
            bond_from_row,
        )
        .optional()?)
}

fn user_exists(conn: &Connection, id: &UserId) -> ModelResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![id.as_str()],
        |row| row.get(0),
    )?)
}

fn insert_bond(
    conn: &Connection,
    user: &UserId,
    friend: &UserId,
    state: BondState,
) -> ModelResult<Bond> {
    let mut errors = ValidationErrors::new();
    if user == friend {
        errors.add("friend", ErrorKind::Invalid);
    } else {
        if !user_exists(conn, user)? {
            errors.add("user", ErrorKind::MustExist);
        }
        if !user_exists(conn, friend)? {
            errors.add("friend", ErrorKind::MustExist);
        } else if load_bond(conn, user, friend)?.is_some() {
            errors.add("friend", ErrorKind::Taken);
        }
    }
    errors.into_result()?;

    let id = db::new_id();
    conn.execute(
        "INSERT INTO bonds (id, user_id, friend_id, state) VALUES (?1, ?2, ?3, ?4)",
        params![id, user.as_str(), friend.as_str(), state],
    )
    .map_err(|e| {
        if db::unique_violation_columns(&e).is_some() {
            let mut errors = ValidationErrors::new();
            errors.add("friend", ErrorKind::Taken);
            ModelError::Invalid(errors)
        } else {
            e.into()
        }
    })?;

    tracing::info!(user_id = %user, friend_id = %friend, %state, "Created bond");
    load_bond(conn, user, friend)?.ok_or_else(|| ModelError::not_found("bond", id))
}

/// Creates an edge in an explicit state. One edge per (user, friend) pair;
/// users cannot bond with themselves.
pub fn create_bond(
    pool: &DbPool,
    user: &UserId,
    friend: &UserId,
    state: BondState,
) -> ModelResult<Bond> {
    let conn = pool.get()?;
    insert_bond(&conn, user, friend, state)
}

/// Follows `friend` directly when their profile is public, otherwise files a
/// request. Following an already bonded user returns the existing edge.
pub fn follow(pool: &DbPool, user: &UserId, friend: &UserId) -> ModelResult<Bond> {
    let conn = pool.get()?;
    if let Some(existing) = load_bond(&conn, user, friend)? {
        return Ok(existing);
    }
    let target = load_user(&conn, friend)?;
    insert_bond(&conn, user, friend, BondState::initial_for(target.is_public))
}

/// `target` accepts the pending request from `requester`.
pub fn accept_request(pool: &DbPool, requester: &UserId, target: &UserId) -> ModelResult<Bond> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE bonds SET state = ?3, updated_at = datetime('now')
         WHERE user_id = ?1 AND friend_id = ?2 AND state = ?4",
        params![
            requester.as_str(),
            target.as_str(),
            BondState::Following,
            BondState::Requesting
        ],
    )?;
    if rows == 0 {
        return Err(ModelError::not_found(
            "follow request",
            format!("{} -> {}", requester, target),
        ));
    }

    tracing::info!(requester_id = %requester, target_id = %target, "Accepted follow request");
    load_bond(&conn, requester, target)?
        .ok_or_else(|| ModelError::not_found("bond", requester.as_str()))
}

/// Removes the edge from `user` to `friend` in whatever state it is.
pub fn unfollow(pool: &DbPool, user: &UserId, friend: &UserId) -> ModelResult<bool> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "DELETE FROM bonds WHERE user_id = ?1 AND friend_id = ?2",
        params![user.as_str(), friend.as_str()],
    )?;
    if rows > 0 {
        tracing::info!(user_id = %user, friend_id = %friend, "Removed bond");
    }
    Ok(rows > 0)
}

pub fn find_bond(pool: &DbPool, user: &UserId, friend: &UserId) -> ModelResult<Option<Bond>> {
    let conn = pool.get()?;
    load_bond(&conn, user, friend)
}

/// Users `user` follows, in the order the follows were made.
pub fn followings(pool: &DbPool, user: &UserId) -> ModelResult<Vec<User>> {
    let conn = pool.get()?;
    users_by_bond(&conn, user, Direction::Outgoing, BondState::Following)
}

/// Users following `user`, in the order they followed.
pub fn followers(pool: &DbPool, user: &UserId) -> ModelResult<Vec<User>> {
    let conn = pool.get()?;
    users_by_bond(&conn, user, Direction::Incoming, BondState::Following)
}

/// Users `user` has asked to follow who have not accepted yet.
pub fn follow_requests(pool: &DbPool, user: &UserId) -> ModelResult<Vec<User>> {
    let conn = pool.get()?;
    users_by_bond(&conn, user, Direction::Outgoing, BondState::Requesting)
}

/// Users waiting for `user` to accept their request.
pub fn pending_requests(pool: &DbPool, user: &UserId) -> ModelResult<Vec<User>> {
    let conn = pool.get()?;
    users_by_bond(&conn, user, Direction::Incoming, BondState::Requesting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_user, NewUser};
    use crate::testing;

    fn ids(users: &[User]) -> Vec<UserId> {
        users.iter().map(|u| u.id.clone()).collect()
    }

    #[test]
    fn lists_followings_and_follow_requests() {
        let pool = testing::pool();
        let user = testing::user(&pool);
        let friends = testing::users(&pool, 3);
        let states = [BondState::Following, BondState::Following, BondState::Requesting];
        for (friend, state) in friends.iter().zip(states) {
            create_bond(&pool, &user.id, &friend.id, state).unwrap();
        }

        let followings = ids(&followings(&pool, &user.id).unwrap());
        assert_eq!(followings, vec![friends[0].id.clone(), friends[1].id.clone()]);

        let requests = ids(&follow_requests(&pool, &user.id).unwrap());
        assert_eq!(requests, vec![friends[2].id.clone()]);
    }

    #[test]
    fn lists_followers_in_creation_order() {
        let pool = testing::pool();
        let users = testing::users(&pool, 2);
        let followers_1 = testing::users(&pool, 2);
        let followers_2 = testing::users(&pool, 2);

        for follower in &followers_1 {
            create_bond(&pool, &follower.id, &users[0].id, BondState::Following).unwrap();
        }
        create_bond(&pool, &followers_2[0].id, &users[1].id, BondState::Following).unwrap();
        create_bond(&pool, &followers_2[1].id, &users[1].id, BondState::Requesting).unwrap();

        assert_eq!(followers(&pool, &users[0].id).unwrap(), followers_1);
        assert_eq!(
            followers(&pool, &users[1].id).unwrap(),
            vec![followers_2[0].clone()]
        );
        assert_eq!(
            pending_requests(&pool, &users[1].id).unwrap(),
            vec![followers_2[1].clone()]
        );
    }

    #[test]
    fn rejects_self_bonds() {
        let pool = testing::pool();
        let user = testing::user(&pool);
        let err = create_bond(&pool, &user.id, &user.id, BondState::Following).unwrap_err();
        assert!(err.is_invalid_on("friend", ErrorKind::Invalid));
    }

    #[test]
    fn rejects_duplicate_pairs_but_allows_the_reverse_edge() {
        let pool = testing::pool();
        let sam = testing::user(&pool);
        let adam = testing::user(&pool);

        create_bond(&pool, &sam.id, &adam.id, BondState::Following).unwrap();
        let err = create_bond(&pool, &sam.id, &adam.id, BondState::Requesting).unwrap_err();
        assert!(err.is_invalid_on("friend", ErrorKind::Taken));

        assert!(create_bond(&pool, &adam.id, &sam.id, BondState::Following).is_ok());
    }

    #[test]
    fn rejects_unknown_users() {
        let pool = testing::pool();
        let sam = testing::user(&pool);
        let err = create_bond(&pool, &sam.id, &UserId::new("ghost"), BondState::Following)
            .unwrap_err();
        assert!(err.is_invalid_on("friend", ErrorKind::MustExist));
    }

    #[test]
    fn follow_respects_visibility() {
        let pool = testing::pool();
        let sam = testing::user(&pool);
        let public = testing::user(&pool);
        let private =
            create_user(&pool, NewUser::new("Rin", "rin@example.org", "rin").private()).unwrap();

        assert_eq!(follow(&pool, &sam.id, &public.id).unwrap().state, BondState::Following);
        assert_eq!(follow(&pool, &sam.id, &private.id).unwrap().state, BondState::Requesting);

        // following twice keeps the original edge
        let again = follow(&pool, &sam.id, &private.id).unwrap();
        assert_eq!(again.state, BondState::Requesting);
        assert!(followers(&pool, &private.id).unwrap().is_empty());
    }

    #[test]
    fn accepting_a_request_makes_a_follower() {
        let pool = testing::pool();
        let sam = testing::user(&pool);
        let private =
            create_user(&pool, NewUser::new("Rin", "rin@example.org", "rin").private()).unwrap();

        follow(&pool, &sam.id, &private.id).unwrap();
        let bond = accept_request(&pool, &sam.id, &private.id).unwrap();
        assert!(bond.is_following());
        assert_eq!(ids(&followers(&pool, &private.id).unwrap()), vec![sam.id.clone()]);
        assert!(follow_requests(&pool, &sam.id).unwrap().is_empty());

        // nothing left to accept
        assert!(matches!(
            accept_request(&pool, &sam.id, &private.id),
            Err(ModelError::NotFound { .. })
        ));
    }

    #[test]
    fn unfollow_removes_the_edge() {
        let pool = testing::pool();
        let sam = testing::user(&pool);
        let adam = testing::user(&pool);
        follow(&pool, &sam.id, &adam.id).unwrap();

        assert!(unfollow(&pool, &sam.id, &adam.id).unwrap());
        assert!(!unfollow(&pool, &sam.id, &adam.id).unwrap());
        assert_eq!(find_bond(&pool, &sam.id, &adam.id).unwrap(), None);
    }
}
