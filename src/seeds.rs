//! Sample data: two friends in Surabaya and a short conversation about a
//! hotel check-in.

use crate::accounts::{create_user, find_by_email, NewUser, User};
use crate::db::DbPool;
use crate::error::ModelResult;
use crate::graph::{create_bond, find_bond, BondState};
use crate::places::{create_place, places_in_locale, Coordinate, NewPlace, Place};
use crate::timeline::{create_post, posts_by_user, ActivityType, NewPost, Post, Postable};

const ROOT_TEXT: &str = "Wow! Looks great! Have fun, Sam!";
const HOTEL: &str = "Hotel Majapahit";

#[derive(Debug)]
pub struct Seeded {
    pub sam: User,
    pub adam: User,
    pub place: Place,
    pub root: Post,
    pub replies: Vec<Post>,
}

/// Loads the sample records. Returns `None` when Sam's root post already
/// exists.
///
/// Records are written one by one, not in a single transaction. Users, bonds
/// and the place are looked up before being created, so a run that failed
/// halfway picks up where it stopped. The replies are only written together
/// with a new root post.
pub fn seed(pool: &DbPool) -> ModelResult<Option<Seeded>> {
    let sam = find_or_create_user(
        pool,
        NewUser::new("Sam", "sam@example.org", "samsam").last_name("Yamashita"),
    )?;
    if find_root(pool, &sam)?.is_some() {
        tracing::info!("Seed data already present, skipping");
        return Ok(None);
    }

    let adam = find_or_create_user(
        pool,
        NewUser::new("Adam", "adam@example.org", "adam123").last_name("Notodikromo"),
    )?;

    for (user, friend) in [(&sam, &adam), (&adam, &sam)] {
        if find_bond(pool, &user.id, &friend.id)?.is_none() {
            create_bond(pool, &user.id, &friend.id, BondState::Following)?;
        }
    }

    let coordinate: Coordinate = "POINT (112.739898 -7.259836 0)".parse()?;
    let existing = places_in_locale(pool, "en")?
        .into_iter()
        .find(|p| p.name == HOTEL && p.coordinate == coordinate);
    let place = match existing {
        Some(place) => place,
        None => create_place(pool, NewPlace::new(coordinate, "en", HOTEL, "hotel"))?,
    };

    let root = create_post(pool, NewPost::status(&sam.id, ROOT_TEXT))?;
    let replies = vec![
        create_post(
            pool,
            NewPost::status(&adam.id, "Wow! Looks great! Have fun, Sam!").reply_to(&root.id),
        )?,
        create_post(
            pool,
            NewPost::status(&sam.id, "Ya ya ya! Are you in town?").reply_to(&root.id),
        )?,
        create_post(
            pool,
            NewPost::status(&adam.id, "Yups! Let's explore the city!").reply_to(&root.id),
        )?,
        create_post(
            pool,
            NewPost::sight(&sam.id, &place.id, ActivityType::CheckIn).reply_to(&root.id),
        )?,
    ];

    tracing::info!(
        users = 2,
        bonds = 2,
        places = 1,
        posts = 1 + replies.len(),
        "Seeded sample data"
    );
    Ok(Some(Seeded {
        sam,
        adam,
        place,
        root,
        replies,
    }))
}

fn find_or_create_user(pool: &DbPool, new_user: NewUser) -> ModelResult<User> {
    match find_by_email(pool, &new_user.email)? {
        Some(user) => Ok(user),
        None => create_user(pool, new_user),
    }
}

fn find_root(pool: &DbPool, sam: &User) -> ModelResult<Option<Post>> {
    Ok(posts_by_user(pool, &sam.id)?.into_iter().find(|post| {
        !post.is_reply() && matches!(&post.postable, Postable::Status(s) if s.text == ROOT_TEXT)
    }))
}
