//! Subcommand dispatch. Each command yields the JSON document the binary
//! prints, or `None` when there is nothing to report.

use std::io::Read;

use anyhow::Context;
use serde_json::{json, Value};

use crate::accounts::{self, User};
use crate::config::{Command, Config};
use crate::db::DbPool;
use crate::places::{self, Coordinate};
use crate::timeline::{self, Post, PostId, Summary};
use crate::{graph, seeds};

/// Runs `command`. `input` is only read by `sign-up`, which expects a JSON
/// object of sign-up params.
pub fn execute(
    pool: &DbPool,
    config: &Config,
    command: Command,
    mut input: impl Read,
) -> anyhow::Result<Option<Value>> {
    let output = match command {
        Command::Migrate => return Ok(None),
        Command::Seed => match seeds::seed(pool)? {
            Some(seeded) => json!({
                "users": user_list(vec![seeded.sam, seeded.adam]),
                "place": seeded.place.name,
                "root_post": seeded.root.id,
                "replies": seeded.replies.len(),
            }),
            None => json!({ "seeded": false }),
        },
        Command::SignUp => {
            let mut raw = String::new();
            input.read_to_string(&mut raw)?;
            let raw: Value =
                serde_json::from_str(&raw).context("sign-up params must be a JSON object")?;
            let params = accounts::permit_sign_up(&raw)?;
            serde_json::to_value(accounts::sign_up(pool, params, &config.auth)?)?
        }
        Command::Followers { username } => {
            let user = require_user(pool, &username)?;
            user_list(graph::followers(pool, &user.id)?)
        }
        Command::Followings { username } => {
            let user = require_user(pool, &username)?;
            user_list(graph::followings(pool, &user.id)?)
        }
        Command::Requests { username } => {
            let user = require_user(pool, &username)?;
            user_list(graph::follow_requests(pool, &user.id)?)
        }
        Command::Follow { username, friend } => {
            let user = require_user(pool, &username)?;
            let friend = require_user(pool, &friend)?;
            serde_json::to_value(graph::follow(pool, &user.id, &friend.id)?)?
        }
        // USERNAME is the one being followed; the edge runs requester -> user.
        Command::Accept {
            username,
            requester,
        } => {
            let user = require_user(pool, &username)?;
            let requester = require_user(pool, &requester)?;
            serde_json::to_value(graph::accept_request(pool, &requester.id, &user.id)?)?
        }
        Command::Thread { post_id } => {
            let post = timeline::find_post(pool, &PostId::new(post_id))?;
            let root = timeline::thread_root(pool, &post.id)?;
            let replies: Vec<Value> = timeline::replies(pool, &root.id)?
                .iter()
                .map(post_entry)
                .collect();
            json!({ "root": post_entry(&root), "replies": replies })
        }
        Command::Nearby {
            longitude,
            latitude,
            radius,
        } => {
            let center = Coordinate::new(longitude, latitude)?;
            let nearby: Vec<Value> = places::places_near(pool, &center, radius)?
                .into_iter()
                .map(|(place, distance)| {
                    json!({
                        "location": place.coordinate.to_ewkt(),
                        "place": place,
                        "distance_m": distance.round(),
                    })
                })
                .collect();
            Value::Array(nearby)
        }
    };
    Ok(Some(output))
}

fn require_user(pool: &DbPool, username: &str) -> anyhow::Result<User> {
    accounts::find_by_username(pool, username)?
        .with_context(|| format!("no user named {}", username))
}

fn user_list(users: Vec<User>) -> Value {
    users
        .into_iter()
        .map(|u| json!({ "username": u.username, "name": u.full_name() }))
        .collect()
}

fn post_entry(post: &Post) -> Value {
    json!({
        "id": post.id,
        "user_id": post.user_id,
        "summary": post.summary(),
        "place": post.postable.place().map(|p| p.name.as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_user, NewUser};
    use crate::graph::{find_bond, follow, BondState};
    use crate::testing;

    fn run(pool: &DbPool, command: Command) -> Value {
        execute(pool, &Config::default(), command, std::io::empty())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn accept_takes_the_followed_user_first() {
        let pool = testing::pool();
        let alice = create_user(&pool, NewUser::new("Alice", "alice@example.org", "alice").private())
            .unwrap();
        let bob = testing::user(&pool);
        follow(&pool, &bob.id, &alice.id).unwrap();

        let bond = run(
            &pool,
            Command::Accept {
                username: alice.username.clone(),
                requester: bob.username.clone(),
            },
        );
        assert_eq!(bond["user_id"], json!(bob.id));
        assert_eq!(bond["friend_id"], json!(alice.id));
        assert_eq!(bond["state"], "following");

        let stored = find_bond(&pool, &bob.id, &alice.id).unwrap().unwrap();
        assert_eq!(stored.state, BondState::Following);
    }

    #[test]
    fn accept_with_swapped_names_finds_no_request() {
        let pool = testing::pool();
        let alice = create_user(&pool, NewUser::new("Alice", "alice@example.org", "alice").private())
            .unwrap();
        let bob = testing::user(&pool);
        follow(&pool, &bob.id, &alice.id).unwrap();

        let result = execute(
            &pool,
            &Config::default(),
            Command::Accept {
                username: bob.username.clone(),
                requester: alice.username.clone(),
            },
            std::io::empty(),
        );
        assert!(result.is_err());
        let pending = find_bond(&pool, &bob.id, &alice.id).unwrap().unwrap();
        assert_eq!(pending.state, BondState::Requesting);
    }

    #[test]
    fn user_lists_show_full_names() {
        let pool = testing::pool();
        let sam = create_user(
            &pool,
            NewUser::new("Sam", "sam@example.org", "samsam").last_name("Yamashita"),
        )
        .unwrap();
        let fan = testing::user(&pool);
        follow(&pool, &fan.id, &sam.id).unwrap();

        let followers = run(
            &pool,
            Command::Followers {
                username: sam.username.clone(),
            },
        );
        assert_eq!(followers, json!([{ "username": fan.username, "name": "User" }]));

        let followings = run(&pool, Command::Followings { username: fan.username });
        assert_eq!(followings[0]["name"], "Sam Yamashita");
    }

    #[test]
    fn thread_names_the_checked_in_place() {
        let pool = testing::pool();
        run(&pool, Command::Seed);
        let sam = accounts::find_by_username(&pool, "samsam").unwrap().unwrap();
        let root = timeline::posts_by_user(&pool, &sam.id)
            .unwrap()
            .into_iter()
            .find(|p| !p.is_reply())
            .unwrap();

        let thread = run(
            &pool,
            Command::Thread {
                post_id: root.id.as_str().to_string(),
            },
        );
        assert_eq!(thread["root"]["place"], Value::Null);
        let replies = thread["replies"].as_array().unwrap();
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[3]["place"], "Hotel Majapahit");
        assert_eq!(replies[3]["summary"], "Checked in at Hotel Majapahit");
    }

    #[test]
    fn sign_up_reads_params_from_input() {
        let pool = testing::pool();
        let mut config = Config::default();
        config.auth.bcrypt_cost = 4;
        let input = r#"{"first_name": "nia", "email": "nia@example.org", "username": "nia", "password": "secret1"}"#;

        let user = execute(&pool, &config, Command::SignUp, input.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(user["first_name"], "Nia");
        assert!(accounts::find_by_username(&pool, "nia").unwrap().is_some());
    }

    #[test]
    fn migrate_prints_nothing() {
        let pool = testing::pool();
        let output = execute(&pool, &Config::default(), Command::Migrate, std::io::empty()).unwrap();
        assert!(output.is_none());
    }

    #[test]
    fn nearby_reports_extended_wkt() {
        let pool = testing::pool();
        run(&pool, Command::Seed);
        let nearby = run(
            &pool,
            Command::Nearby {
                longitude: 112.74,
                latitude: -7.26,
                radius: 500.0,
            },
        );
        assert_eq!(nearby[0]["location"], "SRID=4326;POINT (112.739898 -7.259836)");
    }
}
