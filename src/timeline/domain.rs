use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::accounts::UserId;
use crate::places::{Place, PlaceId};

/// What someone did at a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    #[serde(rename = "checkin")]
    CheckIn,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::CheckIn => "checkin",
        }
    }
}

impl ToSql for ActivityType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ActivityType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "checkin" => Ok(ActivityType::CheckIn),
            other => Err(FromSqlError::Other(
                format!("unknown activity type: {}", other).into(),
            )),
        }
    }
}

/// Discriminant stored next to a post to say which payload table it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostableKind {
    Status,
    Sight,
}

impl PostableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostableKind::Status => "status",
            PostableKind::Sight => "sight",
        }
    }
}

impl ToSql for PostableKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostableKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "status" => Ok(PostableKind::Status),
            "sight" => Ok(PostableKind::Sight),
            other => Err(FromSqlError::Other(
                format!("unknown postable type: {}", other).into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-line rendering of a post payload.
pub trait Summary {
    fn summary(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub id: String,
    pub text: String,
}

impl Summary for Status {
    fn summary(&self) -> String {
        self.text.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sight {
    pub id: String,
    pub place: Place,
    pub activity_type: ActivityType,
}

impl Summary for Sight {
    fn summary(&self) -> String {
        match self.activity_type {
            ActivityType::CheckIn => format!("Checked in at {}", self.place.name),
        }
    }
}

/// Payload of a stored post.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Postable {
    Status(Status),
    Sight(Sight),
}

impl Postable {
    pub fn kind(&self) -> PostableKind {
        match self {
            Postable::Status(_) => PostableKind::Status,
            Postable::Sight(_) => PostableKind::Sight,
        }
    }

    pub fn place(&self) -> Option<&Place> {
        match self {
            Postable::Sight(sight) => Some(&sight.place),
            Postable::Status(_) => None,
        }
    }
}

impl Summary for Postable {
    fn summary(&self) -> String {
        match self {
            Postable::Status(status) => status.summary(),
            Postable::Sight(sight) => sight.summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub postable: Postable,
    pub thread_id: Option<PostId>,
    pub created_at: String,
}

impl Post {
    pub fn is_reply(&self) -> bool {
        self.thread_id.is_some()
    }
}

impl Summary for Post {
    fn summary(&self) -> String {
        self.postable.summary()
    }
}

/// Payload to attach to a new post.
#[derive(Debug, Clone, PartialEq)]
pub enum NewPostable {
    Status {
        text: String,
    },
    Sight {
        place_id: PlaceId,
        activity_type: ActivityType,
    },
}

impl NewPostable {
    pub fn kind(&self) -> PostableKind {
        match self {
            NewPostable::Status { .. } => PostableKind::Status,
            NewPostable::Sight { .. } => PostableKind::Sight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub user_id: UserId,
    pub postable: NewPostable,
    pub thread_id: Option<PostId>,
}

impl NewPost {
    pub fn status(user_id: &UserId, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.clone(),
            postable: NewPostable::Status { text: text.into() },
            thread_id: None,
        }
    }

    pub fn sight(user_id: &UserId, place_id: &PlaceId, activity_type: ActivityType) -> Self {
        Self {
            user_id: user_id.clone(),
            postable: NewPostable::Sight {
                place_id: place_id.clone(),
                activity_type,
            },
            thread_id: None,
        }
    }

    pub fn reply_to(mut self, thread: &PostId) -> Self {
        self.thread_id = Some(thread.clone());
        self
    }
}
