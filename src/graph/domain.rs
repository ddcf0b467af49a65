use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::accounts::UserId;

/// Outcome of a follow: accepted, or waiting on the followed user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondState {
    Following,
    Requesting,
}

impl BondState {
    pub const ALL: [BondState; 2] = [BondState::Following, BondState::Requesting];

    pub fn as_str(&self) -> &'static str {
        match self {
            BondState::Following => "following",
            BondState::Requesting => "requesting",
        }
    }

    /// State a new follow starts in, given the followed user's visibility.
    pub fn initial_for(friend_is_public: bool) -> Self {
        if friend_is_public {
            BondState::Following
        } else {
            BondState::Requesting
        }
    }
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBondState(pub String);

impl fmt::Display for UnknownBondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown bond state: {}", self.0)
    }
}

impl std::error::Error for UnknownBondState {}

impl FromStr for BondState {
    type Err = UnknownBondState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BondState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownBondState(s.to_string()))
    }
}

impl ToSql for BondState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BondState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BondId(pub String);

impl BondId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Directed edge: `user` follows (or has asked to follow) `friend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bond {
    pub id: BondId,
    pub user_id: UserId,
    pub friend_id: UserId,
    pub state: BondState,
    pub created_at: String,
    pub updated_at: String,
}

impl Bond {
    pub fn is_following(&self) -> bool {
        self.state == BondState::Following
    }
}
