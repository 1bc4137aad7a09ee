use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::schema::{blocks, connections, follows, profile_visitors, users};

pub use medlink_shared::types::UserId;

/// Anything in a user listing that can be traced back to one user.
pub trait UserKeyed {
    fn user_id(&self) -> UserId;
}

// --- User ---

/// Identity plus opaque display fields. Only `id` matters to the graph.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct UserRef {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub profile_image_url: Option<String>,
    pub headline: Option<String>,
}

impl UserKeyed for UserRef {
    fn user_id(&self) -> UserId {
        self.id
    }
}

// --- Connection ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ConnectionStatus::Pending),
            "connected" => Ok(ConnectionStatus::Connected),
            _ => Err(format!("unknown connection status: {s}")),
        }
    }
}

impl ToSql<Text, Pg> for ConnectionStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ConnectionStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(ConnectionStatus::Pending),
            b"connected" => Ok(ConnectionStatus::Connected),
            other => Err(format!("unrecognized connection status: {}", String::from_utf8_lossy(other)).into()),
        }
    }
}

/// One row per unordered pair; requester/addressee roles record who asked.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = connections)]
pub struct Connection {
    pub id: i32,
    pub requester_id: UserId,
    pub addressee_id: UserId,
    pub status: ConnectionStatus,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn involves(&self, a: UserId, b: UserId) -> bool {
        (self.requester_id == a && self.addressee_id == b)
            || (self.requester_id == b && self.addressee_id == a)
    }

    /// The party that is not `user`.
    pub fn other_party(&self, user: UserId) -> UserId {
        if self.requester_id == user {
            self.addressee_id
        } else {
            self.requester_id
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = connections)]
pub struct NewConnection {
    pub requester_id: UserId,
    pub addressee_id: UserId,
    pub status: ConnectionStatus,
}

// --- Follow ---

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = follows)]
pub struct Follow {
    pub id: i32,
    pub follower_id: UserId,
    pub following_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = follows)]
pub struct NewFollow {
    pub follower_id: UserId,
    pub following_id: UserId,
}

// --- Block ---

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = blocks)]
pub struct Block {
    pub id: i32,
    pub blocker_id: UserId,
    pub blocked_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = blocks)]
pub struct NewBlock {
    pub blocker_id: UserId,
    pub blocked_id: UserId,
}

// --- ProfileVisit ---

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = profile_visitors)]
pub struct ProfileVisit {
    pub id: i32,
    pub visitor_id: UserId,
    pub profile_user_id: UserId,
    pub visit_count: i32,
    pub first_visited_at: DateTime<Utc>,
    pub last_visited_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profile_visitors)]
pub struct NewProfileVisit {
    pub visitor_id: UserId,
    pub profile_user_id: UserId,
    pub visit_count: i32,
}

// --- Listings ---

/// A connection record joined with the other party's display fields.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEntry {
    pub connection: Connection,
    pub user: UserRef,
}

impl UserKeyed for ConnectionEntry {
    fn user_id(&self) -> UserId {
        self.user.id
    }
}

/// A follower, followee or blocked user with the time the edge was created.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeEntry {
    pub user: UserRef,
    pub since: DateTime<Utc>,
}

impl UserKeyed for EdgeEntry {
    fn user_id(&self) -> UserId {
        self.user.id
    }
}

/// A candidate scored by how many connections it shares with the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct RankedUser {
    pub user: UserRef,
    pub mutual_count: i64,
}

impl UserKeyed for RankedUser {
    fn user_id(&self) -> UserId {
        self.user.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VisitEntry {
    pub user: UserRef,
    pub visit_count: i32,
    pub last_visited_at: DateTime<Utc>,
}

impl UserKeyed for VisitEntry {
    fn user_id(&self) -> UserId {
        self.user.id
    }
}

// --- Aggregates ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipPath {
    pub degree: Option<u8>,
    pub path: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionCounts {
    pub connected: i64,
    pub pending_incoming: i64,
    pub pending_outgoing: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NetworkStats {
    pub connections: ConnectionCounts,
    pub follows: FollowCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitStats {
    pub unique_visitors: i64,
    pub total_visits: i64,
    pub visitors_last_7_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Connected".parse::<ConnectionStatus>().unwrap(), ConnectionStatus::Connected);
        assert!("accepted".parse::<ConnectionStatus>().is_err());
    }

    #[test]
    fn other_party_works_from_both_sides() {
        let now = Utc::now();
        let conn = Connection {
            id: 1,
            requester_id: 4,
            addressee_id: 9,
            status: ConnectionStatus::Pending,
            requested_at: now,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(conn.other_party(4), 9);
        assert_eq!(conn.other_party(9), 4);
        assert!(conn.involves(9, 4));
        assert!(!conn.involves(4, 4));
    }
}
