//! Persistent relation storage.
//!
//! Three relation kinds live here: connections (symmetric, stateful), follows
//! and blocks (directed, stateless). Every primitive is a single storage round
//! trip and is idempotent on duplicate input: creating something that already
//! exists returns the existing record, deleting something absent returns `None`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use medlink_shared::errors::{AppError, AppResult, ErrorCode};
use medlink_shared::types::Page;

use crate::models::{Block, Connection, ConnectionStatus, Follow, ProfileVisit, UserId, UserRef, VisitStats};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Record for the unordered pair, whichever side requested. `None` when `a == b`.
    async fn find_connection(&self, a: UserId, b: UserId) -> AppResult<Option<Connection>>;

    /// Inserts a pending request unless any record exists for `{requester, addressee}`,
    /// in which case the existing record is returned unchanged.
    async fn request_connection(&self, requester: UserId, addressee: UserId) -> AppResult<Connection>;

    /// pending -> connected, only for the exact requester/addressee orientation.
    async fn accept_connection(&self, requester: UserId, addressee: UserId) -> AppResult<Option<Connection>>;

    async fn remove_connection(&self, a: UserId, b: UserId) -> AppResult<Option<Connection>>;

    /// Ordered by accepted_at desc (nulls last), then created_at desc.
    async fn list_connections(
        &self,
        user: UserId,
        status: Option<ConnectionStatus>,
        page: Page,
    ) -> AppResult<Vec<Connection>>;

    async fn list_pending_incoming(&self, user: UserId, page: Page) -> AppResult<Vec<Connection>>;

    async fn list_pending_outgoing(&self, user: UserId, page: Page) -> AppResult<Vec<Connection>>;

    async fn count_connections(&self, user: UserId) -> AppResult<i64>;

    async fn count_pending_incoming(&self, user: UserId) -> AppResult<i64>;

    async fn count_pending_outgoing(&self, user: UserId) -> AppResult<i64>;

    /// Ids of every connected neighbor, in `list_connections` order.
    async fn connected_ids(&self, user: UserId) -> AppResult<Vec<UserId>>;

    /// All connected edges `(from, to)` with `from` in `users`, in one round trip.
    async fn connected_edges(&self, users: &[UserId]) -> AppResult<Vec<(UserId, UserId)>>;

    async fn follow(&self, follower: UserId, following: UserId) -> AppResult<Follow>;

    async fn unfollow(&self, follower: UserId, following: UserId) -> AppResult<Option<Follow>>;

    async fn is_following(&self, follower: UserId, following: UserId) -> AppResult<bool>;

    async fn list_followers(&self, user: UserId, page: Page) -> AppResult<Vec<Follow>>;

    async fn list_following(&self, user: UserId, page: Page) -> AppResult<Vec<Follow>>;

    async fn count_followers(&self, user: UserId) -> AppResult<i64>;

    async fn count_following(&self, user: UserId) -> AppResult<i64>;

    async fn block(&self, blocker: UserId, blocked: UserId) -> AppResult<Block>;

    async fn unblock(&self, blocker: UserId, blocked: UserId) -> AppResult<Option<Block>>;

    /// `a` blocked `b`.
    async fn is_blocked_one_way(&self, a: UserId, b: UserId) -> AppResult<bool>;

    async fn is_blocked_either_way(&self, a: UserId, b: UserId) -> AppResult<bool>;

    async fn list_blocked(&self, blocker: UserId, page: Page) -> AppResult<Vec<Block>>;
}

/// Read-only access to the user table owned by the profile subsystem.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> AppResult<Option<UserRef>>;

    /// Resolves display fields for `ids`. Missing users are skipped; order is unspecified.
    async fn users_by_ids(&self, ids: &[UserId]) -> AppResult<Vec<UserRef>>;

    async fn ping(&self) -> AppResult<()>;
}

#[async_trait]
pub trait VisitLog: Send + Sync {
    /// Upserts the (visitor, profile) row: visit_count += 1, last_visited_at = now.
    async fn record_visit(&self, visitor: UserId, profile: UserId) -> AppResult<ProfileVisit>;

    /// Inbound visits, most recent first.
    async fn list_visitors(&self, profile: UserId, page: Page) -> AppResult<Vec<ProfileVisit>>;

    /// Outbound visits, most recent first.
    async fn list_visited(&self, visitor: UserId, page: Page) -> AppResult<Vec<ProfileVisit>>;

    async fn visit_stats(&self, profile: UserId, recent_since: DateTime<Utc>) -> AppResult<VisitStats>;
}

/// The storage handle every service is built on.
pub trait GraphStore: RelationStore + UserDirectory + VisitLog {}

impl<T: RelationStore + UserDirectory + VisitLog> GraphStore for T {}

pub(crate) fn ensure_distinct(a: UserId, b: UserId, code: ErrorCode) -> AppResult<()> {
    if a == b {
        return Err(AppError::new(code, "a user cannot form a relation with themselves"));
    }
    Ok(())
}
