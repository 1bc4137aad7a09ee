//! In-process store with the same semantics as [`PgStore`](super::PgStore).
//!
//! Used by the test suites and for running the service without a database.
//! Every primitive takes the lock once, which mirrors the one-statement
//! atomicity of the SQL implementation.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use medlink_shared::errors::{AppResult, ErrorCode};
use medlink_shared::types::Page;

use super::{ensure_distinct, RelationStore, UserDirectory, VisitLog};
use crate::models::{
    Block, Connection, ConnectionStatus, Follow, ProfileVisit, UserId, UserRef, VisitStats,
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserId, UserRef>,
    connections: Vec<Connection>,
    follows: Vec<Follow>,
    blocks: Vec<Block>,
    visits: Vec<ProfileVisit>,
    next_user_id: UserId,
    next_row_id: i32,
}

impl MemoryState {
    fn row_id(&mut self) -> i32 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn pair(&self, a: UserId, b: UserId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.involves(a, b))
    }

    /// Connections touching `user`, in list order.
    fn connections_of(&self, user: UserId, status: Option<ConnectionStatus>) -> Vec<&Connection> {
        let mut rows: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|c| c.requester_id == user || c.addressee_id == user)
            .filter(|c| status.map_or(true, |s| c.status == s))
            .collect();
        // accepted_at desc nulls last, created_at desc, id desc
        rows.sort_by_key(|c| (c.accepted_at.is_none(), Reverse(c.accepted_at), Reverse(c.created_at), Reverse(c.id)));
        rows
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user and returns its reference.
    pub fn insert_user(&self, first_name: &str, last_name: &str) -> UserRef {
        let mut state = self.state.write();
        state.next_user_id += 1;
        let user = UserRef {
            id: state.next_user_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            profile_image_url: None,
            headline: None,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// Deletes a user and every record that references it (ON DELETE CASCADE).
    pub fn delete_user(&self, id: UserId) -> bool {
        let mut state = self.state.write();
        if state.users.remove(&id).is_none() {
            return false;
        }
        state.connections.retain(|c| c.requester_id != id && c.addressee_id != id);
        state.follows.retain(|f| f.follower_id != id && f.following_id != id);
        state.blocks.retain(|b| b.blocker_id != id && b.blocked_id != id);
        state.visits.retain(|v| v.visitor_id != id && v.profile_user_id != id);
        true
    }
}

fn paged<T: Clone>(rows: Vec<&T>, page: Page) -> Vec<T> {
    page.slice(rows).into_iter().cloned().collect()
}

fn newest_first<T>(rows: &mut [&T], key: impl Fn(&T) -> (DateTime<Utc>, i32)) {
    rows.sort_by_key(|r| Reverse(key(*r)));
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn find_connection(&self, a: UserId, b: UserId) -> AppResult<Option<Connection>> {
        if a == b {
            return Ok(None);
        }
        Ok(self.state.read().pair(a, b).cloned())
    }

    async fn request_connection(&self, requester: UserId, addressee: UserId) -> AppResult<Connection> {
        ensure_distinct(requester, addressee, ErrorCode::CannotConnectSelf)?;
        let mut state = self.state.write();
        if let Some(existing) = state.pair(requester, addressee) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let record = Connection {
            id: state.row_id(),
            requester_id: requester,
            addressee_id: addressee,
            status: ConnectionStatus::Pending,
            requested_at: now,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.connections.push(record.clone());
        Ok(record)
    }

    async fn accept_connection(&self, requester: UserId, addressee: UserId) -> AppResult<Option<Connection>> {
        ensure_distinct(requester, addressee, ErrorCode::CannotConnectSelf)?;
        let mut state = self.state.write();
        let record = state.connections.iter_mut().find(|c| {
            c.requester_id == requester && c.addressee_id == addressee && c.status == ConnectionStatus::Pending
        });
        Ok(record.map(|c| {
            let now = Utc::now();
            c.status = ConnectionStatus::Connected;
            c.accepted_at = Some(now);
            c.updated_at = now;
            c.clone()
        }))
    }

    async fn remove_connection(&self, a: UserId, b: UserId) -> AppResult<Option<Connection>> {
        ensure_distinct(a, b, ErrorCode::CannotConnectSelf)?;
        let mut state = self.state.write();
        let position = state.connections.iter().position(|c| c.involves(a, b));
        Ok(position.map(|i| state.connections.remove(i)))
    }

    async fn list_connections(
        &self,
        user: UserId,
        status: Option<ConnectionStatus>,
        page: Page,
    ) -> AppResult<Vec<Connection>> {
        let state = self.state.read();
        Ok(paged(state.connections_of(user, status), page))
    }

    async fn list_pending_incoming(&self, user: UserId, page: Page) -> AppResult<Vec<Connection>> {
        let state = self.state.read();
        let mut rows: Vec<&Connection> = state
            .connections
            .iter()
            .filter(|c| c.addressee_id == user && c.status == ConnectionStatus::Pending)
            .collect();
        newest_first(&mut rows, |c| (c.requested_at, c.id));
        Ok(paged(rows, page))
    }

    async fn list_pending_outgoing(&self, user: UserId, page: Page) -> AppResult<Vec<Connection>> {
        let state = self.state.read();
        let mut rows: Vec<&Connection> = state
            .connections
            .iter()
            .filter(|c| c.requester_id == user && c.status == ConnectionStatus::Pending)
            .collect();
        newest_first(&mut rows, |c| (c.requested_at, c.id));
        Ok(paged(rows, page))
    }

    async fn count_connections(&self, user: UserId) -> AppResult<i64> {
        let state = self.state.read();
        Ok(state.connections_of(user, Some(ConnectionStatus::Connected)).len() as i64)
    }

    async fn count_pending_incoming(&self, user: UserId) -> AppResult<i64> {
        let state = self.state.read();
        let count = state
            .connections
            .iter()
            .filter(|c| c.addressee_id == user && c.status == ConnectionStatus::Pending)
            .count();
        Ok(count as i64)
    }

    async fn count_pending_outgoing(&self, user: UserId) -> AppResult<i64> {
        let state = self.state.read();
        let count = state
            .connections
            .iter()
            .filter(|c| c.requester_id == user && c.status == ConnectionStatus::Pending)
            .count();
        Ok(count as i64)
    }

    async fn connected_ids(&self, user: UserId) -> AppResult<Vec<UserId>> {
        let state = self.state.read();
        Ok(state
            .connections_of(user, Some(ConnectionStatus::Connected))
            .into_iter()
            .map(|c| c.other_party(user))
            .collect())
    }

    async fn connected_edges(&self, users: &[UserId]) -> AppResult<Vec<(UserId, UserId)>> {
        let wanted: HashSet<UserId> = users.iter().copied().collect();
        let state = self.state.read();
        let mut edges = Vec::new();
        for c in state.connections.iter().filter(|c| c.is_connected()) {
            if wanted.contains(&c.requester_id) {
                edges.push((c.requester_id, c.addressee_id));
            }
            if wanted.contains(&c.addressee_id) {
                edges.push((c.addressee_id, c.requester_id));
            }
        }
        Ok(edges)
    }

    async fn follow(&self, follower: UserId, following: UserId) -> AppResult<Follow> {
        ensure_distinct(follower, following, ErrorCode::CannotFollowSelf)?;
        let mut state = self.state.write();
        if let Some(existing) = state
            .follows
            .iter()
            .find(|f| f.follower_id == follower && f.following_id == following)
        {
            return Ok(existing.clone());
        }
        let record = Follow {
            id: state.row_id(),
            follower_id: follower,
            following_id: following,
            created_at: Utc::now(),
        };
        state.follows.push(record.clone());
        Ok(record)
    }

    async fn unfollow(&self, follower: UserId, following: UserId) -> AppResult<Option<Follow>> {
        ensure_distinct(follower, following, ErrorCode::CannotFollowSelf)?;
        let mut state = self.state.write();
        let position = state
            .follows
            .iter()
            .position(|f| f.follower_id == follower && f.following_id == following);
        Ok(position.map(|i| state.follows.remove(i)))
    }

    async fn is_following(&self, follower: UserId, following: UserId) -> AppResult<bool> {
        let state = self.state.read();
        Ok(state
            .follows
            .iter()
            .any(|f| f.follower_id == follower && f.following_id == following))
    }

    async fn list_followers(&self, user: UserId, page: Page) -> AppResult<Vec<Follow>> {
        let state = self.state.read();
        let mut rows: Vec<&Follow> = state.follows.iter().filter(|f| f.following_id == user).collect();
        newest_first(&mut rows, |f| (f.created_at, f.id));
        Ok(paged(rows, page))
    }

    async fn list_following(&self, user: UserId, page: Page) -> AppResult<Vec<Follow>> {
        let state = self.state.read();
        let mut rows: Vec<&Follow> = state.follows.iter().filter(|f| f.follower_id == user).collect();
        newest_first(&mut rows, |f| (f.created_at, f.id));
        Ok(paged(rows, page))
    }

    async fn count_followers(&self, user: UserId) -> AppResult<i64> {
        let state = self.state.read();
        Ok(state.follows.iter().filter(|f| f.following_id == user).count() as i64)
    }

    async fn count_following(&self, user: UserId) -> AppResult<i64> {
        let state = self.state.read();
        Ok(state.follows.iter().filter(|f| f.follower_id == user).count() as i64)
    }

    async fn block(&self, blocker: UserId, blocked: UserId) -> AppResult<Block> {
        ensure_distinct(blocker, blocked, ErrorCode::CannotBlockSelf)?;
        let mut state = self.state.write();
        if let Some(existing) = state
            .blocks
            .iter()
            .find(|b| b.blocker_id == blocker && b.blocked_id == blocked)
        {
            return Ok(existing.clone());
        }
        let record = Block {
            id: state.row_id(),
            blocker_id: blocker,
            blocked_id: blocked,
            created_at: Utc::now(),
        };
        state.blocks.push(record.clone());
        Ok(record)
    }

    async fn unblock(&self, blocker: UserId, blocked: UserId) -> AppResult<Option<Block>> {
        ensure_distinct(blocker, blocked, ErrorCode::CannotBlockSelf)?;
        let mut state = self.state.write();
        let position = state
            .blocks
            .iter()
            .position(|b| b.blocker_id == blocker && b.blocked_id == blocked);
        Ok(position.map(|i| state.blocks.remove(i)))
    }

    async fn is_blocked_one_way(&self, a: UserId, b: UserId) -> AppResult<bool> {
        let state = self.state.read();
        Ok(state.blocks.iter().any(|r| r.blocker_id == a && r.blocked_id == b))
    }

    async fn is_blocked_either_way(&self, a: UserId, b: UserId) -> AppResult<bool> {
        let state = self.state.read();
        Ok(state.blocks.iter().any(|r| {
            (r.blocker_id == a && r.blocked_id == b) || (r.blocker_id == b && r.blocked_id == a)
        }))
    }

    async fn list_blocked(&self, blocker: UserId, page: Page) -> AppResult<Vec<Block>> {
        let state = self.state.read();
        let mut rows: Vec<&Block> = state.blocks.iter().filter(|b| b.blocker_id == blocker).collect();
        newest_first(&mut rows, |b| (b.created_at, b.id));
        Ok(paged(rows, page))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: UserId) -> AppResult<Option<UserRef>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn users_by_ids(&self, ids: &[UserId]) -> AppResult<Vec<UserRef>> {
        let state = self.state.read();
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl VisitLog for MemoryStore {
    async fn record_visit(&self, visitor: UserId, profile: UserId) -> AppResult<ProfileVisit> {
        ensure_distinct(visitor, profile, ErrorCode::BadRequest)?;
        let now = Utc::now();
        let mut state = self.state.write();
        if let Some(visit) = state
            .visits
            .iter_mut()
            .find(|v| v.visitor_id == visitor && v.profile_user_id == profile)
        {
            visit.visit_count += 1;
            visit.last_visited_at = now;
            visit.updated_at = now;
            return Ok(visit.clone());
        }
        let visit = ProfileVisit {
            id: state.row_id(),
            visitor_id: visitor,
            profile_user_id: profile,
            visit_count: 1,
            first_visited_at: now,
            last_visited_at: now,
            created_at: now,
            updated_at: now,
        };
        state.visits.push(visit.clone());
        Ok(visit)
    }

    async fn list_visitors(&self, profile: UserId, page: Page) -> AppResult<Vec<ProfileVisit>> {
        let state = self.state.read();
        let mut rows: Vec<&ProfileVisit> = state.visits.iter().filter(|v| v.profile_user_id == profile).collect();
        newest_first(&mut rows, |v| (v.last_visited_at, v.id));
        Ok(paged(rows, page))
    }

    async fn list_visited(&self, visitor: UserId, page: Page) -> AppResult<Vec<ProfileVisit>> {
        let state = self.state.read();
        let mut rows: Vec<&ProfileVisit> = state.visits.iter().filter(|v| v.visitor_id == visitor).collect();
        newest_first(&mut rows, |v| (v.last_visited_at, v.id));
        Ok(paged(rows, page))
    }

    async fn visit_stats(&self, profile: UserId, recent_since: DateTime<Utc>) -> AppResult<VisitStats> {
        let state = self.state.read();
        let rows: Vec<&ProfileVisit> = state.visits.iter().filter(|v| v.profile_user_id == profile).collect();
        Ok(VisitStats {
            unique_visitors: rows.len() as i64,
            total_visits: rows.iter().map(|v| i64::from(v.visit_count)).sum(),
            visitors_last_7_days: rows.iter().filter(|v| v.last_visited_at >= recent_since).count() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlink_shared::errors::ErrorKind;

    fn page() -> Page {
        Page::first(50)
    }

    #[tokio::test]
    async fn request_is_idempotent_across_orientations() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;

        let first = store.request_connection(a, b).await.unwrap();
        let again = store.request_connection(a, b).await.unwrap();
        let reverse = store.request_connection(b, a).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(first.id, reverse.id);
        assert_eq!(reverse.requester_id, a);
        assert_eq!(store.list_connections(a, None, page()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn crossing_requests_leave_one_record() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;

        let (ab, ba) = tokio::join!(store.request_connection(a, b), store.request_connection(b, a));
        assert_eq!(ab.unwrap().id, ba.unwrap().id);
        assert_eq!(store.list_connections(a, None, page()).await.unwrap().len(), 1);
        assert_eq!(store.list_connections(b, None, page()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accept_requires_exact_orientation() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        store.request_connection(a, b).await.unwrap();

        assert!(store.accept_connection(b, a).await.unwrap().is_none());
        let accepted = store.accept_connection(a, b).await.unwrap().unwrap();
        assert_eq!(accepted.status, ConnectionStatus::Connected);
        assert!(accepted.accepted_at.is_some());
        // already connected, no second transition
        assert!(store.accept_connection(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_returns_row_then_none() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        let created = store.request_connection(a, b).await.unwrap();

        assert_eq!(store.remove_connection(b, a).await.unwrap().map(|c| c.id), Some(created.id));
        assert!(store.remove_connection(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn self_pairs_are_rejected_or_absent() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;

        assert!(store.find_connection(a, a).await.unwrap().is_none());
        let err = store.request_connection(a, a).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.follow(a, a).await.unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.block(a, a).await.unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn follow_unfollow_restores_counts() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;

        let first = store.follow(a, b).await.unwrap();
        assert_eq!(store.follow(a, b).await.unwrap().id, first.id);
        assert_eq!(store.count_followers(b).await.unwrap(), 1);
        assert_eq!(store.count_following(a).await.unwrap(), 1);

        assert!(store.unfollow(a, b).await.unwrap().is_some());
        assert!(store.unfollow(a, b).await.unwrap().is_none());
        assert_eq!(store.count_followers(b).await.unwrap(), 0);
        assert_eq!(store.count_following(a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blocks_are_directed() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        store.block(a, b).await.unwrap();

        assert!(store.is_blocked_one_way(a, b).await.unwrap());
        assert!(!store.is_blocked_one_way(b, a).await.unwrap());
        assert!(store.is_blocked_either_way(b, a).await.unwrap());
    }

    #[tokio::test]
    async fn connected_list_puts_pending_last() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        let c = store.insert_user("Alan", "Turing").id;
        store.request_connection(a, b).await.unwrap();
        store.request_connection(a, c).await.unwrap();
        store.accept_connection(a, b).await.unwrap();

        let rows = store.list_connections(a, None, page()).await.unwrap();
        assert_eq!(rows[0].other_party(a), b);
        assert_eq!(rows[1].other_party(a), c);
        assert_eq!(store.count_connections(a).await.unwrap(), 1);
        assert_eq!(store.count_pending_outgoing(a).await.unwrap(), 1);
        assert_eq!(store.count_pending_incoming(c).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn visits_upsert_one_row() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        for _ in 0..3 {
            store.record_visit(a, b).await.unwrap();
        }

        let rows = store.list_visitors(b, page()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].visit_count, 3);
        let stats = store.visit_stats(b, Utc::now() - chrono::Duration::days(7)).await.unwrap();
        assert_eq!(stats, VisitStats { unique_visitors: 1, total_visits: 3, visitors_last_7_days: 1 });
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let store = MemoryStore::new();
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        store.request_connection(a, b).await.unwrap();
        store.follow(b, a).await.unwrap();
        store.block(a, b).await.unwrap();

        assert!(store.delete_user(b));
        assert!(store.find_connection(a, b).await.unwrap().is_none());
        assert_eq!(store.count_followers(a).await.unwrap(), 0);
        assert!(!store.is_blocked_either_way(a, b).await.unwrap());
    }
}
