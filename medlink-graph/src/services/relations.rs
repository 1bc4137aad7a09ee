use std::sync::Arc;

use chrono::{DateTime, Utc};

use medlink_shared::errors::{AppResult, ErrorCode};
use medlink_shared::types::Page;

use super::{resolve_users, AccessGuard, Visible, VisibilityFilter};
use crate::models::{Block, Connection, ConnectionEntry, ConnectionStatus, EdgeEntry, Follow, UserId};
use crate::store::{ensure_distinct, GraphStore, RelationStore};

/// Connection, follow and block mutations plus the plain relation listings.
#[derive(Clone)]
pub struct RelationService {
    store: Arc<dyn GraphStore>,
    guard: AccessGuard,
    filter: VisibilityFilter,
}

impl RelationService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            guard: AccessGuard::new(store.clone()),
            filter: VisibilityFilter::new(store.clone()),
            store,
        }
    }

    // --- Connections ---

    pub async fn request_connection(&self, viewer: UserId, target: UserId) -> AppResult<Connection> {
        ensure_distinct(viewer, target, ErrorCode::CannotConnectSelf)?;
        self.guard.inspect(Some(viewer), target).await?;

        let record = self.store.request_connection(viewer, target).await?;
        tracing::info!(
            connection_id = record.id,
            requester = record.requester_id,
            addressee = record.addressee_id,
            status = %record.status,
            "connection requested"
        );
        Ok(record)
    }

    /// The viewer accepts a pending request sent by `requester`.
    pub async fn accept_connection(&self, viewer: UserId, requester: UserId) -> AppResult<Option<Connection>> {
        ensure_distinct(viewer, requester, ErrorCode::CannotConnectSelf)?;
        self.guard.require_user(requester).await?;

        let record = self.store.accept_connection(requester, viewer).await?;
        if let Some(record) = &record {
            tracing::info!(connection_id = record.id, requester, addressee = viewer, "connection accepted");
        }
        Ok(record)
    }

    pub async fn remove_connection(&self, viewer: UserId, other: UserId) -> AppResult<Option<Connection>> {
        ensure_distinct(viewer, other, ErrorCode::CannotConnectSelf)?;
        self.guard.require_user(other).await?;

        let removed = self.store.remove_connection(viewer, other).await?;
        if let Some(record) = &removed {
            tracing::info!(connection_id = record.id, by = viewer, other, "connection removed");
        }
        Ok(removed)
    }

    pub async fn find_connection(&self, viewer: UserId, other: UserId) -> AppResult<Option<Connection>> {
        self.guard.inspect(Some(viewer), other).await?;
        self.store.find_connection(viewer, other).await
    }

    pub async fn list_connections(
        &self,
        viewer: UserId,
        status: Option<ConnectionStatus>,
        page: Page,
    ) -> AppResult<Vec<Visible<ConnectionEntry>>> {
        let rows = self.store.list_connections(viewer, status, page).await?;
        let entries = self.connection_entries(viewer, rows).await?;
        self.filter.apply(Some(viewer), entries).await
    }

    /// Another user's connected list, as seen by `viewer`.
    pub async fn list_connections_of(
        &self,
        viewer: Option<UserId>,
        target: UserId,
        page: Page,
    ) -> AppResult<Vec<Visible<ConnectionEntry>>> {
        self.guard.inspect(viewer, target).await?;
        let rows = self
            .store
            .list_connections(target, Some(ConnectionStatus::Connected), page)
            .await?;
        let entries = self.connection_entries(target, rows).await?;
        self.filter.apply(viewer, entries).await
    }

    pub async fn list_pending_incoming(&self, viewer: UserId, page: Page) -> AppResult<Vec<Visible<ConnectionEntry>>> {
        let rows = self.store.list_pending_incoming(viewer, page).await?;
        let entries = self.connection_entries(viewer, rows).await?;
        self.filter.apply(Some(viewer), entries).await
    }

    pub async fn list_pending_outgoing(&self, viewer: UserId, page: Page) -> AppResult<Vec<Visible<ConnectionEntry>>> {
        let rows = self.store.list_pending_outgoing(viewer, page).await?;
        let entries = self.connection_entries(viewer, rows).await?;
        self.filter.apply(Some(viewer), entries).await
    }

    // --- Follows ---

    pub async fn follow(&self, viewer: UserId, target: UserId) -> AppResult<Follow> {
        ensure_distinct(viewer, target, ErrorCode::CannotFollowSelf)?;
        self.guard.inspect(Some(viewer), target).await?;

        let record = self.store.follow(viewer, target).await?;
        tracing::info!(follower = viewer, following = target, "follow created");
        Ok(record)
    }

    pub async fn unfollow(&self, viewer: UserId, target: UserId) -> AppResult<Option<Follow>> {
        ensure_distinct(viewer, target, ErrorCode::CannotFollowSelf)?;
        self.guard.require_user(target).await?;
        self.store.unfollow(viewer, target).await
    }

    pub async fn is_following(&self, viewer: UserId, target: UserId) -> AppResult<bool> {
        self.guard.inspect(Some(viewer), target).await?;
        self.store.is_following(viewer, target).await
    }

    pub async fn list_followers(
        &self,
        viewer: Option<UserId>,
        target: UserId,
        page: Page,
    ) -> AppResult<Vec<Visible<EdgeEntry>>> {
        self.guard.inspect(viewer, target).await?;
        let rows = self.store.list_followers(target, page).await?;
        let entries = self
            .edge_entries(rows.into_iter().map(|f| (f.follower_id, f.created_at)).collect())
            .await?;
        self.filter.apply(viewer, entries).await
    }

    pub async fn list_following(
        &self,
        viewer: Option<UserId>,
        target: UserId,
        page: Page,
    ) -> AppResult<Vec<Visible<EdgeEntry>>> {
        self.guard.inspect(viewer, target).await?;
        let rows = self.store.list_following(target, page).await?;
        let entries = self
            .edge_entries(rows.into_iter().map(|f| (f.following_id, f.created_at)).collect())
            .await?;
        self.filter.apply(viewer, entries).await
    }

    // --- Blocks ---

    /// Existing connections and follows stay in storage; the filter hides them.
    pub async fn block(&self, viewer: UserId, target: UserId) -> AppResult<Block> {
        ensure_distinct(viewer, target, ErrorCode::CannotBlockSelf)?;
        self.guard.require_user(target).await?;

        let record = self.store.block(viewer, target).await?;
        tracing::info!(blocker = viewer, blocked = target, "block created");
        Ok(record)
    }

    pub async fn unblock(&self, viewer: UserId, target: UserId) -> AppResult<Option<Block>> {
        ensure_distinct(viewer, target, ErrorCode::CannotBlockSelf)?;
        self.guard.require_user(target).await?;

        let removed = self.store.unblock(viewer, target).await?;
        if removed.is_some() {
            tracing::info!(blocker = viewer, blocked = target, "block lifted");
        }
        Ok(removed)
    }

    /// Users the viewer blocked. Annotated but never filtered, so `iBlocked` is set.
    pub async fn list_blocked(&self, viewer: UserId, page: Page) -> AppResult<Vec<Visible<EdgeEntry>>> {
        let rows = self.store.list_blocked(viewer, page).await?;
        let entries = self
            .edge_entries(rows.into_iter().map(|b| (b.blocked_id, b.created_at)).collect())
            .await?;
        self.filter.annotate(viewer, entries).await
    }

    async fn connection_entries(&self, owner: UserId, rows: Vec<Connection>) -> AppResult<Vec<ConnectionEntry>> {
        let ids: Vec<UserId> = rows.iter().map(|c| c.other_party(owner)).collect();
        let mut users = resolve_users(self.store.as_ref(), &ids).await?;
        Ok(rows
            .into_iter()
            .filter_map(|connection| {
                let user = users.remove(&connection.other_party(owner))?;
                Some(ConnectionEntry { connection, user })
            })
            .collect())
    }

    async fn edge_entries(&self, edges: Vec<(UserId, DateTime<Utc>)>) -> AppResult<Vec<EdgeEntry>> {
        let ids: Vec<UserId> = edges.iter().map(|(id, _)| *id).collect();
        let mut users = resolve_users(self.store.as_ref(), &ids).await?;
        Ok(edges
            .into_iter()
            .filter_map(|(id, since)| Some(EdgeEntry { user: users.remove(&id)?, since }))
            .collect())
    }
}
