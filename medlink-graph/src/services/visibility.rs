//! The single choke point every user listing passes through before it leaves
//! the service: hides users with a block in either direction and annotates
//! survivors with the viewer's relationship to them.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;

use medlink_shared::errors::AppResult;

use crate::models::{ConnectionStatus, UserId, UserKeyed};
use crate::store::{GraphStore, RelationStore};

/// Relationship of the viewer to one listed user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub is_connected: bool,
    pub connection_status: Option<ConnectionStatus>,
    pub connection_requester_id: Option<UserId>,
    pub connection_pending: bool,
    pub i_follow_them: bool,
    pub they_follow_me: bool,
    pub i_blocked: bool,
    pub blocked_me: bool,
}

/// A listed record plus the optional per-viewer annotation.
#[derive(Debug, Clone, Serialize)]
pub struct Visible<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

impl<T> Visible<T> {
    pub fn plain(item: T) -> Self {
        Self { item, relationship: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    HideBlocked,
    AnnotateOnly,
}

struct Lookup {
    blocked_either_way: bool,
    relationship: Relationship,
}

#[derive(Clone)]
pub struct VisibilityFilter {
    store: Arc<dyn GraphStore>,
}

impl VisibilityFilter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Drops candidates with a block either way and annotates the rest.
    /// Anonymous viewers get the list back untouched.
    pub async fn apply<T: UserKeyed>(&self, viewer: Option<UserId>, items: Vec<T>) -> AppResult<Vec<Visible<T>>> {
        self.run(viewer, items, Mode::HideBlocked).await
    }

    /// Annotates without dropping anyone; `iBlocked`/`blockedMe` become observable.
    pub async fn annotate<T: UserKeyed>(&self, viewer: UserId, items: Vec<T>) -> AppResult<Vec<Visible<T>>> {
        self.run(Some(viewer), items, Mode::AnnotateOnly).await
    }

    /// Relationship of `viewer` to `other`. All lookups are issued at once.
    pub async fn relationship(&self, viewer: UserId, other: UserId) -> AppResult<Relationship> {
        Ok(self.lookup(viewer, other).await?.relationship)
    }

    async fn lookup(&self, viewer: UserId, other: UserId) -> AppResult<Lookup> {
        let store = self.store.as_ref();
        let (blocked_either_way, connection, i_follow_them, they_follow_me, i_blocked, blocked_me) = tokio::try_join!(
            store.is_blocked_either_way(viewer, other),
            store.find_connection(viewer, other),
            store.is_following(viewer, other),
            store.is_following(other, viewer),
            store.is_blocked_one_way(viewer, other),
            store.is_blocked_one_way(other, viewer),
        )?;

        let status = connection.as_ref().map(|c| c.status);
        Ok(Lookup {
            blocked_either_way,
            relationship: Relationship {
                is_connected: status == Some(ConnectionStatus::Connected),
                connection_status: status,
                connection_requester_id: connection.as_ref().map(|c| c.requester_id),
                connection_pending: status == Some(ConnectionStatus::Pending),
                i_follow_them,
                they_follow_me,
                i_blocked,
                blocked_me,
            },
        })
    }

    async fn run<T: UserKeyed>(&self, viewer: Option<UserId>, items: Vec<T>, mode: Mode) -> AppResult<Vec<Visible<T>>> {
        let Some(viewer) = viewer else {
            return Ok(items.into_iter().map(Visible::plain).collect());
        };

        let lookups = try_join_all(items.iter().map(|item| {
            let other = item.user_id();
            async move {
                if other == viewer {
                    Ok(None)
                } else {
                    self.lookup(viewer, other).await.map(Some)
                }
            }
        }))
        .await?;

        let total = items.len();
        let visible: Vec<Visible<T>> = items
            .into_iter()
            .zip(lookups)
            .filter_map(|(item, lookup)| match lookup {
                None => Some(Visible::plain(item)),
                Some(l) if mode == Mode::HideBlocked && l.blocked_either_way => None,
                Some(l) => Some(Visible { item, relationship: Some(l.relationship) }),
            })
            .collect();

        if visible.len() < total {
            tracing::debug!(viewer, hidden = total - visible.len(), "blocked users removed from listing");
        }
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRef;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, VisibilityFilter, Vec<UserRef>) {
        let store = Arc::new(MemoryStore::new());
        let users = ["Ada", "Grace", "Alan", "Edsger"]
            .iter()
            .map(|name| store.insert_user(name, "Test"))
            .collect();
        let filter = VisibilityFilter::new(store.clone());
        (store, filter, users)
    }

    #[tokio::test]
    async fn anonymous_viewer_sees_everything_unannotated() {
        let (store, filter, users) = setup();
        store.block(users[0].id, users[1].id).await.unwrap();

        let out = filter.apply(None, users.clone()).await.unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|v| v.relationship.is_none()));
    }

    #[tokio::test]
    async fn blocks_hide_in_both_directions() {
        let (store, filter, users) = setup();
        let viewer = users[0].id;
        store.block(viewer, users[1].id).await.unwrap();
        store.block(users[2].id, viewer).await.unwrap();

        let out = filter.apply(Some(viewer), users.clone()).await.unwrap();
        let ids: Vec<UserId> = out.iter().map(|v| v.item.id).collect();
        assert_eq!(ids, vec![viewer, users[3].id]);
        // self passes through unannotated
        assert!(out[0].relationship.is_none());
        assert!(out[1].relationship.is_some());
    }

    #[tokio::test]
    async fn annotation_reports_pending_origin_and_follows() {
        let (store, filter, users) = setup();
        let (viewer, other) = (users[0].id, users[1].id);
        store.request_connection(other, viewer).await.unwrap();
        store.follow(other, viewer).await.unwrap();

        let rel = filter.relationship(viewer, other).await.unwrap();
        assert!(rel.connection_pending);
        assert!(!rel.is_connected);
        assert_eq!(rel.connection_requester_id, Some(other));
        assert_eq!(rel.connection_status, Some(ConnectionStatus::Pending));
        assert!(rel.they_follow_me);
        assert!(!rel.i_follow_them);
    }

    #[tokio::test]
    async fn annotate_only_keeps_blocked_users() {
        let (store, filter, users) = setup();
        let viewer = users[0].id;
        store.block(viewer, users[1].id).await.unwrap();

        let out = filter.annotate(viewer, vec![users[1].clone()]).await.unwrap();
        assert_eq!(out.len(), 1);
        let rel = out[0].relationship.unwrap();
        assert!(rel.i_blocked);
        assert!(!rel.blocked_me);
    }

    #[tokio::test]
    async fn order_is_preserved() {
        let (_store, filter, users) = setup();
        let reversed: Vec<UserRef> = users.iter().rev().cloned().collect();
        let out = filter.apply(Some(users[0].id), reversed.clone()).await.unwrap();
        let ids: Vec<UserId> = out.iter().map(|v| v.item.id).collect();
        assert_eq!(ids, reversed.iter().map(|u| u.id).collect::<Vec<_>>());
    }
}
