//! Derived queries over the connected graph: mutuals, second-degree reach,
//! degree of separation and per-user counters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use medlink_shared::errors::AppResult;
use medlink_shared::types::Page;

use super::{resolve_users, AccessGuard, Visible, VisibilityFilter};
use crate::models::{
    ConnectionCounts, FollowCounts, NetworkStats, RankedUser, RelationshipPath, UserId, UserRef,
};
use crate::store::{GraphStore, RelationStore};

#[derive(Clone)]
pub struct GraphQuery {
    store: Arc<dyn GraphStore>,
    guard: AccessGuard,
    filter: VisibilityFilter,
}

impl GraphQuery {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            guard: AccessGuard::new(store.clone()),
            filter: VisibilityFilter::new(store.clone()),
            store,
        }
    }

    /// Users connected to both `a` and `b`, in `a`'s connection order.
    pub async fn mutual_ids(&self, a: UserId, b: UserId) -> AppResult<Vec<UserId>> {
        let (left, right) = tokio::try_join!(self.store.connected_ids(a), self.store.connected_ids(b))?;
        let right: HashSet<UserId> = right.into_iter().collect();
        Ok(left
            .into_iter()
            .filter(|id| *id != a && *id != b && right.contains(id))
            .collect())
    }

    pub async fn mutual_connections(
        &self,
        viewer: UserId,
        target: UserId,
        page: Page,
    ) -> AppResult<Vec<Visible<UserRef>>> {
        self.guard.inspect(Some(viewer), target).await?;
        let ids = page.slice(self.mutual_ids(viewer, target).await?);
        let mut users = resolve_users(self.store.as_ref(), &ids).await?;
        let ordered: Vec<UserRef> = ids.iter().filter_map(|id| users.remove(id)).collect();
        self.filter.apply(Some(viewer), ordered).await
    }

    /// Users one intermediary away from `root` and not already connected to it,
    /// with the number of distinct intermediaries. Highest count first, ties by id.
    pub async fn second_degree_ids(&self, root: UserId, cap: usize) -> AppResult<Vec<(UserId, i64)>> {
        let direct = self.store.connected_ids(root).await?;
        if direct.is_empty() || cap == 0 {
            return Ok(Vec::new());
        }
        let direct_set: HashSet<UserId> = direct.iter().copied().collect();

        let mut via: HashMap<UserId, HashSet<UserId>> = HashMap::new();
        for (intermediary, candidate) in self.store.connected_edges(&direct).await? {
            if candidate == root || direct_set.contains(&candidate) {
                continue;
            }
            via.entry(candidate).or_default().insert(intermediary);
        }

        let mut ranked: Vec<(UserId, i64)> = via
            .into_iter()
            .map(|(id, intermediaries)| (id, intermediaries.len() as i64))
            .collect();
        rank(&mut ranked);
        ranked.truncate(cap);
        Ok(ranked)
    }

    pub async fn second_degree(&self, viewer: UserId, page: Page) -> AppResult<Vec<Visible<RankedUser>>> {
        let ranked = page.slice(self.second_degree_ids(viewer, page.end()).await?);
        let candidates = self.ranked_users(&ranked).await?;
        self.filter.apply(Some(viewer), candidates).await
    }

    /// Degree of separation up to two hops. A block either way fails in the guard.
    pub async fn relationship_path(&self, viewer: UserId, target: UserId) -> AppResult<RelationshipPath> {
        self.guard.inspect(Some(viewer), target).await?;
        if viewer == target {
            return Ok(RelationshipPath { degree: Some(0), path: Vec::new() });
        }

        let direct = self.store.find_connection(viewer, target).await?;
        if direct.is_some_and(|c| c.is_connected()) {
            return Ok(RelationshipPath { degree: Some(1), path: vec![target] });
        }

        // the first neighbour of the viewer, in listing order, that also knows the target
        if let Some(via) = self.mutual_ids(viewer, target).await?.into_iter().next() {
            return Ok(RelationshipPath { degree: Some(2), path: vec![via, target] });
        }
        Ok(RelationshipPath { degree: None, path: Vec::new() })
    }

    /// Counters for `target`. Anyone may read their own; others go through the guard.
    pub async fn network_stats(&self, viewer: Option<UserId>, target: UserId) -> AppResult<NetworkStats> {
        self.guard.inspect(viewer, target).await?;

        let store = self.store.as_ref();
        let (connected, pending_incoming, pending_outgoing, followers, following) = tokio::try_join!(
            store.count_connections(target),
            store.count_pending_incoming(target),
            store.count_pending_outgoing(target),
            store.count_followers(target),
            store.count_following(target),
        )?;

        Ok(NetworkStats {
            connections: ConnectionCounts {
                connected,
                pending_incoming,
                pending_outgoing,
                total: connected + pending_incoming + pending_outgoing,
            },
            follows: FollowCounts { followers, following },
        })
    }

    /// Resolves ranked ids into display records, keeping the ranking order.
    pub(crate) async fn ranked_users(&self, ranked: &[(UserId, i64)]) -> AppResult<Vec<RankedUser>> {
        let ids: Vec<UserId> = ranked.iter().map(|(id, _)| *id).collect();
        let mut users = resolve_users(self.store.as_ref(), &ids).await?;
        Ok(ranked
            .iter()
            .filter_map(|(id, mutual_count)| {
                Some(RankedUser { user: users.remove(id)?, mutual_count: *mutual_count })
            })
            .collect())
    }
}

/// mutual_count desc, then id asc.
pub(crate) fn rank(entries: &mut [(UserId, i64)]) {
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use medlink_shared::errors::ErrorKind;

    async fn connect(store: &MemoryStore, a: UserId, b: UserId) {
        store.request_connection(a, b).await.unwrap();
        store.accept_connection(a, b).await.unwrap();
    }

    /// U1-U2, U2-U3, U3-U4, U1-U5, U5-U3
    async fn five_users() -> (Arc<MemoryStore>, GraphQuery, Vec<UserId>) {
        let store = Arc::new(MemoryStore::new());
        let u: Vec<UserId> = (1..=5).map(|i| store.insert_user(&format!("U{i}"), "Test").id).collect();
        for (a, b) in [(0, 1), (1, 2), (2, 3), (0, 4), (4, 2)] {
            connect(&store, u[a], u[b]).await;
        }
        let query = GraphQuery::new(store.clone());
        (store, query, u)
    }

    #[tokio::test]
    async fn mutuals_are_the_shared_connected_set() {
        let (_store, query, u) = five_users().await;

        let mut ids = query.mutual_ids(u[0], u[2]).await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![u[1], u[4]]);

        let listed = query.mutual_connections(u[0], u[2], Page::first(20)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|v| v.relationship.unwrap().is_connected));
    }

    #[tokio::test]
    async fn second_degree_counts_distinct_intermediaries() {
        let (store, query, u) = five_users().await;
        let u6 = store.insert_user("U6", "Test").id;
        connect(&store, u[1], u6).await;

        let ranked = query.second_degree_ids(u[0], 10).await.unwrap();
        assert_eq!(ranked, vec![(u[2], 2), (u6, 1)]);

        // U4 only hangs off U3, which is itself second degree
        assert!(ranked.iter().all(|(id, _)| *id != u[3]));
        assert_eq!(query.second_degree_ids(u[0], 1).await.unwrap(), vec![(u[2], 2)]);
    }

    #[tokio::test]
    async fn second_degree_excludes_direct_connections() {
        let (_store, query, u) = five_users().await;
        let ranked = query.second_degree_ids(u[1], 10).await.unwrap();
        let ids: Vec<UserId> = ranked.iter().map(|(id, _)| *id).collect();
        assert!(!ids.contains(&u[1]));
        assert!(!ids.contains(&u[0]));
        assert!(!ids.contains(&u[2]));
        // U5 through U1 and U3, U4 through U3 only
        assert_eq!(ranked, vec![(u[4], 2), (u[3], 1)]);
    }

    #[tokio::test]
    async fn second_degree_page_past_the_end_is_empty() {
        let (_store, query, u) = five_users().await;
        let page = Page { limit: 5, offset: i64::MAX };
        assert!(query.second_degree(u[0], page).await.unwrap().is_empty());

        let page = Page { limit: 5, offset: 1 };
        assert!(query.second_degree(u[0], page).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn path_degrees() {
        let (_store, query, u) = five_users().await;

        let same = query.relationship_path(u[0], u[0]).await.unwrap();
        assert_eq!(same, RelationshipPath { degree: Some(0), path: vec![] });

        let direct = query.relationship_path(u[0], u[1]).await.unwrap();
        assert_eq!(direct, RelationshipPath { degree: Some(1), path: vec![u[1]] });

        let two = query.relationship_path(u[0], u[2]).await.unwrap();
        assert_eq!(two.degree, Some(2));
        assert!(two.path[0] == u[1] || two.path[0] == u[4]);
        assert_eq!(two.path[1], u[2]);

        let far = query.relationship_path(u[0], u[3]).await.unwrap();
        assert_eq!(far, RelationshipPath { degree: None, path: vec![] });
    }

    #[tokio::test]
    async fn pending_request_is_not_degree_one() {
        let store = Arc::new(MemoryStore::new());
        let a = store.insert_user("A", "Test").id;
        let b = store.insert_user("B", "Test").id;
        store.request_connection(a, b).await.unwrap();
        let query = GraphQuery::new(store);

        assert_eq!(query.relationship_path(a, b).await.unwrap().degree, None);
    }

    #[tokio::test]
    async fn block_stops_path_and_hides_mutuals() {
        let (store, query, u) = five_users().await;
        store.block(u[0], u[1]).await.unwrap();

        let err = query.relationship_path(u[0], u[1]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let listed = query.mutual_connections(u[0], u[2], Page::first(20)).await.unwrap();
        let ids: Vec<UserId> = listed.iter().map(|v| v.item.id).collect();
        assert_eq!(ids, vec![u[4]]);
    }

    #[tokio::test]
    async fn stats_add_up() {
        let (store, query, u) = five_users().await;
        let extra = store.insert_user("U6", "Test").id;
        store.request_connection(extra, u[0]).await.unwrap();
        store.follow(u[2], u[0]).await.unwrap();

        let stats = query.network_stats(None, u[0]).await.unwrap();
        assert_eq!(stats.connections.connected, 2);
        assert_eq!(stats.connections.pending_incoming, 1);
        assert_eq!(stats.connections.pending_outgoing, 0);
        assert_eq!(stats.connections.total, 3);
        assert_eq!(stats.follows, FollowCounts { followers: 1, following: 0 });
    }

    #[test]
    fn ranking_breaks_ties_by_id() {
        let mut entries = vec![(9, 1), (4, 3), (2, 1), (7, 3)];
        rank(&mut entries);
        assert_eq!(entries, vec![(4, 3), (7, 3), (2, 1), (9, 1)]);
    }
}
