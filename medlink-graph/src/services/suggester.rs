use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;

use medlink_shared::errors::AppResult;
use medlink_shared::types::Page;

use super::graph_query::rank;
use super::{GraphQuery, Visible, VisibilityFilter};
use crate::models::{RankedUser, UserId};
use crate::store::{GraphStore, RelationStore};

/// Bounds on how much of the graph a single suggestion request may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestSettings {
    /// How many of the viewer's connections are expanded for mutuals.
    pub fanout: usize,
    /// Second-degree candidates fetched per requested suggestion.
    pub second_degree_factor: usize,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self { fanout: 10, second_degree_factor: 2 }
    }
}

#[derive(Clone)]
pub struct Suggester {
    store: Arc<dyn GraphStore>,
    query: GraphQuery,
    filter: VisibilityFilter,
    settings: SuggestSettings,
}

impl Suggester {
    pub fn new(store: Arc<dyn GraphStore>, settings: SuggestSettings) -> Self {
        Self {
            query: GraphQuery::new(store.clone()),
            filter: VisibilityFilter::new(store.clone()),
            store,
            settings,
        }
    }

    /// People the viewer may know, ranked by shared connections.
    ///
    /// Candidates come from the second-degree neighbourhood, topped up with the
    /// mutuals of the first `fanout` connections. The viewer, the viewer's
    /// existing connections and anyone with a block either way never appear.
    /// Users with a pending request toward or from the viewer are kept; their
    /// annotation says so. The page is cut from the final ranked, filtered list.
    pub async fn suggest(&self, viewer: UserId, page: Page) -> AppResult<Vec<Visible<RankedUser>>> {
        let connected = self.store.connected_ids(viewer).await?;
        if connected.is_empty() || page.limit == 0 {
            return Ok(Vec::new());
        }

        let cap = page.end().saturating_mul(self.settings.second_degree_factor);
        let base = self.query.second_degree_ids(viewer, cap).await?;
        let mut scores: HashMap<UserId, i64> = base.into_iter().collect();

        let expanded = &connected[..connected.len().min(self.settings.fanout)];
        let mutual_lists = try_join_all(expanded.iter().map(|c| self.query.mutual_ids(viewer, *c))).await?;
        for mutual in mutual_lists.into_iter().flatten() {
            *scores.entry(mutual).or_insert(0) += 1;
        }

        let excluded: HashSet<UserId> = connected.iter().copied().chain([viewer]).collect();
        let mut ranked: Vec<(UserId, i64)> = scores
            .into_iter()
            .filter(|(id, _)| !excluded.contains(id))
            .collect();
        rank(&mut ranked);

        let candidates = self.query.ranked_users(&ranked).await?;
        let visible = page.slice(self.filter.apply(Some(viewer), candidates).await?);

        tracing::debug!(viewer, returned = visible.len(), "suggestions computed");
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn connect(store: &MemoryStore, a: UserId, b: UserId) {
        store.request_connection(a, b).await.unwrap();
        store.accept_connection(a, b).await.unwrap();
    }

    async fn network(n: usize, edges: &[(usize, usize)]) -> (Arc<MemoryStore>, Suggester, Vec<UserId>) {
        let store = Arc::new(MemoryStore::new());
        let u: Vec<UserId> = (0..n).map(|i| store.insert_user(&format!("U{i}"), "Test").id).collect();
        for (a, b) in edges {
            connect(&store, u[*a], u[*b]).await;
        }
        let suggester = Suggester::new(store.clone(), SuggestSettings::default());
        (store, suggester, u)
    }

    fn ids(out: &[Visible<RankedUser>]) -> Vec<UserId> {
        out.iter().map(|v| v.item.user.id).collect()
    }

    #[tokio::test]
    async fn no_connections_means_no_suggestions() {
        let (_store, suggester, u) = network(3, &[(1, 2)]).await;
        assert!(suggester.suggest(u[0], Page::first(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ranks_by_shared_connections() {
        // U0 knows U1 and U2; U3 knows both of them, U4 only U1
        let (_store, suggester, u) = network(5, &[(0, 1), (0, 2), (1, 3), (2, 3), (1, 4), (1, 2)]).await;

        let out = suggester.suggest(u[0], Page::first(10)).await.unwrap();
        assert_eq!(ids(&out), vec![u[3], u[4]]);
        assert_eq!(out[0].item.mutual_count, 2);
        assert_eq!(out[1].item.mutual_count, 1);
    }

    #[tokio::test]
    async fn never_returns_self_connected_or_blocked() {
        let edges = [(0, 1), (0, 2), (1, 2), (1, 3), (2, 4), (1, 5), (2, 5)];
        let (store, suggester, u) = network(6, &edges).await;
        store.block(u[5], u[0]).await.unwrap();

        let out = suggester.suggest(u[0], Page::first(10)).await.unwrap();
        let got = ids(&out);
        assert!(!got.contains(&u[0]));
        assert!(!got.contains(&u[1]));
        assert!(!got.contains(&u[2]));
        assert!(!got.contains(&u[5]));
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn respects_limit() {
        let edges: Vec<(usize, usize)> = (2..8).map(|i| (1, i)).chain([(0, 1)]).collect();
        let (_store, suggester, u) = network(8, &edges).await;

        let out = suggester.suggest(u[0], Page::first(3)).await.unwrap();
        assert_eq!(out.len(), 3);
        // all tie at one mutual, so ids ascend
        assert_eq!(ids(&out), vec![u[2], u[3], u[4]]);
    }

    #[tokio::test]
    async fn offset_skips_into_the_ranking() {
        let edges: Vec<(usize, usize)> = (2..8).map(|i| (1, i)).chain([(0, 1)]).collect();
        let (_store, suggester, u) = network(8, &edges).await;

        let out = suggester.suggest(u[0], Page { limit: 2, offset: 3 }).await.unwrap();
        assert_eq!(ids(&out), vec![u[5], u[6]]);

        let out = suggester.suggest(u[0], Page { limit: 2, offset: i64::MAX }).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn pending_candidates_are_annotated() {
        let (store, suggester, u) = network(3, &[(0, 1), (1, 2)]).await;
        store.request_connection(u[2], u[0]).await.unwrap();

        let out = suggester.suggest(u[0], Page::first(5)).await.unwrap();
        assert_eq!(ids(&out), vec![u[2]]);
        let rel = out[0].relationship.unwrap();
        assert!(rel.connection_pending);
        assert_eq!(rel.connection_requester_id, Some(u[2]));
    }
}
