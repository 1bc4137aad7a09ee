use std::sync::Arc;

use chrono::{Duration, Utc};

use medlink_shared::errors::AppResult;
use medlink_shared::types::Page;

use super::{resolve_users, AccessGuard, Visible, VisibilityFilter};
use crate::models::{ProfileVisit, UserId, VisitEntry, VisitStats};
use crate::store::{GraphStore, VisitLog};

/// Window for `visitors_last_7_days`.
const RECENT_WINDOW_DAYS: i64 = 7;

/// Profile visit tracking. Inbound data is readable by the profile owner only.
#[derive(Clone)]
pub struct VisitService {
    store: Arc<dyn GraphStore>,
    guard: AccessGuard,
    filter: VisibilityFilter,
}

impl VisitService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            guard: AccessGuard::new(store.clone()),
            filter: VisibilityFilter::new(store.clone()),
            store,
        }
    }

    /// Counts a view of `profile` by `visitor`. Looking at your own profile is not a visit.
    pub async fn record_visit(&self, visitor: UserId, profile: UserId) -> AppResult<Option<ProfileVisit>> {
        if visitor == profile {
            return Ok(None);
        }
        self.guard.inspect(Some(visitor), profile).await?;

        let visit = self.store.record_visit(visitor, profile).await?;
        tracing::debug!(visitor, profile, visit_count = visit.visit_count, "profile visit recorded");
        Ok(Some(visit))
    }

    pub async fn visitors(&self, viewer: UserId, profile: UserId, page: Page) -> AppResult<Vec<Visible<VisitEntry>>> {
        self.guard.require_user(profile).await?;
        self.guard.owner_only(viewer, profile)?;

        let rows = self.store.list_visitors(profile, page).await?;
        let edges = rows.into_iter().map(|v| (v.visitor_id, v)).collect();
        let entries = self.visit_entries(edges).await?;
        self.filter.apply(Some(viewer), entries).await
    }

    /// Profiles the viewer has looked at, most recent first.
    pub async fn visited(&self, viewer: UserId, page: Page) -> AppResult<Vec<Visible<VisitEntry>>> {
        let rows = self.store.list_visited(viewer, page).await?;
        let edges = rows.into_iter().map(|v| (v.profile_user_id, v)).collect();
        let entries = self.visit_entries(edges).await?;
        self.filter.apply(Some(viewer), entries).await
    }

    pub async fn visit_stats(&self, viewer: UserId, profile: UserId) -> AppResult<VisitStats> {
        self.guard.require_user(profile).await?;
        self.guard.owner_only(viewer, profile)?;

        let since = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
        self.store.visit_stats(profile, since).await
    }

    async fn visit_entries(&self, rows: Vec<(UserId, ProfileVisit)>) -> AppResult<Vec<VisitEntry>> {
        let ids: Vec<UserId> = rows.iter().map(|(id, _)| *id).collect();
        let mut users = resolve_users(self.store.as_ref(), &ids).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, visit)| {
                Some(VisitEntry {
                    user: users.remove(&id)?,
                    visit_count: visit.visit_count,
                    last_visited_at: visit.last_visited_at,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RelationStore};
    use medlink_shared::errors::{ErrorCode, ErrorKind};

    fn setup(n: usize) -> (Arc<MemoryStore>, VisitService, Vec<UserId>) {
        let store = Arc::new(MemoryStore::new());
        let ids = (0..n).map(|i| store.insert_user(&format!("U{i}"), "Test").id).collect();
        let service = VisitService::new(store.clone());
        (store, service, ids)
    }

    #[tokio::test]
    async fn repeated_visits_share_one_row() {
        let (_store, service, u) = setup(3);
        for _ in 0..3 {
            service.record_visit(u[0], u[1]).await.unwrap();
        }
        service.record_visit(u[2], u[1]).await.unwrap();
        service.record_visit(u[0], u[1]).await.unwrap();

        let visitors = service.visitors(u[1], u[1], Page::first(20)).await.unwrap();
        assert_eq!(visitors.len(), 2);
        assert_eq!(visitors[0].item.user.id, u[0]);
        assert_eq!(visitors[0].item.visit_count, 4);
        assert_eq!(visitors[1].item.visit_count, 1);
    }

    #[tokio::test]
    async fn visitors_are_private_to_the_owner() {
        let (_store, service, u) = setup(3);
        service.record_visit(u[0], u[1]).await.unwrap();

        let err = service.visitors(u[2], u[1], Page::first(20)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.code(), Some(ErrorCode::VisitorsPrivate));
        assert_eq!(service.visit_stats(u[2], u[1]).await.unwrap_err().kind(), ErrorKind::Forbidden);
        assert_eq!(service.visitors(u[1], 999, Page::first(20)).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn self_visit_is_ignored() {
        let (_store, service, u) = setup(1);
        assert!(service.record_visit(u[0], u[0]).await.unwrap().is_none());
        let stats = service.visit_stats(u[0], u[0]).await.unwrap();
        assert_eq!(stats, VisitStats::default());
    }

    #[tokio::test]
    async fn blocked_visitors_are_rejected_and_hidden() {
        let (store, service, u) = setup(3);
        service.record_visit(u[0], u[2]).await.unwrap();
        service.record_visit(u[1], u[2]).await.unwrap();
        store.block(u[2], u[1]).await.unwrap();

        let err = service.record_visit(u[1], u[2]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let visitors = service.visitors(u[2], u[2], Page::first(20)).await.unwrap();
        let ids: Vec<UserId> = visitors.iter().map(|v| v.item.user.id).collect();
        assert_eq!(ids, vec![u[0]]);

        // stats still count the hidden visitor
        let stats = service.visit_stats(u[2], u[2]).await.unwrap();
        assert_eq!(stats.unique_visitors, 2);
        assert_eq!(stats.total_visits, 2);
        assert_eq!(stats.visitors_last_7_days, 2);
    }

    #[tokio::test]
    async fn visited_lists_outbound_profiles() {
        let (_store, service, u) = setup(3);
        service.record_visit(u[0], u[1]).await.unwrap();
        service.record_visit(u[0], u[2]).await.unwrap();

        let visited = service.visited(u[0], Page::first(20)).await.unwrap();
        let ids: Vec<UserId> = visited.iter().map(|v| v.item.user.id).collect();
        assert_eq!(ids, vec![u[2], u[1]]);
    }
}
