use std::sync::Arc;

use medlink_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{UserId, UserRef};
use crate::store::{GraphStore, RelationStore, UserDirectory};

/// Entry checks for operations aimed at another user.
#[derive(Clone)]
pub struct AccessGuard {
    store: Arc<dyn GraphStore>,
}

impl AccessGuard {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn require_user(&self, id: UserId) -> AppResult<UserRef> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, format!("user {id} not found")))
    }

    /// Target must exist and, for an authenticated viewer other than the target,
    /// no block may exist in either direction.
    pub async fn inspect(&self, viewer: Option<UserId>, target: UserId) -> AppResult<UserRef> {
        let viewer = match viewer {
            Some(v) if v != target => v,
            _ => return self.require_user(target).await,
        };

        let (user, blocked) = tokio::join!(
            self.store.find_user(target),
            self.store.is_blocked_either_way(viewer, target),
        );
        let user = user?.ok_or_else(|| AppError::new(ErrorCode::UserNotFound, format!("user {target} not found")))?;
        if blocked? {
            tracing::debug!(viewer, target, "access denied by block");
            return Err(AppError::new(ErrorCode::UserBlocked, "this user is not available"));
        }
        Ok(user)
    }

    /// Privacy gate for inbound visit data: only the profile owner may read it.
    pub fn owner_only(&self, viewer: UserId, target: UserId) -> AppResult<()> {
        if viewer != target {
            return Err(AppError::new(ErrorCode::VisitorsPrivate, "profile visitors are only visible to the profile owner"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use medlink_shared::errors::ErrorKind;

    #[tokio::test]
    async fn missing_target_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.insert_user("Ada", "Lovelace").id;
        let guard = AccessGuard::new(store);

        let err = guard.inspect(Some(viewer), 999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn block_either_way_is_forbidden() {
        let store = Arc::new(MemoryStore::new());
        let a = store.insert_user("Ada", "Lovelace").id;
        let b = store.insert_user("Grace", "Hopper").id;
        store.block(b, a).await.unwrap();
        let guard = AccessGuard::new(store);

        assert_eq!(guard.inspect(Some(a), b).await.unwrap_err().kind(), ErrorKind::Forbidden);
        assert_eq!(guard.inspect(Some(b), a).await.unwrap_err().kind(), ErrorKind::Forbidden);
        // anonymous and self-targeted inspection skip the block check
        assert!(guard.inspect(None, b).await.is_ok());
        assert!(guard.inspect(Some(a), a).await.is_ok());
    }

    #[tokio::test]
    async fn owner_gate() {
        let guard = AccessGuard::new(Arc::new(MemoryStore::new()));
        assert!(guard.owner_only(3, 3).is_ok());
        assert_eq!(guard.owner_only(3, 4).unwrap_err().code(), Some(ErrorCode::VisitorsPrivate));
    }
}
