pub mod blocks;
pub mod connections;
pub mod follows;
pub mod health;
pub mod network;
pub mod users;
pub mod visitors;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde::Deserialize;

use medlink_shared::errors::{AppError, AppResult, ErrorCode};
use medlink_shared::types::{Page, PageParams};

use crate::models::UserId;

/// `:user_id` path segment. A non-integer id is an invalid argument, not a routing miss.
#[derive(Debug, Clone, Copy)]
pub struct UserPath(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        raw.parse::<UserId>()
            .map(UserPath)
            .map_err(|_| AppError::new(ErrorCode::ValidationError, format!("invalid user id: {raw}")))
    }
}

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn page(&self, default_limit: i64) -> AppResult<Page> {
        PageParams { limit: self.limit, offset: self.offset }.resolve(default_limit)
    }
}
