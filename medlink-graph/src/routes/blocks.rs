use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;

use medlink_shared::errors::AppResult;
use medlink_shared::types::auth::AuthUser;
use medlink_shared::types::{ApiResponse, Paginated};

use super::{ListQuery, UserPath};
use crate::models::{Block, EdgeEntry};
use crate::services::Visible;
use crate::AppState;

// --- POST /blocks/:user_id ---

pub async fn block(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<Block>>> {
    let record = state.relations.block(user.id, target).await?;
    Ok(Json(ApiResponse::ok(record)))
}

// --- DELETE /blocks/:user_id ---

pub async fn unblock(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<Option<Block>>>> {
    let removed = state.relations.unblock(user.id, target).await?;
    Ok(Json(ApiResponse::ok(removed)))
}

// --- GET /blocks ---

pub async fn list_blocked(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<EdgeEntry>>>>> {
    let page = params.page(50)?;
    let items = state.relations.list_blocked(user.id, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}
