//! Public views of another user's graph. Authentication is optional; anonymous
//! callers get unfiltered, unannotated lists.

use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;

use medlink_shared::errors::AppResult;
use medlink_shared::middleware::OptionalAuthUser;
use medlink_shared::types::{ApiResponse, Paginated};

use super::{ListQuery, UserPath};
use crate::models::{ConnectionEntry, EdgeEntry, NetworkStats};
use crate::services::Visible;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 20;

// --- GET /users/:user_id/connections ---

pub async fn connections_of(
    viewer: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<ConnectionEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state
        .relations
        .list_connections_of(viewer.viewer_id(), target, page)
        .await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /users/:user_id/followers ---

pub async fn followers_of(
    viewer: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<EdgeEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state.relations.list_followers(viewer.viewer_id(), target, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /users/:user_id/following ---

pub async fn following_of(
    viewer: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<EdgeEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state.relations.list_following(viewer.viewer_id(), target, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /users/:user_id/stats ---

pub async fn stats_of(
    viewer: OptionalAuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<NetworkStats>>> {
    let stats = state.graph.network_stats(viewer.viewer_id(), target).await?;
    Ok(Json(ApiResponse::ok(stats)))
}
