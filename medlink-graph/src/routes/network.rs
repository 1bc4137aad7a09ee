use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;

use medlink_shared::errors::AppResult;
use medlink_shared::types::auth::AuthUser;
use medlink_shared::types::{ApiResponse, Paginated};

use super::{ListQuery, UserPath};
use crate::models::{NetworkStats, RankedUser, RelationshipPath, UserRef};
use crate::services::Visible;
use crate::AppState;

// --- GET /network/mutual/:user_id ---

pub async fn mutual_connections(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<UserRef>>>>> {
    let page = params.page(20)?;
    let items = state.graph.mutual_connections(user.id, target, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /network/second-degree ---

pub async fn second_degree(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<RankedUser>>>>> {
    let page = params.page(20)?;
    let items = state.graph.second_degree(user.id, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /network/path/:user_id ---

pub async fn relationship_path(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<RelationshipPath>>> {
    let path = state.graph.relationship_path(user.id, target).await?;
    Ok(Json(ApiResponse::ok(path)))
}

// --- GET /network/stats ---

pub async fn my_stats(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<NetworkStats>>> {
    let stats = state.graph.network_stats(Some(user.id), user.id).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

// --- GET /network/suggestions ---

pub async fn suggestions(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<RankedUser>>>>> {
    let page = params.page(10)?;
    let items = state.suggester.suggest(user.id, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}
