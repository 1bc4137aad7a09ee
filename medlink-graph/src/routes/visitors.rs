use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;

use medlink_shared::errors::AppResult;
use medlink_shared::types::auth::AuthUser;
use medlink_shared::types::{ApiResponse, Paginated};

use super::{ListQuery, UserPath};
use crate::models::{ProfileVisit, VisitEntry, VisitStats};
use crate::services::Visible;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 20;

// --- POST /profiles/:user_id/visit ---

/// Records a profile view. Viewing your own profile returns `null`.
pub async fn record_visit(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(profile): UserPath,
) -> AppResult<Json<ApiResponse<Option<ProfileVisit>>>> {
    let visit = state.visits.record_visit(user.id, profile).await?;
    Ok(Json(ApiResponse::ok(visit)))
}

// --- GET /profiles/:user_id/visitors ---

pub async fn visitors(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(profile): UserPath,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<VisitEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state.visits.visitors(user.id, profile, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /profiles/:user_id/visit-stats ---

pub async fn visit_stats(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(profile): UserPath,
) -> AppResult<Json<ApiResponse<VisitStats>>> {
    let stats = state.visits.visit_stats(user.id, profile).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

// --- GET /visits/visited ---

pub async fn visited(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<VisitEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state.visits.visited(user.id, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}
