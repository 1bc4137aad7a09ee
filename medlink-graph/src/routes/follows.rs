use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use medlink_shared::errors::AppResult;
use medlink_shared::types::auth::AuthUser;
use medlink_shared::types::ApiResponse;

use super::UserPath;
use crate::models::Follow;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct FollowState {
    pub following: bool,
}

// --- POST /follows/:user_id ---

pub async fn follow(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<Follow>>> {
    let record = state.relations.follow(user.id, target).await?;
    Ok(Json(ApiResponse::ok(record)))
}

// --- DELETE /follows/:user_id ---

pub async fn unfollow(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<Option<Follow>>>> {
    let removed = state.relations.unfollow(user.id, target).await?;
    Ok(Json(ApiResponse::ok(removed)))
}

// --- GET /follows/:user_id ---

pub async fn is_following(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<FollowState>>> {
    let following = state.relations.is_following(user.id, target).await?;
    Ok(Json(ApiResponse::ok(FollowState { following })))
}
