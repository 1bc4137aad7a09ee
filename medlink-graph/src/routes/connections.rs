use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use medlink_shared::errors::{AppError, AppResult, ErrorCode};
use medlink_shared::types::auth::AuthUser;
use medlink_shared::types::{ApiResponse, Paginated, PageParams};

use super::{ListQuery, UserPath};
use crate::models::{Connection, ConnectionEntry, ConnectionStatus};
use crate::services::Visible;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 20;

// --- POST /connections/:user_id ---

pub async fn request_connection(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(target): UserPath,
) -> AppResult<Json<ApiResponse<Connection>>> {
    let record = state.relations.request_connection(user.id, target).await?;
    Ok(Json(ApiResponse::ok(record)))
}

// --- POST /connections/:user_id/accept ---

/// `user_id` is the requester whose pending request the caller accepts.
pub async fn accept_connection(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(requester): UserPath,
) -> AppResult<Json<ApiResponse<Option<Connection>>>> {
    match state.relations.accept_connection(user.id, requester).await? {
        Some(record) => Ok(Json(ApiResponse::ok(Some(record)))),
        None => Ok(Json(ApiResponse::ok_with_message(None, "no pending request from this user"))),
    }
}

// --- DELETE /connections/:user_id ---

/// Withdraws a request, declines one, or disconnects. Absent records yield `null`.
pub async fn remove_connection(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(other): UserPath,
) -> AppResult<Json<ApiResponse<Option<Connection>>>> {
    let removed = state.relations.remove_connection(user.id, other).await?;
    Ok(Json(ApiResponse::ok(removed)))
}

// --- GET /connections/:user_id/status ---

pub async fn connection_status(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    UserPath(other): UserPath,
) -> AppResult<Json<ApiResponse<Option<Connection>>>> {
    let record = state.relations.find_connection(user.id, other).await?;
    Ok(Json(ApiResponse::ok(record)))
}

// --- GET /connections ---

#[derive(Debug, Deserialize)]
pub struct ConnectionListQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl ConnectionListQuery {
    fn status(&self) -> AppResult<Option<ConnectionStatus>> {
        match self.status.as_deref() {
            None | Some("") | Some("all") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|msg: String| AppError::new(ErrorCode::InvalidConnectionStatus, msg)),
        }
    }
}

pub async fn list_connections(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectionListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<ConnectionEntry>>>>> {
    let status = params.status()?;
    let page = PageParams { limit: params.limit, offset: params.offset }.resolve(DEFAULT_LIMIT)?;

    let items = state.relations.list_connections(user.id, status, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /connections/pending/incoming ---

pub async fn list_pending_incoming(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<ConnectionEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state.relations.list_pending_incoming(user.id, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}

// --- GET /connections/pending/outgoing ---

pub async fn list_pending_outgoing(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Paginated<Visible<ConnectionEntry>>>>> {
    let page = params.page(DEFAULT_LIMIT)?;
    let items = state.relations.list_pending_outgoing(user.id, page).await?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, page))))
}
