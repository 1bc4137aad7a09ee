use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};

use crate::types::{ApiErrorDetail, ApiErrorResponse};

/// Stable wire codes, `E{area}{sequence}`.
///
/// E0xxx is infrastructure, E1xxx token handling, E2xxx the social graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    Conflict,
    StorageUnavailable,

    TokenExpired,
    TokenInvalid,

    UserNotFound,
    CannotConnectSelf,
    CannotFollowSelf,
    CannotBlockSelf,
    UserBlocked,
    VisitorsPrivate,
    InvalidPagination,
    InvalidConnectionStatus,
}

/// Coarse error taxonomy shared by every graph operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Forbidden,
    Conflict,
    Unauthenticated,
    Storage,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorCode {
    fn entry(self) -> (&'static str, ErrorKind) {
        use ErrorKind::*;
        match self {
            Self::InternalError => ("E0001", Storage),
            Self::ValidationError => ("E0002", InvalidArgument),
            Self::NotFound => ("E0003", NotFound),
            Self::Unauthorized => ("E0004", Unauthenticated),
            Self::Forbidden => ("E0005", Forbidden),
            Self::BadRequest => ("E0008", InvalidArgument),
            Self::Conflict => ("E0009", Conflict),
            Self::StorageUnavailable => ("E0010", Storage),

            Self::TokenExpired => ("E1004", Unauthenticated),
            Self::TokenInvalid => ("E1005", Unauthenticated),

            Self::UserNotFound => ("E2001", NotFound),
            Self::CannotConnectSelf => ("E2002", InvalidArgument),
            Self::CannotFollowSelf => ("E2003", InvalidArgument),
            Self::CannotBlockSelf => ("E2004", InvalidArgument),
            Self::UserBlocked => ("E2005", Forbidden),
            Self::VisitorsPrivate => ("E2006", Forbidden),
            Self::InvalidPagination => ("E2007", InvalidArgument),
            Self::InvalidConnectionStatus => ("E2008", InvalidArgument),
        }
    }

    pub fn code(&self) -> &'static str {
        self.entry().0
    }

    pub fn kind(&self) -> ErrorKind {
        self.entry().1
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known { code, message: message.into(), details: None }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known { code, message: message.into(), details: Some(details) }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Known { code, .. } => code.kind(),
            Self::Validation(_) => ErrorKind::InvalidArgument,
            Self::Database(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => ErrorKind::Conflict,
            Self::Database(DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, _)) => {
                ErrorKind::InvalidArgument
            }
            Self::Database(_) | Self::Pool(_) | Self::Internal(_) => ErrorKind::Storage,
        }
    }

    /// Stable code for known application errors; `None` for wrapped failures.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Known { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Status plus client-facing body; the status always follows `kind()`.
    /// Storage failures are logged here and reach the caller only as an opaque code.
    fn to_wire(&self) -> (StatusCode, ApiErrorDetail) {
        match self {
            Self::Known { code, message, details } => {
                (code.status_code(), ApiErrorDetail::new(code.code(), message, details.clone()))
            }
            Self::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorDetail::new(ErrorCode::ValidationError.code(), msg, None),
            ),
            Self::Pool(err) => {
                tracing::error!(error = %err, "connection pool error");
                opaque(ErrorCode::StorageUnavailable, "storage unavailable")
            }
            Self::Database(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) => {
                tracing::warn!(error = info.message(), "unique constraint rejected a write");
                opaque(ErrorCode::Conflict, "record already exists")
            }
            Self::Database(DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info)) => {
                tracing::warn!(error = info.message(), "check constraint rejected a write");
                opaque(ErrorCode::ValidationError, "value violates a constraint")
            }
            Self::Database(err) => {
                tracing::error!(error = %err, "database error");
                opaque(ErrorCode::InternalError, "database error")
            }
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                opaque(ErrorCode::InternalError, "internal server error")
            }
        }
    }
}

fn opaque(code: ErrorCode, message: &str) -> (StatusCode, ApiErrorDetail) {
    (code.status_code(), ApiErrorDetail::new(code.code(), message, None))
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = self.to_wire();
        (status, Json(ApiErrorResponse::from(detail))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_codes_map_to_taxonomy() {
        assert_eq!(ErrorCode::CannotConnectSelf.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ErrorCode::UserNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(ErrorCode::UserBlocked.kind(), ErrorKind::Forbidden);
        assert_eq!(ErrorCode::VisitorsPrivate.kind(), ErrorKind::Forbidden);
        assert_eq!(ErrorCode::UserBlocked.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn storage_failures_are_opaque() {
        let err = AppError::Database(DieselError::BrokenTransactionManager);
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.code(), None);

        let (status, detail) = err.to_wire();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(detail.code, "E0001");
        assert_eq!(detail.message, "database error");
    }

    #[test]
    fn known_error_keeps_its_status() {
        let resp = AppError::new(ErrorCode::UserNotFound, "user not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    fn constraint(kind: DatabaseErrorKind) -> AppError {
        AppError::Database(DieselError::DatabaseError(kind, Box::new("constraint".to_string())))
    }

    #[test]
    fn constraint_violations_render_by_kind() {
        let err = constraint(DatabaseErrorKind::UniqueViolation);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let (status, detail) = err.to_wire();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(detail.code, "E0009");

        let err = constraint(DatabaseErrorKind::CheckViolation);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let (status, detail) = err.to_wire();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail.code, "E0002");
    }

    #[test]
    fn wire_status_always_follows_kind() {
        let errors = [
            AppError::new(ErrorCode::UserBlocked, "blocked"),
            AppError::Validation("bad".into()),
            constraint(DatabaseErrorKind::UniqueViolation),
            constraint(DatabaseErrorKind::CheckViolation),
            AppError::Database(DieselError::NotFound),
            AppError::Internal(anyhow::anyhow!("boom")),
        ];
        for err in errors {
            assert_eq!(err.to_wire().0, err.kind().status_code(), "{err:?}");
        }
    }
}
