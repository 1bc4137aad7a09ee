use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthUser, Claims};
use crate::types::UserId;

pub const DEFAULT_JWT_SECRET: &str = "development-secret-change-in-production";

/// HS256 secret shared with the token issuer. Falls back to the development value.
pub fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string())
}

/// The bearer token, or `None` when no Authorization header was sent.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| AppError::unauthorized("authorization header must use Bearer scheme"))
}

/// Verifies signature and expiry and returns the claims.
pub fn verify_token(token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(jwt_secret().as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::new(ErrorCode::TokenExpired, "token has expired")
            }
            _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
        })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?
            .ok_or_else(|| AppError::unauthorized("missing authorization header"))?;
        Ok(AuthUser::from(verify_token(token)?))
    }
}

/// Viewer identity for public routes. No header means anonymous; a header that
/// is present must still carry a valid token.
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl OptionalAuthUser {
    pub fn viewer_id(&self) -> Option<UserId> {
        self.0.map(|u| u.id)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers)? {
            None => Ok(Self(None)),
            Some(token) => Ok(Self(Some(AuthUser::from(verify_token(token)?)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn signed(claims: &Claims) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(jwt_secret().as_bytes())).unwrap()
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).unwrap().is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        let err = bearer_token(&headers).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Unauthorized));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), Some("abc"));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let err = verify_token("not-a-jwt").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenInvalid));
    }

    #[test]
    fn signed_token_round_trips_and_expires() {
        let claims = verify_token(&signed(&Claims::new(42, 60))).unwrap();
        assert_eq!(AuthUser::from(claims).id, 42);

        let err = verify_token(&signed(&Claims::new(42, -120))).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenExpired));
    }
}
