use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Integer identity of a user row. The only user attribute the graph depends on.
pub type UserId = i32;

/// Access-token claims as issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: UserId, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self { sub: user_id, iat: now, exp: now + ttl_secs }
    }
}

/// Authenticated viewer extracted from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self { id: claims.sub }
    }
}
