use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use campus_types::models::{Claims, Scope, Session};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub const SESSION_COOKIE: &str = "campus_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Guard for student-scope routes.
pub async fn require_student(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(state, Scope::Student, req, next).await
}

/// Guard for user-scope routes.
pub async fn require_user(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(state, Scope::User, req, next).await
}

/// Resolve the session token (bearer header first, then the session cookie),
/// check it belongs to `scope` and is still live server-side, and hand the
/// resulting [`Session`] to the handler as a request extension.
async fn authenticate(
    state: AppState,
    scope: Scope,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(&req).ok_or(ApiError::Unauthenticated)?;

    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected session token: {}", e);
        ApiError::Unauthenticated
    })?
    .claims;

    if claims.scope != scope {
        return Err(ApiError::Unauthenticated);
    }

    let sid = claims.sid.to_string();
    let row = blocking(&state, move |s| s.db.get_session(&sid).map_err(ApiError::from))
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    // The row is the source of truth; the token only points at it
    let account_id: Uuid = row.account_id.parse().map_err(|_| ApiError::Unauthenticated)?;
    if Scope::parse(&row.scope) != Some(scope) || account_id != claims.sub {
        return Err(ApiError::Unauthenticated);
    }

    let session = Session { id: claims.sid, scope, account_id, csrf_token: row.csrf_token };

    if !is_safe(req.method()) {
        let presented = req.headers().get(CSRF_HEADER).map(|v| v.as_bytes());
        if !csrf_matches(presented, &session.csrf_token) {
            return Err(ApiError::CsrfMismatch);
        }
    }

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

fn session_token(req: &Request) -> Option<String> {
    if let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(req.headers())
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

/// Compares fixed-length digests without an early exit, so timing says
/// nothing about how much of the token matched.
fn csrf_matches(presented: Option<&[u8]>, expected: &str) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    let a = Sha256::digest(presented);
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_must_match_exactly() {
        let token = "aB3dE5gH7jK9mN1pQ3sT5vW7yZ9bC1dE3fG5hJ7k";
        assert!(csrf_matches(Some(token.as_bytes()), token));

        assert!(!csrf_matches(None, token));
        assert!(!csrf_matches(Some(b""), token));
        assert!(!csrf_matches(Some(&token.as_bytes()[..39]), token));
        assert!(!csrf_matches(Some(token.to_lowercase().as_bytes()), token));
        assert!(!csrf_matches(Some(format!("{token}x").as_bytes()), token));
    }
}
