use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use social_core::{CoreError, User};

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated user, attached by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Returns the token of an `Authorization: Bearer <token>` header.
///
/// The header must split on single spaces into exactly two parts.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Validates the bearer token, resolves its user and attaches [`AuthUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AppError::Unauthorized)?;

    let claims = state.authenticator.validate_token(token).map_err(|e| {
        tracing::debug!("rejected bearer token: {e}");
        AppError::Unauthorized
    })?;
    let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;

    let user = state.users.resolve(user_id).await.map_err(|e| match e {
        CoreError::NotFound => AppError::NotFound,
        other => AppError::Internal(format!("resolving user {user_id}: {other}")),
    })?;

    tracing::debug!(user_id, "authenticated request");
    req.extensions_mut().insert(AuthUser(user));
    Ok(next.run(req).await)
}

/// HTTP Basic authentication against the configured credentials.
/// Passes everything through when none are configured.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let basic = &state.config.auth.basic;
    if !basic.is_enabled() {
        return Ok(next.run(req).await);
    }

    let credentials = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|raw| String::from_utf8(raw).ok())
        .ok_or(AppError::BasicUnauthorized)?;

    match credentials.split_once(':') {
        Some((user, pass)) if user == basic.user && pass == basic.pass => Ok(next.run(req).await),
        _ => {
            tracing::warn!("basic auth failed");
            Err(AppError::BasicUnauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("bearer abc")), None);
        assert_eq!(bearer_token(&headers("Token abc")), None);
        assert_eq!(bearer_token(&headers("Bearer abc def")), None);
        assert_eq!(bearer_token(&headers("Bearer  abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
