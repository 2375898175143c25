use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use social_core::{CoreError, TokenError};

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    /// Failed HTTP Basic authentication; carries a `WWW-Authenticate` challenge.
    BasicUnauthorized,
    Forbidden,
    NotFound,
    RateLimited { retry_after: Duration },
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized | AppError::BasicUnauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized".to_string())
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            AppError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "rate limit exceeded, retry after: {}s",
                    retry_after_secs(*retry_after)
                ),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => {
                // Log the real error server-side, return generic message to client
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "the server encountered a problem".to_string(),
                )
            }
        };

        let mut response = (status, axum::Json(ErrorBody { error: message })).into_response();

        match self {
            AppError::BasicUnauthorized => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Basic realm="restricted", charset="UTF-8""#),
                );
            }
            AppError::RateLimited { retry_after } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
            }
            _ => {}
        }

        response
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound => AppError::NotFound,
            CoreError::DuplicateEmail | CoreError::DuplicateUsername => {
                AppError::BadRequest(e.to_string())
            }
            CoreError::UniqueViolation => AppError::Conflict(e.to_string()),
            CoreError::Token(TokenError::Signing(_)) => AppError::Internal(e.to_string()),
            CoreError::Token(_) => AppError::Unauthorized,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{e:#}"))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::BadRequest(e.to_string())
    }
}
