//! Error types for `social-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

use crate::auth::token::TokenError;

/// Unified error type for all core operations.
///
/// Repository implementations translate backend-specific failures into the
/// narrow variants (`NotFound`, the duplicate variants) so callers can
/// branch on them without knowing which backend is in use.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested record does not exist.
    #[error("resource not found")]
    NotFound,

    /// A user with the same email is already registered.
    #[error("a user with that email already exists")]
    DuplicateEmail,

    /// A user with the same username is already registered.
    #[error("a user with that username already exists")]
    DuplicateUsername,

    /// Any other unique-constraint violation (e.g. following someone twice).
    #[error("duplicate unique record")]
    UniqueViolation,

    /// A role the service depends on is missing from the role table.
    #[error("role not configured: {0}")]
    MissingRole(String),

    /// Bearer token issuance or validation failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The cache backend misbehaved. A miss is never reported this way.
    #[error("cache error: {0}")]
    Cache(String),

    /// Password hashing or hash parsing failed.
    #[error("password error: {0}")]
    Password(String),

    /// The relational store returned an error.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A repository call did not finish within its deadline.
    #[error("query timed out")]
    Timeout,

    /// Encoding or decoding a cached snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return match db.constraint() {
                    Some("users_email_key") => CoreError::DuplicateEmail,
                    Some("users_username_key") => CoreError::DuplicateUsername,
                    _ => CoreError::UniqueViolation,
                };
            }
        }
        if matches!(e, sqlx::Error::RowNotFound) {
            return CoreError::NotFound;
        }
        CoreError::Database(e)
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        CoreError::Cache(e.to_string())
    }
}

/// Convenience alias used throughout `social-core`.
pub type CoreResult<T> = Result<T, CoreError>;
