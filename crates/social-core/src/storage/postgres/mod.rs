//! PostgreSQL repositories built on `sqlx`.
//!
//! The schema lives in `migrations/` at the repository root.

mod comments;
mod followers;
mod posts;
mod roles;
mod users;

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::QUERY_TIMEOUT;
use crate::error::{CoreError, CoreResult};
use crate::model::{Author, Role, User};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Empty means "no database": the server falls back to in-memory storage.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    30
}

fn default_min_connections() -> u32 {
    0
}

fn default_idle_timeout_secs() -> u64 {
    15 * 60
}

pub async fn connect(config: &DatabaseConfig) -> CoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .acquire_timeout(QUERY_TIMEOUT)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// Applies the migrations under `migrations/` that have not run yet.
pub async fn migrate(pool: &PgPool) -> CoreResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| CoreError::Database(sqlx::Error::Migrate(Box::new(e))))
}

/// Repositories backed by one connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Runs a query future under [`QUERY_TIMEOUT`].
async fn timed<T, F>(fut: F) -> CoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result.map_err(CoreError::from),
        Err(_) => Err(CoreError::Timeout),
    }
}

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.created_at, u.is_active, \
     u.role_id, r.name AS role_name, r.level AS role_level, r.description AS role_description";

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        created_at: row.try_get("created_at")?,
        is_active: row.try_get("is_active")?,
        role_id: row.try_get("role_id")?,
        role: Role {
            id: row.try_get("role_id")?,
            name: row.try_get("role_name")?,
            level: row.try_get("role_level")?,
            description: row
                .try_get::<Option<String>, _>("role_description")?
                .unwrap_or_default(),
        },
    })
}

fn author_from_row(row: &PgRow, id_column: &str) -> Result<Author, sqlx::Error> {
    Ok(Author {
        id: row.try_get(id_column)?,
        username: row.try_get("username")?,
    })
}
