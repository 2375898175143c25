//! Social API core library: transport-agnostic domain logic.
//!
//! `social-core` holds everything the HTTP server needs that is not HTTP:
//! entities, the rate limiter, token and password handling, the user cache
//! and the repositories. The axum server in `social-web` wires these
//! together.
//!
//! # Modules
//!
//! - [`ratelimit`]: fixed-window per-client rate limiting.
//! - [`auth`]: tokens, passwords, role registry, ownership checks, user resolution.
//! - [`cache`]: cache-aside user snapshots (Redis, in-process, disabled).
//! - [`storage`]: repository traits with PostgreSQL and in-memory backends.
//! - [`model`]: users, roles, posts, comments and feed queries.
//! - [`error`]: unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod auth;
pub mod cache;
pub mod error;
pub mod model;
pub mod ratelimit;
pub mod storage;

pub use auth::{check_ownership, Access, Authenticator, Claims, RoleRegistry, TokenError, UserResolver};
pub use cache::{CacheConfig, UserCache};
pub use error::{CoreError, CoreResult};
pub use model::{RoleName, User};
pub use ratelimit::{Decision, FixedWindowLimiter, Limiter, RateLimitConfig, RetryAfterPolicy};
pub use storage::Storage;
