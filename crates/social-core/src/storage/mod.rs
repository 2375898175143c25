//! Repository interfaces and their backends.
//!
//! Every repository reports a missing record as [`CoreError::NotFound`] and
//! duplicate inserts as one of the duplicate variants, whatever the backend.
//!
//! - [`postgres`]: the production backend on PostgreSQL.
//! - [`memory`]: an in-process backend for tests and local development.
//!
//! [`CoreError::NotFound`]: crate::error::CoreError::NotFound

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::CoreResult;
use crate::model::{Comment, FeedItem, FeedQuery, NewComment, NewPost, NewUser, Post, Role, User};

/// Upper bound for a single repository call.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> CoreResult<User>;

    /// Only active users can be found by email.
    async fn get_by_email(&self, email: &str) -> CoreResult<User>;

    /// Creates an inactive user and its invitation in one transaction.
    ///
    /// `token_hash` is the [`hash_token`] digest of the activation token
    /// that was handed to the user.
    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_ttl: Duration,
    ) -> CoreResult<User>;

    /// Activates the user owning the unexpired invitation for `token` and
    /// removes their invitations.
    async fn activate(&self, token: &str) -> CoreResult<()>;

    /// Removes the user and any pending invitation.
    async fn delete(&self, id: i64) -> CoreResult<()>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn get_by_name(&self, name: &str) -> CoreResult<Role>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> CoreResult<Post>;
    async fn create(&self, post: NewPost) -> CoreResult<Post>;

    /// Saves title and content if `post.version` is still current and
    /// returns the post with its bumped version. A stale version is
    /// reported as `NotFound`.
    async fn update(&self, post: &Post) -> CoreResult<Post>;

    async fn delete(&self, id: i64) -> CoreResult<()>;

    /// Posts written by `user_id` or by anyone they follow.
    async fn user_feed(&self, user_id: i64, query: &FeedQuery) -> CoreResult<Vec<FeedItem>>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: NewComment) -> CoreResult<Comment>;

    /// Newest first.
    async fn get_by_post_id(&self, post_id: i64) -> CoreResult<Vec<Comment>>;
}

#[async_trait]
pub trait FollowerRepository: Send + Sync {
    /// Following the same user twice is a `UniqueViolation`.
    async fn follow(&self, follower_id: i64, followed_id: i64) -> CoreResult<()>;
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> CoreResult<()>;
}

/// All repositories the service uses, bundled for sharing through app state.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub followers: Arc<dyn FollowerRepository>,
}

impl Storage {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            roles: store.clone(),
            posts: store.clone(),
            comments: store.clone(),
            followers: store,
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(Arc::new(memory::MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            roles: store.clone(),
            posts: store.clone(),
            comments: store.clone(),
            followers: store,
        }
    }
}

/// SHA-256 hex digest under which activation tokens are stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
