use std::sync::Arc;

use crate::cache::UserCache;
use crate::error::CoreResult;
use crate::model::User;
use crate::storage::UserRepository;

/// Looks users up through the cache, falling back to the repository.
#[derive(Clone)]
pub struct UserResolver {
    users: Arc<dyn UserRepository>,
    cache: Arc<dyn UserCache>,
}

impl UserResolver {
    pub fn new(users: Arc<dyn UserRepository>, cache: Arc<dyn UserCache>) -> Self {
        Self { users, cache }
    }

    /// A cache miss is filled from the repository and written back.
    /// Concurrent misses for the same id may each write the same snapshot.
    pub async fn resolve(&self, user_id: i64) -> CoreResult<User> {
        if let Some(user) = self.cache.get(user_id).await? {
            tracing::debug!(user_id, "user cache hit");
            return Ok(user);
        }
        tracing::debug!(user_id, "user cache miss");

        let user = self.users.get_by_id(user_id).await?;
        self.cache.set(&user).await?;
        Ok(user)
    }
}
