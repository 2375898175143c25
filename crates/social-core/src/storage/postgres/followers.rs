use async_trait::async_trait;

use super::{timed, PgStore};
use crate::error::CoreResult;
use crate::storage::FollowerRepository;

// `followers.user_id` is the followed account, `follower_id` the one following.
#[async_trait]
impl FollowerRepository for PgStore {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> CoreResult<()> {
        timed(
            sqlx::query("INSERT INTO followers (user_id, follower_id) VALUES ($1, $2)")
                .bind(followed_id)
                .bind(follower_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> CoreResult<()> {
        timed(
            sqlx::query("DELETE FROM followers WHERE user_id = $1 AND follower_id = $2")
                .bind(followed_id)
                .bind(follower_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
