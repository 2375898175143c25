use std::time::Duration;

use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;

use super::{user_key, UserCache};
use crate::error::CoreResult;
use crate::model::User;

/// Redis-backed cache. Entries are written with `SET .. EX`.
#[derive(Clone)]
pub struct RedisUserCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisUserCache {
    pub async fn connect(url: &str, ttl: Duration) -> CoreResult<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, ttl })
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, user_id: i64) -> CoreResult<Option<User>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(user_key(user_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User) -> CoreResult<()> {
        let json = serde_json::to_string(user)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(user_key(user.id), json, self.ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}
