use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{user_key, UserCache};
use crate::error::CoreResult;
use crate::model::User;

struct Entry {
    snapshot: String,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process cache. Expiry is checked on read.
pub struct MemoryUserCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryUserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_at(&self, user_id: i64, now: Instant) -> CoreResult<Option<User>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = user_key(user_id);
        match entries.get(&key) {
            Some(entry) if entry.is_live(now) => {
                Ok(Some(serde_json::from_str(&entry.snapshot)?))
            }
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn set_at(&self, user: &User, now: Instant) -> CoreResult<()> {
        let snapshot = serde_json::to_string(user)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                user_key(user.id),
                Entry {
                    snapshot,
                    expires_at: now.checked_add(self.ttl),
                },
            );
        Ok(())
    }
}

#[async_trait]
impl UserCache for MemoryUserCache {
    async fn get(&self, user_id: i64) -> CoreResult<Option<User>> {
        self.get_at(user_id, Instant::now())
    }

    async fn set(&self, user: &User) -> CoreResult<()> {
        self.set_at(user, Instant::now())
    }
}
