//! Fixed-window rate limiting.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Decision, Limiter, RateLimitConfig, RetryAfterPolicy};

/// Request count for one client inside its current window.
#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    window_start: Instant,
}

impl ClientWindow {
    fn start(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Counts requests per client key and denies them once `limit` is reached
/// within one window.
///
/// Windows expire lazily: a request arriving after its client's window has
/// elapsed starts a fresh window with a count of one. [`cleanup_expired`]
/// drops stale windows for clients that never come back, and the server
/// calls it on a fixed interval.
///
/// Each read-modify-write runs while holding the map shard that owns the
/// key, so concurrent requests for the same client are serialized.
///
/// [`cleanup_expired`]: FixedWindowLimiter::cleanup_expired
pub struct FixedWindowLimiter {
    clients: DashMap<String, ClientWindow>,
    limit: u32,
    window: Duration,
    retry_after: RetryAfterPolicy,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            limit,
            window,
            retry_after: RetryAfterPolicy::Window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_window, config.window()).with_retry_after(config.retry_after)
    }

    pub fn with_retry_after(mut self, policy: RetryAfterPolicy) -> Self {
        self.retry_after = policy;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Same as [`Limiter::allow`], evaluated at `now`.
    pub fn allow_at(&self, client_key: &str, now: Instant) -> Decision {
        match self.clients.entry(client_key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(ClientWindow::start(now));
                Decision::Allowed
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if window.is_expired(now, self.window) {
                    *window = ClientWindow::start(now);
                    return Decision::Allowed;
                }
                if window.count < self.limit {
                    window.count += 1;
                    return Decision::Allowed;
                }
                Decision::Denied {
                    retry_after: self.retry_delay(window, now),
                }
            }
        }
    }

    fn retry_delay(&self, window: &ClientWindow, now: Instant) -> Duration {
        match self.retry_after {
            RetryAfterPolicy::Window => self.window,
            RetryAfterPolicy::Remaining => self
                .window
                .saturating_sub(now.saturating_duration_since(window.window_start)),
        }
    }

    /// Removes every window that has fully elapsed. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        let window = self.window;
        self.clients.retain(|_, w| !w.is_expired(now, window));
        let removed = before.saturating_sub(self.clients.len());
        if removed > 0 {
            tracing::debug!(
                removed,
                tracked = self.tracked_clients(),
                "Dropped expired rate limit windows"
            );
        }
        removed
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

impl Limiter for FixedWindowLimiter {
    fn allow(&self, client_key: &str) -> Decision {
        self.allow_at(client_key, Instant::now())
    }
}
