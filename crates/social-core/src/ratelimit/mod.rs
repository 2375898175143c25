//! Per-client request rate limiting.
//!
//! - [`Limiter`]: the decision interface the HTTP layer talks to.
//! - [`FixedWindowLimiter`]: in-process fixed-window implementation.
//! - [`RateLimitConfig`]: configuration shared with the server config file.
//!
//! State is local to one process. Nothing is persisted or shared between
//! instances.

pub mod fixed_window;

use std::time::Duration;

use serde::Deserialize;

pub use fixed_window::FixedWindowLimiter;

/// The outcome of asking a limiter about one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// The client is over its quota and should wait `retry_after`.
    Denied { retry_after: Duration },
}

impl Decision {
    #[cfg(test)]
    pub(crate) fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Decides whether a request from `client_key` may proceed.
pub trait Limiter: Send + Sync {
    fn allow(&self, client_key: &str) -> Decision;
}

/// What a denial reports as its retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryAfterPolicy {
    /// Always the full window length, regardless of how much of it is left.
    #[default]
    Window,
    /// The time left until the client's current window ends.
    Remaining,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default)]
    pub retry_after: RetryAfterPolicy,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_window: default_requests_per_window(),
            window_seconds: default_window_seconds(),
            retry_after: RetryAfterPolicy::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_window() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.requests_per_window, 20);
        assert_eq!(config.window(), Duration::from_secs(5));
        assert_eq!(config.retry_after, RetryAfterPolicy::Window);
    }

    #[test]
    fn decision_is_allowed() {
        assert!(Decision::Allowed.is_allowed());
        assert!(!Decision::Denied {
            retry_after: Duration::from_secs(1)
        }
        .is_allowed());
    }
}
