use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use social_core::ratelimit::{Decision, FixedWindowLimiter, Limiter, RateLimitConfig};

use crate::error::AppError;

/// Builds the limiter for `config`, or `None` when rate limiting is off.
///
/// An enabled limiter gets a background task that drops the windows of
/// clients that stopped sending requests, so this must run inside a Tokio
/// runtime.
pub fn build_limiter(config: &RateLimitConfig) -> Option<Arc<dyn Limiter>> {
    if !config.enabled {
        tracing::info!("rate limiting disabled");
        return None;
    }

    let limiter = Arc::new(FixedWindowLimiter::from_config(config));
    tracing::info!(
        requests = config.requests_per_window,
        window_secs = config.window_seconds,
        "rate limiting enabled"
    );

    let sweeper = limiter.clone();
    let period = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            sweeper.cleanup_expired();
        }
    });

    Some(limiter as Arc<dyn Limiter>)
}

/// Client key for rate limiting: the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the TCP peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<dyn Limiter>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(req.headers(), peer);

    match limiter.allow(&key) {
        Decision::Allowed => Ok(next.run(req).await),
        Decision::Denied { retry_after } => {
            tracing::warn!(client = %key, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            Err(AppError::RateLimited { retry_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(client_key(&headers, None), "10.0.0.1");
    }

    #[test]
    fn real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(client_key(&headers, None), "10.0.0.3");

        let peer: SocketAddr = "192.168.1.5:4321".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), Some(peer)), "192.168.1.5");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }
}
