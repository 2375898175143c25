use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use social_core::cache::CacheConfig;
use social_core::ratelimit::{RateLimitConfig, RetryAfterPolicy};
use social_core::storage::postgres::DatabaseConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_env")]
    pub env: String,
    /// Public address of the API, reported at startup.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Empty allows no cross-origin requests.
    #[serde(default)]
    pub cors_allowed_origin: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub basic: BasicAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Defaults to the issuer.
    #[serde(default)]
    pub audience: String,
    #[serde(default = "default_token_ttl_hours")]
    pub ttl_hours: u64,
}

/// Credentials guarding the health endpoint. Empty disables the check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicAuthConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub from_email: String,
    #[serde(default = "default_invitation_ttl_hours")]
    pub invitation_ttl_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            env: default_env(),
            api_url: default_api_url(),
            frontend_url: default_frontend_url(),
            cors_allowed_origin: String::new(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: default_issuer(),
            audience: String::new(),
            ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_email: String::new(),
            invitation_ttl_hours: default_invitation_ttl_hours(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_env() -> String {
    "development".to_string()
}

fn default_api_url() -> String {
    "localhost:8000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_issuer() -> String {
    "socialapi".to_string()
}

fn default_token_ttl_hours() -> u64 {
    24 * 3
}

fn default_invitation_ttl_hours() -> u64 {
    24 * 3
}

const WEAK_SECRETS: &[&str] = &["example", "secret", "password", "change-me", "jwt-secret"];

/// Upper bound for every configured lifetime: one year.
const MAX_TTL_HOURS: u64 = 24 * 365;

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }

    pub fn audience(&self) -> &str {
        if self.audience.is_empty() {
            &self.issuer
        } else {
            &self.audience
        }
    }
}

impl BasicAuthConfig {
    pub fn is_enabled(&self) -> bool {
        !self.user.is_empty() || !self.pass.is_empty()
    }
}

impl MailConfig {
    pub fn invitation_ttl(&self) -> Duration {
        Duration::from_secs(self.invitation_ttl_hours.saturating_mul(3600))
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("SOCIAL_WEB_CONFIG").map(PathBuf::from).ok();

        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents)?
        } else {
            ServerConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.finalize()?;
        Ok(config)
    }

    /// Applies `SOCIAL_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(addr) = lookup("SOCIAL_ADDR") {
            self.bind_addr = addr.parse()?;
        }
        if let Some(env) = lookup("SOCIAL_ENV") {
            self.env = env;
        }
        if let Some(url) = lookup("SOCIAL_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("SOCIAL_FRONTEND_URL") {
            self.frontend_url = url;
        }
        if let Some(origin) = lookup("SOCIAL_CORS_ORIGIN") {
            self.cors_allowed_origin = origin;
        }

        if let Some(url) = lookup("SOCIAL_DB_URL") {
            self.database.url = url;
        }
        parse_into(&lookup, "SOCIAL_DB_MAX_CONNS", &mut self.database.max_connections)?;

        if let Some(url) = lookup("SOCIAL_REDIS_URL") {
            self.cache.redis_url = url;
        }
        parse_into(&lookup, "SOCIAL_CACHE_ENABLED", &mut self.cache.enabled)?;
        parse_into(&lookup, "SOCIAL_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds)?;

        if let Some(secret) = lookup("SOCIAL_TOKEN_SECRET") {
            self.auth.token.secret = secret;
        }
        if let Some(issuer) = lookup("SOCIAL_TOKEN_ISSUER") {
            self.auth.token.issuer = issuer;
        }
        parse_into(&lookup, "SOCIAL_TOKEN_TTL_HOURS", &mut self.auth.token.ttl_hours)?;
        if let Some(user) = lookup("SOCIAL_BASIC_USER") {
            self.auth.basic.user = user;
        }
        if let Some(pass) = lookup("SOCIAL_BASIC_PASS") {
            self.auth.basic.pass = pass;
        }

        parse_into(&lookup, "SOCIAL_RATELIMIT_ENABLED", &mut self.rate_limit.enabled)?;
        parse_into(
            &lookup,
            "SOCIAL_RATELIMIT_REQUESTS",
            &mut self.rate_limit.requests_per_window,
        )?;
        parse_into(
            &lookup,
            "SOCIAL_RATELIMIT_WINDOW_SECONDS",
            &mut self.rate_limit.window_seconds,
        )?;
        if let Some(policy) = lookup("SOCIAL_RATELIMIT_RETRY_AFTER") {
            self.rate_limit.retry_after = match policy.as_str() {
                "window" => RetryAfterPolicy::Window,
                "remaining" => RetryAfterPolicy::Remaining,
                other => anyhow::bail!("SOCIAL_RATELIMIT_RETRY_AFTER: unknown policy {other:?}"),
            };
        }
        Ok(())
    }

    /// Fills in a missing token secret and rejects unusable settings.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        if self.auth.token.secret.is_empty() {
            self.auth.token.secret = uuid::Uuid::new_v4().to_string();
            tracing::warn!(
                "No token secret configured. Generated random secret (tokens will not survive a restart)."
            );
        }

        if WEAK_SECRETS.iter().any(|&w| self.auth.token.secret == w) {
            if self.is_production() {
                anyhow::bail!(
                    "Token secret matches a known weak/placeholder value. \
                     Set a strong random secret via SOCIAL_TOKEN_SECRET."
                );
            }
            tracing::warn!("Token secret is a known placeholder value; do not use it in production.");
        } else if self.auth.token.secret.len() < 32 {
            tracing::warn!(
                "Token secret is shorter than 32 characters. \
                 Consider using a stronger secret via SOCIAL_TOKEN_SECRET."
            );
        }

        if self.rate_limit.enabled && self.rate_limit.window_seconds == 0 {
            anyhow::bail!("rate_limit.window_seconds must be greater than zero");
        }

        if self.auth.token.ttl_hours > MAX_TTL_HOURS {
            anyhow::bail!("auth.token.ttl_hours must be at most {MAX_TTL_HOURS}");
        }
        if self.mail.invitation_ttl_hours > MAX_TTL_HOURS {
            anyhow::bail!("mail.invitation_ttl_hours must be at most {MAX_TTL_HOURS}");
        }
        if self.cache.ttl_seconds > MAX_TTL_HOURS * 3600 {
            anyhow::bail!("cache.ttl_seconds must be at most {}", MAX_TTL_HOURS * 3600);
        }

        if self.database.url.is_empty() {
            tracing::warn!("No database URL configured. Using in-memory storage; data is lost on restart.");
        }
        Ok(())
    }
}

fn parse_into<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}: invalid value {raw:?}: {e}"))?;
    }
    Ok(())
}
