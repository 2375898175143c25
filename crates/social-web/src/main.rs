mod api;
mod auth;
mod config;
mod dto;
mod error;
mod mail;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use social_core::auth::{Authenticator, RoleRegistry, UserResolver};
use social_core::storage::postgres;
use social_core::{cache, Storage};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::mail::LogMailer;
use crate::middleware::rate_limit::build_limiter;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social_web=debug,social_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    let bind_addr = config.bind_addr;
    let api_url = config.api_url.clone();

    let storage = if config.database.url.is_empty() {
        Storage::memory()
    } else {
        let pool = postgres::connect(&config.database).await?;
        postgres::migrate(&pool).await?;
        tracing::info!("Database connection pool established");
        Storage::postgres(pool)
    };

    let user_cache = cache::from_config(&config.cache).await?;
    let roles = RoleRegistry::load(storage.roles.as_ref()).await?;

    let token = &config.auth.token;
    let authenticator = Arc::new(Authenticator::new(
        &token.secret,
        &token.issuer,
        token.audience(),
        token.ttl(),
    ));

    let limiter = build_limiter(&config.rate_limit);

    let mailer = Arc::new(LogMailer::new(config.mail.from_email.clone()));

    let state = AppState {
        users: UserResolver::new(storage.users.clone(), user_cache),
        storage,
        authenticator,
        roles: Arc::new(roles),
        limiter,
        mailer,
        config: Arc::new(config),
    };

    let app = api::app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(api_url = %api_url, "social-web listening on http://{}", bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
