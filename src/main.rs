// The in-memory credential store and the clock-explicit decode/authorize
// paths exist for tests rather than the binary's call graph.  Allow
// dead_code crate-wide instead of scattering per-item allows.
#![allow(dead_code)]

mod auth;
mod config;
mod health;
mod http;
mod metrics;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::guard::AccessGuard;
use crate::auth::service::Authenticator;
use crate::auth::token::TokenCodec;
use crate::config::{Config, SigningAlgorithm};
use crate::metrics::MetricsRegistry;
use crate::store::postgres::PgCredentialStore;
use crate::store::CredentialStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "storefront", about = "E-commerce account and auth API server")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/storefront/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CredentialStore>,
    pub authenticator: Authenticator,
    pub guard: AccessGuard,
    pub metrics: MetricsRegistry,
}

// ---------------------------------------------------------------------------
// Database pool setup
// ---------------------------------------------------------------------------

async fn build_store(config: &Config) -> Result<PgCredentialStore> {
    let database_url = std::env::var(&config.database.url_env).with_context(|| {
        format!(
            "database URL env var {} is not set",
            config.database.url_env
        )
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    tracing::info!(
        max_connections = config.database.max_connections,
        "database pool initialised"
    );

    let store = PgCredentialStore::new(pool, Duration::from_secs(config.database.query_timeout));
    store
        .ensure_schema()
        .await
        .context("failed to ensure database schema")?;

    Ok(store)
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .listen
        .parse()
        .context("invalid listen address")?;

    let app = http::handler::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting storefront");

    // ---- Signing key (fatal if absent; no per-request fallback) ----
    let signing_secret = std::env::var(&config.auth.signing_secret_env).with_context(|| {
        format!(
            "signing secret env var {} is not set",
            config.auth.signing_secret_env
        )
    })?;

    let codec = match config.auth.algorithm {
        SigningAlgorithm::Hs256 => TokenCodec::new(signing_secret),
    };

    // ---- Credential store ----
    let store: Arc<dyn CredentialStore> = Arc::new(build_store(&config).await?);

    // ---- Auth services ----
    let authenticator = Authenticator::new(
        Arc::clone(&store),
        codec.clone(),
        config.auth.token_lifetime_minutes,
        config.auth.bcrypt_cost,
    );
    let guard = AccessGuard::new(codec);

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- App state ----
    let state = AppState {
        config: Arc::clone(&config),
        store,
        authenticator,
        guard,
        metrics,
    };

    run_http_server(state).await?;

    tracing::info!("storefront shut down cleanly");
    Ok(())
}
