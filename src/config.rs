use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Signing algorithm
// ---------------------------------------------------------------------------

/// Closed set of supported token signing algorithms.
///
/// Only HMAC-SHA-256 is implemented; the field exists so that a config file
/// naming anything else fails at startup instead of silently signing with a
/// different algorithm than the operator expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SigningAlgorithm {
    #[default]
    #[serde(rename = "HS256")]
    Hs256,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    pub listen: String,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Name of the environment variable that holds the Postgres URL.
    /// The URL carries credentials, so it never appears in the config file.
    #[serde(default = "default_database_url_env")]
    pub url_env: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Timeout (seconds) for acquiring a connection at startup.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Per-query timeout (seconds).  A query exceeding this fails the request
    /// with a retriable error instead of hanging.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
}

fn default_database_url_env() -> String {
    "STOREFRONT_DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the environment variable that holds the token signing secret.
    /// The variable being unset is a fatal startup error; there is no
    /// per-request fallback.
    #[serde(default = "default_signing_secret_env")]
    pub signing_secret_env: String,
    /// Token signing algorithm identifier.
    #[serde(default)]
    pub algorithm: SigningAlgorithm,
    /// Access-token lifetime in minutes.
    #[serde(default = "default_token_lifetime_minutes")]
    pub token_lifetime_minutes: i64,
    /// bcrypt cost factor for password hashing.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_signing_secret_env() -> String {
    "STOREFRONT_SIGNING_SECRET".to_string()
}

fn default_token_lifetime_minutes() -> i64 {
    30
}

fn default_bcrypt_cost() -> u32 {
    12
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.auth.token_lifetime_minutes >= 1,
        "token_lifetime_minutes must be at least 1"
    );
    anyhow::ensure!(
        (4..=31).contains(&config.auth.bcrypt_cost),
        "bcrypt_cost must be in range 4-31"
    );
    anyhow::ensure!(
        config.database.max_connections >= 1,
        "max_connections must be at least 1"
    );
    anyhow::ensure!(
        config.database.query_timeout >= 1,
        "query_timeout must be at least 1 second"
    );
    Ok(())
}
