use std::time::Duration;

use anyhow::{Context, Result};

use crate::keywords::retry::RetryPolicy;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Total extraction attempts per analysis, including the first one.
    pub extraction_max_attempts: u32,
    pub extraction_backoff_ms: u64,
    pub extraction_max_backoff_ms: u64,
    pub max_upload_bytes: usize,
    /// Idle sessions without subscribers are evicted after this many seconds.
    pub session_idle_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            extraction_max_attempts: parse_env("EXTRACTION_MAX_ATTEMPTS", 3)?,
            extraction_backoff_ms: parse_env("EXTRACTION_BACKOFF_MS", 1000)?,
            extraction_max_backoff_ms: parse_env("EXTRACTION_MAX_BACKOFF_MS", 30_000)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            session_idle_ttl_secs: parse_env("SESSION_IDLE_TTL_SECS", 900)?,
        })
    }

    /// How long an unobserved session may sit idle before it is evicted.
    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_secs.max(1))
    }

    /// Retry policy applied to rate-limited extraction calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.extraction_max_attempts.max(1),
            base_backoff: Duration::from_millis(self.extraction_backoff_ms),
            max_backoff: Duration::from_millis(self.extraction_max_backoff_ms),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
