use std::str::FromStr;
use std::time::Duration;

use autodoc_core::admission::{
    AdmissionConfig, DEFAULT_MAX_GLOBAL, DEFAULT_MAX_PER_TENANT, DEFAULT_RETENTION_CAP,
};
use autodoc_core::scanning::{DEFAULT_BRANCH, DEFAULT_POLL_INTERVAL, DEFAULT_SCAN_TIMEOUT};
use autodoc_pipeline::OrchestratorConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight scans to record their outcome.
    pub shutdown_timeout_secs: u64,
    /// Postgres URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Base URL of the Scanning Worker.
    pub scanner_url: String,
    pub max_concurrent_scans: usize,
    pub max_scans_per_tenant: usize,
    /// Terminal scan jobs kept for queue stats.
    pub scan_history_limit: usize,
    pub scan_poll_interval_secs: u64,
    pub scan_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                  |
    /// |---------------------------|--------------------------|
    /// | `HOST`                    | `0.0.0.0`                |
    /// | `PORT`                    | `3000`                   |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                     |
    /// | `DATABASE_URL`            | unset (in-memory store)  |
    /// | `SCANNER_URL`             | `http://localhost:3001`  |
    /// | `MAX_CONCURRENT_SCANS`    | `5`                      |
    /// | `MAX_SCANS_PER_TENANT`    | `2`                      |
    /// | `SCAN_HISTORY_LIMIT`      | `100`                    |
    /// | `SCAN_POLL_INTERVAL_SECS` | `2`                      |
    /// | `SCAN_TIMEOUT_SECS`       | `300`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let scanner_url =
            std::env::var("SCANNER_URL").unwrap_or_else(|_| "http://localhost:3001".into());

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            database_url,
            scanner_url,
            max_concurrent_scans: env_or("MAX_CONCURRENT_SCANS", DEFAULT_MAX_GLOBAL),
            max_scans_per_tenant: env_or("MAX_SCANS_PER_TENANT", DEFAULT_MAX_PER_TENANT),
            scan_history_limit: env_or("SCAN_HISTORY_LIMIT", DEFAULT_RETENTION_CAP),
            scan_poll_interval_secs: env_or(
                "SCAN_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            ),
            scan_timeout_secs: env_or("SCAN_TIMEOUT_SECS", DEFAULT_SCAN_TIMEOUT.as_secs()),
        }
    }

    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_global: self.max_concurrent_scans,
            max_per_tenant: self.max_scans_per_tenant,
            retention_cap: self.scan_history_limit,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(self.scan_poll_interval_secs.max(1)),
            scan_timeout: Duration::from_secs(self.scan_timeout_secs),
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
///
/// Panics on a malformed value so misconfiguration fails at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value: {e}")),
        Err(_) => default,
    }
}
