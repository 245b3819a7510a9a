use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;
use statline_core::constants::{
    DEFAULT_AGGREGATE_TTL_SECS, DEFAULT_POLL_DELAY_MS, DEFAULT_POLL_MAX_ATTEMPTS,
};

pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub analysis_url: String,
    /// Per-request timeout of the HTTP analysis client.
    pub analysis_timeout: Duration,
    pub poll_attempts: u32,
    pub poll_delay: Duration,
    pub cache_ttl: Duration,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            db_path: "./db/statline.db".to_string(),
            analysis_url: "http://127.0.0.1:8000/api".to_string(),
            analysis_timeout: Duration::from_millis(30_000),
            poll_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            poll_delay: Duration::from_millis(DEFAULT_POLL_DELAY_MS),
            cache_ttl: Duration::from_secs(DEFAULT_AGGREGATE_TTL_SECS),
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_millis(30_000),
        }
    }
}

impl Config {
    /// Reads `STATLINE_*` variables (and a `.env` file when present).
    ///
    /// Numeric values that do not parse fall back to their defaults; an
    /// unparsable listen address is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("STATLINE_LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid STATLINE_LISTEN_ADDR '{}'", raw))?,
            Err(_) => defaults.listen_addr,
        };
        let db_path = std::env::var("STATLINE_DB_PATH").unwrap_or(defaults.db_path);
        let analysis_url = std::env::var("STATLINE_ANALYSIS_URL").unwrap_or(defaults.analysis_url);
        let cors_allow = std::env::var("STATLINE_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            listen_addr,
            db_path,
            analysis_url,
            analysis_timeout: Duration::from_millis(env_or("STATLINE_ANALYSIS_TIMEOUT_MS", 30_000)),
            poll_attempts: env_or("STATLINE_POLL_ATTEMPTS", defaults.poll_attempts).max(1),
            poll_delay: Duration::from_millis(env_or(
                "STATLINE_POLL_DELAY_MS",
                DEFAULT_POLL_DELAY_MS,
            )),
            cache_ttl: Duration::from_secs(env_or(
                "STATLINE_CACHE_TTL_SECS",
                DEFAULT_AGGREGATE_TTL_SECS,
            )),
            cors_allow,
            request_timeout: Duration::from_millis(env_or("STATLINE_REQUEST_TIMEOUT_MS", 30_000)),
        })
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
