//! Application configuration.
//!
//! All options are readable from `OPINE_*` environment variables via
//! [`AppConfig::from_env`]; the struct also deserialises from TOML/JSON for
//! test fixtures. Defaults match a single-replica development deployment.

use std::net::SocketAddr;
use std::path::PathBuf;

use opine_error::{OpineError, Result};
use serde::{Deserialize, Serialize};

/// Rate-limit tier configuration (requests per minute per client).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitTiers {
    /// General API endpoints.
    #[serde(default = "default_rl_general")]
    pub general_per_min: u32,

    /// Analytics rollup endpoints.
    #[serde(default = "default_rl_analytics")]
    pub analytics_per_min: u32,

    /// Admin mutation endpoints (per subject).
    #[serde(default = "default_rl_admin")]
    pub admin_per_min: u32,

    /// Upload endpoints.
    #[serde(default = "default_rl_upload")]
    pub upload_per_min: u32,

    /// Burst capacity on top of the steady rate.
    #[serde(default = "default_rl_burst")]
    pub burst: u32,
}

impl Default for RateLimitTiers {
    fn default() -> Self {
        Self {
            general_per_min:   default_rl_general(),
            analytics_per_min: default_rl_analytics(),
            admin_per_min:     default_rl_admin(),
            upload_per_min:    default_rl_upload(),
            burst:             default_rl_burst(),
        }
    }
}

/// One configured credential pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (e.g., "info", "opine=debug,tower_http=warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines.
    #[serde(default)]
    pub json: bool,

    /// Optional log file path; stdout when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json:  false,
            file:  None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Database connection pool size.
    #[serde(default = "default_pool_size")]
    pub db_pool_size: usize,

    /// Extra connections the pool may open under load.
    #[serde(default = "default_pool_overflow")]
    pub db_pool_overflow: usize,

    /// Redis URL for the analytics cache. Unset disables caching (every
    /// lookup is a miss).
    #[serde(default)]
    pub cache_url: Option<String>,

    /// Redis URL for the job queues. Unset selects the in-process queue.
    #[serde(default)]
    pub queue_url: Option<String>,

    /// Vector store REST endpoint. Unset selects the in-process index.
    #[serde(default)]
    pub vector_url: Option<String>,

    /// Enrichment model endpoint (HF-style inference API).
    #[serde(default)]
    pub model_url: Option<String>,

    /// LLM chat-completion endpoint for the QA facade.
    #[serde(default)]
    pub llm_url: Option<String>,

    /// API key for the LLM endpoint.
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Bearer token signing secret (HS256).
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: u64,

    /// Admin credentials.
    #[serde(default = "default_admin_credentials")]
    pub admin: Credentials,

    /// Viewer credentials.
    #[serde(default = "default_viewer_credentials")]
    pub viewer: Credentials,

    /// Rate-limit tiers.
    #[serde(default)]
    pub rate_limits: RateLimitTiers,

    /// CORS allowed origins; empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Use the HF sentiment endpoint instead of the lexicon classifier.
    #[serde(default)]
    pub hf_sentiment: bool,

    /// Drop non-English rows at upload time.
    #[serde(default)]
    pub english_only: bool,

    /// HTTP bind address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Logging options.
    #[serde(default)]
    pub log: LogConfig,

    /// Serve the Prometheus endpoint (development only).
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Enrichment worker tasks per queue.
    #[serde(default = "default_workers_per_queue")]
    pub workers_per_queue: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url:        default_database_url(),
            db_pool_size:        default_pool_size(),
            db_pool_overflow:    default_pool_overflow(),
            cache_url:           None,
            queue_url:           None,
            vector_url:          None,
            model_url:           None,
            llm_url:             None,
            llm_api_key:         None,
            token_secret:        default_token_secret(),
            token_lifetime_secs: default_token_lifetime(),
            admin:               default_admin_credentials(),
            viewer:              default_viewer_credentials(),
            rate_limits:         RateLimitTiers::default(),
            cors_origins:        Vec::new(),
            hf_sentiment:        false,
            english_only:        false,
            bind_addr:           default_bind_addr(),
            log:                 LogConfig::default(),
            metrics_enabled:     false,
            workers_per_queue:   default_workers_per_queue(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `OPINE_*` environment variables, falling back
    /// to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` when a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("OPINE_DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Some(v) = parse_env("OPINE_DB_POOL_SIZE")? {
            cfg.db_pool_size = v;
        }
        if let Some(v) = parse_env("OPINE_DB_POOL_OVERFLOW")? {
            cfg.db_pool_overflow = v;
        }
        cfg.cache_url = std::env::var("OPINE_CACHE_URL").ok().or(cfg.cache_url);
        cfg.queue_url = std::env::var("OPINE_QUEUE_URL").ok().or(cfg.queue_url);
        cfg.vector_url = std::env::var("OPINE_VECTOR_URL").ok().or(cfg.vector_url);
        cfg.model_url = std::env::var("OPINE_MODEL_URL").ok().or(cfg.model_url);
        cfg.llm_url = std::env::var("OPINE_LLM_URL").ok().or(cfg.llm_url);
        cfg.llm_api_key = std::env::var("OPINE_LLM_API_KEY").ok().or(cfg.llm_api_key);
        if let Ok(v) = std::env::var("OPINE_TOKEN_SECRET") {
            cfg.token_secret = v;
        }
        if let Some(v) = parse_env("OPINE_TOKEN_LIFETIME_SECS")? {
            cfg.token_lifetime_secs = v;
        }
        if let Ok(v) = std::env::var("OPINE_ADMIN_USERNAME") {
            cfg.admin.username = v;
        }
        if let Ok(v) = std::env::var("OPINE_ADMIN_PASSWORD") {
            cfg.admin.password = v;
        }
        if let Ok(v) = std::env::var("OPINE_VIEWER_USERNAME") {
            cfg.viewer.username = v;
        }
        if let Ok(v) = std::env::var("OPINE_VIEWER_PASSWORD") {
            cfg.viewer.password = v;
        }
        if let Some(v) = parse_env("OPINE_RATE_LIMIT_GENERAL")? {
            cfg.rate_limits.general_per_min = v;
        }
        if let Some(v) = parse_env("OPINE_RATE_LIMIT_ANALYTICS")? {
            cfg.rate_limits.analytics_per_min = v;
        }
        if let Some(v) = parse_env("OPINE_RATE_LIMIT_ADMIN")? {
            cfg.rate_limits.admin_per_min = v;
        }
        if let Some(v) = parse_env("OPINE_RATE_LIMIT_UPLOAD")? {
            cfg.rate_limits.upload_per_min = v;
        }
        if let Some(v) = parse_env("OPINE_RATE_LIMIT_BURST")? {
            cfg.rate_limits.burst = v;
        }
        if let Ok(v) = std::env::var("OPINE_CORS_ORIGINS") {
            cfg.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = parse_env("OPINE_HF_SENTIMENT")? {
            cfg.hf_sentiment = v;
        }
        if let Some(v) = parse_env("OPINE_ENGLISH_ONLY")? {
            cfg.english_only = v;
        }
        if let Some(v) = parse_env("OPINE_BIND_ADDR")? {
            cfg.bind_addr = v;
        }
        if let Ok(v) = std::env::var("OPINE_LOG_LEVEL") {
            cfg.log.level = v;
        }
        if let Some(v) = parse_env("OPINE_LOG_JSON")? {
            cfg.log.json = v;
        }
        if let Ok(v) = std::env::var("OPINE_LOG_FILE") {
            cfg.log.file = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_env("OPINE_METRICS_ENABLED")? {
            cfg.metrics_enabled = v;
        }
        if let Some(v) = parse_env("OPINE_WORKERS_PER_QUEUE")? {
            cfg.workers_per_queue = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `OpineError::Validation` when the token secret is too short
    /// or a pool/worker size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.token_secret.len() < 16 {
            return Err(OpineError::validation(
                "token_secret must be at least 16 characters",
            ));
        }
        if self.db_pool_size == 0 {
            return Err(OpineError::validation("db_pool_size must be positive"));
        }
        if self.workers_per_queue == 0 {
            return Err(OpineError::validation("workers_per_queue must be positive"));
        }
        Ok(())
    }

    /// Total pool capacity (base size plus overflow).
    #[must_use]
    pub const fn db_pool_capacity(&self) -> usize {
        self.db_pool_size + self.db_pool_overflow
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| OpineError::validation(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/opine".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_pool_overflow() -> usize {
    20
}

fn default_token_secret() -> String {
    // Development-only fallback; deployments must set OPINE_TOKEN_SECRET.
    "opine-dev-secret-change-me".to_string()
}

fn default_token_lifetime() -> u64 {
    86_400
}

fn default_admin_credentials() -> Credentials {
    Credentials {
        username: "admin".to_string(),
        password: "admin".to_string(),
    }
}

fn default_viewer_credentials() -> Credentials {
    Credentials {
        username: "viewer".to_string(),
        password: "viewer".to_string(),
    }
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8000".parse().expect("static addr")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers_per_queue() -> usize {
    2
}

fn default_rl_general() -> u32 {
    60
}

fn default_rl_analytics() -> u32 {
    30
}

fn default_rl_admin() -> u32 {
    10
}

fn default_rl_upload() -> u32 {
    5
}

fn default_rl_burst() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.database_url, "postgresql://localhost/opine");
        assert_eq!(cfg.db_pool_size, 10);
        assert_eq!(cfg.db_pool_overflow, 20);
        assert_eq!(cfg.db_pool_capacity(), 30);
        assert_eq!(cfg.token_lifetime_secs, 86_400);
        assert_eq!(cfg.rate_limits.general_per_min, 60);
        assert_eq!(cfg.rate_limits.analytics_per_min, 30);
        assert_eq!(cfg.rate_limits.admin_per_min, 10);
        assert_eq!(cfg.rate_limits.upload_per_min, 5);
        assert_eq!(cfg.rate_limits.burst, 10);
        assert!(!cfg.metrics_enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_short_token_secret_rejected() {
        let cfg = AppConfig {
            token_secret: "short".to_string(),
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let cfg = AppConfig {
            db_pool_size: 0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml_shape() {
        let cfg: AppConfig = serde_json::from_value(serde_json::json!({
            "database_url": "postgresql://db.internal/opine",
            "english_only": true,
            "rate_limits": {"general_per_min": 120}
        }))
        .expect("deserialize");

        assert_eq!(cfg.database_url, "postgresql://db.internal/opine");
        assert!(cfg.english_only);
        assert_eq!(cfg.rate_limits.general_per_min, 120);
        // Unspecified tiers fall back to defaults.
        assert_eq!(cfg.rate_limits.burst, 10);
    }
}
