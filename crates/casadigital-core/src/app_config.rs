use std::net::SocketAddr;
use std::path::PathBuf;

use crate::affiliate::AffiliateRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
    pub catalog_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub marketplace_base_url: String,
    pub marketplace_request_timeout_secs: u64,
    pub marketplace_user_agent: String,
    pub marketplace_max_retries: u32,
    pub marketplace_retry_backoff_base_secs: u64,
    pub sync_inter_request_delay_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
    /// Requests each caller may make per window on protected routes.
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub affiliates: AffiliateRegistry,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("cors_origins", &self.cors_origins)
            .field("catalog_path", &self.catalog_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("marketplace_base_url", &self.marketplace_base_url)
            .field(
                "marketplace_request_timeout_secs",
                &self.marketplace_request_timeout_secs,
            )
            .field("marketplace_user_agent", &self.marketplace_user_agent)
            .field("marketplace_max_retries", &self.marketplace_max_retries)
            .field(
                "marketplace_retry_backoff_base_secs",
                &self.marketplace_retry_backoff_base_secs,
            )
            .field(
                "sync_inter_request_delay_ms",
                &self.sync_inter_request_delay_ms,
            )
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("affiliates", &self.affiliates)
            .finish()
    }
}
