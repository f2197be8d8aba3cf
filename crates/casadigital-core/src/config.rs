use crate::affiliate::AffiliateRegistry;
use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing is decoupled from the process environment so it can be tested with
/// a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("CASADIGITAL_ENV", "development"))?;

    let bind_addr = parse_addr("CASADIGITAL_BIND_ADDR", "0.0.0.0:8000")?;
    let log_level = or_default("CASADIGITAL_LOG_LEVEL", "info");
    let cors_origins = parse_cors_origins(&or_default("BACKEND_CORS_ORIGINS", ""))?;
    let catalog_path = PathBuf::from(or_default(
        "CASADIGITAL_CATALOG_PATH",
        "./config/catalog.yaml",
    ));

    let db_max_connections = parse_u32("CASADIGITAL_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CASADIGITAL_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CASADIGITAL_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let marketplace_base_url = or_default(
        "CASADIGITAL_MARKETPLACE_BASE_URL",
        "https://api.mercadolibre.com",
    );
    let marketplace_request_timeout_secs =
        parse_u64("CASADIGITAL_MARKETPLACE_REQUEST_TIMEOUT_SECS", "30")?;
    let marketplace_user_agent = or_default(
        "CASADIGITAL_MARKETPLACE_USER_AGENT",
        "casadigital/0.1 (affiliate-catalog)",
    );
    let marketplace_max_retries = parse_u32("CASADIGITAL_MARKETPLACE_MAX_RETRIES", "3")?;
    let marketplace_retry_backoff_base_secs =
        parse_u64("CASADIGITAL_MARKETPLACE_RETRY_BACKOFF_BASE_SECS", "2")?;
    let sync_inter_request_delay_ms = parse_u64("CASADIGITAL_SYNC_INTER_REQUEST_DELAY_MS", "5000")?;

    let cache_ttl_secs = parse_u64("CASADIGITAL_CACHE_TTL_SECS", "300")?;
    let cache_max_entries = parse_u64("CASADIGITAL_CACHE_MAX_ENTRIES", "10000")?;

    let rate_limit_max_requests = parse_u32("CASADIGITAL_RATE_LIMIT_MAX_REQUESTS", "120")?;
    let rate_limit_window_secs = parse_u64("CASADIGITAL_RATE_LIMIT_WINDOW_SECS", "60")?;
    if rate_limit_max_requests == 0 || rate_limit_window_secs == 0 {
        return Err(invalid(
            "CASADIGITAL_RATE_LIMIT_MAX_REQUESTS",
            "rate limit and window must both be positive".to_string(),
        ));
    }

    let affiliates = AffiliateRegistry::from_lookup(&lookup);

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        cors_origins,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        marketplace_base_url,
        marketplace_request_timeout_secs,
        marketplace_user_agent,
        marketplace_max_retries,
        marketplace_retry_backoff_base_secs,
        sync_inter_request_delay_ms,
        cache_ttl_secs,
        cache_max_entries,
        rate_limit_max_requests,
        rate_limit_window_secs,
        affiliates,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CASADIGITAL_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}

/// Parse `BACKEND_CORS_ORIGINS`: either a comma-separated list or a JSON
/// array of strings. Every origin must be an absolute `http(s)` URL with a
/// host; a trailing `/` is dropped.
fn parse_cors_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    const VAR: &str = "BACKEND_CORS_ORIGINS";
    let invalid = |reason: String| ConfigError::InvalidEnvVar {
        var: VAR.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    let entries: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| invalid(format!("invalid JSON array: {e}")))?
    } else {
        trimmed.split(',').map(ToOwned::to_owned).collect()
    };

    let mut origins = Vec::with_capacity(entries.len());
    for entry in &entries {
        let origin = entry.trim().trim_end_matches('/');
        if origin.is_empty() {
            continue;
        }
        let parsed =
            url::Url::parse(origin).map_err(|e| invalid(format!("'{origin}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(invalid(format!("'{origin}' is not an http(s) origin")));
        }
        origins.push(origin.to_string());
    }

    Ok(origins)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
