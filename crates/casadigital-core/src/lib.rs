pub mod affiliate;
pub mod app_config;
pub mod catalog;
pub mod config;
pub mod platform;
pub mod products;

pub use affiliate::{is_valid_affiliate_url, AffiliateConfig, AffiliateRegistry};
pub use app_config::{AppConfig, Environment};
pub use catalog::{load_catalog, CatalogGroup, CatalogTerm, SyncCatalog};
pub use config::{load_app_config, load_app_config_from_env};
pub use platform::Platform;
pub use products::NormalizedProduct;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}
