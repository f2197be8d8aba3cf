use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A third-party marketplace integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MercadoLivre,
}

impl Platform {
    pub const ALL: [Platform; 1] = [Platform::MercadoLivre];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::MercadoLivre => "mercadolivre",
        }
    }

    /// Base URL of the platform's affiliate redirect endpoint.
    #[must_use]
    pub fn affiliate_redirect_base(self) -> &'static str {
        match self {
            Platform::MercadoLivre => "https://www.mercadolivre.com.br/link/redirect",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mercadolivre" => Ok(Platform::MercadoLivre),
            other => Err(ConfigError::UnsupportedPlatform(other.to_string())),
        }
    }
}
