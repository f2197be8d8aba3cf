//! Per-platform affiliate identity used when rewriting product links.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Default sub-platform tag sent as the `platform` query parameter.
pub const DEFAULT_SUB_PLATFORM_CODE: &str = "ml";

/// Substrings that identify a link already pointing at an affiliate endpoint.
const AFFILIATE_URL_PATTERNS: [&str; 4] = [
    "mercadolivre.com.br/social/",
    "mercadolivre.com.br/link/redirect",
    "mercadolibre.com/social/",
    "mercadolibre.com/link/redirect",
];

/// Static affiliate configuration for one platform.
///
/// `affiliate_id` is mandatory: a platform without one has no entry in the
/// [`AffiliateRegistry`] at all, so rewriting is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateConfig {
    pub affiliate_id: String,
    pub campaign: Option<String>,
    pub sub_platform_code: String,
}

impl AffiliateConfig {
    /// Builds a config, treating blank ids as "not configured".
    #[must_use]
    pub fn new(
        affiliate_id: &str,
        campaign: Option<&str>,
        sub_platform_code: Option<&str>,
    ) -> Option<Self> {
        let affiliate_id = affiliate_id.trim();
        if affiliate_id.is_empty() {
            return None;
        }
        Some(Self {
            affiliate_id: affiliate_id.to_string(),
            campaign: campaign
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToOwned::to_owned),
            sub_platform_code: sub_platform_code
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_SUB_PLATFORM_CODE)
                .to_string(),
        })
    }
}

/// Read-only lookup of [`AffiliateConfig`] by platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffiliateRegistry {
    configs: HashMap<Platform, AffiliateConfig>,
}

impl AffiliateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a registry with `config` registered for `platform`.
    #[must_use]
    pub fn with(mut self, platform: Platform, config: AffiliateConfig) -> Self {
        self.configs.insert(platform, config);
        self
    }

    /// Looks up the configuration for a platform name. Unknown platforms and
    /// platforms without an affiliate id both yield `None`.
    #[must_use]
    pub fn get(&self, platform: &str) -> Option<&AffiliateConfig> {
        let platform = platform.parse::<Platform>().ok()?;
        self.configs.get(&platform)
    }

    #[must_use]
    pub fn get_platform(&self, platform: Platform) -> Option<&AffiliateConfig> {
        self.configs.get(&platform)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Builds the registry from `<PLATFORM>_AFFILIATE_ID`,
    /// `<PLATFORM>_AFFILIATE_CAMPAIGN` and `<PLATFORM>_AFFILIATE_PLATFORM_CODE`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let mut registry = Self::new();
        for platform in Platform::ALL {
            let prefix = platform.as_str().to_uppercase();
            let id = lookup(&format!("{prefix}_AFFILIATE_ID")).unwrap_or_default();
            let campaign = lookup(&format!("{prefix}_AFFILIATE_CAMPAIGN")).ok();
            let code = lookup(&format!("{prefix}_AFFILIATE_PLATFORM_CODE")).ok();
            if let Some(config) = AffiliateConfig::new(&id, campaign.as_deref(), code.as_deref()) {
                registry = registry.with(platform, config);
            }
        }
        registry
    }
}

/// Returns `true` if `url` points at a known affiliate endpoint.
#[must_use]
pub fn is_valid_affiliate_url(url: &str) -> bool {
    AFFILIATE_URL_PATTERNS
        .iter()
        .any(|pattern| url.contains(pattern))
}
