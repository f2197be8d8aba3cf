//! Search-term catalog driving bulk product synchronization.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTerm {
    pub query: String,
    /// Marketplace category id used to narrow the search, e.g. `"MLB1051"`.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogGroup {
    pub name: String,
    pub terms: Vec<CatalogTerm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCatalog {
    /// Products requested per search term.
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub groups: Vec<CatalogGroup>,
}

fn default_limit() -> u32 {
    50
}

impl SyncCatalog {
    /// Iterates all terms across groups in file order.
    pub fn terms(&self) -> impl Iterator<Item = &CatalogTerm> {
        self.groups.iter().flat_map(|g| g.terms.iter())
    }

    #[must_use]
    pub fn term_count(&self) -> usize {
        self.groups.iter().map(|g| g.terms.len()).sum()
    }
}

/// Load and validate the sync catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<SyncCatalog, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let catalog: SyncCatalog = serde_yaml::from_str(&content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &SyncCatalog) -> Result<(), ConfigError> {
    if !(1..=50).contains(&catalog.limit) {
        return Err(ConfigError::Validation(format!(
            "catalog limit must be between 1 and 50, got {}",
            catalog.limit
        )));
    }

    let mut seen = HashSet::new();
    for group in &catalog.groups {
        if group.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "catalog group name must be non-empty".to_string(),
            ));
        }
        for term in &group.terms {
            let query = term.query.trim().to_lowercase();
            if query.chars().count() < 2 {
                return Err(ConfigError::Validation(format!(
                    "search term '{}' in group '{}' must have at least 2 characters",
                    term.query, group.name
                )));
            }
            if !seen.insert(query) {
                return Err(ConfigError::Validation(format!(
                    "duplicate search term: '{}'",
                    term.query
                )));
            }
        }
    }

    Ok(())
}
