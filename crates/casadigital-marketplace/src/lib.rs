pub mod affiliate;
pub mod client;
pub mod error;
pub mod normalize;
mod retry;
pub mod types;

pub use affiliate::{build_affiliate_url, extract_product_id, ExtractionRule, EXTRACTION_PRIORITY};
pub use client::{ClientSettings, MercadoLivreClient, MAX_SEARCH_LIMIT, SITE_ID};
pub use error::MarketplaceError;
pub use normalize::normalize_item;
pub use types::{Category, CategoryDetail, ChildCategory, TrendingKeyword};

use casadigital_core::{AffiliateRegistry, Platform};

/// Builds the API client for a store on `platform`.
///
/// `credentials` is the store's JSON credential object; its `access_token`
/// string, when present and non-empty, is sent as a bearer token.
///
/// # Errors
///
/// Returns [`MarketplaceError::UnsupportedPlatform`] if no client exists for
/// `platform`, or the construction errors of [`MercadoLivreClient::new`].
pub fn client_for_store(
    platform: &str,
    credentials: &serde_json::Value,
    settings: &ClientSettings,
    affiliates: &AffiliateRegistry,
) -> Result<MercadoLivreClient, MarketplaceError> {
    let platform = platform
        .parse::<Platform>()
        .map_err(|_| MarketplaceError::UnsupportedPlatform(platform.to_string()))?;

    match platform {
        Platform::MercadoLivre => {
            let access_token = credentials
                .get("access_token")
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned);
            MercadoLivreClient::new(settings, access_token, affiliates.clone())
        }
    }
}
