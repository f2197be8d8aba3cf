//! HTTP client for the Mercado Livre public API.

use std::time::Duration;

use casadigital_core::{AffiliateRegistry, AppConfig, NormalizedProduct};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::MarketplaceError;
use crate::normalize::normalize_item;
use crate::retry::retry_with_backoff;
use crate::types::{
    Category, CategoryDetail, Item, ItemDescription, SearchResponse, TrendingKeyword,
};

/// Brazilian site id; every search, category and trend request is scoped to it.
pub const SITE_ID: &str = "MLB";

/// Largest page the search endpoint accepts.
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Connection settings shared by every client built for a store.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Additional attempts after the first failure on transient errors.
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.marketplace_base_url.clone(),
            timeout_secs: config.marketplace_request_timeout_secs,
            user_agent: config.marketplace_user_agent.clone(),
            max_retries: config.marketplace_max_retries,
            backoff_base_secs: config.marketplace_retry_backoff_base_secs,
        }
    }
}

/// Mercado Livre API client.
///
/// Requests carry `Authorization: Bearer <token>` when the store has an
/// access token. Rate limits (429), 5xx responses and network failures are
/// retried with exponential backoff; 404s map to [`MarketplaceError::NotFound`].
pub struct MercadoLivreClient {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
    affiliates: AffiliateRegistry,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl MercadoLivreClient {
    /// Builds a client against `settings.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidUrl`] if the base URL does not parse,
    /// or [`MarketplaceError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        settings: &ClientSettings,
        access_token: Option<String>,
        affiliates: AffiliateRegistry,
    ) -> Result<Self, MarketplaceError> {
        let base_url = parse_base_url(&settings.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&settings.user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url,
            access_token: access_token.filter(|t| !t.is_empty()),
            affiliates,
            max_retries: settings.max_retries,
            backoff_base_secs: settings.backoff_base_secs,
        })
    }

    /// Searches listings and returns them normalized, with affiliate links
    /// attached. Listings that cannot be normalized are skipped.
    ///
    /// `limit` is clamped to `1..=50`.
    ///
    /// # Errors
    ///
    /// Returns a [`MarketplaceError`] if the search request fails.
    pub async fn search_products(
        &self,
        query: &str,
        category: Option<&str>,
        limit: u32,
    ) -> Result<Vec<NormalizedProduct>, MarketplaceError> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let mut url = self.endpoint(&["sites", SITE_ID, "search"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("limit", &limit.to_string());
            if let Some(category) = category.filter(|c| !c.is_empty()) {
                pairs.append_pair("category", category);
            }
        }

        let response: SearchResponse = self
            .get_json(url, &format!("search results for '{query}'"))
            .await?;

        let total = response.paging.as_ref().and_then(|p| p.total);
        let products: Vec<NormalizedProduct> = response
            .results
            .into_iter()
            .filter_map(|raw| match self.normalize_search_result(raw) {
                Ok(product) => Some(product),
                Err(e) => {
                    tracing::warn!(error = %e, query, "skipping listing that failed to normalize");
                    None
                }
            })
            .collect();

        tracing::debug!(query, ?category, total, returned = products.len(), "search completed");
        Ok(products)
    }

    fn normalize_search_result(
        &self,
        raw: serde_json::Value,
    ) -> Result<NormalizedProduct, MarketplaceError> {
        let item: Item =
            serde_json::from_value(raw).map_err(|source| MarketplaceError::Deserialize {
                context: "search result".to_string(),
                source,
            })?;
        normalize_item(item, None, &self.affiliates)
    }

    /// Fetches one listing with its full description.
    ///
    /// A failing description request is not fatal: the listing subtitle is
    /// used instead.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::NotFound`] for unknown ids, or another
    /// [`MarketplaceError`] if the item request or normalization fails.
    pub async fn get_product_details(
        &self,
        item_id: &str,
    ) -> Result<NormalizedProduct, MarketplaceError> {
        let item: Item = self
            .get_json(self.endpoint(&["items", item_id])?, &format!("item {item_id}"))
            .await?;

        let description_url = self.endpoint(&["items", item_id, "description"])?;
        let description = match self
            .get_json::<ItemDescription>(description_url, &format!("description of {item_id}"))
            .await
        {
            Ok(d) => d.plain_text,
            Err(e) => {
                tracing::warn!(item_id, error = %e, "item description unavailable");
                None
            }
        };

        normalize_item(item, description, &self.affiliates)
    }

    /// Lists the site's top-level categories.
    ///
    /// # Errors
    ///
    /// Returns a [`MarketplaceError`] if the request fails.
    pub async fn get_categories(&self) -> Result<Vec<Category>, MarketplaceError> {
        self.get_json(
            self.endpoint(&["sites", SITE_ID, "categories"])?,
            "site categories",
        )
        .await
    }

    /// Fetches one category with its path and children.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::NotFound`] for unknown ids, or another
    /// [`MarketplaceError`] if the request fails.
    pub async fn get_category(&self, category_id: &str) -> Result<CategoryDetail, MarketplaceError> {
        self.get_json(
            self.endpoint(&["categories", category_id])?,
            &format!("category {category_id}"),
        )
        .await
    }

    /// Trending search keywords for the site, or for one category.
    ///
    /// # Errors
    ///
    /// Returns a [`MarketplaceError`] if the request fails.
    pub async fn get_trending(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrendingKeyword>, MarketplaceError> {
        let url = match category.filter(|c| !c.is_empty()) {
            Some(category) => self.endpoint(&["trends", SITE_ID, category])?,
            None => self.endpoint(&["trends", SITE_ID])?,
        };
        let mut keywords: Vec<TrendingKeyword> = self.get_json(url, "trending keywords").await?;
        keywords.truncate(limit);
        Ok(keywords)
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, MarketplaceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| MarketplaceError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
    ) -> Result<T, MarketplaceError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.clone();
            async move {
                let mut request = self
                    .client
                    .get(url.clone())
                    .header(reqwest::header::ACCEPT, "application/json");
                if let Some(token) = &self.access_token {
                    request = request.bearer_auth(token);
                }

                let response = request.send().await?;
                let status = response.status();

                if status == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after_secs = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    return Err(MarketplaceError::RateLimited { retry_after_secs });
                }

                if status == StatusCode::NOT_FOUND {
                    return Err(MarketplaceError::NotFound {
                        url: url.to_string(),
                    });
                }

                if !status.is_success() {
                    return Err(MarketplaceError::UnexpectedStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }

                let body = response.text().await?;
                serde_json::from_str::<T>(&body).map_err(|e| MarketplaceError::Deserialize {
                    context: context.to_string(),
                    source: e,
                })
            }
        })
        .await
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, MarketplaceError> {
    let url = Url::parse(base_url).map_err(|e| MarketplaceError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(MarketplaceError::InvalidUrl {
            url: base_url.to_string(),
            reason: "not a hierarchical URL".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> ClientSettings {
        ClientSettings {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            user_agent: "casadigital-test/0.1".to_string(),
            max_retries: 0,
            backoff_base_secs: 0,
        }
    }

    fn client(base_url: &str) -> MercadoLivreClient {
        MercadoLivreClient::new(&settings(base_url), None, AffiliateRegistry::new())
            .expect("client builds")
    }

    #[test]
    fn endpoint_joins_segments_without_double_slash() {
        let c = client("https://api.mercadolibre.com/");
        let url = c.endpoint(&["sites", SITE_ID, "search"]).unwrap();
        assert_eq!(url.as_str(), "https://api.mercadolibre.com/sites/MLB/search");
    }

    #[test]
    fn endpoint_percent_encodes_user_supplied_ids() {
        let c = client("https://api.mercadolibre.com");
        let url = c.endpoint(&["items", "MLB1/../admin"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mercadolibre.com/items/MLB1%2F..%2Fadmin"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = MercadoLivreClient::new(&settings("not a url"), None, AffiliateRegistry::new());
        assert!(matches!(result, Err(MarketplaceError::InvalidUrl { .. })));

        let result =
            MercadoLivreClient::new(&settings("mailto:ops@casadigital.com"), None, AffiliateRegistry::new());
        assert!(matches!(result, Err(MarketplaceError::InvalidUrl { .. })));
    }

    #[test]
    fn blank_access_token_is_dropped() {
        let c = MercadoLivreClient::new(
            &settings("https://api.mercadolibre.com"),
            Some(String::new()),
            AffiliateRegistry::new(),
        )
        .unwrap();
        assert!(c.access_token.is_none());
    }
}
