//! Mercado Livre API response types.
//!
//! Only the fields the catalog uses are modelled. Prices arrive as JSON
//! numbers (`1999.9`) and are converted to `Decimal` during normalization.
//! `original_price` is `null` for listings without a discount.

use serde::{Deserialize, Serialize};

/// Response from `GET /sites/{site}/search`.
///
/// Results stay raw so that one malformed listing is skipped on its own
/// instead of failing the whole page.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub total: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// A listing, as returned by search results and by `GET /items/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub currency_id: Option<String>,
    #[serde(default)]
    pub available_quantity: i64,
    pub thumbnail: Option<String>,
    pub permalink: Option<String>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub pictures: Vec<Picture>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Picture {
    pub url: Option<String>,
    pub secure_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub value_name: Option<String>,
}

/// Response from `GET /items/{id}/description`.
#[derive(Debug, Deserialize)]
pub struct ItemDescription {
    #[serde(default)]
    pub plain_text: Option<String>,
}

/// Entry of `GET /sites/{site}/categories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Response from `GET /categories/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDetail {
    pub id: String,
    pub name: String,
    pub total_items_in_this_category: Option<u64>,
    #[serde(default)]
    pub path_from_root: Vec<Category>,
    #[serde(default)]
    pub children_categories: Vec<ChildCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildCategory {
    pub id: String,
    pub name: String,
    pub total_items_in_this_category: Option<u64>,
}

/// Entry of `GET /trends/{site}[/{category}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingKeyword {
    pub keyword: String,
    pub url: Option<String>,
}
