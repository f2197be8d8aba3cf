use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use casadigital_core::{NormalizedProduct, Platform};
use casadigital_marketplace::{
    client_for_store, Category, CategoryDetail, MercadoLivreClient, TrendingKeyword,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cache::cache_key;
use crate::middleware::RequestId;

use super::{
    map_db_error, map_lookup_error, map_marketplace_error, normalize_limit, parse_platform,
    respond, ApiError, ApiResponse, AppState,
};

const MIN_QUERY_CHARS: usize = 2;
const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 50;
const DEFAULT_TRENDING_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    pub id: i64,
    pub external_id: String,
    pub platform: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub affiliate_url: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<casadigital_db::ProductRow> for ProductItem {
    fn from(row: casadigital_db::ProductRow) -> Self {
        Self {
            id: row.id,
            external_id: row.external_id,
            platform: row.platform,
            title: row.title,
            description: row.description,
            price: row.price,
            sale_price: row.sale_price,
            image_url: row.image_url,
            product_url: row.product_url,
            affiliate_url: row.affiliate_url,
            category: row.category,
            brand: row.brand,
            available: row.available,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductListQuery {
    pub platform: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrendingQuery {
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub limit: Option<u32>,
}

fn validate_search(req_id: &str, query: &SearchQuery) -> Result<(String, u32), ApiError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            format!("q must be at least {MIN_QUERY_CHARS} characters"),
        ));
    }

    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            format!("limit must be between 1 and {MAX_SEARCH_LIMIT}, got {limit}"),
        ));
    }

    Ok((q.to_string(), limit))
}

/// Client for live lookups on `platform`: the first active store's
/// credentials when one exists, anonymous otherwise.
async fn platform_client(
    state: &AppState,
    req_id: &str,
    platform: Platform,
) -> Result<MercadoLivreClient, ApiError> {
    let store = casadigital_db::get_active_store_for_platform(&state.pool, platform.as_str())
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;
    let credentials = store
        .map(|s| s.api_credentials)
        .unwrap_or_else(|| serde_json::json!({}));

    client_for_store(
        platform.as_str(),
        &credentials,
        &state.sync.client,
        &state.sync.affiliates,
    )
    .map_err(|e| map_marketplace_error(req_id.to_owned(), &e))
}

async fn cached_search(
    state: &AppState,
    req_id: &str,
    platform: Platform,
    q: &str,
    category: Option<&str>,
    limit: u32,
) -> Result<Vec<NormalizedProduct>, ApiError> {
    let normalized_q = q.trim().to_lowercase();
    let key = cache_key(&[
        "search",
        platform.as_str(),
        &normalized_q,
        category.unwrap_or_default(),
        &limit.to_string(),
    ]);
    if let Some(hit) = state.cache.get::<Vec<NormalizedProduct>>(&key) {
        return Ok(hit);
    }

    let client = platform_client(state, req_id, platform).await?;
    let products = client
        .search_products(q, category, limit)
        .await
        .map_err(|e| map_marketplace_error(req_id.to_owned(), &e))?;

    state.cache.set(&key, &products);
    Ok(products)
}

/// GET /api/v1/products
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = casadigital_db::list_products(
        &state.pool,
        query.platform.as_deref(),
        query.skip.unwrap_or(0).max(0),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(respond(
        rows.into_iter().map(ProductItem::from).collect(),
        req_id.0,
    ))
}

/// GET /api/v1/products/{product_id}
///
/// Shoppers get the affiliate link in place of the plain listing URL.
pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let row = casadigital_db::get_product(&state.pool, product_id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "product"))?;

    let mut item = ProductItem::from(row);
    if let Some(affiliate_url) = &item.affiliate_url {
        item.product_url.clone_from(affiliate_url);
    }

    Ok(respond(item, req_id.0))
}

/// GET /api/v1/products/search
///
/// A platform whose search fails contributes an empty list.
pub(super) async fn search_all_platforms(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<BTreeMap<String, Vec<NormalizedProduct>>>>, ApiError> {
    let (q, limit) = validate_search(&req_id.0, &query)?;

    let mut results = BTreeMap::new();
    for platform in Platform::ALL {
        let products = match cached_search(&state, &req_id.0, platform, &q, None, limit).await {
            Ok(products) => products,
            Err(e) => {
                tracing::warn!(
                    platform = platform.as_str(),
                    code = %e.error.code,
                    "platform search failed; returning no results for it"
                );
                Vec::new()
            }
        };
        results.insert(platform.as_str().to_string(), products);
    }

    Ok(respond(results, req_id.0))
}

/// GET /api/v1/products/search/{platform}
pub(super) async fn search_platform(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(platform): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<NormalizedProduct>>>, ApiError> {
    let platform = parse_platform(&req_id.0, &platform)?;
    let (q, limit) = validate_search(&req_id.0, &query)?;
    let category = query.category.as_deref().filter(|c| !c.trim().is_empty());

    let products = cached_search(&state, &req_id.0, platform, &q, category, limit).await?;
    Ok(respond(products, req_id.0))
}

/// GET /api/v1/products/external/{platform}/{product_id}
pub(super) async fn get_external_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((platform, product_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<NormalizedProduct>>, ApiError> {
    let platform = parse_platform(&req_id.0, &platform)?;
    let client = platform_client(&state, &req_id.0, platform).await?;
    let product = client
        .get_product_details(&product_id)
        .await
        .map_err(|e| map_marketplace_error(req_id.0.clone(), &e))?;

    Ok(respond(product, req_id.0))
}

/// GET /api/v1/products/categories/{platform}
pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(platform): Path<String>,
) -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let platform = parse_platform(&req_id.0, &platform)?;
    let key = cache_key(&["categories", platform.as_str()]);
    if let Some(hit) = state.cache.get::<Vec<Category>>(&key) {
        return Ok(respond(hit, req_id.0));
    }

    let client = platform_client(&state, &req_id.0, platform).await?;
    let categories = client
        .get_categories()
        .await
        .map_err(|e| map_marketplace_error(req_id.0.clone(), &e))?;

    state.cache.set(&key, &categories);
    Ok(respond(categories, req_id.0))
}

/// GET /api/v1/products/categories/{platform}/{category_id}
pub(super) async fn get_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((platform, category_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<CategoryDetail>>, ApiError> {
    let platform = parse_platform(&req_id.0, &platform)?;
    let key = cache_key(&["category", platform.as_str(), &category_id]);
    if let Some(hit) = state.cache.get::<CategoryDetail>(&key) {
        return Ok(respond(hit, req_id.0));
    }

    let client = platform_client(&state, &req_id.0, platform).await?;
    let detail = client
        .get_category(&category_id)
        .await
        .map_err(|e| map_marketplace_error(req_id.0.clone(), &e))?;

    state.cache.set(&key, &detail);
    Ok(respond(detail, req_id.0))
}

/// GET /api/v1/products/trending/{platform}
pub(super) async fn list_trending(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(platform): Path<String>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<ApiResponse<Vec<TrendingKeyword>>>, ApiError> {
    let platform = parse_platform(&req_id.0, &platform)?;
    let category = query.category.as_deref().filter(|c| !c.trim().is_empty());
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRENDING_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT as usize);

    let key = cache_key(&[
        "trending",
        platform.as_str(),
        category.unwrap_or_default(),
        &limit.to_string(),
    ]);
    if let Some(hit) = state.cache.get::<Vec<TrendingKeyword>>(&key) {
        return Ok(respond(hit, req_id.0));
    }

    let client = platform_client(&state, &req_id.0, platform).await?;
    let keywords = client
        .get_trending(category, limit)
        .await
        .map_err(|e| map_marketplace_error(req_id.0.clone(), &e))?;

    state.cache.set(&key, &keywords);
    Ok(respond(keywords, req_id.0))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use casadigital_core::NormalizedProduct;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::super::test_support::{app, app_with, get, send};
    use super::{validate_search, SearchQuery};

    fn query(q: Option<&str>, limit: Option<u32>) -> SearchQuery {
        SearchQuery {
            q: q.map(ToOwned::to_owned),
            category: None,
            limit,
        }
    }

    #[test]
    fn validate_search_applies_default_limit() {
        let (q, limit) = validate_search("req", &query(Some(" tv "), None)).expect("valid");
        assert_eq!(q, "tv");
        assert_eq!(limit, 20);
    }

    #[test]
    fn validate_search_rejects_short_query_and_bad_limit() {
        assert!(validate_search("req", &query(Some("a"), None)).is_err());
        assert!(validate_search("req", &query(None, None)).is_err());
        assert!(validate_search("req", &query(Some("tv"), Some(0))).is_err());
        assert!(validate_search("req", &query(Some("tv"), Some(51))).is_err());
        assert!(validate_search("req", &query(Some("tv"), Some(50))).is_ok());
    }

    async fn seed_product(pool: &sqlx::PgPool, external_id: &str, affiliate: Option<&str>) -> i64 {
        let product = NormalizedProduct {
            external_id: external_id.to_string(),
            platform: "mercadolivre".to_string(),
            title: format!("Produto {external_id}"),
            description: None,
            price: Decimal::new(19_990, 2),
            sale_price: None,
            image_url: None,
            product_url: format!("https://produto.mercadolivre.com.br/{external_id}"),
            affiliate_url: affiliate.map(ToOwned::to_owned),
            category: None,
            brand: None,
            available: true,
        };
        casadigital_db::upsert_product(pool, &product)
            .await
            .expect("seed product")
            .id
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn get_product_prefers_affiliate_url(pool: sqlx::PgPool) {
        let id = seed_product(
            &pool,
            "MLB100",
            Some("https://www.mercadolivre.com.br/social/casadigital?id=MLB100"),
        )
        .await;

        let (status, json) = send(app(pool), get(&format!("/api/v1/products/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["data"]["product_url"],
            "https://www.mercadolivre.com.br/social/casadigital?id=MLB100"
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn get_product_returns_404_for_unknown_id(pool: sqlx::PgPool) {
        let (status, json) = send(app(pool), get("/api/v1/products/987654")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_products_pages_results(pool: sqlx::PgPool) {
        for id in ["MLB1", "MLB2", "MLB3"] {
            seed_product(&pool, id, None).await;
        }

        let (status, json) = send(
            app(pool),
            get("/api/v1/products?platform=mercadolivre&skip=1&limit=1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["external_id"], "MLB2");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn search_rejects_short_query(pool: sqlx::PgPool) {
        let (status, json) = send(app(pool), get("/api/v1/products/search/mercadolivre?q=a")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn search_rejects_unknown_platform(pool: sqlx::PgPool) {
        let (status, _) = send(app(pool), get("/api/v1/products/search/shopee?q=celular")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn search_platform_returns_rewritten_links_and_caches(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/MLB/search"))
            .and(query_param("q", "celular"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "id": "MLB123",
                    "title": "Celular",
                    "price": 999.0,
                    "available_quantity": 3,
                    "permalink": "https://produto.mercadolivre.com.br/MLB-123-celular-_JM"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let app = app_with(pool, &server.uri());
        let uri = "/api/v1/products/search/mercadolivre?q=celular&limit=5";

        let (status, json) = send(app.clone(), get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        let affiliate = json["data"][0]["affiliate_url"].as_str().expect("affiliate url");
        assert!(affiliate.contains("id=MLB123"));
        assert!(affiliate.contains("referer=casadigital"));

        let (status, again) = send(app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["data"], json["data"]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn search_all_platforms_maps_platform_to_products(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/MLB/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (status, json) = send(
            app_with(pool, &server.uri()),
            get("/api/v1/products/search?q=geladeira"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["mercadolivre"], json!([]));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn external_product_404_is_forwarded(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/MLB404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (status, _) = send(
            app_with(pool, &server.uri()),
            get("/api/v1/products/external/mercadolivre/MLB404"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn categories_are_listed(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites/MLB/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "MLB1051", "name": "Celulares e Telefones"}
            ])))
            .mount(&server)
            .await;

        let (status, json) = send(
            app_with(pool, &server.uri()),
            get("/api/v1/products/categories/mercadolivre"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["id"], "MLB1051");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn category_detail_is_forwarded(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/categories/MLB1051"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "MLB1051",
                "name": "Celulares e Telefones",
                "total_items_in_this_category": 1200,
                "children_categories": [{"id": "MLB1055", "name": "Celulares"}]
            })))
            .mount(&server)
            .await;

        let (status, json) = send(
            app_with(pool, &server.uri()),
            get("/api/v1/products/categories/mercadolivre/MLB1051"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["children_categories"][0]["id"], "MLB1055");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn trending_keywords_are_truncated_to_limit(pool: sqlx::PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/MLB"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"keyword": "iphone", "url": "https://lista.mercadolivre.com.br/iphone"},
                {"keyword": "air fryer"},
                {"keyword": "smart tv"}
            ])))
            .mount(&server)
            .await;

        let (status, json) = send(
            app_with(pool, &server.uri()),
            get("/api/v1/products/trending/mercadolivre?limit=2"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["data"][0]["keyword"], "iphone");
    }
}
