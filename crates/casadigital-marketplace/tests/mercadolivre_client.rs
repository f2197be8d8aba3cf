//! Integration tests for `MercadoLivreClient` against a `wiremock` server.

use casadigital_core::{AffiliateConfig, AffiliateRegistry, Platform};
use casadigital_marketplace::{ClientSettings, MarketplaceError, MercadoLivreClient};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(base_url: &str, max_retries: u32) -> ClientSettings {
    ClientSettings {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        user_agent: "casadigital-test/0.1".to_string(),
        max_retries,
        backoff_base_secs: 0,
    }
}

/// Client with no retries and no affiliate configuration.
fn test_client(server: &MockServer) -> MercadoLivreClient {
    MercadoLivreClient::new(&settings(&server.uri(), 0), None, AffiliateRegistry::new())
        .expect("failed to build test client")
}

fn affiliates() -> AffiliateRegistry {
    AffiliateRegistry::new().with(
        Platform::MercadoLivre,
        AffiliateConfig::new("casadigital", Some("vitrine"), None).expect("valid config"),
    )
}

fn item_json(id: &str) -> serde_json::Value {
    let digits = id.trim_start_matches("MLB");
    json!({
        "id": id,
        "title": "Smart TV 50\" 4K",
        "price": 2199.0,
        "original_price": null,
        "currency_id": "BRL",
        "available_quantity": 3,
        "thumbnail": "http://http2.mlstatic.com/D_thumb.jpg",
        "permalink": format!("https://produto.mercadolivre.com.br/MLB-{digits}-smart-tv-_JM"),
        "category_id": "MLB1002",
        "attributes": [{"id": "BRAND", "name": "Marca", "value_name": "LG"}]
    })
}

// ---------------------------------------------------------------------------
// search_products
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_products_normalizes_results_and_sends_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/search"))
        .and(query_param("q", "smart tv"))
        .and(query_param("limit", "2"))
        .and(query_param("category", "MLB1002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paging": {"total": 2, "offset": 0, "limit": 2},
            "results": [item_json("MLB111"), item_json("MLB222")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let products = client
        .search_products("smart tv", Some("MLB1002"), 2)
        .await
        .expect("search failed");

    assert_eq!(products.len(), 2);
    assert_eq!(products[0].external_id, "MLB111");
    assert_eq!(products[0].brand.as_deref(), Some("LG"));
    assert_eq!(products[0].affiliate_url, None);
}

#[tokio::test]
async fn search_products_attaches_affiliate_links_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/search"))
        .and(query_param_is_missing("category"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"results": [item_json("MLB333")]})),
        )
        .mount(&server)
        .await;

    let client = MercadoLivreClient::new(&settings(&server.uri(), 0), None, affiliates())
        .expect("client builds");
    let products = client
        .search_products("tv", None, 10)
        .await
        .expect("search failed");

    assert_eq!(
        products[0].affiliate_url.as_deref(),
        Some(
            "https://www.mercadolivre.com.br/link/redirect?id=MLB333&platform=ml\
             &referer=casadigital&utm_source=casadigital&utm_medium=affiliate\
             &utm_campaign=vitrine"
        )
    );
    assert_eq!(
        products[0].product_url,
        "https://produto.mercadolivre.com.br/MLB-333-smart-tv-_JM"
    );
}

#[tokio::test]
async fn search_products_skips_listings_that_fail_to_normalize() {
    let server = MockServer::start().await;

    let mut broken = item_json("MLB444");
    broken["permalink"] = serde_json::Value::Null;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [broken, item_json("MLB555")]})),
        )
        .mount(&server)
        .await;

    let products = test_client(&server)
        .search_products("tv", None, 10)
        .await
        .expect("search failed");

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].external_id, "MLB555");
}

#[tokio::test]
async fn search_products_skips_listings_that_fail_to_decode() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                item_json("MLB666"),
                {"id": "MLB777", "price": 10.0, "available_quantity": null}
            ]
        })))
        .mount(&server)
        .await;

    let products = test_client(&server)
        .search_products("tv", None, 10)
        .await
        .expect("one bad listing must not fail the search");

    assert_eq!(products.len(), 1);
    assert_eq!(products[0].external_id, "MLB666");
}

#[tokio::test]
async fn search_products_clamps_limit_to_fifty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/search"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let products = test_client(&server)
        .search_products("notebook", None, 500)
        .await
        .expect("search failed");
    assert!(products.is_empty());
}

#[tokio::test]
async fn requests_carry_bearer_token_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/search"))
        .and(header("authorization", "Bearer APP_USR-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = MercadoLivreClient::new(
        &settings(&server.uri(), 0),
        Some("APP_USR-token".to_string()),
        AffiliateRegistry::new(),
    )
    .expect("client builds");

    client
        .search_products("celular", None, 5)
        .await
        .expect("search failed");
}

// ---------------------------------------------------------------------------
// get_product_details
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_product_details_uses_description_and_first_picture() {
    let server = MockServer::start().await;

    let mut item = item_json("MLB666");
    item["pictures"] = json!([
        {"url": "http://http2.mlstatic.com/D_1.jpg", "secure_url": "https://http2.mlstatic.com/D_1.jpg"}
    ]);

    Mock::given(method("GET"))
        .and(path("/items/MLB666"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/MLB666/description"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"plain_text": "Painel LED 4K"})),
        )
        .mount(&server)
        .await;

    let product = test_client(&server)
        .get_product_details("MLB666")
        .await
        .expect("details failed");

    assert_eq!(product.description.as_deref(), Some("Painel LED 4K"));
    assert_eq!(
        product.image_url.as_deref(),
        Some("https://http2.mlstatic.com/D_1.jpg")
    );
}

#[tokio::test]
async fn get_product_details_survives_missing_description() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/MLB777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_json("MLB777")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/MLB777/description"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let product = test_client(&server)
        .get_product_details("MLB777")
        .await
        .expect("details should not fail on description error");

    assert_eq!(product.external_id, "MLB777");
    assert_eq!(product.description, None);
}

#[tokio::test]
async fn get_product_details_maps_404_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/MLB000"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = test_client(&server)
        .get_product_details("MLB000")
        .await
        .unwrap_err();
    assert!(
        matches!(err, MarketplaceError::NotFound { .. }),
        "got: {err:?}"
    );
}

// ---------------------------------------------------------------------------
// Categories and trends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_categories_and_category_detail() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "MLB1051", "name": "Celulares e Telefones"},
            {"id": "MLB1648", "name": "Informática"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/categories/MLB1051"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "MLB1051",
            "name": "Celulares e Telefones",
            "total_items_in_this_category": 120_000,
            "path_from_root": [{"id": "MLB1051", "name": "Celulares e Telefones"}],
            "children_categories": [
                {"id": "MLB1055", "name": "Celulares e Smartphones", "total_items_in_this_category": 90_000}
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let categories = client.get_categories().await.expect("categories failed");
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1].name, "Informática");

    let detail = client
        .get_category("MLB1051")
        .await
        .expect("category failed");
    assert_eq!(detail.children_categories[0].id, "MLB1055");
}

#[tokio::test]
async fn get_trending_truncates_to_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trends/MLB/MLB1648"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"keyword": "notebook gamer", "url": "https://lista.mercadolivre.com.br/notebook-gamer"},
            {"keyword": "macbook air"},
            {"keyword": "ssd 1tb"}
        ])))
        .mount(&server)
        .await;

    let trends = test_client(&server)
        .get_trending(Some("MLB1648"), 2)
        .await
        .expect("trends failed");
    assert_eq!(trends.len(), 2);
    assert_eq!(trends[0].keyword, "notebook gamer");
    assert_eq!(trends[1].url, None);
}

// ---------------------------------------------------------------------------
// Error handling and retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limit_is_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/categories"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites/MLB/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = MercadoLivreClient::new(&settings(&server.uri(), 2), None, AffiliateRegistry::new())
        .expect("client builds");
    let categories = client.get_categories().await.expect("should succeed after retry");
    assert!(categories.is_empty());
}

#[tokio::test]
async fn rate_limit_without_retries_is_returned() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/categories"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let err = test_client(&server).get_categories().await.unwrap_err();
    assert!(
        matches!(err, MarketplaceError::RateLimited { retry_after_secs: 30 }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn forbidden_is_unexpected_status_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/categories"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = MercadoLivreClient::new(&settings(&server.uri(), 3), None, AffiliateRegistry::new())
        .expect("client builds");
    let err = client.get_categories().await.unwrap_err();
    assert!(
        matches!(err, MarketplaceError::UnexpectedStatus { status: 403, .. }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn malformed_json_is_a_deserialize_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sites/MLB/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = test_client(&server).get_categories().await.unwrap_err();
    assert!(
        matches!(err, MarketplaceError::Deserialize { .. }),
        "got: {err:?}"
    );
}
