mod admin;
mod affiliate_links;
mod affiliate_stores;
mod products;
mod sync;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use casadigital_marketplace::MarketplaceError;
use casadigital_sync::SyncSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::cache::ResponseCache;
use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub sync: Arc<SyncSettings>,
    pub cache: ResponseCache,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

#[derive(Debug, Serialize)]
struct WelcomeData {
    message: &'static str,
    status: &'static str,
    version: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

/// Wraps `data` in the standard response envelope.
pub(super) fn respond<T: Serialize>(data: T, request_id: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(request_id),
    })
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Clamps a page size to `1..=500`, defaulting to 100.
pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 500)
}

pub(super) fn map_db_error(request_id: String, error: &casadigital_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

/// Like [`map_db_error`] but reports a missing row as `not_found`.
pub(super) fn map_lookup_error(
    request_id: String,
    error: &casadigital_db::DbError,
    what: &str,
) -> ApiError {
    if matches!(error, casadigital_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", format!("{what} not found"));
    }
    map_db_error(request_id, error)
}

pub(super) fn map_marketplace_error(request_id: String, error: &MarketplaceError) -> ApiError {
    match error {
        MarketplaceError::NotFound { .. } => {
            ApiError::new(request_id, "not_found", "marketplace resource not found")
        }
        MarketplaceError::RateLimited { .. } => ApiError::new(
            request_id,
            "rate_limited",
            "marketplace rate limit reached; retry later",
        ),
        MarketplaceError::UnsupportedPlatform(platform) => ApiError::new(
            request_id,
            "validation_error",
            format!("unsupported platform: {platform}"),
        ),
        other => {
            tracing::error!(error = %other, "marketplace request failed");
            ApiError::new(request_id, "upstream_error", "marketplace request failed")
        }
    }
}

pub(super) fn parse_platform(
    request_id: &str,
    raw: &str,
) -> Result<casadigital_core::Platform, ApiError> {
    raw.parse()
        .map_err(|e: casadigital_core::ConfigError| {
            ApiError::new(request_id, "validation_error", e.to_string())
        })
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(products::list_products))
        .route("/api/v1/products/{product_id}", get(products::get_product))
        .route(
            "/api/v1/products/search",
            get(products::search_all_platforms),
        )
        .route(
            "/api/v1/products/search/{platform}",
            get(products::search_platform),
        )
        .route(
            "/api/v1/products/external/{platform}/{product_id}",
            get(products::get_external_product),
        )
        .route(
            "/api/v1/products/categories/{platform}",
            get(products::list_categories),
        )
        .route(
            "/api/v1/products/categories/{platform}/{category_id}",
            get(products::get_category),
        )
        .route(
            "/api/v1/products/trending/{platform}",
            get(products::list_trending),
        )
        .route(
            "/api/v1/sync/stores/{store_id}/products",
            post(sync::sync_store_products),
        )
        .route("/api/v1/sync/runs", get(sync::list_sync_runs))
        .route("/api/v1/sync/runs/{run_id}", get(sync::get_sync_run))
        .route(
            "/api/v1/affiliate-links/pending",
            get(affiliate_links::list_pending),
        )
        .route(
            "/api/v1/affiliate-links/export",
            get(affiliate_links::export_pending),
        )
        .route(
            "/api/v1/affiliate-links/import",
            post(affiliate_links::import_links),
        )
        .route(
            "/api/v1/affiliate-links/stats",
            get(affiliate_links::get_stats),
        )
        .route(
            "/api/v1/affiliate-links/validate",
            post(affiliate_links::validate_links),
        )
        .route(
            "/api/v1/affiliate-links/convert",
            post(affiliate_links::convert_link),
        )
        .route(
            "/api/v1/affiliate-stores",
            get(affiliate_stores::list_stores).post(affiliate_stores::create_store),
        )
        .route(
            "/api/v1/affiliate-stores/{store_id}",
            get(affiliate_stores::get_store)
                .put(affiliate_stores::update_store)
                .delete(affiliate_stores::delete_store),
        )
        .route(
            "/api/v1/admin/affiliate-dashboard",
            get(admin::affiliate_dashboard),
        )
        .route("/api/v1/admin/cache", delete(admin::clear_cache))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(
    state: AppState,
    auth: AuthState,
    rate_limit: RateLimitState,
    cors_origins: &[String],
) -> Router {
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors(cors_origins))
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn root(Extension(req_id): Extension<RequestId>) -> Json<ApiResponse<WelcomeData>> {
    respond(
        WelcomeData {
            message: "Casa Digital affiliate catalog API",
            status: "online",
            version: env!("CARGO_PKG_VERSION"),
        },
        req_id.0,
    )
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match casadigital_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            respond(
                HealthData {
                    status: "ok",
                    database: "ok",
                },
                req_id.0,
            ),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                respond(
                    HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    req_id.0,
                ),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use casadigital_core::{AffiliateConfig, AffiliateRegistry, Platform};
    use casadigital_marketplace::ClientSettings;
    use casadigital_sync::SyncSettings;
    use tower::ServiceExt;

    use std::time::Duration;

    use super::{build_app, AppState};
    use crate::cache::ResponseCache;
    use crate::middleware::{AuthState, RateLimitState};

    pub(crate) fn settings(base_url: &str) -> SyncSettings {
        SyncSettings {
            client: ClientSettings {
                base_url: base_url.to_string(),
                timeout_secs: 5,
                user_agent: "casadigital-test/0.1".to_string(),
                max_retries: 0,
                backoff_base_secs: 0,
            },
            affiliates: AffiliateRegistry::new().with(
                Platform::MercadoLivre,
                AffiliateConfig::new("casadigital", Some("ofertas"), None)
                    .expect("valid config"),
            ),
            inter_request_delay_ms: 0,
        }
    }

    pub(crate) fn app_guarded(
        pool: sqlx::PgPool,
        auth: AuthState,
        rate_limit: RateLimitState,
    ) -> Router {
        let state = AppState {
            pool,
            sync: Arc::new(settings("http://127.0.0.1:9")),
            cache: ResponseCache::new(60, 100),
        };
        build_app(state, auth, rate_limit, &[])
    }

    pub(crate) fn app_with(pool: sqlx::PgPool, base_url: &str) -> Router {
        let state = AppState {
            pool,
            sync: Arc::new(settings(base_url)),
            cache: ResponseCache::new(60, 100),
        };
        build_app(
            state,
            AuthState::disabled(),
            RateLimitState::new(1_000, Duration::from_secs(60)),
            &[],
        )
    }

    pub(crate) fn app(pool: sqlx::PgPool) -> Router {
        app_with(pool, "http://127.0.0.1:9")
    }

    pub(crate) async fn send(
        app: Router,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).expect("json parse")
        };
        (status, json)
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    pub(crate) fn empty_post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }
}
