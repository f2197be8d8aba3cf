//! Manual affiliate link workflow: export pending products, import the
//! generated links, validate what is stored, and convert one-off URLs.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use casadigital_marketplace::{build_affiliate_url, extract_product_id};
use casadigital_sync::{AffiliateLinkImport, RunType, SyncError, Trigger};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::products::ProductItem;
use super::{
    map_db_error, normalize_limit, parse_platform, respond, ApiError, ApiResponse, AppState,
};

const DEFAULT_PLATFORM: &str = "mercadolivre";

#[derive(Debug, Deserialize)]
pub(super) struct PendingQuery {
    pub platform: Option<String>,
    pub limit: Option<i64>,
    pub format: Option<String>,
}

impl PendingQuery {
    fn platform(&self) -> &str {
        self.platform.as_deref().unwrap_or(DEFAULT_PLATFORM)
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PendingProducts {
    total_pending: i64,
    returned_count: usize,
    products: Vec<ProductItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct ExportRow {
    product_id: i64,
    external_id: String,
    product_url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ExportData {
    filename: String,
    content_type: &'static str,
    content: Vec<ExportRow>,
    count: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct JobAccepted {
    run_id: Uuid,
    status: String,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlatformQuery {
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct StatsData {
    platform: String,
    total_products: i64,
    with_affiliate_url: i64,
    without_affiliate_url: i64,
    coverage_percentage: f64,
}

#[derive(Debug, Deserialize)]
pub(super) struct ConvertRequest {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ConvertData {
    platform: String,
    original_url: String,
    affiliate_url: String,
    product_id: Option<String>,
    converted: bool,
}

fn map_queue_error(request_id: &str, error: &SyncError) -> ApiError {
    tracing::error!(error = %error, "failed to queue affiliate job");
    ApiError::new(request_id, "internal_error", "failed to queue job")
}

/// GET /api/v1/affiliate-links/pending
pub(super) async fn list_pending(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<ApiResponse<PendingProducts>>, ApiError> {
    let platform = query.platform();
    let rows = casadigital_db::list_pending_affiliate_products(
        &state.pool,
        platform,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let total_pending = casadigital_db::count_pending_affiliate_products(&state.pool, platform)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let products: Vec<ProductItem> = rows.into_iter().map(ProductItem::from).collect();
    Ok(respond(
        PendingProducts {
            total_pending,
            returned_count: products.len(),
            products,
        },
        req_id.0,
    ))
}

/// GET /api/v1/affiliate-links/export
///
/// Only `format=json` is produced.
pub(super) async fn export_pending(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<ApiResponse<ExportData>>, ApiError> {
    let format = query.format.as_deref().unwrap_or("json").to_lowercase();
    if format != "json" {
        return Err(ApiError::new(
            &req_id.0,
            "validation_error",
            format!("unsupported export format: {format}"),
        ));
    }

    let platform = query.platform();
    let rows = casadigital_db::list_pending_affiliate_products(
        &state.pool,
        platform,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let content: Vec<ExportRow> = rows
        .into_iter()
        .map(|row| ExportRow {
            product_id: row.id,
            external_id: row.external_id,
            product_url: row.product_url,
        })
        .collect();
    let count = content.len();

    Ok(respond(
        ExportData {
            filename: format!("{platform}_products_for_affiliate_{count}.json"),
            content_type: "application/json",
            content,
            count,
        },
        req_id.0,
    ))
}

/// POST /api/v1/affiliate-links/import
///
/// Rows are applied by a background `affiliate_import` run; per-row
/// rejections are counted in the run's `records_failed`.
pub(super) async fn import_links(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(rows): Json<Vec<AffiliateLinkImport>>,
) -> Result<(StatusCode, Json<ApiResponse<JobAccepted>>), ApiError> {
    if rows.is_empty() {
        return Err(ApiError::new(
            &req_id.0,
            "validation_error",
            "at least one row is required",
        ));
    }

    let run = casadigital_sync::queue_run(
        &state.pool,
        RunType::AffiliateImport,
        Trigger::Api,
        None,
        None,
    )
    .await
    .map_err(|e| map_queue_error(&req_id.0, &e))?;

    let accepted = JobAccepted {
        run_id: run.public_id,
        status: run.status.clone(),
        message: "import started in background",
    };

    let pool = state.pool.clone();
    tokio::spawn(async move {
        match casadigital_sync::execute_affiliate_import(&pool, &run, &rows).await {
            Ok(report) => {
                for error in &report.errors {
                    tracing::warn!(run_id = %run.public_id, "import row rejected: {error}");
                }
            }
            Err(e) => {
                tracing::error!(run_id = %run.public_id, error = %e, "background import failed");
            }
        }
    });

    Ok((StatusCode::ACCEPTED, respond(accepted, req_id.0)))
}

/// GET /api/v1/affiliate-links/stats
pub(super) async fn get_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PlatformQuery>,
) -> Result<Json<ApiResponse<StatsData>>, ApiError> {
    let platform = query.platform.as_deref().unwrap_or(DEFAULT_PLATFORM);
    let stats = casadigital_db::get_affiliate_stats(&state.pool, Some(platform))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(respond(
        StatsData {
            platform: platform.to_string(),
            total_products: stats.total_products,
            with_affiliate_url: stats.with_affiliate_url,
            without_affiliate_url: stats.without_affiliate_url,
            coverage_percentage: stats.coverage_percentage(),
        },
        req_id.0,
    ))
}

/// POST /api/v1/affiliate-links/validate
///
/// Clears links that no longer match a known affiliate endpoint, in a
/// background `affiliate_validation` run.
pub(super) async fn validate_links(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PlatformQuery>,
) -> Result<(StatusCode, Json<ApiResponse<JobAccepted>>), ApiError> {
    let platform = query
        .platform
        .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

    let run = casadigital_sync::queue_run(
        &state.pool,
        RunType::AffiliateValidation,
        Trigger::Api,
        None,
        Some(&platform),
    )
    .await
    .map_err(|e| map_queue_error(&req_id.0, &e))?;

    let accepted = JobAccepted {
        run_id: run.public_id,
        status: run.status.clone(),
        message: "validation started in background",
    };

    let pool = state.pool.clone();
    tokio::spawn(async move {
        if let Err(e) = casadigital_sync::execute_affiliate_validation(&pool, &run, &platform).await
        {
            tracing::error!(run_id = %run.public_id, error = %e, "background validation failed");
        }
    });

    Ok((StatusCode::ACCEPTED, respond(accepted, req_id.0)))
}

/// POST /api/v1/affiliate-links/convert
///
/// Rewrites one product URL with the configured affiliate identity. URLs
/// that cannot be rewritten come back unchanged with `converted: false`.
pub(super) async fn convert_link(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ConvertRequest>,
) -> Result<Json<ApiResponse<ConvertData>>, ApiError> {
    let platform = parse_platform(&req_id.0, &body.platform)?;
    let url = body.url.trim();
    if url.is_empty() {
        return Err(ApiError::new(&req_id.0, "validation_error", "url is required"));
    }

    let affiliate_url = build_affiliate_url(&state.sync.affiliates, platform.as_str(), url);

    Ok(respond(
        ConvertData {
            platform: platform.as_str().to_string(),
            original_url: url.to_string(),
            converted: affiliate_url != url,
            product_id: extract_product_id(url),
            affiliate_url,
        },
        req_id.0,
    ))
}
