use axum::{extract::State, Extension, Json};
use casadigital_core::Platform;
use casadigital_db::AffiliateStats;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, respond, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct CoverageItem {
    total_products: i64,
    with_affiliate_url: i64,
    without_affiliate_url: i64,
    coverage_percentage: f64,
}

impl From<AffiliateStats> for CoverageItem {
    fn from(stats: AffiliateStats) -> Self {
        Self {
            total_products: stats.total_products,
            with_affiliate_url: stats.with_affiliate_url,
            without_affiliate_url: stats.without_affiliate_url,
            coverage_percentage: stats.coverage_percentage(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PlatformCoverage {
    platform: &'static str,
    affiliate_configured: bool,
    #[serde(flatten)]
    coverage: CoverageItem,
}

#[derive(Debug, Serialize)]
pub(super) struct AffiliateDashboard {
    #[serde(flatten)]
    overall: CoverageItem,
    platforms: Vec<PlatformCoverage>,
}

/// GET /api/v1/admin/affiliate-dashboard
pub(super) async fn affiliate_dashboard(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<AffiliateDashboard>>, ApiError> {
    let overall = casadigital_db::get_affiliate_stats(&state.pool, None)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let mut platforms = Vec::with_capacity(Platform::ALL.len());
    for platform in Platform::ALL {
        let stats = casadigital_db::get_affiliate_stats(&state.pool, Some(platform.as_str()))
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
        platforms.push(PlatformCoverage {
            platform: platform.as_str(),
            affiliate_configured: state.sync.affiliates.get_platform(platform).is_some(),
            coverage: stats.into(),
        });
    }

    Ok(respond(
        AffiliateDashboard {
            overall: overall.into(),
            platforms,
        },
        req_id.0,
    ))
}

#[derive(Debug, Serialize)]
pub(super) struct CacheCleared {
    cleared_entries: u64,
}

/// DELETE /api/v1/admin/cache
///
/// Drops cached marketplace lookups so the next request goes upstream.
pub(super) async fn clear_cache(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<CacheCleared>> {
    let cleared_entries = state.cache.clear();
    tracing::info!(cleared_entries, "response cache cleared");
    respond(CacheCleared { cleared_entries }, req_id.0)
}
