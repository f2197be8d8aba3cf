//! Bulk maintenance of product affiliate links.

use casadigital_core::is_valid_affiliate_url;
use casadigital_db::{DbError, SyncRunRow};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::run::{fail_run_best_effort, to_i32};
use crate::SyncError;

/// One manually generated affiliate link to attach to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateLinkImport {
    pub product_id: i64,
    pub affiliate_url: String,
}

/// Result of [`import_affiliate_links`]: rows applied, and one message per
/// rejected row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Attaches each imported link to its product.
///
/// Rows whose URL is not a recognized affiliate link, or whose product does
/// not exist, are reported in [`ImportReport::errors`] and skipped. A database
/// error on one row does not stop the others.
pub async fn import_affiliate_links(pool: &PgPool, rows: &[AffiliateLinkImport]) -> ImportReport {
    let mut report = ImportReport::default();

    for row in rows {
        if !is_valid_affiliate_url(&row.affiliate_url) {
            report.errors.push(format!(
                "invalid affiliate URL for product {}: {}",
                row.product_id, row.affiliate_url
            ));
            continue;
        }

        match casadigital_db::set_product_affiliate_url(pool, row.product_id, &row.affiliate_url)
            .await
        {
            Ok(()) => report.updated += 1,
            Err(DbError::NotFound) => {
                report
                    .errors
                    .push(format!("product not found: {}", row.product_id));
            }
            Err(e) => {
                report
                    .errors
                    .push(format!("failed to update product {}: {e}", row.product_id));
            }
        }
    }

    tracing::info!(
        updated = report.updated,
        errors = report.errors.len(),
        "affiliate link import finished"
    );
    report
}

/// Clears affiliate links on `platform` that no longer point at a known
/// affiliate endpoint, so they show up as pending again. Returns the number
/// of links cleared.
///
/// # Errors
///
/// Returns [`SyncError::Db`] if the sweep fails.
pub async fn validate_affiliate_links(pool: &PgPool, platform: &str) -> Result<u64, SyncError> {
    let cleared = casadigital_db::clear_invalid_affiliate_urls(pool, platform).await?;
    tracing::info!(platform, cleared, "affiliate link validation finished");
    Ok(cleared)
}

/// Executes a queued `affiliate_import` run.
///
/// # Errors
///
/// Returns [`SyncError::Db`] if the run cannot be started or completed.
pub async fn execute_affiliate_import(
    pool: &PgPool,
    run: &SyncRunRow,
    rows: &[AffiliateLinkImport],
) -> Result<ImportReport, SyncError> {
    casadigital_db::start_sync_run(pool, run.id).await?;
    let report = import_affiliate_links(pool, rows).await;

    if let Err(e) = casadigital_db::complete_sync_run(
        pool,
        run.id,
        to_i32(report.updated),
        to_i32(report.errors.len()),
    )
    .await
    {
        fail_run_best_effort(pool, run, &e.to_string()).await;
        return Err(e.into());
    }

    Ok(report)
}

/// Executes a queued `affiliate_validation` run.
///
/// # Errors
///
/// Returns [`SyncError::Db`] if the sweep or the run bookkeeping fails.
pub async fn execute_affiliate_validation(
    pool: &PgPool,
    run: &SyncRunRow,
    platform: &str,
) -> Result<u64, SyncError> {
    casadigital_db::start_sync_run(pool, run.id).await?;

    let cleared = match validate_affiliate_links(pool, platform).await {
        Ok(cleared) => cleared,
        Err(e) => {
            fail_run_best_effort(pool, run, &e.to_string()).await;
            return Err(e);
        }
    };

    let processed = i32::try_from(cleared).unwrap_or(i32::MAX);
    if let Err(e) = casadigital_db::complete_sync_run(pool, run.id, processed, 0).await {
        fail_run_best_effort(pool, run, &e.to_string()).await;
        return Err(e.into());
    }

    Ok(cleared)
}
