//! Sync run bookkeeping shared by every job.

use casadigital_db::{NewSyncRun, SyncRunRow};
use sqlx::PgPool;

use crate::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    StoreSearch,
    Catalog,
    AffiliateImport,
    AffiliateValidation,
}

impl RunType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::StoreSearch => "store_search",
            RunType::Catalog => "catalog",
            RunType::AffiliateImport => "affiliate_import",
            RunType::AffiliateValidation => "affiliate_validation",
        }
    }
}

/// Who started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Api,
    Cli,
    Scheduler,
}

impl Trigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Api => "api",
            Trigger::Cli => "cli",
            Trigger::Scheduler => "scheduler",
        }
    }
}

/// Records a new queued run.
///
/// # Errors
///
/// Returns [`SyncError::Db`] if the insert fails.
pub async fn queue_run(
    pool: &PgPool,
    run_type: RunType,
    trigger: Trigger,
    store_id: Option<i64>,
    query: Option<&str>,
) -> Result<SyncRunRow, SyncError> {
    let run = casadigital_db::create_sync_run(
        pool,
        NewSyncRun {
            store_id,
            run_type: run_type.as_str(),
            trigger_source: trigger.as_str(),
            query,
        },
    )
    .await?;
    tracing::info!(
        run_id = %run.public_id,
        run_type = run_type.as_str(),
        trigger = trigger.as_str(),
        "sync run queued"
    );
    Ok(run)
}

/// Marks a run as failed, logging instead of propagating any error.
pub(crate) async fn fail_run_best_effort(pool: &PgPool, run: &SyncRunRow, message: &str) {
    if let Err(mark_err) = casadigital_db::fail_sync_run(pool, run.id, message).await {
        tracing::error!(
            run_id = %run.public_id,
            error = %mark_err,
            "failed to mark {} run as failed",
            run.run_type
        );
    }
}

/// Converts a count to the `INTEGER` stored in `sync_runs`, saturating.
pub(crate) fn to_i32(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}
