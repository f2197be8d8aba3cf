//! Background job scheduler.
//!
//! Registers the recurring catalog sync and affiliate link validation jobs.
//! Job failures are logged; they never stop the scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use casadigital_core::Platform;
use casadigital_sync::{RunType, SyncSettings, Trigger};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

const DEFAULT_CATALOG_SYNC_CRON: &str = "0 0 3 * * *";
const DEFAULT_AFFILIATE_VALIDATION_CRON: &str = "0 30 4 * * *";

/// Builds and starts the scheduler. The returned handle must be kept alive
/// for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    settings: Arc<SyncSettings>,
    catalog_path: PathBuf,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_catalog_sync_job(&scheduler, pool.clone(), settings, catalog_path).await?;
    register_affiliate_validation_job(&scheduler, pool).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Daily catalog sync across every active store. Overridable with
/// `CATALOG_SYNC_CRON`.
async fn register_catalog_sync_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    settings: Arc<SyncSettings>,
    catalog_path: PathBuf,
) -> Result<(), JobSchedulerError> {
    let cron = std::env::var("CATALOG_SYNC_CRON")
        .unwrap_or_else(|_| DEFAULT_CATALOG_SYNC_CRON.to_string());
    let catalog_path = Arc::new(catalog_path);

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = pool.clone();
        let settings = Arc::clone(&settings);
        let catalog_path = Arc::clone(&catalog_path);

        Box::pin(async move {
            tracing::info!("scheduler: starting catalog sync");
            run_catalog_sync_job(&pool, &settings, &catalog_path).await;
            tracing::info!("scheduler: catalog sync complete");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered catalog sync job");
    Ok(())
}

async fn run_catalog_sync_job(pool: &PgPool, settings: &SyncSettings, catalog_path: &Path) {
    // Re-read each run so catalog edits apply without a restart.
    let catalog = match casadigital_core::load_catalog(catalog_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %catalog_path.display(), error = %e, "scheduler: failed to load catalog");
            return;
        }
    };

    match casadigital_sync::run_catalog_sync_for_active_stores(
        pool,
        settings,
        &catalog,
        Trigger::Scheduler,
    )
    .await
    {
        Ok(summaries) if summaries.is_empty() => {
            tracing::info!("scheduler: no active stores synced");
        }
        Ok(summaries) => {
            let upserted: usize = summaries.iter().map(|s| s.inserted + s.updated).sum();
            tracing::info!(stores = summaries.len(), upserted, "scheduler: catalog synced");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to list active stores");
        }
    }
}

/// Daily sweep clearing affiliate links that no longer point at a known
/// affiliate endpoint. Overridable with `AFFILIATE_VALIDATION_CRON`.
async fn register_affiliate_validation_job(
    scheduler: &JobScheduler,
    pool: PgPool,
) -> Result<(), JobSchedulerError> {
    let cron = std::env::var("AFFILIATE_VALIDATION_CRON")
        .unwrap_or_else(|_| DEFAULT_AFFILIATE_VALIDATION_CRON.to_string());

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = pool.clone();
        Box::pin(async move {
            for platform in Platform::ALL {
                run_validation_for(&pool, platform).await;
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered affiliate validation job");
    Ok(())
}

async fn run_validation_for(pool: &PgPool, platform: Platform) {
    let run = match casadigital_sync::queue_run(
        pool,
        RunType::AffiliateValidation,
        Trigger::Scheduler,
        None,
        Some(platform.as_str()),
    )
    .await
    {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(platform = platform.as_str(), error = %e, "scheduler: failed to queue validation");
            return;
        }
    };

    match casadigital_sync::execute_affiliate_validation(pool, &run, platform.as_str()).await {
        Ok(cleared) => {
            tracing::info!(platform = platform.as_str(), cleared, "scheduler: affiliate links validated");
        }
        Err(e) => {
            tracing::error!(platform = platform.as_str(), error = %e, "scheduler: affiliate validation failed");
        }
    }
}
