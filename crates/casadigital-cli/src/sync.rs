//! Sync command handlers. Runs are recorded with the `cli` trigger and
//! executed inline, so the command returns once the marketplace work is done.

use casadigital_core::AppConfig;
use casadigital_sync::{StoreSyncRequest, SyncSettings, SyncSummary, Trigger};

/// Search one store and upsert the results.
///
/// `limit` is clamped to the marketplace page size.
///
/// # Errors
///
/// Returns an error if the store is missing or inactive, or if the search
/// or run bookkeeping fails.
pub(crate) async fn run_store_sync(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    store_id: i64,
    query: String,
    category: Option<String>,
    limit: u32,
) -> anyhow::Result<()> {
    let query = query.trim().to_string();
    if query.is_empty() {
        anyhow::bail!("--query must not be blank");
    }

    let request = StoreSyncRequest {
        query,
        category: category.filter(|c| !c.trim().is_empty()),
        limit: limit.clamp(1, casadigital_marketplace::MAX_SEARCH_LIMIT),
    };
    let settings = SyncSettings::from_app_config(config);

    let summary =
        casadigital_sync::run_store_sync(pool, &settings, store_id, &request, Trigger::Cli).await?;
    println!("{}", format_summary(&summary));
    Ok(())
}

/// Run the search catalog at `config.catalog_path` against one store, or
/// against every active store when `store_id` is `None`.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded, or if a single-store
/// sync fails. Per-store failures in the all-stores path are logged and
/// skipped.
pub(crate) async fn run_catalog_sync(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    store_id: Option<i64>,
) -> anyhow::Result<()> {
    let catalog = casadigital_core::load_catalog(&config.catalog_path)?;
    let settings = SyncSettings::from_app_config(config);
    tracing::info!(
        path = %config.catalog_path.display(),
        terms = catalog.term_count(),
        "catalog loaded"
    );

    let summaries = match store_id {
        Some(id) => vec![
            casadigital_sync::run_catalog_sync(pool, &settings, id, &catalog, Trigger::Cli)
                .await?,
        ],
        None => {
            casadigital_sync::run_catalog_sync_for_active_stores(
                pool,
                &settings,
                &catalog,
                Trigger::Cli,
            )
            .await?
        }
    };

    if summaries.is_empty() {
        println!("no active stores synced");
    }
    for summary in &summaries {
        println!("{}", format_summary(summary));
    }
    Ok(())
}

pub(crate) fn format_summary(summary: &SyncSummary) -> String {
    format!(
        "store {}: run {} fetched={} inserted={} updated={} failed={}",
        summary.store_id,
        summary.run_id,
        summary.fetched,
        summary.inserted,
        summary.updated,
        summary.failed
    )
}
