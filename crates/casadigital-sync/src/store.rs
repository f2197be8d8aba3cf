//! Pulling marketplace listings for an affiliate store into `products`.

use std::time::Duration;

use casadigital_core::{NormalizedProduct, SyncCatalog};
use casadigital_db::{AffiliateStoreRow, DbError, SyncRunRow};
use casadigital_marketplace::{client_for_store, MercadoLivreClient};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::run::{fail_run_best_effort, queue_run, to_i32, RunType, Trigger};
use crate::{SyncError, SyncSettings};

/// One search to run against a store.
#[derive(Debug, Clone)]
pub struct StoreSyncRequest {
    pub query: String,
    pub category: Option<String>,
    pub limit: u32,
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub store_id: i64,
    /// Listings returned by the marketplace.
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Listings that could not be written.
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    fetched: usize,
    inserted: usize,
    updated: usize,
    failed: usize,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.failed += other.failed;
    }
}

/// Loads a store that can be synced.
///
/// # Errors
///
/// Returns [`SyncError::StoreUnavailable`] if the store does not exist or is
/// inactive, or [`SyncError::Db`] on query failure.
pub async fn load_active_store(
    pool: &PgPool,
    store_id: i64,
) -> Result<AffiliateStoreRow, SyncError> {
    match casadigital_db::get_affiliate_store(pool, store_id).await {
        Ok(store) if store.active => Ok(store),
        Ok(_) | Err(DbError::NotFound) => Err(SyncError::StoreUnavailable { store_id }),
        Err(e) => Err(e.into()),
    }
}

/// Validates the store and records a queued `store_search` run.
///
/// # Errors
///
/// Returns [`SyncError::StoreUnavailable`] for missing or inactive stores,
/// or [`SyncError::Db`] if the run cannot be recorded.
pub async fn queue_store_sync(
    pool: &PgPool,
    store_id: i64,
    request: &StoreSyncRequest,
    trigger: Trigger,
) -> Result<(AffiliateStoreRow, SyncRunRow), SyncError> {
    let store = load_active_store(pool, store_id).await?;
    let run = queue_run(
        pool,
        RunType::StoreSearch,
        trigger,
        Some(store.id),
        Some(&request.query),
    )
    .await?;
    Ok((store, run))
}

/// Runs a queued `store_search` run: searches the store's marketplace and
/// upserts every listing. Per-listing write failures are counted, not fatal.
///
/// # Errors
///
/// Returns [`SyncError`] if the run cannot be started, the client cannot be
/// built, or the search fails. The run is marked failed in the latter cases.
pub async fn execute_store_sync(
    pool: &PgPool,
    settings: &SyncSettings,
    store: &AffiliateStoreRow,
    run: &SyncRunRow,
    request: &StoreSyncRequest,
) -> Result<SyncSummary, SyncError> {
    casadigital_db::start_sync_run(pool, run.id).await?;

    let result = async {
        let client = build_client(store, settings)?;
        let products = client
            .search_products(&request.query, request.category.as_deref(), request.limit)
            .await?;
        Ok::<_, SyncError>(persist_products(pool, &products).await)
    }
    .await;

    finish_run(pool, store, run, result).await
}

/// Queues and executes a store search in one call.
///
/// # Errors
///
/// See [`queue_store_sync`] and [`execute_store_sync`].
pub async fn run_store_sync(
    pool: &PgPool,
    settings: &SyncSettings,
    store_id: i64,
    request: &StoreSyncRequest,
    trigger: Trigger,
) -> Result<SyncSummary, SyncError> {
    let (store, run) = queue_store_sync(pool, store_id, request, trigger).await?;
    execute_store_sync(pool, settings, &store, &run, request).await
}

/// Runs every catalog search term against one store as a single `catalog`
/// run.
///
/// # Errors
///
/// Returns [`SyncError::StoreUnavailable`] for missing or inactive stores,
/// [`SyncError::AllTermsFailed`] when no term could be searched, or another
/// [`SyncError`] if bookkeeping fails.
pub async fn run_catalog_sync(
    pool: &PgPool,
    settings: &SyncSettings,
    store_id: i64,
    catalog: &SyncCatalog,
    trigger: Trigger,
) -> Result<SyncSummary, SyncError> {
    let store = load_active_store(pool, store_id).await?;
    let run = queue_run(pool, RunType::Catalog, trigger, Some(store.id), None).await?;
    execute_catalog_sync(pool, settings, &store, &run, catalog).await
}

/// Executes a queued `catalog` run.
///
/// Terms are searched one after another with `inter_request_delay_ms`
/// between them. A failing term is logged and skipped.
///
/// # Errors
///
/// See [`run_catalog_sync`].
pub async fn execute_catalog_sync(
    pool: &PgPool,
    settings: &SyncSettings,
    store: &AffiliateStoreRow,
    run: &SyncRunRow,
    catalog: &SyncCatalog,
) -> Result<SyncSummary, SyncError> {
    casadigital_db::start_sync_run(pool, run.id).await?;

    let result = async {
        let client = build_client(store, settings)?;
        collect_catalog(pool, &client, catalog, settings.inter_request_delay_ms).await
    }
    .await;

    finish_run(pool, store, run, result).await
}

/// Runs the catalog against every active store. Stores that fail are logged
/// and skipped; the summaries of the successful ones are returned.
///
/// # Errors
///
/// Returns [`SyncError::Db`] only if the active stores cannot be listed.
pub async fn run_catalog_sync_for_active_stores(
    pool: &PgPool,
    settings: &SyncSettings,
    catalog: &SyncCatalog,
    trigger: Trigger,
) -> Result<Vec<SyncSummary>, SyncError> {
    let stores = casadigital_db::list_active_affiliate_stores(pool).await?;
    let mut summaries = Vec::with_capacity(stores.len());

    for store in &stores {
        match run_catalog_sync(pool, settings, store.id, catalog, trigger).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                tracing::error!(store_id = store.id, store = %store.name, error = %e, "catalog sync failed");
            }
        }
    }

    Ok(summaries)
}

fn build_client(
    store: &AffiliateStoreRow,
    settings: &SyncSettings,
) -> Result<MercadoLivreClient, SyncError> {
    Ok(client_for_store(
        &store.platform,
        &store.api_credentials,
        &settings.client,
        &settings.affiliates,
    )?)
}

async fn collect_catalog(
    pool: &PgPool,
    client: &MercadoLivreClient,
    catalog: &SyncCatalog,
    delay_ms: u64,
) -> Result<Tally, SyncError> {
    let term_count = catalog.term_count();
    let mut tally = Tally::default();
    let mut failed_terms = 0usize;

    for (index, term) in catalog.terms().enumerate() {
        if index > 0 && delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match client
            .search_products(&term.query, term.category.as_deref(), catalog.limit)
            .await
        {
            Ok(products) => {
                let term_tally = persist_products(pool, &products).await;
                tracing::info!(
                    query = %term.query,
                    fetched = term_tally.fetched,
                    inserted = term_tally.inserted,
                    updated = term_tally.updated,
                    "catalog term synced"
                );
                tally.add(term_tally);
            }
            Err(e) => {
                failed_terms += 1;
                tracing::warn!(query = %term.query, error = %e, "catalog term failed");
            }
        }
    }

    if term_count > 0 && failed_terms == term_count {
        return Err(SyncError::AllTermsFailed {
            failed: failed_terms,
        });
    }

    Ok(tally)
}

async fn persist_products(pool: &PgPool, products: &[NormalizedProduct]) -> Tally {
    let mut tally = Tally {
        fetched: products.len(),
        ..Tally::default()
    };

    for product in products {
        match casadigital_db::upsert_product(pool, product).await {
            Ok(outcome) if outcome.inserted => tally.inserted += 1,
            Ok(_) => tally.updated += 1,
            Err(e) => {
                tally.failed += 1;
                tracing::warn!(
                    external_id = %product.external_id,
                    error = %e,
                    "failed to persist product"
                );
            }
        }
    }

    tally
}

async fn finish_run(
    pool: &PgPool,
    store: &AffiliateStoreRow,
    run: &SyncRunRow,
    result: Result<Tally, SyncError>,
) -> Result<SyncSummary, SyncError> {
    let tally = match result {
        Ok(tally) => tally,
        Err(e) => {
            tracing::error!(run_id = %run.public_id, store_id = store.id, error = %e, "sync run failed");
            fail_run_best_effort(pool, run, &e.to_string()).await;
            return Err(e);
        }
    };

    if let Err(e) = casadigital_db::complete_sync_run(
        pool,
        run.id,
        to_i32(tally.inserted + tally.updated),
        to_i32(tally.failed),
    )
    .await
    {
        fail_run_best_effort(pool, run, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        run_id = %run.public_id,
        store_id = store.id,
        fetched = tally.fetched,
        inserted = tally.inserted,
        updated = tally.updated,
        failed = tally.failed,
        "sync run completed"
    );

    Ok(SyncSummary {
        run_id: run.public_id,
        store_id: store.id,
        fetched: tally.fetched,
        inserted: tally.inserted,
        updated: tally.updated,
        failed: tally.failed,
    })
}
