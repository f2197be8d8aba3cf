//! Product synchronization and affiliate link maintenance.
//!
//! Every job is recorded as a `sync_runs` row. Callers that need to answer
//! before the work is done (the HTTP API) queue the run first and execute it
//! in the background; the CLI and the scheduler run both steps inline.

pub mod error;
pub mod links;
pub mod run;
pub mod store;

pub use error::SyncError;
pub use links::{
    execute_affiliate_import, execute_affiliate_validation, import_affiliate_links,
    validate_affiliate_links, AffiliateLinkImport, ImportReport,
};
pub use run::{queue_run, RunType, Trigger};
pub use store::{
    execute_catalog_sync, execute_store_sync, load_active_store, queue_store_sync,
    run_catalog_sync, run_catalog_sync_for_active_stores, run_store_sync, StoreSyncRequest,
    SyncSummary,
};

use casadigital_core::{AffiliateRegistry, AppConfig};
use casadigital_marketplace::ClientSettings;

/// Everything a sync job needs besides the database pool.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub client: ClientSettings,
    pub affiliates: AffiliateRegistry,
    /// Pause between catalog search terms.
    pub inter_request_delay_ms: u64,
}

impl SyncSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            client: ClientSettings::from_app_config(config),
            affiliates: config.affiliates.clone(),
            inter_request_delay_ms: config.sync_inter_request_delay_ms,
        }
    }
}
