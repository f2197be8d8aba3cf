use casadigital_db::DbError;
use casadigital_marketplace::MarketplaceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store with ID {store_id} not found or not active")]
    StoreUnavailable { store_id: i64 },

    #[error("all {failed} catalog search terms failed")]
    AllTermsFailed { failed: usize },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
}
