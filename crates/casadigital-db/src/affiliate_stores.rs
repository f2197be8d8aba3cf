//! Database operations for `affiliate_stores`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

const STORE_COLUMNS: &str = "id, name, platform, api_credentials, active, created_at, updated_at";

/// A row from the `affiliate_stores` table.
///
/// `api_credentials` holds marketplace secrets (e.g. `access_token`) and must
/// never be serialized back to API clients.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AffiliateStoreRow {
    pub id: i64,
    pub name: String,
    pub platform: String,
    pub api_credentials: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AffiliateStoreRow {
    /// Names of the credential keys present, sorted, without their values.
    #[must_use]
    pub fn credential_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .api_credentials
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// A string-valued credential, e.g. `access_token`.
    #[must_use]
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.api_credentials
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewAffiliateStore {
    pub name: String,
    pub platform: String,
    pub api_credentials: Value,
    pub active: bool,
}

/// Sparse update: `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct AffiliateStoreUpdate {
    pub name: Option<String>,
    pub platform: Option<String>,
    pub api_credentials: Option<Value>,
    pub active: Option<bool>,
}

/// Inserts a new store and returns the created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_affiliate_store(
    pool: &PgPool,
    store: &NewAffiliateStore,
) -> Result<AffiliateStoreRow, DbError> {
    let row = sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "INSERT INTO affiliate_stores (name, platform, api_credentials, active) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(&store.name)
    .bind(&store.platform)
    .bind(&store.api_credentials)
    .bind(store.active)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Lists stores ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_affiliate_stores(
    pool: &PgPool,
    skip: i64,
    limit: i64,
) -> Result<Vec<AffiliateStoreRow>, DbError> {
    let rows = sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM affiliate_stores ORDER BY id OFFSET $1 LIMIT $2"
    ))
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists every active store ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_affiliate_stores(
    pool: &PgPool,
) -> Result<Vec<AffiliateStoreRow>, DbError> {
    let rows = sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM affiliate_stores WHERE active = true ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches a store by id, active or not.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_affiliate_store(pool: &PgPool, id: i64) -> Result<AffiliateStoreRow, DbError> {
    sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM affiliate_stores WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the lowest-id active store for `platform`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_active_store_for_platform(
    pool: &PgPool,
    platform: &str,
) -> Result<Option<AffiliateStoreRow>, DbError> {
    let row = sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM affiliate_stores \
         WHERE platform = $1 AND active = true \
         ORDER BY id \
         LIMIT 1"
    ))
    .bind(platform)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Applies a sparse update and returns the updated row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the store does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_affiliate_store(
    pool: &PgPool,
    id: i64,
    update: &AffiliateStoreUpdate,
) -> Result<AffiliateStoreRow, DbError> {
    sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "UPDATE affiliate_stores SET \
             name            = COALESCE($2, name), \
             platform        = COALESCE($3, platform), \
             api_credentials = COALESCE($4, api_credentials), \
             active          = COALESCE($5, active), \
             updated_at      = NOW() \
         WHERE id = $1 \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(id)
    .bind(&update.name)
    .bind(&update.platform)
    .bind(&update.api_credentials)
    .bind(update.active)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Deletes a store and returns the row as it was before deletion.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the store does not exist, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_affiliate_store(pool: &PgPool, id: i64) -> Result<AffiliateStoreRow, DbError> {
    sqlx::query_as::<_, AffiliateStoreRow>(&format!(
        "DELETE FROM affiliate_stores WHERE id = $1 RETURNING {STORE_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
