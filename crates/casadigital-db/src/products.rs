//! Database operations for `products` and their affiliate links.

use casadigital_core::{is_valid_affiliate_url, NormalizedProduct};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, external_id, platform, title, description, price, sale_price, \
     image_url, product_url, affiliate_url, category, brand, available, created_at, updated_at";

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub external_id: String,
    pub platform: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub product_url: String,
    pub affiliate_url: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`upsert_product`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct UpsertOutcome {
    pub id: i64,
    /// `true` when a new row was inserted, `false` when an existing row was updated.
    pub inserted: bool,
}

/// Affiliate link coverage counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct AffiliateStats {
    pub total_products: i64,
    pub with_affiliate_url: i64,
    pub without_affiliate_url: i64,
}

impl AffiliateStats {
    /// Share of products with an affiliate link, as a percentage rounded to
    /// two decimal places. Zero when there are no products.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage_percentage(&self) -> f64 {
        if self.total_products == 0 {
            return 0.0;
        }
        let pct = self.with_affiliate_url as f64 / self.total_products as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    }
}

/// Upserts a product keyed by `(platform, external_id)`.
///
/// Existing rows get every listing field refreshed. `affiliate_url` is only
/// overwritten when the incoming product carries one, so links imported by
/// hand survive a re-sync of an unconfigured platform.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(
    pool: &PgPool,
    product: &NormalizedProduct,
) -> Result<UpsertOutcome, DbError> {
    let outcome = sqlx::query_as::<_, UpsertOutcome>(
        "INSERT INTO products \
             (external_id, platform, title, description, price, sale_price, image_url, \
              product_url, affiliate_url, category, brand, available) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (platform, external_id) DO UPDATE SET \
             title         = EXCLUDED.title, \
             description   = EXCLUDED.description, \
             price         = EXCLUDED.price, \
             sale_price    = EXCLUDED.sale_price, \
             image_url     = EXCLUDED.image_url, \
             product_url   = EXCLUDED.product_url, \
             affiliate_url = COALESCE(EXCLUDED.affiliate_url, products.affiliate_url), \
             category      = EXCLUDED.category, \
             brand         = EXCLUDED.brand, \
             available     = EXCLUDED.available, \
             updated_at    = NOW() \
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(&product.external_id)
    .bind(&product.platform)
    .bind(&product.title)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.sale_price)
    .bind(&product.image_url)
    .bind(&product.product_url)
    .bind(&product.affiliate_url)
    .bind(&product.category)
    .bind(&product.brand)
    .bind(product.available)
    .fetch_one(pool)
    .await?;

    Ok(outcome)
}

/// Fetches a product by its internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists products ordered by id, optionally filtered by platform.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    platform: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE ($1::text IS NULL OR platform = $1) \
         ORDER BY id \
         OFFSET $2 LIMIT $3"
    ))
    .bind(platform)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists products on `platform` that have no affiliate link yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_affiliate_products(
    pool: &PgPool,
    platform: &str,
    limit: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE platform = $1 AND affiliate_url IS NULL \
         ORDER BY id \
         LIMIT $2"
    ))
    .bind(platform)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts products on `platform` that have no affiliate link yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_pending_affiliate_products(
    pool: &PgPool,
    platform: &str,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products WHERE platform = $1 AND affiliate_url IS NULL",
    )
    .bind(platform)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Affiliate coverage for one platform, or across all platforms when
/// `platform` is `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_affiliate_stats(
    pool: &PgPool,
    platform: Option<&str>,
) -> Result<AffiliateStats, DbError> {
    let stats = sqlx::query_as::<_, AffiliateStats>(
        "SELECT COUNT(*) AS total_products, \
                COUNT(affiliate_url) AS with_affiliate_url, \
                COUNT(*) FILTER (WHERE affiliate_url IS NULL) AS without_affiliate_url \
         FROM products \
         WHERE ($1::text IS NULL OR platform = $1)",
    )
    .bind(platform)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

/// Sets the affiliate link of a single product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_product_affiliate_url(
    pool: &PgPool,
    id: i64,
    affiliate_url: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET affiliate_url = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(affiliate_url)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Clears every affiliate link on `platform` that does not point at a known
/// affiliate endpoint. Returns the number of links cleared.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the read or the update fails.
pub async fn clear_invalid_affiliate_urls(pool: &PgPool, platform: &str) -> Result<u64, DbError> {
    let linked: Vec<(i64, String)> = sqlx::query_as(
        "SELECT id, affiliate_url FROM products \
         WHERE platform = $1 AND affiliate_url IS NOT NULL",
    )
    .bind(platform)
    .fetch_all(pool)
    .await?;

    let invalid_ids: Vec<i64> = linked
        .into_iter()
        .filter(|(_, url)| !is_valid_affiliate_url(url))
        .map(|(id, _)| id)
        .collect();

    if invalid_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE products SET affiliate_url = NULL, updated_at = NOW() WHERE id = ANY($1)",
    )
    .bind(&invalid_ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
