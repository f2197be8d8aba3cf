//! Affiliate store CRUD. Stored credentials are write-only: responses list
//! the credential key names, never their values.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use casadigital_db::{AffiliateStoreRow, AffiliateStoreUpdate, NewAffiliateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_lookup_error, normalize_limit, parse_platform, respond, ApiError,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize)]
pub(super) struct StoreItem {
    id: i64,
    name: String,
    platform: String,
    credential_keys: Vec<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AffiliateStoreRow> for StoreItem {
    fn from(row: AffiliateStoreRow) -> Self {
        Self {
            credential_keys: row.credential_keys(),
            id: row.id,
            name: row.name,
            platform: row.platform,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateStoreRequest {
    pub name: String,
    pub platform: String,
    pub api_credentials: Option<Value>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateStoreRequest {
    pub name: Option<String>,
    pub platform: Option<String>,
    pub api_credentials: Option<Value>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StoreListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

fn validate_name(req_id: &str, name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "name must be 1-200 characters",
        ));
    }
    Ok(name.to_owned())
}

fn validate_credentials(req_id: &str, credentials: &Value) -> Result<(), ApiError> {
    if credentials.is_object() {
        Ok(())
    } else {
        Err(ApiError::new(
            req_id,
            "validation_error",
            "api_credentials must be a JSON object",
        ))
    }
}

/// POST /api/v1/affiliate-stores
pub(super) async fn create_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StoreItem>>), ApiError> {
    let rid = &req_id.0;
    let name = validate_name(rid, &body.name)?;
    let platform = parse_platform(rid, &body.platform)?;
    let api_credentials = body
        .api_credentials
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    validate_credentials(rid, &api_credentials)?;

    let row = casadigital_db::create_affiliate_store(
        &state.pool,
        &NewAffiliateStore {
            name,
            platform: platform.as_str().to_string(),
            api_credentials,
            active: body.active.unwrap_or(true),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(store_id = row.id, platform = %row.platform, "affiliate store created");
    Ok((StatusCode::CREATED, respond(StoreItem::from(row), req_id.0)))
}

/// GET /api/v1/affiliate-stores
pub(super) async fn list_stores(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<StoreListQuery>,
) -> Result<Json<ApiResponse<Vec<StoreItem>>>, ApiError> {
    let rows = casadigital_db::list_affiliate_stores(
        &state.pool,
        query.skip.unwrap_or(0).max(0),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(respond(
        rows.into_iter().map(StoreItem::from).collect(),
        req_id.0,
    ))
}

/// GET /api/v1/affiliate-stores/{store_id}
pub(super) async fn get_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<i64>,
) -> Result<Json<ApiResponse<StoreItem>>, ApiError> {
    let row = casadigital_db::get_affiliate_store(&state.pool, store_id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "affiliate store"))?;

    Ok(respond(StoreItem::from(row), req_id.0))
}

/// PUT /api/v1/affiliate-stores/{store_id}
///
/// Fields left out of the body keep their current values.
pub(super) async fn update_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<i64>,
    Json(body): Json<UpdateStoreRequest>,
) -> Result<Json<ApiResponse<StoreItem>>, ApiError> {
    let rid = &req_id.0;

    let name = body
        .name
        .as_deref()
        .map(|n| validate_name(rid, n))
        .transpose()?;
    let platform = body
        .platform
        .as_deref()
        .map(|p| parse_platform(rid, p).map(|p| p.as_str().to_string()))
        .transpose()?;
    if let Some(credentials) = &body.api_credentials {
        validate_credentials(rid, credentials)?;
    }

    let row = casadigital_db::update_affiliate_store(
        &state.pool,
        store_id,
        &AffiliateStoreUpdate {
            name,
            platform,
            api_credentials: body.api_credentials,
            active: body.active,
        },
    )
    .await
    .map_err(|e| map_lookup_error(rid.clone(), &e, "affiliate store"))?;

    Ok(respond(StoreItem::from(row), req_id.0))
}

/// DELETE /api/v1/affiliate-stores/{store_id}
pub(super) async fn delete_store(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<i64>,
) -> Result<Json<ApiResponse<StoreItem>>, ApiError> {
    let row = casadigital_db::delete_affiliate_store(&state.pool, store_id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "affiliate store"))?;

    tracing::info!(store_id = row.id, "affiliate store deleted");
    Ok(respond(StoreItem::from(row), req_id.0))
}
