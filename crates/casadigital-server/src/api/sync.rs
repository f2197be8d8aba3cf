use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use casadigital_sync::{StoreSyncRequest, SyncError, Trigger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_lookup_error, normalize_limit, respond, ApiError, ApiResponse, AppState,
};

const DEFAULT_SYNC_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub(super) struct SyncStoreQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncAccepted {
    run_id: Uuid,
    store_id: i64,
    query: String,
    category: Option<String>,
    limit: u32,
    status: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct SyncRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    run_id: Uuid,
    store_id: Option<i64>,
    run_type: String,
    trigger_source: String,
    status: String,
    query: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i32,
    records_failed: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<casadigital_db::SyncRunRow> for SyncRunItem {
    fn from(row: casadigital_db::SyncRunRow) -> Self {
        Self {
            run_id: row.public_id,
            store_id: row.store_id,
            run_type: row.run_type,
            trigger_source: row.trigger_source,
            status: row.status,
            query: row.query,
            started_at: row.started_at,
            completed_at: row.completed_at,
            records_processed: row.records_processed,
            records_failed: row.records_failed,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

/// POST /api/v1/sync/stores/{store_id}/products
///
/// Queues a `store_search` run and executes it in the background. The
/// response carries the run id to poll on `/api/v1/sync/runs/{run_id}`.
pub(super) async fn sync_store_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(store_id): Path<i64>,
    Query(query): Query<SyncStoreQuery>,
) -> Result<(StatusCode, Json<ApiResponse<SyncAccepted>>), ApiError> {
    let rid = &req_id.0;

    let search = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::new(rid, "validation_error", "query is required"))?;

    let request = StoreSyncRequest {
        query: search.to_string(),
        category: query.category.filter(|c| !c.trim().is_empty()),
        limit: query
            .limit
            .unwrap_or(DEFAULT_SYNC_LIMIT)
            .clamp(1, casadigital_marketplace::MAX_SEARCH_LIMIT),
    };

    let (store, run) =
        casadigital_sync::queue_store_sync(&state.pool, store_id, &request, Trigger::Api)
            .await
            .map_err(|e| match e {
                SyncError::StoreUnavailable { store_id } => ApiError::new(
                    rid,
                    "not_found",
                    format!("store {store_id} not found or not active"),
                ),
                SyncError::Db(ref db) => map_db_error(rid.clone(), db),
                other => {
                    tracing::error!(error = %other, "failed to queue store sync");
                    ApiError::new(rid, "internal_error", "failed to queue sync")
                }
            })?;

    let accepted = SyncAccepted {
        run_id: run.public_id,
        store_id: store.id,
        query: request.query.clone(),
        category: request.category.clone(),
        limit: request.limit,
        status: run.status.clone(),
    };

    let pool = state.pool.clone();
    let settings = std::sync::Arc::clone(&state.sync);
    tokio::spawn(async move {
        if let Err(e) =
            casadigital_sync::execute_store_sync(&pool, &settings, &store, &run, &request).await
        {
            tracing::error!(run_id = %run.public_id, error = %e, "background store sync failed");
        }
    });

    Ok((StatusCode::ACCEPTED, respond(accepted, req_id.0)))
}

/// GET /api/v1/sync/runs
pub(super) async fn list_sync_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SyncRunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let rows = casadigital_db::list_sync_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(respond(
        rows.into_iter().map(SyncRunItem::from).collect(),
        req_id.0,
    ))
}

/// GET /api/v1/sync/runs/{run_id}
pub(super) async fn get_sync_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<String>,
) -> Result<Json<ApiResponse<SyncRunItem>>, ApiError> {
    let run_id = Uuid::parse_str(&run_id).map_err(|_| {
        ApiError::new(
            &req_id.0,
            "validation_error",
            format!("run_id must be a UUID, got '{run_id}'"),
        )
    })?;

    let row = casadigital_db::get_sync_run_by_public_id(&state.pool, run_id)
        .await
        .map_err(|e| map_lookup_error(req_id.0.clone(), &e, "sync run"))?;

    Ok(respond(SyncRunItem::from(row), req_id.0))
}
