//! FinOps metrics API handlers
//!
//! REST endpoints over the metrics store: dimension listings with equality
//! filters, per-query details, summary, refresh triggers, and status.
//! Every list endpoint accepts `limit`, `export=csv`, and any row field as
//! an equality filter (unknown fields are a 400).

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::AppState;
use crate::models::SummaryMetrics;
use crate::services::{Dimension, Filter};
use crate::utils::{ApiError, ApiResult, csv};

/// Reserved query-string keys that are not filter fields.
const LIMIT_PARAM: &str = "limit";
const EXPORT_PARAM: &str = "export";

fn parse_params(params: &HashMap<String, String>) -> ApiResult<(Vec<Filter>, Option<usize>, bool)> {
    let mut filters = Vec::new();
    let mut limit = None;
    let mut export_csv = false;

    for (key, value) in params {
        match key.as_str() {
            LIMIT_PARAM => {
                limit = Some(value.parse().map_err(|_| {
                    ApiError::invalid_input(format!("Invalid limit: {}", value))
                })?);
            },
            EXPORT_PARAM => {
                export_csv = match value.as_str() {
                    "csv" => true,
                    "json" => false,
                    other => {
                        return Err(ApiError::invalid_input(format!(
                            "Unsupported export format: {}",
                            other
                        )));
                    },
                };
            },
            _ => filters.push(Filter::eq(key.clone(), value.clone())),
        }
    }
    Ok((filters, limit, export_csv))
}

async fn list_dimension(
    state: &AppState,
    dimension: Dimension,
    params: &HashMap<String, String>,
) -> ApiResult<Response> {
    let (filters, limit, export_csv) = parse_params(params)?;
    tracing::debug!(
        dimension = dimension.as_str(),
        filters = filters.len(),
        ?limit,
        "Listing dimension rows"
    );

    let rows = state.metrics.get(dimension, &filters, limit).await?;

    if export_csv {
        let body = csv::rows_to_csv(&rows)?;
        return Ok(csv::csv_response(dimension.as_str(), body));
    }
    Ok(Json(rows).into_response())
}

// Warehouse metrics
#[utoipa::path(
    get,
    path = "/api/warehouses",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Warehouse aggregate rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_warehouses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::Warehouses, &params).await
}

// User x warehouse metrics
#[utoipa::path(
    get,
    path = "/api/users",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Per-user warehouse usage rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::Users, &params).await
}

// Database metrics
#[utoipa::path(
    get,
    path = "/api/databases",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Database aggregate rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_databases(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::Databases, &params).await
}

// Table metrics
#[utoipa::path(
    get,
    path = "/api/tables",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Table aggregate rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_tables(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::Tables, &params).await
}

// Role metrics
#[utoipa::path(
    get,
    path = "/api/roles",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Role aggregate rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::Roles, &params).await
}

// Serverless service metrics
#[utoipa::path(
    get,
    path = "/api/serverless",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Serverless service aggregate rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_serverless(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::Serverless, &params).await
}

// Enriched query history
#[utoipa::path(
    get,
    path = "/api/query-history",
    params(
        ("limit" = Option<usize>, Query, description = "Maximum rows to return"),
        ("export" = Option<String>, Query, description = "Set to 'csv' for a CSV download")
    ),
    responses(
        (status = 200, description = "Classified query history rows"),
        (status = 400, description = "Invalid filter field")
    ),
    tag = "Metrics"
)]
pub async fn list_query_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    list_dimension(&state, Dimension::QueryHistory, &params).await
}

// Per-query deep dive
#[utoipa::path(
    get,
    path = "/api/query-details/{query_id}",
    responses(
        (status = 200, description = "Query analysis with recommendations"),
        (status = 404, description = "Query not found")
    ),
    tag = "Metrics"
)]
pub async fn get_query_details(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> ApiResult<Json<Value>> {
    tracing::debug!("Getting query details: {}", query_id);
    let detail = state.metrics.query_detail(&query_id).await?;
    Ok(Json(detail))
}

// Queries behind one user x warehouse aggregate
#[utoipa::path(
    get,
    path = "/api/users/{user_warehouse_id}/queries",
    responses(
        (status = 200, description = "Contributing query history rows")
    ),
    tag = "Metrics"
)]
pub async fn get_user_queries(
    State(state): State<Arc<AppState>>,
    Path(user_warehouse_id): Path<u64>,
) -> ApiResult<Json<Vec<Value>>> {
    let rows = state.metrics.drill_down("user_warehouse_id", user_warehouse_id).await?;
    Ok(Json(rows))
}

// Queries behind one warehouse aggregate
#[utoipa::path(
    get,
    path = "/api/warehouses/{warehouse_id}/queries",
    responses(
        (status = 200, description = "Contributing query history rows")
    ),
    tag = "Metrics"
)]
pub async fn get_warehouse_queries(
    State(state): State<Arc<AppState>>,
    Path(warehouse_id): Path<u64>,
) -> ApiResult<Json<Vec<Value>>> {
    let rows = state.metrics.drill_down("warehouse_id", warehouse_id).await?;
    Ok(Json(rows))
}

// Cross-dimension summary
#[utoipa::path(
    get,
    path = "/api/summary",
    responses(
        (status = 200, description = "High-level cost summary", body = SummaryMetrics)
    ),
    tag = "Metrics"
)]
pub async fn get_summary(State(state): State<Arc<AppState>>) -> ApiResult<Json<SummaryMetrics>> {
    let summary = state.metrics.summary().await?;
    Ok(Json(summary))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct RefreshParams {
    /// Dimension to refresh; omitted or "all" refreshes everything.
    pub dimension: Option<String>,
}

// Force a recompute
#[utoipa::path(
    post,
    path = "/api/refresh",
    params(RefreshParams),
    responses(
        (status = 200, description = "Refresh completed"),
        (status = 404, description = "Unknown dimension"),
        (status = 502, description = "Source fetch failed")
    ),
    tag = "Metrics"
)]
pub async fn trigger_refresh(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
) -> ApiResult<Json<Value>> {
    match params.dimension.as_deref() {
        None | Some("all") => {
            tracing::info!("Manual refresh: all dimensions");
            state.metrics.refresh_all().await?;
            Ok(Json(serde_json::json!({ "refreshed": "all" })))
        },
        Some(name) => {
            let dimension = Dimension::parse(name)?;
            tracing::info!("Manual refresh: {}", dimension.as_str());
            let snapshot = state.metrics.refresh(dimension).await?;
            Ok(Json(serde_json::json!({
                "refreshed": dimension.as_str(),
                "rows": snapshot.row_count(),
                "computed_at": snapshot.computed_at,
            })))
        },
    }
}

// Snapshot status per dimension
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Per-dimension snapshot status")
    ),
    tag = "System"
)]
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<Vec<Value>> {
    Json(state.metrics.status())
}

// Liveness probe
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up")
    ),
    tag = "System"
)]
pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
