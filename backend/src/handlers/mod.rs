pub mod metrics;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::AppState;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/warehouses", get(metrics::list_warehouses))
        .route("/api/warehouses/:warehouse_id/queries", get(metrics::get_warehouse_queries))
        .route("/api/users", get(metrics::list_users))
        .route("/api/users/:user_warehouse_id/queries", get(metrics::get_user_queries))
        .route("/api/databases", get(metrics::list_databases))
        .route("/api/tables", get(metrics::list_tables))
        .route("/api/roles", get(metrics::list_roles))
        .route("/api/serverless", get(metrics::list_serverless))
        .route("/api/query-history", get(metrics::list_query_history))
        .route("/api/query-details/:query_id", get(metrics::get_query_details))
        .route("/api/summary", get(metrics::get_summary))
        .route("/api/refresh", post(metrics::trigger_refresh))
        .route("/api/status", get(metrics::get_status))
        .route("/api/health", get(metrics::health_check))
}
