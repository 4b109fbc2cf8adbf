pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::services::MetricsService;

/// Shared application state injected into every handler.
pub struct AppState {
    pub config: Config,
    pub metrics: Arc<MetricsService>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::metrics::list_warehouses,
        handlers::metrics::get_warehouse_queries,
        handlers::metrics::list_users,
        handlers::metrics::get_user_queries,
        handlers::metrics::list_databases,
        handlers::metrics::list_tables,
        handlers::metrics::list_roles,
        handlers::metrics::list_serverless,
        handlers::metrics::list_query_history,
        handlers::metrics::get_query_details,
        handlers::metrics::get_summary,
        handlers::metrics::trigger_refresh,
        handlers::metrics::get_status,
        handlers::metrics::health_check,
    ),
    components(schemas(
        models::QueryRecord,
        models::ExecutionStatus,
        models::WarehouseMetrics,
        models::UserWarehouseMetrics,
        models::DatabaseMetrics,
        models::TableMetrics,
        models::RoleMetrics,
        models::ServerlessMetrics,
        models::QueryHistoryRow,
        models::QueryDetails,
        models::SummaryMetrics,
        models::PerformanceBuckets,
        models::BadPracticeCounts,
        services::ClassificationFlags,
    )),
    tags(
        (name = "Metrics", description = "Cost and usage aggregates"),
        (name = "System", description = "Health and snapshot status")
    ),
    info(
        title = "FinOps Admin API",
        description = "Cost observability over warehouse query telemetry",
        version = "1.0.0"
    )
)]
pub struct ApiDoc;

/// Assemble the full application router.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::api_router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
