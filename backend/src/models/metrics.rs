use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::classifier::ClassificationFlags;

/// Histogram of query counts by elapsed-time range.
///
/// Invariant: the six bucket counts sum to the total query count of the
/// aggregate row they belong to.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct PerformanceBuckets {
    pub queries_0_to_1_sec: u64,
    pub queries_1_to_10_sec: u64,
    pub queries_10_to_30_sec: u64,
    pub queries_30_to_60_sec: u64,
    pub queries_1_to_5_min: u64,
    pub queries_5_min_plus: u64,
}

impl PerformanceBuckets {
    /// Record one execution by its elapsed time.
    pub fn record(&mut self, elapsed_ms: i64) {
        if elapsed_ms <= 1_000 {
            self.queries_0_to_1_sec += 1;
        } else if elapsed_ms <= 10_000 {
            self.queries_1_to_10_sec += 1;
        } else if elapsed_ms <= 30_000 {
            self.queries_10_to_30_sec += 1;
        } else if elapsed_ms <= 60_000 {
            self.queries_30_to_60_sec += 1;
        } else if elapsed_ms <= 300_000 {
            self.queries_1_to_5_min += 1;
        } else {
            self.queries_5_min_plus += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.queries_0_to_1_sec
            + self.queries_1_to_10_sec
            + self.queries_10_to_30_sec
            + self.queries_30_to_60_sec
            + self.queries_1_to_5_min
            + self.queries_5_min_plus
    }
}

/// Per-flag counts of bad-practice patterns within an aggregate group.
///
/// Each count is bounded above by the group's total query count.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct BadPracticeCounts {
    pub select_star_on_large_scan_queries: u64,
    pub unpartitioned_scan_queries: u64,
    pub cartesian_join_queries: u64,
    pub zero_result_expensive_queries: u64,
    pub failed_cancelled_queries: u64,
    pub high_compile_time_queries: u64,
    pub spilled_to_local_queries: u64,
    pub spilled_to_remote_queries: u64,
    pub long_running_queries: u64,
    pub high_queue_time_queries: u64,
    pub missing_where_clause_queries: u64,
}

impl BadPracticeCounts {
    /// Fold one record's classification flags into the counts.
    pub fn absorb(&mut self, flags: &ClassificationFlags) {
        self.select_star_on_large_scan_queries += flags.is_select_star_on_large_scan as u64;
        self.unpartitioned_scan_queries += flags.is_unpartitioned_scan as u64;
        self.cartesian_join_queries += flags.is_cartesian_join as u64;
        self.zero_result_expensive_queries += flags.is_zero_result_expensive as u64;
        self.failed_cancelled_queries += flags.is_failed as u64;
        self.high_compile_time_queries += flags.is_high_compile_time as u64;
        self.spilled_to_local_queries += flags.is_spilled_local as u64;
        self.spilled_to_remote_queries += flags.is_spilled_remote as u64;
        self.long_running_queries += flags.is_long_running as u64;
        self.high_queue_time_queries += flags.is_high_queue_time as u64;
        self.missing_where_clause_queries += flags.is_missing_where_clause as u64;
    }

    pub fn max_count(&self) -> u64 {
        [
            self.select_star_on_large_scan_queries,
            self.unpartitioned_scan_queries,
            self.cartesian_join_queries,
            self.zero_result_expensive_queries,
            self.failed_cancelled_queries,
            self.high_compile_time_queries,
            self.spilled_to_local_queries,
            self.spilled_to_remote_queries,
            self.long_running_queries,
            self.high_queue_time_queries,
            self.missing_where_clause_queries,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Aggregate row for one warehouse.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct WarehouseMetrics {
    pub warehouse_id: u64,
    pub warehouse_name: String,
    pub total_queries: u64,
    pub unique_users: u64,
    pub total_credits: f64,
    pub avg_credits_per_query: f64,
    pub active_days: u64,
    pub avg_execution_time_ms: f64,
    pub total_gb_scanned: f64,
    pub total_rows_produced: i64,
    #[serde(flatten)]
    pub buckets: PerformanceBuckets,
    #[serde(flatten)]
    pub bad_practices: BadPracticeCounts,
    pub weekend_credits: f64,
    pub off_hours_credits: f64,
    pub avg_queue_wait_time_ms: f64,
    pub performance_recommendation: String,
    pub cost_recommendation: String,
}

/// Aggregate row for one (user, warehouse) pair.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserWarehouseMetrics {
    /// Drill-down surrogate key: hash of user name + warehouse name.
    pub user_warehouse_id: u64,
    pub user_name: String,
    pub warehouse_name: String,
    pub warehouse_id: u64,
    pub total_queries: u64,
    pub total_credits: f64,
    pub avg_credits_per_query: f64,
    pub total_gb_scanned: f64,
    pub avg_execution_time_ms: f64,
    pub active_days: u64,
    /// Share of the parent warehouse's credits, 0..=100.
    pub percentage_of_warehouse_credits: f64,
    pub percentage_of_warehouse_queries: f64,
    #[serde(flatten)]
    pub buckets: PerformanceBuckets,
    #[serde(flatten)]
    pub bad_practices: BadPracticeCounts,
    pub weekend_credits: f64,
    pub off_hours_credits: f64,
    /// Queries that consumed more than one credit.
    pub expensive_queries: u64,
    pub cost_category: String,
    pub optimization_status: String,
}

/// Aggregate row for one database.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct DatabaseMetrics {
    pub database_id: u64,
    pub database_name: String,
    pub total_queries: u64,
    pub unique_users: u64,
    pub unique_warehouses: u64,
    pub unique_schemas: u64,
    pub active_days: u64,
    pub total_credits: f64,
    pub avg_execution_time_ms: f64,
    pub total_gb_scanned: f64,
    pub avg_gb_scanned_per_query: f64,
    #[serde(flatten)]
    pub buckets: PerformanceBuckets,
    #[serde(flatten)]
    pub bad_practices: BadPracticeCounts,
    pub storage_recommendation: String,
}

/// Aggregate row for one table reference within a database.
///
/// Attribution is best-effort text matching of query text against the table
/// reference, so counts may over- or under-attribute (see aggregator docs).
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct TableMetrics {
    pub table_id: u64,
    pub database_name: String,
    pub table_name: String,
    pub query_count: u64,
    pub select_star_count: u64,
    pub total_gb_scanned: f64,
    pub avg_execution_time_ms: f64,
    pub unique_users_accessing: u64,
    #[serde(flatten)]
    pub buckets: PerformanceBuckets,
    #[serde(flatten)]
    pub bad_practices: BadPracticeCounts,
    pub optimization_recommendation: String,
}

/// Aggregate row for one role.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RoleMetrics {
    pub role_id: u64,
    pub role_name: String,
    pub unique_users: u64,
    pub total_queries: u64,
    pub total_credits: f64,
    pub warehouses_used: u64,
    pub databases_accessed: u64,
    pub avg_execution_time_ms: f64,
    #[serde(flatten)]
    pub buckets: PerformanceBuckets,
    #[serde(flatten)]
    pub bad_practices: BadPracticeCounts,
    pub security_recommendation: String,
}

/// Aggregate row for one serverless service (executions with no user
/// warehouse attached, grouped by inferred service type and run-as user).
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ServerlessMetrics {
    pub service_id: u64,
    pub service_type: String,
    pub service_name: String,
    pub executions_count: u64,
    pub total_credits: f64,
    pub avg_credits_per_execution: f64,
    pub rows_processed: i64,
    pub error_count: u64,
    pub error_rate_pct: f64,
    #[serde(flatten)]
    pub buckets: PerformanceBuckets,
    #[serde(flatten)]
    pub bad_practices: BadPracticeCounts,
    pub optimization_recommendation: String,
}

/// One query-history row enriched with flags, categories, and the surrogate
/// keys that link it back to the aggregate dimensions.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct QueryHistoryRow {
    pub query_id: String,
    pub query_text_preview: String,
    pub user_name: String,
    pub role_name: String,
    pub warehouse_name: String,
    pub database_name: String,
    pub schema_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub execution_time_ms: i64,
    pub compilation_time_ms: i64,
    pub queue_time_ms: i64,
    pub execution_status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub gb_scanned: f64,
    pub rows_produced: i64,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub rows_deleted: i64,
    pub credits_used_compute: f64,
    pub credits_used_cloud_services: f64,
    pub total_credits_used: f64,
    pub partitions_scanned: i64,
    pub partitions_total: i64,
    pub gb_spilled_local: f64,
    pub gb_spilled_remote: f64,
    pub is_select_star_large: bool,
    pub is_unpartitioned_scan: bool,
    pub is_cartesian_join: bool,
    pub is_zero_result_expensive: bool,
    pub is_failed: bool,
    pub is_high_compile_time: bool,
    pub is_spilled_local: bool,
    pub is_spilled_remote: bool,
    pub is_long_running: bool,
    pub is_high_queue_time: bool,
    pub is_missing_where_clause: bool,
    pub performance_bucket: String,
    pub cost_category: String,
    pub time_category: String,
    pub query_type: String,
    /// Foreign-key references for drill-down navigation.
    pub user_warehouse_id: u64,
    pub warehouse_id: u64,
    pub database_id: u64,
    pub role_id: u64,
}

/// Per-query deep-dive analysis row.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct QueryDetails {
    pub query_id: String,
    pub query_text: String,
    pub execution_time_ms: i64,
    pub compilation_time_ms: i64,
    pub bytes_scanned: i64,
    pub rows_produced: i64,
    pub total_credits: f64,
    pub partitions_scanned: i64,
    pub partitions_total: i64,
    pub bytes_spilled_local: i64,
    pub bytes_spilled_remote: i64,
    pub estimated_cost_usd: f64,
    pub cost_per_gb_scanned: f64,
    pub rows_per_second: f64,
    pub rows_per_gb_scanned: f64,
    pub partition_scan_percentage: f64,
    /// Every matching advisory, in rule order (the per-query view is
    /// cumulative, unlike the first-match aggregate recommendations).
    pub optimization_recommendations: Vec<String>,
    pub cost_impact: String,
    pub performance_impact: String,
}

/// High-level roll-up across the aggregate dimensions.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SummaryMetrics {
    pub total_warehouses: u64,
    pub total_credits_used: f64,
    pub active_users: u64,
    pub databases_count: u64,
    pub serverless_services_count: u64,
    pub average_credits_per_user: f64,
    pub top_warehouse: Option<String>,
    pub highest_cost_user: Option<String>,
    pub largest_database: Option<String>,
    pub timestamp: DateTime<Utc>,
}
