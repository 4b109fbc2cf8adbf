use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Final status of a query execution as reported by the usage feed.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Fail,
    Cancelled,
}

impl ExecutionStatus {
    /// Parse the status column from the usage feed. Unknown values are
    /// treated as failures so they surface in the failed-query counts.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "SUCCESS" => Self::Success,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// One historical query execution from the account-usage feed.
///
/// Immutable and externally sourced: the upstream materializes these for a
/// trailing window (see `source.window_days`); this service never mutates
/// them, only classifies and aggregates.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct QueryRecord {
    pub query_id: String,
    pub query_text: String,
    pub user_name: Option<String>,
    pub role_name: Option<String>,
    pub warehouse_name: Option<String>,
    pub warehouse_id: Option<i64>,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Total elapsed time in milliseconds (compile + queue + execute).
    pub total_elapsed_ms: i64,
    pub compilation_ms: i64,
    pub queue_ms: i64,
    pub execution_status: ExecutionStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub bytes_scanned: i64,
    pub bytes_spilled_local: i64,
    pub bytes_spilled_remote: i64,
    pub rows_produced: i64,
    pub rows_inserted: i64,
    pub rows_updated: i64,
    pub rows_deleted: i64,
    pub partitions_scanned: i64,
    pub partitions_total: i64,
    pub credits_compute: f64,
    pub credits_cloud_services: f64,
}

impl QueryRecord {
    /// Combined compute + cloud-services credits for this execution.
    pub fn total_credits(&self) -> f64 {
        self.credits_compute + self.credits_cloud_services
    }

    pub fn gb_scanned(&self) -> f64 {
        self.bytes_scanned as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// A record without a query id cannot be keyed or drilled into; such
    /// records are excluded from aggregation and counted as skipped.
    pub fn is_well_formed(&self) -> bool {
        !self.query_id.trim().is_empty()
    }

    /// First 200 characters of the query text, for list views.
    pub fn text_preview(&self) -> String {
        self.query_text.chars().take(200).collect()
    }
}
