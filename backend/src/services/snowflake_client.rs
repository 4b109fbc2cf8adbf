//! Query-history source backed by the Snowflake SQL API.
//!
//! One pull returns the full record set for the configured trailing window.
//! The client owns no retry policy; a failed fetch surfaces as a
//! `SourceFetchFailed` and the caller keeps serving the previous snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::{SnowflakeConfig, SourceConfig};
use crate::models::{ExecutionStatus, QueryRecord};
use crate::utils::{ApiError, ApiResult};

/// Pull-based batch feed of execution records.
#[async_trait]
pub trait QueryHistorySource: Send + Sync {
    /// Fetch all records for the trailing window. One call, no paging from
    /// the caller's point of view.
    async fn fetch_records(&self) -> ApiResult<Vec<QueryRecord>>;

    /// Human-readable description shown in the status endpoint.
    fn description(&self) -> String;
}

pub struct SnowflakeClient {
    http_client: Client,
    config: SnowflakeConfig,
    window_days: i64,
}

impl SnowflakeClient {
    pub fn new(config: SnowflakeConfig, source: &SourceConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self { http_client, config, window_days: source.window_days }
    }

    fn statements_url(&self) -> String {
        format!("https://{}.snowflakecomputing.com/api/v2/statements", self.config.account)
    }

    fn history_sql(&self) -> String {
        format!(
            "SELECT query_id, query_text, user_name, role_name, warehouse_name, warehouse_id, \
             database_name, schema_name, start_time, end_time, total_elapsed_time, \
             compilation_time, queued_overload_time, execution_status, error_code, error_message, \
             bytes_scanned, bytes_spilled_to_local_storage, bytes_spilled_to_remote_storage, \
             rows_produced, rows_inserted, rows_updated, rows_deleted, \
             partitions_scanned, partitions_total, \
             credits_used_cloud_services, credits_attributed_compute \
             FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY \
             WHERE start_time >= DATEADD('day', -{}, CURRENT_TIMESTAMP())",
            self.window_days
        )
    }

    async fn execute_statement(&self) -> ApiResult<Value> {
        let body = json!({
            "statement": self.history_sql(),
            "timeout": 300,
            "warehouse": self.config.warehouse,
            "role": self.config.role,
        });

        let response = self
            .http_client
            .post(self.statements_url())
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", "PROGRAMMATIC_ACCESS_TOKEN")
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::source_fetch_failed("query_history", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::source_fetch_failed(
                "query_history",
                format!("SQL API returned {}: {}", status, detail),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::source_fetch_failed("query_history", e.to_string()))
    }

    /// Map one SQL API result row (positional string array) to a record.
    /// Rows that cannot be parsed are dropped with a warning; the malformed
    /// tally is handled downstream.
    fn parse_row(row: &[Value]) -> Option<QueryRecord> {
        fn text(v: Option<&Value>) -> Option<String> {
            v.and_then(Value::as_str).map(str::to_string)
        }
        fn int(v: Option<&Value>) -> i64 {
            v.and_then(Value::as_str).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0) as i64
        }
        fn float(v: Option<&Value>) -> f64 {
            v.and_then(Value::as_str).and_then(|s| s.parse().ok()).unwrap_or(0.0)
        }
        fn time(v: Option<&Value>) -> Option<DateTime<Utc>> {
            // The SQL API renders TIMESTAMP_LTZ as epoch seconds with a
            // fractional part.
            v.and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        }

        let query_id = text(row.first())?;
        Some(QueryRecord {
            query_id,
            query_text: text(row.get(1)).unwrap_or_default(),
            user_name: text(row.get(2)),
            role_name: text(row.get(3)),
            warehouse_name: text(row.get(4)),
            warehouse_id: row.get(5).and_then(Value::as_str).and_then(|s| s.parse().ok()),
            database_name: text(row.get(6)),
            schema_name: text(row.get(7)),
            start_time: time(row.get(8))?,
            end_time: time(row.get(9)),
            total_elapsed_ms: int(row.get(10)),
            compilation_ms: int(row.get(11)),
            queue_ms: int(row.get(12)),
            execution_status: ExecutionStatus::parse(
                text(row.get(13)).unwrap_or_default().as_str(),
            ),
            error_code: text(row.get(14)),
            error_message: text(row.get(15)),
            bytes_scanned: int(row.get(16)),
            bytes_spilled_local: int(row.get(17)),
            bytes_spilled_remote: int(row.get(18)),
            rows_produced: int(row.get(19)),
            rows_inserted: int(row.get(20)),
            rows_updated: int(row.get(21)),
            rows_deleted: int(row.get(22)),
            partitions_scanned: int(row.get(23)),
            partitions_total: int(row.get(24)),
            credits_cloud_services: float(row.get(25)),
            credits_compute: float(row.get(26)),
        })
    }
}

#[async_trait]
impl QueryHistorySource for SnowflakeClient {
    async fn fetch_records(&self) -> ApiResult<Vec<QueryRecord>> {
        tracing::debug!(window_days = self.window_days, "Fetching query history from SQL API");
        let payload = self.execute_statement().await?;

        let rows = payload
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ApiError::source_fetch_failed("query_history", "response missing data array")
            })?;

        let mut records = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;
        for row in rows {
            match row.as_array().and_then(|cells| Self::parse_row(cells)) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!("Dropped {} unparseable query-history rows", dropped);
        }
        tracing::info!("Fetched {} query-history records", records.len());
        Ok(records)
    }

    fn description(&self) -> String {
        format!(
            "snowflake://{}/ACCOUNT_USAGE.QUERY_HISTORY ({}d window)",
            self.config.account, self.window_days
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn parses_a_positional_row() {
        let row: Vec<Value> = vec![
            cell("01aa-bb"),
            cell("SELECT 1"),
            cell("ALICE"),
            cell("ANALYST"),
            cell("WH1"),
            cell("42"),
            cell("SALES"),
            cell("PUBLIC"),
            cell("1709733600.000000"),
            cell("1709733605.000000"),
            cell("5000"),
            cell("120"),
            cell("0"),
            cell("SUCCESS"),
            Value::Null,
            Value::Null,
            cell("2048"),
            cell("0"),
            cell("0"),
            cell("10"),
            cell("0"),
            cell("0"),
            cell("0"),
            cell("1"),
            cell("4"),
            cell("0.001"),
            cell("0.05"),
        ];
        let record = SnowflakeClient::parse_row(&row).unwrap();
        assert_eq!(record.query_id, "01aa-bb");
        assert_eq!(record.warehouse_name.as_deref(), Some("WH1"));
        assert_eq!(record.total_elapsed_ms, 5000);
        assert_eq!(record.execution_status, ExecutionStatus::Success);
        assert!((record.total_credits() - 0.051).abs() < 1e-9);
    }

    #[test]
    fn row_without_query_id_is_rejected() {
        let row = vec![Value::Null, cell("SELECT 1")];
        assert!(SnowflakeClient::parse_row(&row).is_none());
    }
}
