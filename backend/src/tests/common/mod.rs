// Common test utilities and helpers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::models::{ExecutionStatus, QueryRecord};
use crate::services::{MetricsService, QueryHistorySource};
use crate::utils::{ApiError, ApiResult};

/// A plain successful record; tweak fields per test.
pub fn record(id: &str, user: &str, warehouse: &str, credits: f64) -> QueryRecord {
    QueryRecord {
        query_id: id.to_string(),
        query_text: "SELECT c FROM orders WHERE c > 0".to_string(),
        user_name: Some(user.to_string()),
        role_name: Some("ANALYST".to_string()),
        warehouse_name: Some(warehouse.to_string()),
        warehouse_id: None,
        database_name: Some("SALES".to_string()),
        schema_name: Some("PUBLIC".to_string()),
        start_time: Utc.with_ymd_and_hms(2024, 3, 6, 14, 0, 0).unwrap(),
        end_time: None,
        total_elapsed_ms: 1_200,
        compilation_ms: 80,
        queue_ms: 10,
        execution_status: ExecutionStatus::Success,
        error_code: None,
        error_message: None,
        bytes_scanned: 4_096,
        bytes_spilled_local: 0,
        bytes_spilled_remote: 0,
        rows_produced: 42,
        rows_inserted: 0,
        rows_updated: 0,
        rows_deleted: 0,
        partitions_scanned: 2,
        partitions_total: 8,
        credits_compute: credits,
        credits_cloud_services: 0.0,
    }
}

/// Upstream stub that counts fetches and can be switched into failure mode.
/// An optional delay keeps a fetch in flight so tests can overlap requests.
pub struct CountingSource {
    pub records: Vec<QueryRecord>,
    pub fetches: AtomicUsize,
    pub fail: AtomicBool,
    pub delay_ms: u64,
}

impl CountingSource {
    pub fn new(records: Vec<QueryRecord>) -> Arc<Self> {
        Self::with_delay(records, 0)
    }

    pub fn with_delay(records: Vec<QueryRecord>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            records,
            fetches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay_ms,
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueryHistorySource for CountingSource {
    async fn fetch_records(&self) -> ApiResult<Vec<QueryRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::source_fetch_failed("query_history", "simulated outage"));
        }
        Ok(self.records.clone())
    }

    fn description(&self) -> String {
        format!("counting-stub ({} records)", self.records.len())
    }
}

/// Service over a counting stub with a long TTL (snapshots stay fresh).
pub fn fresh_service(records: Vec<QueryRecord>) -> (Arc<CountingSource>, MetricsService) {
    let source = CountingSource::new(records);
    let service = MetricsService::new(source.clone(), 3_600);
    (source, service)
}

/// Service whose snapshots are always considered stale.
pub fn stale_service(records: Vec<QueryRecord>) -> (Arc<CountingSource>, MetricsService) {
    let source = CountingSource::new(records);
    let service = MetricsService::new(source.clone(), 0);
    (source, service)
}
