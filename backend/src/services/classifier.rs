//! Per-record bad-practice classification.
//!
//! Pure functions mapping one `QueryRecord` to a fixed set of boolean flags
//! and categorical labels. No I/O, deterministic; recomputed on every
//! aggregation pass rather than persisted.

use chrono::{Datelike, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ExecutionStatus, QueryRecord};

/// 1 GiB. Scans above this are "large" for the SELECT * / missing-WHERE flags.
pub const LARGE_SCAN_BYTES: i64 = 1_073_741_824;
/// Elapsed time above which a query counts as long-running.
pub const LONG_RUNNING_MS: i64 = 300_000;
/// Compilation time above which a query counts as slow to compile.
/// The source data pipeline used both 5s and 10s in different paths; 10s is
/// the canonical value here.
pub const HIGH_COMPILE_MS: i64 = 10_000;
/// Queue time above which a query counts as queue-bound.
pub const HIGH_QUEUE_MS: i64 = 30_000;
/// Elapsed-time floor for the zero-result-but-expensive flag.
pub const ZERO_RESULT_EXPENSIVE_MS: i64 = 5_000;
/// Partition-scan ratio above which a scan counts as unpartitioned.
pub const UNPARTITIONED_RATIO: f64 = 0.8;
/// Minimum partition count before the unpartitioned-scan flag can fire.
pub const UNPARTITIONED_MIN_PARTITIONS: i64 = 10;
/// USD per credit for the estimated-cost field in the detail view.
pub const USD_PER_CREDIT: f64 = 3.0;

static SELECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSELECT\b").expect("static regex"));
static WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("static regex"));

/// The fixed set of per-record bad-practice indicators.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationFlags {
    pub is_select_star_on_large_scan: bool,
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
}

/// Compute all classification flags for one record.
pub fn classify(record: &QueryRecord) -> ClassificationFlags {
    let text_upper = record.query_text.to_uppercase();
    let large_scan = record.bytes_scanned > LARGE_SCAN_BYTES;

    // partitions_total == 0 must never flag (division guard).
    let unpartitioned = record.partitions_total > UNPARTITIONED_MIN_PARTITIONS
        && record.partitions_scanned as f64
            > record.partitions_total as f64 * UNPARTITIONED_RATIO;

    ClassificationFlags {
        is_select_star_on_large_scan: text_upper.contains("SELECT *") && large_scan,
        is_unpartitioned_scan: unpartitioned,
        is_cartesian_join: text_upper.contains("CROSS JOIN") || text_upper.contains("CARTESIAN"),
        is_zero_result_expensive: record.rows_produced == 0
            && record.total_elapsed_ms > ZERO_RESULT_EXPENSIVE_MS,
        is_failed: matches!(
            record.execution_status,
            ExecutionStatus::Fail | ExecutionStatus::Cancelled
        ),
        is_high_compile_time: record.compilation_ms > HIGH_COMPILE_MS,
        is_spilled_local: record.bytes_spilled_local > 0,
        is_spilled_remote: record.bytes_spilled_remote > 0,
        is_long_running: record.total_elapsed_ms > LONG_RUNNING_MS,
        is_high_queue_time: record.queue_ms > HIGH_QUEUE_MS,
        is_missing_where_clause: SELECT_RE.is_match(&record.query_text)
            && !WHERE_RE.is_match(&record.query_text)
            && large_scan,
    }
}

/// Elapsed-time bucket label. Ranges are half-open on the low end and
/// inclusive on the high end; the first bucket includes zero.
pub fn performance_bucket(elapsed_ms: i64) -> &'static str {
    if elapsed_ms <= 1_000 {
        "0-1s"
    } else if elapsed_ms <= 10_000 {
        "1-10s"
    } else if elapsed_ms <= 30_000 {
        "10-30s"
    } else if elapsed_ms <= 60_000 {
        "30-60s"
    } else if elapsed_ms <= 300_000 {
        "1-5min"
    } else {
        "5min+"
    }
}

/// Per-query cost bucket from total credits consumed.
pub fn cost_category(total_credits: f64) -> &'static str {
    if total_credits == 0.0 {
        "Zero Cost"
    } else if total_credits <= 0.1 {
        "Low Cost"
    } else if total_credits <= 1.0 {
        "Medium Cost"
    } else {
        "High Cost"
    }
}

/// Weekend / off-hours / business-hours label from the start timestamp.
///
/// Off hours wrap around midnight: 22:00 through 06:59.
pub fn time_category(start_time: chrono::DateTime<chrono::Utc>) -> &'static str {
    let weekday = start_time.weekday();
    if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
        return "Weekend";
    }
    let hour = start_time.hour();
    if hour >= 22 || hour <= 6 { "Off Hours" } else { "Business Hours" }
}

/// Whether the record ran in the weekend or off-hours window (used for the
/// cost-efficiency credit sums).
pub fn is_weekend(start_time: chrono::DateTime<chrono::Utc>) -> bool {
    matches!(start_time.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

pub fn is_off_hours(start_time: chrono::DateTime<chrono::Utc>) -> bool {
    let hour = start_time.hour();
    hour >= 22 || hour <= 6
}

/// Statement type from the leading keyword.
pub fn query_type(query_text: &str) -> &'static str {
    let upper = query_text.trim_start().to_uppercase();
    for prefix in ["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER"] {
        if upper.starts_with(prefix) {
            return match prefix {
                "SELECT" => "SELECT",
                "INSERT" => "INSERT",
                "UPDATE" => "UPDATE",
                "DELETE" => "DELETE",
                "CREATE" => "CREATE",
                "DROP" => "DROP",
                _ => "ALTER",
            };
        }
    }
    "OTHER"
}

/// Cost-impact severity for the detail view.
pub fn cost_impact(total_credits: f64) -> &'static str {
    if total_credits > 10.0 {
        "CRITICAL"
    } else if total_credits > 1.0 {
        "HIGH"
    } else if total_credits > 0.1 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

/// Performance-impact severity for the detail view.
pub fn performance_impact(elapsed_ms: i64) -> &'static str {
    if elapsed_ms > 300_000 {
        "CRITICAL"
    } else if elapsed_ms > 60_000 {
        "HIGH"
    } else if elapsed_ms > 10_000 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

/// Percentage of partitions scanned, 0 when the total is unknown.
pub fn partition_scan_percentage(scanned: i64, total: i64) -> f64 {
    if total > 0 { scanned as f64 / total as f64 * 100.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn base_record() -> QueryRecord {
        QueryRecord {
            query_id: "q-1".to_string(),
            query_text: "SELECT id FROM t WHERE id = 1".to_string(),
            user_name: Some("ALICE".to_string()),
            role_name: Some("ANALYST".to_string()),
            warehouse_name: Some("WH1".to_string()),
            warehouse_id: Some(10),
            database_name: Some("SALES".to_string()),
            schema_name: Some("PUBLIC".to_string()),
            start_time: Utc.with_ymd_and_hms(2024, 3, 6, 14, 30, 0).unwrap(),
            end_time: None,
            total_elapsed_ms: 500,
            compilation_ms: 100,
            queue_ms: 0,
            execution_status: ExecutionStatus::Success,
            error_code: None,
            error_message: None,
            bytes_scanned: 1024,
            bytes_spilled_local: 0,
            bytes_spilled_remote: 0,
            rows_produced: 10,
            rows_inserted: 0,
            rows_updated: 0,
            rows_deleted: 0,
            partitions_scanned: 1,
            partitions_total: 4,
            credits_compute: 0.01,
            credits_cloud_services: 0.0,
        }
    }

    #[test]
    fn select_star_on_large_scan_and_missing_where() {
        let mut record = base_record();
        record.query_text = "SELECT * FROM t".to_string();
        record.bytes_scanned = 6_442_450_944;

        let flags = classify(&record);
        assert!(flags.is_select_star_on_large_scan);
        assert!(flags.is_missing_where_clause);
    }

    #[test]
    fn select_star_on_small_scan_is_fine() {
        let mut record = base_record();
        record.query_text = "SELECT * FROM t".to_string();
        record.bytes_scanned = 1024;

        let flags = classify(&record);
        assert!(!flags.is_select_star_on_large_scan);
        assert!(!flags.is_missing_where_clause);
    }

    #[test]
    fn where_clause_suppresses_missing_where() {
        let mut record = base_record();
        record.query_text = "select c from t where c > 0".to_string();
        record.bytes_scanned = LARGE_SCAN_BYTES + 1;

        assert!(!classify(&record).is_missing_where_clause);
    }

    #[test]
    fn performance_bucket_boundaries() {
        assert_eq!(performance_bucket(0), "0-1s");
        assert_eq!(performance_bucket(1_000), "0-1s");
        assert_eq!(performance_bucket(1_001), "1-10s");
        assert_eq!(performance_bucket(10_000), "1-10s");
        assert_eq!(performance_bucket(30_000), "10-30s");
        assert_eq!(performance_bucket(45_000), "30-60s");
        assert_eq!(performance_bucket(60_000), "30-60s");
        assert_eq!(performance_bucket(65_000), "1-5min");
        assert_eq!(performance_bucket(300_000), "1-5min");
        assert_eq!(performance_bucket(300_001), "5min+");
    }

    #[test]
    fn unpartitioned_scan_guards_zero_total() {
        let mut record = base_record();
        record.partitions_scanned = 0;
        record.partitions_total = 0;
        assert!(!classify(&record).is_unpartitioned_scan);

        record.partitions_scanned = 95;
        record.partitions_total = 100;
        assert!(classify(&record).is_unpartitioned_scan);

        // Small tables never flag even when fully scanned.
        record.partitions_scanned = 10;
        record.partitions_total = 10;
        assert!(!classify(&record).is_unpartitioned_scan);
    }

    #[test]
    fn cartesian_join_detection_is_case_insensitive() {
        let mut record = base_record();
        record.query_text = "select * from a cross join b".to_string();
        assert!(classify(&record).is_cartesian_join);
    }

    #[test]
    fn failed_and_cancelled_both_flag() {
        let mut record = base_record();
        record.execution_status = ExecutionStatus::Fail;
        assert!(classify(&record).is_failed);
        record.execution_status = ExecutionStatus::Cancelled;
        assert!(classify(&record).is_failed);
        record.execution_status = ExecutionStatus::Success;
        assert!(!classify(&record).is_failed);
    }

    #[test]
    fn zero_result_expensive_needs_both_conditions() {
        let mut record = base_record();
        record.rows_produced = 0;
        record.total_elapsed_ms = 4_000;
        assert!(!classify(&record).is_zero_result_expensive);
        record.total_elapsed_ms = 6_000;
        assert!(classify(&record).is_zero_result_expensive);
    }

    #[test]
    fn cost_categories() {
        assert_eq!(cost_category(0.0), "Zero Cost");
        assert_eq!(cost_category(0.1), "Low Cost");
        assert_eq!(cost_category(0.5), "Medium Cost");
        assert_eq!(cost_category(1.5), "High Cost");
    }

    #[test]
    fn time_categories() {
        // Saturday afternoon.
        let sat = Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap();
        assert_eq!(time_category(sat), "Weekend");

        // Wednesday 23:00 and 03:00 are off hours; 06:00 still is.
        let late = Utc.with_ymd_and_hms(2024, 3, 6, 23, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 6, 3, 0, 0).unwrap();
        let six = Utc.with_ymd_and_hms(2024, 3, 6, 6, 59, 0).unwrap();
        assert_eq!(time_category(late), "Off Hours");
        assert_eq!(time_category(early), "Off Hours");
        assert_eq!(time_category(six), "Off Hours");

        let midday = Utc.with_ymd_and_hms(2024, 3, 6, 11, 0, 0).unwrap();
        assert_eq!(time_category(midday), "Business Hours");
    }

    #[test]
    fn query_type_prefixes() {
        assert_eq!(query_type("  select 1"), "SELECT");
        assert_eq!(query_type("INSERT INTO t VALUES (1)"), "INSERT");
        assert_eq!(query_type("SHOW TABLES"), "OTHER");
    }

    #[test]
    fn partition_percentage_guards_zero() {
        assert_eq!(partition_scan_percentage(5, 0), 0.0);
        assert!((partition_scan_percentage(80, 100) - 80.0).abs() < f64::EPSILON);
    }
}
