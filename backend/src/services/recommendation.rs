//! Advisory text derived from aggregate rollups.
//!
//! Each category evaluates an ordered rule list and reports the first match;
//! a default "looks good" message covers the no-match case. Rule order is
//! load-bearing: several thresholds can hold at once and only the first is
//! reported. The per-query advisory list is the one exception, it collects
//! every matching rule.

use crate::services::classifier::ClassificationFlags;

/// Warehouse performance advisory.
pub fn warehouse_performance(
    avg_queue_ms: f64,
    long_running_queries: u64,
    spilled_remote_queries: u64,
) -> &'static str {
    if avg_queue_ms > 10_000.0 {
        "Consider increasing warehouse size or using multi-cluster"
    } else if long_running_queries > 50 {
        "Review long-running queries for optimization"
    } else if spilled_remote_queries > 20 {
        "Increase warehouse size to reduce spilling"
    } else {
        "Performance looks good"
    }
}

/// Warehouse cost advisory.
pub fn warehouse_cost(
    weekend_credits: f64,
    total_credits: f64,
    avg_credits_per_query: f64,
) -> &'static str {
    if weekend_credits > total_credits * 0.3 {
        "High weekend usage - consider auto-suspend"
    } else if avg_credits_per_query < 0.1 {
        "Consider using smaller warehouse size"
    } else {
        "Cost efficiency looks reasonable"
    }
}

/// Cost tier label for a (user, warehouse) aggregate.
pub fn user_cost_category(total_credits: f64) -> &'static str {
    if total_credits > 100.0 {
        "High Cost User"
    } else if total_credits > 50.0 {
        "Medium Cost User"
    } else {
        "Low Cost User"
    }
}

/// Behavioural status for a (user, warehouse) aggregate.
pub fn user_optimization_status(
    select_star_queries: u64,
    unpartitioned_scan_queries: u64,
    spilled_queries: u64,
    failed_queries: u64,
) -> &'static str {
    if select_star_queries + unpartitioned_scan_queries + spilled_queries > 10 {
        "Needs Optimization Training"
    } else if failed_queries > 5 {
        "Needs Query Review"
    } else {
        "Good Practices"
    }
}

/// Database storage advisory, driven by scan volume since this service only
/// sees the query feed, not storage metrics.
pub fn database_storage(
    unpartitioned_scan_queries: u64,
    avg_gb_scanned_per_query: f64,
) -> &'static str {
    if unpartitioned_scan_queries > 100 {
        "Consider database partitioning or archival"
    } else if avg_gb_scanned_per_query > 100.0 {
        "Review large tables for optimization"
    } else {
        "Storage optimization looks good"
    }
}

/// Per-table advisory.
pub fn table_optimization(
    full_table_scans: u64,
    select_star_count: u64,
    query_count: u64,
) -> &'static str {
    if full_table_scans > 10 {
        "Add clustering keys or partitioning"
    } else if query_count > 0 && select_star_count * 2 > query_count {
        "Replace SELECT * with specific columns"
    } else {
        "Table optimization looks good"
    }
}

/// Role security advisory.
pub fn role_security(unique_users: u64, total_credits: f64) -> &'static str {
    if unique_users == 0 {
        "Unused role - consider removal"
    } else if total_credits > 1_000.0 && unique_users == 1 {
        "High-cost single user role - review necessity"
    } else {
        "Role usage looks appropriate"
    }
}

/// Serverless service advisory. Thresholds differ per service type.
pub fn serverless_optimization(
    service_type: &str,
    error_rate_pct: f64,
    avg_credits_per_execution: f64,
) -> &'static str {
    if service_type == "SNOWPIPE" && error_rate_pct > 5.0 {
        "Review pipe configuration and source data quality"
    } else if service_type == "TASK" && error_rate_pct > 10.0 {
        "Review task logic and dependencies"
    } else if service_type == "SNOWPIPE" && avg_credits_per_execution > 1.0 {
        "Consider batching smaller files"
    } else if service_type == "TASK" && avg_credits_per_execution > 5.0 {
        "Optimize task queries"
    } else {
        "Service performance looks good"
    }
}

/// Every advisory that applies to one query, in rule order. Unlike the
/// aggregate categories this list is cumulative.
pub fn query_advisories(flags: &ClassificationFlags, cost_per_gb_scanned: f64) -> Vec<String> {
    let mut out = Vec::new();
    if flags.is_unpartitioned_scan {
        out.push("Add WHERE clause to filter partitions".to_string());
    }
    if flags.is_select_star_on_large_scan {
        out.push("Replace SELECT * with specific columns".to_string());
    }
    if flags.is_spilled_local {
        out.push("Increase warehouse size to reduce spilling".to_string());
    }
    if flags.is_spilled_remote {
        out.push("Significantly increase warehouse size - remote spilling detected".to_string());
    }
    if flags.is_high_compile_time {
        out.push("Query compilation is slow - consider simplifying".to_string());
    }
    if flags.is_zero_result_expensive {
        out.push("Query returns no results but takes time - check logic".to_string());
    }
    if cost_per_gb_scanned > 1.0 {
        out.push("High cost per GB scanned - optimize data access patterns".to_string());
    }
    if flags.is_cartesian_join {
        out.push("Cartesian join detected - add proper join conditions".to_string());
    }
    if flags.is_missing_where_clause {
        out.push("Large scan without WHERE clause - add filters".to_string());
    }
    out
}
