//! Dimension rollups over the raw query-history feed.
//!
//! Each `build_*` function groups the record set by one dimension key and
//! produces one aggregate row per distinct key value, with deterministic
//! ordering so repeated runs over the same records yield identical output.
//! Null dimension values are coalesced to "UNKNOWN" rather than dropped;
//! the one exception is the warehouse axis, where records without a
//! warehouse belong to the serverless dimension instead.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    BadPracticeCounts, DatabaseMetrics, PerformanceBuckets, QueryDetails, QueryHistoryRow,
    QueryRecord, RoleMetrics, ServerlessMetrics, TableMetrics,
    UserWarehouseMetrics, WarehouseMetrics,
};
use crate::services::classifier::{
    self, ClassificationFlags, USD_PER_CREDIT, classify, partition_scan_percentage,
};
use crate::services::drilldown::{composite_key, surrogate_key};
use crate::services::recommendation;

pub const UNKNOWN: &str = "UNKNOWN";

static FROM_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bFROM\s+([A-Za-z_][A-Za-z0-9_.$]*)"#).expect("static regex")
});

/// Split a record set into well-formed records and a skipped tally.
/// Malformed records never abort a refresh, they are counted and dropped.
pub fn partition_well_formed(records: &[QueryRecord]) -> (Vec<&QueryRecord>, u64) {
    let mut kept = Vec::with_capacity(records.len());
    let mut skipped = 0u64;
    for record in records {
        if record.is_well_formed() {
            kept.push(record);
        } else {
            skipped += 1;
        }
    }
    (kept, skipped)
}

fn coalesce(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(s) if !s.trim().is_empty() => s,
        _ => UNKNOWN,
    }
}

fn avg(sum: f64, count: u64) -> f64 {
    if count > 0 { sum / count as f64 } else { 0.0 }
}

/// Shared per-group accumulator used by every dimension.
#[derive(Default)]
struct GroupAcc {
    queries: u64,
    credits: f64,
    elapsed_ms_sum: f64,
    queue_ms_sum: f64,
    gb_scanned: f64,
    rows_produced: i64,
    users: HashSet<String>,
    warehouses: HashSet<String>,
    databases: HashSet<String>,
    schemas: HashSet<String>,
    days: HashSet<NaiveDate>,
    buckets: PerformanceBuckets,
    bad_practices: BadPracticeCounts,
    weekend_credits: f64,
    off_hours_credits: f64,
    expensive_queries: u64,
}

impl GroupAcc {
    fn absorb(&mut self, record: &QueryRecord, flags: &ClassificationFlags) {
        let credits = record.total_credits();
        self.queries += 1;
        self.credits += credits;
        self.elapsed_ms_sum += record.total_elapsed_ms as f64;
        self.queue_ms_sum += record.queue_ms as f64;
        self.gb_scanned += record.gb_scanned();
        self.rows_produced += record.rows_produced;
        self.users.insert(coalesce(&record.user_name).to_string());
        if let Some(wh) = record.warehouse_name.as_deref() {
            self.warehouses.insert(wh.to_string());
        }
        self.databases.insert(coalesce(&record.database_name).to_string());
        self.schemas.insert(coalesce(&record.schema_name).to_string());
        self.days.insert(record.start_time.date_naive());
        self.buckets.record(record.total_elapsed_ms);
        self.bad_practices.absorb(flags);
        if classifier::is_weekend(record.start_time) {
            self.weekend_credits += credits;
        } else if classifier::is_off_hours(record.start_time) {
            self.off_hours_credits += credits;
        }
        if credits > 1.0 {
            self.expensive_queries += 1;
        }
    }
}

/// One aggregate row per warehouse. Records without a warehouse are handled
/// by `build_serverless` and excluded here.
pub fn build_warehouses(records: &[&QueryRecord]) -> Vec<WarehouseMetrics> {
    let mut groups: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for record in records {
        let Some(warehouse) = record.warehouse_name.as_deref() else {
            continue;
        };
        let flags = classify(record);
        groups.entry(warehouse.to_string()).or_default().absorb(record, &flags);
    }

    let mut rows: Vec<WarehouseMetrics> = groups
        .into_iter()
        .map(|(name, acc)| WarehouseMetrics {
            // Hash of the name, never the source's numeric id: every row in
            // every dimension must derive the key the same way or the
            // drill-down joins break.
            warehouse_id: surrogate_key(&name),
            warehouse_name: name,
            total_queries: acc.queries,
            unique_users: acc.users.len() as u64,
            total_credits: acc.credits,
            avg_credits_per_query: avg(acc.credits, acc.queries),
            active_days: acc.days.len() as u64,
            avg_execution_time_ms: avg(acc.elapsed_ms_sum, acc.queries),
            total_gb_scanned: acc.gb_scanned,
            total_rows_produced: acc.rows_produced,
            weekend_credits: acc.weekend_credits,
            off_hours_credits: acc.off_hours_credits,
            avg_queue_wait_time_ms: avg(acc.queue_ms_sum, acc.queries),
            performance_recommendation: recommendation::warehouse_performance(
                avg(acc.queue_ms_sum, acc.queries),
                acc.bad_practices.long_running_queries,
                acc.bad_practices.spilled_to_remote_queries,
            )
            .to_string(),
            cost_recommendation: recommendation::warehouse_cost(
                acc.weekend_credits,
                acc.credits,
                avg(acc.credits, acc.queries),
            )
            .to_string(),
            buckets: acc.buckets,
            bad_practices: acc.bad_practices,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_credits
            .total_cmp(&a.total_credits)
            .then_with(|| a.warehouse_name.cmp(&b.warehouse_name))
    });
    rows
}

/// One aggregate row per (user, warehouse) pair, with a second pass for the
/// share-of-parent percentages once warehouse totals are known.
pub fn build_users(records: &[&QueryRecord]) -> Vec<UserWarehouseMetrics> {
    let mut groups: BTreeMap<(String, String), GroupAcc> = BTreeMap::new();
    let mut warehouse_totals: BTreeMap<String, (f64, u64)> = BTreeMap::new();

    for record in records {
        let user = coalesce(&record.user_name).to_string();
        let warehouse = coalesce(&record.warehouse_name).to_string();
        let flags = classify(record);
        groups.entry((user, warehouse.clone())).or_default().absorb(record, &flags);
        let totals = warehouse_totals.entry(warehouse).or_default();
        totals.0 += record.total_credits();
        totals.1 += 1;
    }

    let mut rows: Vec<UserWarehouseMetrics> = groups
        .into_iter()
        .map(|((user, warehouse), acc)| {
            let (parent_credits, parent_queries) =
                warehouse_totals.get(&warehouse).copied().unwrap_or((0.0, 0));
            let pct_credits = if parent_credits > 0.0 {
                acc.credits / parent_credits * 100.0
            } else {
                0.0
            };
            let pct_queries = if parent_queries > 0 {
                acc.queries as f64 / parent_queries as f64 * 100.0
            } else {
                0.0
            };
            UserWarehouseMetrics {
                user_warehouse_id: composite_key(&user, &warehouse),
                warehouse_id: surrogate_key(&warehouse),
                total_queries: acc.queries,
                total_credits: acc.credits,
                avg_credits_per_query: avg(acc.credits, acc.queries),
                total_gb_scanned: acc.gb_scanned,
                avg_execution_time_ms: avg(acc.elapsed_ms_sum, acc.queries),
                active_days: acc.days.len() as u64,
                percentage_of_warehouse_credits: pct_credits,
                percentage_of_warehouse_queries: pct_queries,
                weekend_credits: acc.weekend_credits,
                off_hours_credits: acc.off_hours_credits,
                expensive_queries: acc.expensive_queries,
                cost_category: recommendation::user_cost_category(acc.credits).to_string(),
                optimization_status: recommendation::user_optimization_status(
                    acc.bad_practices.select_star_on_large_scan_queries,
                    acc.bad_practices.unpartitioned_scan_queries,
                    acc.bad_practices.spilled_to_local_queries
                        + acc.bad_practices.spilled_to_remote_queries,
                    acc.bad_practices.failed_cancelled_queries,
                )
                .to_string(),
                buckets: acc.buckets,
                bad_practices: acc.bad_practices,
                user_name: user,
                warehouse_name: warehouse,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_credits.total_cmp(&a.total_credits).then_with(|| {
            a.user_name
                .cmp(&b.user_name)
                .then_with(|| a.warehouse_name.cmp(&b.warehouse_name))
        })
    });
    rows
}

/// One aggregate row per database.
pub fn build_databases(records: &[&QueryRecord]) -> Vec<DatabaseMetrics> {
    let mut groups: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for record in records {
        let database = coalesce(&record.database_name).to_string();
        let flags = classify(record);
        groups.entry(database).or_default().absorb(record, &flags);
    }

    let mut rows: Vec<DatabaseMetrics> = groups
        .into_iter()
        .map(|(name, acc)| DatabaseMetrics {
            database_id: surrogate_key(&name),
            total_queries: acc.queries,
            unique_users: acc.users.len() as u64,
            unique_warehouses: acc.warehouses.len() as u64,
            unique_schemas: acc.schemas.len() as u64,
            active_days: acc.days.len() as u64,
            total_credits: acc.credits,
            avg_execution_time_ms: avg(acc.elapsed_ms_sum, acc.queries),
            total_gb_scanned: acc.gb_scanned,
            avg_gb_scanned_per_query: avg(acc.gb_scanned, acc.queries),
            storage_recommendation: recommendation::database_storage(
                acc.bad_practices.unpartitioned_scan_queries,
                avg(acc.gb_scanned, acc.queries),
            )
            .to_string(),
            buckets: acc.buckets,
            bad_practices: acc.bad_practices,
            database_name: name,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_credits
            .total_cmp(&a.total_credits)
            .then_with(|| a.database_name.cmp(&b.database_name))
    });
    rows
}

/// Extract the table references a query reads from, by scanning FROM clauses.
/// Text matching, not a SQL parse, so attribution is best-effort.
fn table_references(query_text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in FROM_TABLE_RE.captures_iter(query_text) {
        if let Some(m) = caps.get(1) {
            // Qualified names keep only the trailing component.
            let table = m
                .as_str()
                .rsplit('.')
                .next()
                .unwrap_or(m.as_str())
                .to_uppercase();
            if seen.insert(table.clone()) {
                out.push(table);
            }
        }
    }
    out
}

/// One aggregate row per (database, table-reference) pair.
pub fn build_tables(records: &[&QueryRecord]) -> Vec<TableMetrics> {
    struct TableAcc {
        queries: u64,
        select_star: u64,
        gb_scanned: f64,
        elapsed_ms_sum: f64,
        users: HashSet<String>,
        buckets: PerformanceBuckets,
        bad_practices: BadPracticeCounts,
    }

    let mut groups: BTreeMap<(String, String), TableAcc> = BTreeMap::new();
    for record in records {
        let database = coalesce(&record.database_name).to_string();
        let flags = classify(record);
        let is_select_star = record.query_text.to_uppercase().contains("SELECT *");
        for table in table_references(&record.query_text) {
            let acc = groups.entry((database.clone(), table)).or_insert_with(|| TableAcc {
                queries: 0,
                select_star: 0,
                gb_scanned: 0.0,
                elapsed_ms_sum: 0.0,
                users: HashSet::new(),
                buckets: PerformanceBuckets::default(),
                bad_practices: BadPracticeCounts::default(),
            });
            acc.queries += 1;
            acc.select_star += is_select_star as u64;
            acc.gb_scanned += record.gb_scanned();
            acc.elapsed_ms_sum += record.total_elapsed_ms as f64;
            acc.users.insert(coalesce(&record.user_name).to_string());
            acc.buckets.record(record.total_elapsed_ms);
            acc.bad_practices.absorb(&flags);
        }
    }

    let mut rows: Vec<TableMetrics> = groups
        .into_iter()
        .map(|((database, table), acc)| TableMetrics {
            table_id: composite_key(&database, &table),
            query_count: acc.queries,
            select_star_count: acc.select_star,
            total_gb_scanned: acc.gb_scanned,
            avg_execution_time_ms: avg(acc.elapsed_ms_sum, acc.queries),
            unique_users_accessing: acc.users.len() as u64,
            optimization_recommendation: recommendation::table_optimization(
                acc.bad_practices.unpartitioned_scan_queries,
                acc.select_star,
                acc.queries,
            )
            .to_string(),
            buckets: acc.buckets,
            bad_practices: acc.bad_practices,
            database_name: database,
            table_name: table,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.query_count.cmp(&a.query_count).then_with(|| {
            a.database_name
                .cmp(&b.database_name)
                .then_with(|| a.table_name.cmp(&b.table_name))
        })
    });
    rows
}

/// One aggregate row per role.
pub fn build_roles(records: &[&QueryRecord]) -> Vec<RoleMetrics> {
    let mut groups: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for record in records {
        let role = coalesce(&record.role_name).to_string();
        let flags = classify(record);
        groups.entry(role).or_default().absorb(record, &flags);
    }

    let mut rows: Vec<RoleMetrics> = groups
        .into_iter()
        .map(|(name, acc)| RoleMetrics {
            role_id: surrogate_key(&name),
            unique_users: acc.users.len() as u64,
            total_queries: acc.queries,
            total_credits: acc.credits,
            warehouses_used: acc.warehouses.len() as u64,
            databases_accessed: acc.databases.len() as u64,
            avg_execution_time_ms: avg(acc.elapsed_ms_sum, acc.queries),
            security_recommendation: recommendation::role_security(
                acc.users.len() as u64,
                acc.credits,
            )
            .to_string(),
            buckets: acc.buckets,
            bad_practices: acc.bad_practices,
            role_name: name,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_credits
            .total_cmp(&a.total_credits)
            .then_with(|| a.role_name.cmp(&b.role_name))
    });
    rows
}

/// Infer the serverless service type from the statement text.
fn service_type(query_text: &str) -> &'static str {
    let upper = query_text.trim_start().to_uppercase();
    if upper.contains("COPY INTO") {
        "SNOWPIPE"
    } else if upper.starts_with("CALL") {
        "TASK"
    } else {
        "CLOUD_SERVICES"
    }
}

/// One aggregate row per serverless service: executions that ran without a
/// user warehouse, grouped by inferred type and run-as user.
pub fn build_serverless(records: &[&QueryRecord]) -> Vec<ServerlessMetrics> {
    struct ServerlessAcc {
        executions: u64,
        credits: f64,
        rows_processed: i64,
        errors: u64,
        buckets: PerformanceBuckets,
        bad_practices: BadPracticeCounts,
    }

    let mut groups: BTreeMap<(String, String), ServerlessAcc> = BTreeMap::new();
    for record in records {
        if record.warehouse_name.is_some() {
            continue;
        }
        let kind = service_type(&record.query_text).to_string();
        let name = coalesce(&record.user_name).to_string();
        let flags = classify(record);
        let acc = groups.entry((kind, name)).or_insert_with(|| ServerlessAcc {
            executions: 0,
            credits: 0.0,
            rows_processed: 0,
            errors: 0,
            buckets: PerformanceBuckets::default(),
            bad_practices: BadPracticeCounts::default(),
        });
        acc.executions += 1;
        acc.credits += record.total_credits();
        acc.rows_processed += record.rows_produced
            + record.rows_inserted
            + record.rows_updated
            + record.rows_deleted;
        acc.errors += flags.is_failed as u64;
        acc.buckets.record(record.total_elapsed_ms);
        acc.bad_practices.absorb(&flags);
    }

    let mut rows: Vec<ServerlessMetrics> = groups
        .into_iter()
        .map(|((kind, name), acc)| {
            let error_rate = if acc.executions > 0 {
                acc.errors as f64 / acc.executions as f64 * 100.0
            } else {
                0.0
            };
            let avg_credits = avg(acc.credits, acc.executions);
            ServerlessMetrics {
                service_id: composite_key(&kind, &name),
                executions_count: acc.executions,
                total_credits: acc.credits,
                avg_credits_per_execution: avg_credits,
                rows_processed: acc.rows_processed,
                error_count: acc.errors,
                error_rate_pct: error_rate,
                optimization_recommendation: recommendation::serverless_optimization(
                    &kind, error_rate, avg_credits,
                )
                .to_string(),
                buckets: acc.buckets,
                bad_practices: acc.bad_practices,
                service_type: kind,
                service_name: name,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_credits.total_cmp(&a.total_credits).then_with(|| {
            a.service_type
                .cmp(&b.service_type)
                .then_with(|| a.service_name.cmp(&b.service_name))
        })
    });
    rows
}

/// The flat, enriched query-history listing with drill-down foreign keys.
pub fn build_query_history(records: &[&QueryRecord]) -> Vec<QueryHistoryRow> {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let mut rows: Vec<QueryHistoryRow> = records
        .iter()
        .map(|record| {
            let flags = classify(record);
            let user = coalesce(&record.user_name);
            let warehouse = coalesce(&record.warehouse_name);
            QueryHistoryRow {
                query_id: record.query_id.clone(),
                query_text_preview: record.text_preview(),
                user_name: user.to_string(),
                role_name: coalesce(&record.role_name).to_string(),
                warehouse_name: warehouse.to_string(),
                database_name: coalesce(&record.database_name).to_string(),
                schema_name: coalesce(&record.schema_name).to_string(),
                start_time: record.start_time,
                end_time: record.end_time,
                execution_time_ms: record.total_elapsed_ms,
                compilation_time_ms: record.compilation_ms,
                queue_time_ms: record.queue_ms,
                execution_status: record.execution_status.as_str().to_string(),
                error_code: record.error_code.clone(),
                error_message: record.error_message.clone(),
                gb_scanned: record.gb_scanned(),
                rows_produced: record.rows_produced,
                rows_inserted: record.rows_inserted,
                rows_updated: record.rows_updated,
                rows_deleted: record.rows_deleted,
                credits_used_compute: record.credits_compute,
                credits_used_cloud_services: record.credits_cloud_services,
                total_credits_used: record.total_credits(),
                partitions_scanned: record.partitions_scanned,
                partitions_total: record.partitions_total,
                gb_spilled_local: record.bytes_spilled_local as f64 / GIB,
                gb_spilled_remote: record.bytes_spilled_remote as f64 / GIB,
                is_select_star_large: flags.is_select_star_on_large_scan,
                is_unpartitioned_scan: flags.is_unpartitioned_scan,
                is_cartesian_join: flags.is_cartesian_join,
                is_zero_result_expensive: flags.is_zero_result_expensive,
                is_failed: flags.is_failed,
                is_high_compile_time: flags.is_high_compile_time,
                is_spilled_local: flags.is_spilled_local,
                is_spilled_remote: flags.is_spilled_remote,
                is_long_running: flags.is_long_running,
                is_high_queue_time: flags.is_high_queue_time,
                is_missing_where_clause: flags.is_missing_where_clause,
                performance_bucket: classifier::performance_bucket(record.total_elapsed_ms)
                    .to_string(),
                cost_category: classifier::cost_category(record.total_credits()).to_string(),
                time_category: classifier::time_category(record.start_time).to_string(),
                query_type: classifier::query_type(&record.query_text).to_string(),
                user_warehouse_id: composite_key(user, warehouse),
                warehouse_id: surrogate_key(warehouse),
                database_id: surrogate_key(coalesce(&record.database_name)),
                role_id: surrogate_key(coalesce(&record.role_name)),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.query_id.cmp(&b.query_id))
    });
    rows
}

/// Per-query deep-dive rows keyed by query id.
pub fn build_query_details(records: &[&QueryRecord]) -> Vec<QueryDetails> {
    let mut rows: Vec<QueryDetails> = records
        .iter()
        .map(|record| {
            let flags = classify(record);
            let credits = record.total_credits();
            let gb = record.gb_scanned();
            let cost_per_gb = if gb > 0.0 { credits / gb } else { 0.0 };
            let seconds = record.total_elapsed_ms as f64 / 1000.0;
            QueryDetails {
                query_id: record.query_id.clone(),
                query_text: record.query_text.clone(),
                execution_time_ms: record.total_elapsed_ms,
                compilation_time_ms: record.compilation_ms,
                bytes_scanned: record.bytes_scanned,
                rows_produced: record.rows_produced,
                total_credits: credits,
                partitions_scanned: record.partitions_scanned,
                partitions_total: record.partitions_total,
                bytes_spilled_local: record.bytes_spilled_local,
                bytes_spilled_remote: record.bytes_spilled_remote,
                estimated_cost_usd: credits * USD_PER_CREDIT,
                cost_per_gb_scanned: cost_per_gb,
                rows_per_second: if seconds > 0.0 {
                    record.rows_produced as f64 / seconds
                } else {
                    0.0
                },
                rows_per_gb_scanned: if gb > 0.0 {
                    record.rows_produced as f64 / gb
                } else {
                    0.0
                },
                partition_scan_percentage: partition_scan_percentage(
                    record.partitions_scanned,
                    record.partitions_total,
                ),
                optimization_recommendations: recommendation::query_advisories(
                    &flags,
                    cost_per_gb,
                ),
                cost_impact: classifier::cost_impact(credits).to_string(),
                performance_impact: classifier::performance_impact(record.total_elapsed_ms)
                    .to_string(),
            }
        })
        .collect();

    rows.sort_by(|a, b| a.query_id.cmp(&b.query_id));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionStatus;
    use chrono::{TimeZone, Utc};

    fn record(
        id: &str,
        user: Option<&str>,
        warehouse: Option<&str>,
        credits: f64,
        elapsed_ms: i64,
    ) -> QueryRecord {
        QueryRecord {
            query_id: id.to_string(),
            query_text: "SELECT c FROM orders WHERE c > 0".to_string(),
            user_name: user.map(str::to_string),
            role_name: Some("ANALYST".to_string()),
            warehouse_name: warehouse.map(str::to_string),
            warehouse_id: None,
            database_name: Some("SALES".to_string()),
            schema_name: Some("PUBLIC".to_string()),
            start_time: Utc.with_ymd_and_hms(2024, 3, 6, 14, 0, 0).unwrap(),
            end_time: None,
            total_elapsed_ms: elapsed_ms,
            compilation_ms: 50,
            queue_ms: 0,
            execution_status: ExecutionStatus::Success,
            error_code: None,
            error_message: None,
            bytes_scanned: 1024,
            bytes_spilled_local: 0,
            bytes_spilled_remote: 0,
            rows_produced: 5,
            rows_inserted: 0,
            rows_updated: 0,
            rows_deleted: 0,
            partitions_scanned: 1,
            partitions_total: 4,
            credits_compute: credits,
            credits_cloud_services: 0.0,
        }
    }

    fn refs(records: &[QueryRecord]) -> Vec<&QueryRecord> {
        records.iter().collect()
    }

    #[test]
    fn bucket_counts_partition_the_group() {
        let records = vec![
            record("q1", Some("A"), Some("WH1"), 0.1, 500),
            record("q2", Some("A"), Some("WH1"), 0.1, 5_000),
            record("q3", Some("A"), Some("WH1"), 0.1, 400_000),
        ];
        let rows = build_warehouses(&refs(&records));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].buckets.total(), rows[0].total_queries);
    }

    #[test]
    fn flag_counts_never_exceed_query_count() {
        let mut failing = record("q1", Some("A"), Some("WH1"), 0.1, 500);
        failing.execution_status = ExecutionStatus::Fail;
        let records = vec![failing, record("q2", Some("A"), Some("WH1"), 0.1, 500)];
        let rows = build_warehouses(&refs(&records));
        assert!(rows[0].bad_practices.max_count() <= rows[0].total_queries);
        assert_eq!(rows[0].bad_practices.failed_cancelled_queries, 1);
    }

    #[test]
    fn null_user_coalesces_to_unknown() {
        let records = vec![record("q1", None, Some("WH1"), 0.1, 500)];
        let rows = build_users(&refs(&records));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_name, "UNKNOWN");
    }

    #[test]
    fn user_percentages_are_bounded_and_sum_to_parent() {
        let records = vec![
            record("q1", Some("A"), Some("WH1"), 3.0, 500),
            record("q2", Some("B"), Some("WH1"), 1.0, 500),
        ];
        let rows = build_users(&refs(&records));
        let sum: f64 = rows.iter().map(|r| r.percentage_of_warehouse_credits).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        for row in &rows {
            assert!(row.percentage_of_warehouse_credits >= 0.0);
            assert!(row.percentage_of_warehouse_credits <= 100.0);
        }
    }

    #[test]
    fn zero_credit_parent_yields_zero_percentages() {
        let records = vec![record("q1", Some("A"), Some("WH1"), 0.0, 500)];
        let rows = build_users(&refs(&records));
        assert_eq!(rows[0].percentage_of_warehouse_credits, 0.0);
        // Query share still computes from counts.
        assert_eq!(rows[0].percentage_of_warehouse_queries, 100.0);
    }

    #[test]
    fn rows_order_by_credits_desc_then_name() {
        let records = vec![
            record("q1", Some("A"), Some("WH_SMALL"), 1.0, 500),
            record("q2", Some("A"), Some("WH_BIG"), 5.0, 500),
            record("q3", Some("A"), Some("WH_ALSO_SMALL"), 1.0, 500),
        ];
        let rows = build_warehouses(&refs(&records));
        let names: Vec<&str> = rows.iter().map(|r| r.warehouse_name.as_str()).collect();
        assert_eq!(names, vec!["WH_BIG", "WH_ALSO_SMALL", "WH_SMALL"]);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let records = vec![
            record("q1", Some("A"), Some("WH1"), 1.0, 500),
            record("q2", Some("B"), Some("WH2"), 2.0, 1_500),
            record("q3", None, None, 0.5, 50),
        ];
        let first = serde_json::to_string(&build_users(&refs(&records))).unwrap();
        let second = serde_json::to_string(&build_users(&refs(&records))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn serverless_groups_only_records_without_warehouse() {
        let mut copy_into = record("q1", Some("LOADER"), None, 0.2, 500);
        copy_into.query_text = "COPY INTO t FROM @stage".to_string();
        let mut task = record("q2", Some("TASK_RUNNER"), None, 5.5, 500);
        task.query_text = "CALL maintenance_proc()".to_string();
        let records = vec![
            copy_into,
            task,
            record("q3", Some("A"), Some("WH1"), 1.0, 500),
        ];

        let rows = build_serverless(&refs(&records));
        assert_eq!(rows.len(), 2);
        let kinds: HashSet<&str> = rows.iter().map(|r| r.service_type.as_str()).collect();
        assert!(kinds.contains("SNOWPIPE"));
        assert!(kinds.contains("TASK"));
    }

    #[test]
    fn table_references_handle_qualified_names() {
        let tables = table_references("SELECT * FROM db.schema.orders o JOIN x ON 1=1");
        assert_eq!(tables, vec!["ORDERS".to_string()]);
    }

    #[test]
    fn query_history_keys_join_back_to_aggregates() {
        let records = vec![record("q1", Some("A"), Some("WH1"), 1.0, 500)];
        let history = build_query_history(&refs(&records));
        let users = build_users(&refs(&records));
        let warehouses = build_warehouses(&refs(&records));
        assert_eq!(history[0].user_warehouse_id, users[0].user_warehouse_id);
        assert_eq!(history[0].warehouse_id, warehouses[0].warehouse_id);
    }

    #[test]
    fn malformed_records_are_skipped_and_counted() {
        let records = vec![
            record("", Some("A"), Some("WH1"), 1.0, 500),
            record("q2", Some("A"), Some("WH1"), 1.0, 500),
        ];
        let (kept, skipped) = partition_well_formed(&records);
        assert_eq!(kept.len(), 1);
        assert_eq!(skipped, 1);
    }
}
