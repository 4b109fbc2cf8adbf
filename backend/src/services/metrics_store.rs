//! In-memory store of the latest aggregate tables, one snapshot per
//! dimension, with staleness-driven refresh.
//!
//! Snapshots are immutable once published: a refresh builds a complete new
//! `DimensionSnapshot` and swaps the `Arc` in the map, so concurrent readers
//! always see a whole set, old or new. Refreshes of the same dimension are
//! serialized through a per-dimension mutex and coalesced: whoever loses the
//! race re-checks freshness under the lock and returns the winner's snapshot
//! instead of fetching again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::models::SummaryMetrics;
use crate::services::aggregator;
use crate::services::filter::{self, Filter};
use crate::services::snowflake_client::QueryHistorySource;
use crate::utils::{ApiError, ApiResult};

/// The grouping axes this service serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Warehouses,
    Users,
    Databases,
    Tables,
    Roles,
    Serverless,
    QueryHistory,
    QueryDetails,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Warehouses,
        Dimension::Users,
        Dimension::Databases,
        Dimension::Tables,
        Dimension::Roles,
        Dimension::Serverless,
        Dimension::QueryHistory,
        Dimension::QueryDetails,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Warehouses => "warehouses",
            Dimension::Users => "users",
            Dimension::Databases => "databases",
            Dimension::Tables => "tables",
            Dimension::Roles => "roles",
            Dimension::Serverless => "serverless",
            Dimension::QueryHistory => "query_history",
            Dimension::QueryDetails => "query_details",
        }
    }

    pub fn parse(name: &str) -> ApiResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "warehouses" => Ok(Dimension::Warehouses),
            "users" => Ok(Dimension::Users),
            "databases" => Ok(Dimension::Databases),
            "tables" => Ok(Dimension::Tables),
            "roles" => Ok(Dimension::Roles),
            "serverless" => Ok(Dimension::Serverless),
            "query_history" | "query-history" => Ok(Dimension::QueryHistory),
            "query_details" | "query-details" => Ok(Dimension::QueryDetails),
            other => Err(ApiError::dimension_not_found(other)),
        }
    }
}

/// One published aggregate table.
pub struct DimensionSnapshot {
    pub dimension: Dimension,
    pub rows: Vec<Value>,
    pub computed_at: DateTime<Utc>,
    pub source: String,
    /// Malformed records excluded from this computation.
    pub skipped_records: u64,
}

impl DimensionSnapshot {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub struct MetricsService {
    source: Arc<dyn QueryHistorySource>,
    ttl: Duration,
    snapshots: DashMap<Dimension, Arc<DimensionSnapshot>>,
    refresh_locks: DashMap<Dimension, Arc<Mutex<()>>>,
}

impl MetricsService {
    pub fn new(source: Arc<dyn QueryHistorySource>, ttl_secs: u64) -> Self {
        Self {
            source,
            ttl: Duration::from_secs(ttl_secs),
            snapshots: DashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    fn is_fresh(&self, snapshot: &DimensionSnapshot) -> bool {
        let age = Utc::now().signed_duration_since(snapshot.computed_at);
        age.to_std().map(|age| age < self.ttl).unwrap_or(true)
    }

    fn current(&self, dimension: Dimension) -> Option<Arc<DimensionSnapshot>> {
        self.snapshots.get(&dimension).map(|entry| entry.value().clone())
    }

    fn refresh_lock(&self, dimension: Dimension) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(dimension)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn build_rows(dimension: Dimension, records: &[&crate::models::QueryRecord]) -> ApiResult<Vec<Value>> {
        fn to_values<T: serde::Serialize>(rows: Vec<T>) -> ApiResult<Vec<Value>> {
            rows.into_iter().map(|r| Ok(serde_json::to_value(r)?)).collect()
        }

        match dimension {
            Dimension::Warehouses => to_values(aggregator::build_warehouses(records)),
            Dimension::Users => to_values(aggregator::build_users(records)),
            Dimension::Databases => to_values(aggregator::build_databases(records)),
            Dimension::Tables => to_values(aggregator::build_tables(records)),
            Dimension::Roles => to_values(aggregator::build_roles(records)),
            Dimension::Serverless => to_values(aggregator::build_serverless(records)),
            Dimension::QueryHistory => to_values(aggregator::build_query_history(records)),
            Dimension::QueryDetails => to_values(aggregator::build_query_details(records)),
        }
    }

    /// Recompute one dimension from a fresh source pull and publish it.
    /// On fetch failure the previous snapshot stays in place.
    pub async fn refresh(&self, dimension: Dimension) -> ApiResult<Arc<DimensionSnapshot>> {
        let observed = self.current(dimension).map(|s| s.computed_at);
        let lock = self.refresh_lock(dimension);
        let _guard = lock.lock().await;

        // Coalesce: if another caller published while we waited for the
        // lock, return that snapshot instead of recomputing. A caller who
        // saw the current snapshot before locking still forces a recompute.
        if let Some(snapshot) = self.current(dimension)
            && observed < Some(snapshot.computed_at)
        {
            return Ok(snapshot);
        }

        self.refresh_locked(dimension).await
    }

    async fn refresh_locked(&self, dimension: Dimension) -> ApiResult<Arc<DimensionSnapshot>> {
        tracing::info!(dimension = dimension.as_str(), "Refreshing dimension snapshot");
        let records = self.source.fetch_records().await?;
        let (kept, skipped) = aggregator::partition_well_formed(&records);
        if skipped > 0 {
            tracing::warn!(
                dimension = dimension.as_str(),
                skipped,
                "Excluded malformed records from aggregation"
            );
        }

        let rows = Self::build_rows(dimension, &kept)?;
        let snapshot = Arc::new(DimensionSnapshot {
            dimension,
            rows,
            computed_at: Utc::now(),
            source: self.source.description(),
            skipped_records: skipped,
        });
        self.snapshots.insert(dimension, snapshot.clone());
        tracing::info!(
            dimension = dimension.as_str(),
            rows = snapshot.row_count(),
            "Published dimension snapshot"
        );
        Ok(snapshot)
    }

    /// Refresh every dimension from a single source pull.
    pub async fn refresh_all(&self) -> ApiResult<()> {
        // One fetch shared by all dimensions; per-dimension locks are taken
        // in a fixed order so this cannot deadlock against single refreshes.
        let records = self.source.fetch_records().await?;
        let (kept, skipped) = aggregator::partition_well_formed(&records);

        for dimension in Dimension::ALL {
            let lock = self.refresh_lock(dimension);
            let _guard = lock.lock().await;
            let rows = Self::build_rows(dimension, &kept)?;
            let snapshot = Arc::new(DimensionSnapshot {
                dimension,
                rows,
                computed_at: Utc::now(),
                source: self.source.description(),
                skipped_records: skipped,
            });
            self.snapshots.insert(dimension, snapshot);
        }
        tracing::info!("Refreshed all dimension snapshots");
        Ok(())
    }

    /// Return the dimension's snapshot, refreshing first if missing or
    /// older than the staleness interval.
    pub async fn ensure_fresh(&self, dimension: Dimension) -> ApiResult<Arc<DimensionSnapshot>> {
        if let Some(snapshot) = self.current(dimension)
            && self.is_fresh(&snapshot)
        {
            return Ok(snapshot);
        }
        self.refresh(dimension).await
    }

    /// List rows with equality filters and an optional limit, preserving
    /// the aggregation order.
    pub async fn get(
        &self,
        dimension: Dimension,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> ApiResult<Vec<Value>> {
        let snapshot = self.ensure_fresh(dimension).await?;
        filter::apply_filters(&snapshot.rows, filters, limit)
    }

    /// Detail lookup over the per-query analysis rows.
    pub async fn query_detail(&self, query_id: &str) -> ApiResult<Value> {
        let snapshot = self.ensure_fresh(Dimension::QueryDetails).await?;
        snapshot
            .rows
            .iter()
            .find(|row| row.get("query_id").and_then(Value::as_str) == Some(query_id))
            .cloned()
            .ok_or_else(|| ApiError::query_not_found(query_id))
    }

    /// Query-history rows contributing to one aggregate, located by the
    /// drill-down key field carried on every history row.
    pub async fn drill_down(&self, key_field: &str, key: u64) -> ApiResult<Vec<Value>> {
        self.get(
            Dimension::QueryHistory,
            &[Filter::eq(key_field, key.to_string())],
            None,
        )
        .await
    }

    /// Cross-dimension roll-up derived from the current snapshots.
    pub async fn summary(&self) -> ApiResult<SummaryMetrics> {
        let warehouses = self.ensure_fresh(Dimension::Warehouses).await?;
        let users = self.ensure_fresh(Dimension::Users).await?;
        let databases = self.ensure_fresh(Dimension::Databases).await?;
        let serverless = self.ensure_fresh(Dimension::Serverless).await?;

        fn float_field(row: &Value, field: &str) -> f64 {
            row.get(field).and_then(Value::as_f64).unwrap_or(0.0)
        }
        fn str_field<'a>(row: &'a Value, field: &str) -> Option<&'a str> {
            row.get(field).and_then(Value::as_str)
        }

        let warehouse_credits: f64 =
            warehouses.rows.iter().map(|r| float_field(r, "total_credits")).sum();
        let serverless_credits: f64 =
            serverless.rows.iter().map(|r| float_field(r, "total_credits")).sum();
        let total_credits = warehouse_credits + serverless_credits;

        let distinct_users: std::collections::HashSet<&str> =
            users.rows.iter().filter_map(|r| str_field(r, "user_name")).collect();
        let user_count = distinct_users.len() as u64;

        // Row sets are ordered by credits descending, so the first row is
        // the top pick and ties keep first-encounter order.
        Ok(SummaryMetrics {
            total_warehouses: warehouses.row_count() as u64,
            total_credits_used: total_credits,
            active_users: user_count,
            databases_count: databases.row_count() as u64,
            serverless_services_count: serverless.row_count() as u64,
            average_credits_per_user: if user_count > 0 {
                total_credits / user_count as f64
            } else {
                0.0
            },
            top_warehouse: warehouses
                .rows
                .first()
                .and_then(|r| str_field(r, "warehouse_name"))
                .map(str::to_string),
            highest_cost_user: users
                .rows
                .first()
                .and_then(|r| str_field(r, "user_name"))
                .map(str::to_string),
            largest_database: databases
                .rows
                .first()
                .and_then(|r| str_field(r, "database_name"))
                .map(str::to_string),
            timestamp: Utc::now(),
        })
    }

    /// Per-dimension status for the health endpoint: row counts, ages, and
    /// the skipped-record tallies.
    pub fn status(&self) -> Vec<Value> {
        Dimension::ALL
            .iter()
            .map(|dimension| match self.current(*dimension) {
                Some(snapshot) => serde_json::json!({
                    "dimension": dimension.as_str(),
                    "rows": snapshot.row_count(),
                    "computed_at": snapshot.computed_at,
                    "stale": !self.is_fresh(&snapshot),
                    "source": snapshot.source,
                    "skipped_records": snapshot.skipped_records,
                }),
                None => serde_json::json!({
                    "dimension": dimension.as_str(),
                    "rows": 0,
                    "computed_at": Value::Null,
                    "stale": true,
                    "source": Value::Null,
                    "skipped_records": 0,
                }),
            })
            .collect()
    }
}
