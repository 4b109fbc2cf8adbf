// Metrics store behavior: refresh, staleness, filtering, and lookups.

use crate::services::{Dimension, Filter};
use crate::tests::common::{CountingSource, fresh_service, record, stale_service};
use crate::utils::ApiError;

#[tokio::test]
async fn refresh_is_idempotent_for_unchanged_source() {
    let records = vec![
        record("q1", "ALICE", "WH1", 2.0),
        record("q2", "BOB", "WH1", 0.5),
        record("q3", "ALICE", "WH2", 1.0),
    ];
    let (_, service) = stale_service(records);

    let first = service.refresh(Dimension::Users).await.unwrap();
    let second = service.refresh(Dimension::Users).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.rows).unwrap(),
        serde_json::to_string(&second.rows).unwrap()
    );
    assert!(second.computed_at >= first.computed_at);
}

#[tokio::test]
async fn get_applies_filters_limit_and_preserves_order() {
    let mut records = Vec::new();
    for i in 0..20 {
        // Descending credits so row order is deterministic and visible.
        records.push(record(
            &format!("q{}", i),
            &format!("USER_{:02}", i),
            if i % 2 == 0 { "WH1" } else { "WH2" },
            (20 - i) as f64,
        ));
    }
    let (_, service) = fresh_service(records);

    let rows = service
        .get(Dimension::Users, &[Filter::eq("warehouse_name", "WH1")], Some(10))
        .await
        .unwrap();

    assert_eq!(rows.len(), 10);
    let mut last_credits = f64::INFINITY;
    for row in &rows {
        assert_eq!(row["warehouse_name"], "WH1");
        let credits = row["total_credits"].as_f64().unwrap();
        assert!(credits <= last_credits, "rows must keep aggregation order");
        last_credits = credits;
    }
}

#[tokio::test]
async fn unknown_filter_field_is_rejected() {
    let (_, service) = fresh_service(vec![record("q1", "ALICE", "WH1", 1.0)]);

    let err = service
        .get(Dimension::Warehouses, &[Filter::eq("warehose_name", "WH1")], None)
        .await;
    assert!(matches!(err, Err(ApiError::InvalidFilter(_))));
}

#[tokio::test]
async fn fresh_snapshot_serves_reads_without_refetching() {
    let (source, service) = fresh_service(vec![record("q1", "ALICE", "WH1", 1.0)]);

    service.get(Dimension::Warehouses, &[], None).await.unwrap();
    service.get(Dimension::Warehouses, &[], None).await.unwrap();
    service.get(Dimension::Warehouses, &[], None).await.unwrap();

    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn stale_snapshot_triggers_one_refresh_per_read() {
    let (source, service) = stale_service(vec![record("q1", "ALICE", "WH1", 1.0)]);

    service.get(Dimension::Warehouses, &[], None).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    service.get(Dimension::Warehouses, &[], None).await.unwrap();
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn concurrent_refreshes_coalesce() {
    let source = CountingSource::with_delay(vec![record("q1", "ALICE", "WH1", 1.0)], 25);
    let service =
        std::sync::Arc::new(crate::services::MetricsService::new(source.clone(), 3_600));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.refresh(Dimension::Warehouses).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // The lock winner fetches; everyone else finds a fresh snapshot under
    // the lock and returns it.
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_snapshot() {
    let (source, service) = stale_service(vec![record("q1", "ALICE", "WH1", 1.0)]);

    let before = service.refresh(Dimension::Warehouses).await.unwrap();
    assert_eq!(before.row_count(), 1);

    source.set_failing(true);
    let err = service.get(Dimension::Warehouses, &[], None).await;
    assert!(matches!(err, Err(ApiError::SourceFetchFailed { .. })));

    // The old snapshot is still published and becomes servable again once
    // the source recovers.
    source.set_failing(false);
    let rows = service.get(Dimension::Warehouses, &[], None).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn query_detail_lookup_and_not_found() {
    let (_, service) = fresh_service(vec![
        record("q1", "ALICE", "WH1", 1.0),
        record("q2", "BOB", "WH1", 0.1),
    ]);

    let detail = service.query_detail("q2").await.unwrap();
    assert_eq!(detail["query_id"], "q2");
    assert!(detail["optimization_recommendations"].is_array());

    let missing = service.query_detail("nope").await;
    assert!(matches!(missing, Err(ApiError::QueryNotFound { .. })));
}

#[tokio::test]
async fn drill_down_returns_contributing_history_rows() {
    let (_, service) = fresh_service(vec![
        record("q1", "ALICE", "WH1", 1.0),
        record("q2", "ALICE", "WH1", 0.2),
        record("q3", "BOB", "WH2", 0.2),
    ]);

    let users = service.get(Dimension::Users, &[], None).await.unwrap();
    let alice = users
        .iter()
        .find(|row| row["user_name"] == "ALICE")
        .expect("aggregate row for ALICE");
    let key = alice["user_warehouse_id"].as_u64().unwrap();

    let contributing = service.drill_down("user_warehouse_id", key).await.unwrap();
    assert_eq!(contributing.len(), 2);
    for row in &contributing {
        assert_eq!(row["user_name"], "ALICE");
        assert_eq!(row["warehouse_name"], "WH1");
    }
}

#[tokio::test]
async fn null_dimension_values_coalesce_to_unknown() {
    let mut no_user = record("q1", "ALICE", "WH1", 1.0);
    no_user.user_name = None;
    let (_, service) = fresh_service(vec![no_user]);

    let rows = service
        .get(Dimension::Users, &[Filter::eq("user_name", "UNKNOWN")], None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn malformed_records_are_tallied_not_fatal() {
    let mut bad = record("", "ALICE", "WH1", 1.0);
    bad.query_id = String::new();
    let (_, service) = fresh_service(vec![bad, record("q2", "BOB", "WH1", 1.0)]);

    let snapshot = service.ensure_fresh(Dimension::Warehouses).await.unwrap();
    assert_eq!(snapshot.skipped_records, 1);
    assert_eq!(snapshot.row_count(), 1);
}

#[tokio::test]
async fn summary_rolls_up_across_dimensions() {
    let mut serverless = record("q4", "LOADER", "WH1", 0.3);
    serverless.warehouse_name = None;
    serverless.query_text = "COPY INTO t FROM @stage".to_string();

    let (source, service) = fresh_service(vec![
        record("q1", "ALICE", "WH_BIG", 5.0),
        record("q2", "BOB", "WH_SMALL", 1.0),
        record("q3", "ALICE", "WH_BIG", 2.0),
        serverless,
    ]);

    let summary = service.summary().await.unwrap();
    assert_eq!(summary.total_warehouses, 2);
    assert_eq!(summary.serverless_services_count, 1);
    assert_eq!(summary.top_warehouse.as_deref(), Some("WH_BIG"));
    assert_eq!(summary.highest_cost_user.as_deref(), Some("ALICE"));
    assert!((summary.total_credits_used - 8.3).abs() < 1e-9);
    // ALICE, BOB, LOADER
    assert_eq!(summary.active_users, 3);

    // All four dimensions come from one shared staleness policy; with a
    // fresh TTL the summary must not refetch per dimension beyond the
    // snapshots it builds.
    assert!(source.fetch_count() <= 4);
}

#[tokio::test]
async fn refresh_all_publishes_every_dimension_from_one_fetch() {
    let (source, service) = fresh_service(vec![record("q1", "ALICE", "WH1", 1.0)]);

    service.refresh_all().await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    for dimension in Dimension::ALL {
        let snapshot = service.ensure_fresh(dimension).await.unwrap();
        assert!(snapshot.computed_at <= chrono::Utc::now());
    }
    // ensure_fresh found every snapshot already published.
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn unknown_dimension_name_is_rejected() {
    let err = Dimension::parse("wherehouses");
    assert!(matches!(err, Err(ApiError::DimensionNotFound(_))));
    assert_eq!(Dimension::parse("query-history").unwrap(), Dimension::QueryHistory);
}
