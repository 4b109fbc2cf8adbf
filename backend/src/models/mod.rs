pub mod metrics;
pub mod query_history;

pub use metrics::{
    BadPracticeCounts, DatabaseMetrics, PerformanceBuckets, QueryDetails, QueryHistoryRow,
    RoleMetrics, ServerlessMetrics, SummaryMetrics, TableMetrics, UserWarehouseMetrics,
    WarehouseMetrics,
};
pub use query_history::{ExecutionStatus, QueryRecord};
