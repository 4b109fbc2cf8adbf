pub mod aggregator;
pub mod classifier;
pub mod drilldown;
pub mod filter;
pub mod metrics_store;
pub mod recommendation;
pub mod snowflake_client;

pub use classifier::ClassificationFlags;
pub use filter::{Filter, FilterOp};
pub use metrics_store::{Dimension, DimensionSnapshot, MetricsService};
pub use snowflake_client::{QueryHistorySource, SnowflakeClient};
