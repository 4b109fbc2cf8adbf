pub mod common;

mod metrics_store_test;
