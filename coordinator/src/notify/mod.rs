//! Result aggregation and notifications

pub mod aggregator;
pub mod notifier;
