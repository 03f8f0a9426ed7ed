//! In-process metrics aggregation

pub mod aggregator;
pub mod sink;

pub use aggregator::MetricsAggregator;
pub use sink::{MemorySink, MetricsReport, MetricsSink, TracingSink};
