pub mod aggregator;
pub mod pass_at_k;

pub use aggregator::{AggregateMetrics, MetricsAggregator, TaskStats};
pub use pass_at_k::pass_at_k;
