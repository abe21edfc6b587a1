//! Metrics Task Module
//!
//! Receives the periodic `SchedulerCellMetrics` of every cell, logs them and
//! keeps running totals published on a `watch` channel.

mod task;

pub use task::{CellTotals, MetricsSummary, MetricsTask};
