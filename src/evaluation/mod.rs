//! 保留データに対する分類性能の評価。
pub mod metrics;

pub use metrics::{AveragedMetrics, ClassMetrics, ClassificationMetrics, MetricsCalculator};
