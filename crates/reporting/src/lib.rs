//! Reporting on top of the attribution and MMM stages: unified daily
//! metrics, attribution-vs-MMM reconciliation and the end-to-end pipeline.

pub mod metrics;
pub mod pipeline;
pub mod reconciliation;

pub use metrics::{compute_unified_metrics, UnifiedDailyMetric};
pub use pipeline::{current_spend_by_channel, BudgetRecommendation, Pipeline, RunResult};
pub use reconciliation::{
    compute_alignment, AlignmentReport, ChannelAlignment, ReconciliationReport,
    ReconciliationScorer,
};
