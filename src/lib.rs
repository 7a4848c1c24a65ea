//! RfmForge: A Rust CLI application for RFM customer segmentation
//!
//! This library turns a transactional sales log into one Recency/Frequency/Monetary
//! record per customer, scores each metric against its quartiles and labels every
//! customer with a value tier and a lifecycle segment.

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod report;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{
    load_transactions, normalize_transactions, ColumnMap, NormalizationStats, TransactionRecord,
};
pub use error::{Result, RfmError, Stage};
pub use model::{
    aggregate_customers, run_pipeline, score_customers, CustomerMetrics, PipelineOptions,
    RfmAnalysis, RfmBreakpoints, ScoredCustomer,
};
pub use report::{export_csv, segment_score_means, tier_counts, tier_segment_counts};
pub use segment::{LifecycleSegment, RfmScores, ValueTier};
pub use viz::generate_chart_report;
