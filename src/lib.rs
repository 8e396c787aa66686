//! rfmforge: customer segmentation on RFM (Recency, Frequency, Monetary) features
//!
//! Raw retail transactions are cleaned, reduced to one RFM profile per
//! customer, standardized and clustered with K-Means. Clusters are labelled
//! VIP, Loyal, At Risk or Inactive from their centroid profile.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod rfm;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{
    clean_records, load_transaction_table, load_transactions, CleanedRecord, CleaningReport,
    ColumnProfile, TransactionRecord, TransactionTable,
};
pub use error::SegmentationError;
pub use model::{evaluate_candidates, fit_kmeans, DiagnosticPoint, KMeansModel};
pub use pipeline::{run_from_csv, run_pipeline, run_table, SegmentationReport};
pub use report::{summarize_segments, SegmentSummary};
pub use rfm::{aggregate_rfm, CustomerProfile, RfmData, StandardScaler};
pub use segment::{segment_customers, ClusterAssignment, SegmentLabel, SegmentedProfile, Segmentation};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
