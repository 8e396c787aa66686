//! Dataset-level failures that stop a segmentation run
//!
//! Row-level problems (missing customer id, returns, duplicate rows) are never
//! errors; the cleaner drops them. The variants here are the conditions under
//! which producing a segmentation would be misleading.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    /// Cleaning left no records, so there are no customers to profile
    #[error("no customers left after cleaning: every record was missing a customer id, a return, or a duplicate")]
    EmptyProfileSet,

    /// Not enough (distinct) customers to seat the requested number of centroids
    #[error(
        "cannot fit {requested} clusters: population has {customers} customers ({distinct} distinct feature vectors)"
    )]
    InsufficientPopulation {
        customers: usize,
        distinct: usize,
        requested: usize,
    },

    #[error("cluster count must be at least 2, got {requested}")]
    InvalidClusterCount { requested: usize },

    #[error("no candidate cluster counts to evaluate")]
    EmptyCandidateSet,
}
