//! Pipeline configuration

use crate::error::SegmentationError;

/// Knobs for the clustering stages. One value is threaded through the whole
/// run; nothing is cached between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Cluster counts evaluated for the elbow / silhouette diagnostics, in order
    pub candidate_ks: Vec<usize>,
    /// Cluster count used for the final segmentation
    pub n_clusters: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Independent initializations per fit; the lowest inertia wins
    pub n_runs: usize,
    pub max_iters: usize,
    pub tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidate_ks: (2..=5).collect(),
            n_clusters: 4,
            seed: 42,
            n_runs: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.n_clusters < 2 {
            return Err(SegmentationError::InvalidClusterCount {
                requested: self.n_clusters,
            }
            .into());
        }
        if self.candidate_ks.is_empty() {
            return Err(SegmentationError::EmptyCandidateSet.into());
        }
        if let Some(&k) = self.candidate_ks.iter().find(|&&k| k < 2) {
            return Err(SegmentationError::InvalidClusterCount { requested: k }.into());
        }
        if self.n_runs == 0 {
            anyhow::bail!("n_runs must be at least 1");
        }
        if self.max_iters == 0 {
            anyhow::bail!("max_iters must be at least 1");
        }
        if !(self.tolerance > 0.0) {
            anyhow::bail!("tolerance must be positive, got {}", self.tolerance);
        }
        Ok(())
    }
}
