//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::config::PipelineConfig;
use crate::segment::SegmentLabel;

/// Customer segmentation CLI: RFM features, K-Means clustering and segment labels
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transaction CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: PathBuf,

    /// Number of clusters for the final segmentation
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Smallest cluster count evaluated for the elbow / silhouette diagnostics
    #[arg(long, default_value = "2")]
    pub k_min: usize,

    /// Largest cluster count evaluated for the elbow / silhouette diagnostics
    #[arg(long, default_value = "5")]
    pub k_max: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means initializations per fit
    #[arg(long, default_value = "10")]
    pub n_runs: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Directory for exported CSV files and charts
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Only print the strategy for this segment (VIP, Loyal, "At Risk", Inactive).
    /// Prediction mode prints the predicted segment's strategy instead.
    #[arg(short, long, conflicts_with = "predict")]
    pub segment: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        if self.k_min > self.k_max {
            anyhow::bail!(
                "--k-min ({}) must not exceed --k-max ({})",
                self.k_min,
                self.k_max
            );
        }
        let config = PipelineConfig {
            candidate_ks: (self.k_min..=self.k_max).collect(),
            n_clusters: self.clusters,
            seed: self.seed,
            n_runs: self.n_runs,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> crate::Result<Option<[f64; 3]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            anyhow::bail!("Predict values must be in format 'recency,frequency,monetary'");
        }

        let mut values = [0.0; 3];
        for ((value, part), name) in values
            .iter_mut()
            .zip(&parts)
            .zip(["recency", "frequency", "monetary"])
        {
            *value = part
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, part))?;
            if *value < 0.0 {
                anyhow::bail!("{} must not be negative, got {}", name, part);
            }
        }

        Ok(Some(values))
    }

    pub fn parse_segment(&self) -> crate::Result<Option<SegmentLabel>> {
        self.segment.as_deref().map(str::parse).transpose()
    }
}
