//! K-Means clustering model and cluster-count diagnostics

use std::collections::HashSet;

use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::SegmentationError;

/// Fitted K-Means parameters and the assignments of the training data
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in normalized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Id of the centroid nearest to `features`
    pub fn predict(&self, features: &Array1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            anyhow::bail!(
                "Feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            );
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        Ok(closest_cluster)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Fit quality of one candidate cluster count
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticPoint {
    pub k: usize,
    pub inertia: f64,
    /// Mean silhouette coefficient in [-1, 1]
    pub silhouette: f64,
}

/// Fit K-Means on standardized features.
///
/// Centroids are initialized with k-means++ from a generator seeded with
/// `config.seed`; `config.n_runs` initializations are tried and the one with
/// the lowest inertia is kept, so the same input always yields the same model.
///
/// # Arguments
///
/// * `features` - Standardized feature matrix, one row per customer
/// * `n_clusters` - Number of clusters, at least 2
/// * `config` - Seed, restarts, iteration cap and tolerance
///
/// # Returns
///
/// The fitted [`KMeansModel`] with training labels and inertia, or
/// `InvalidClusterCount` / `InsufficientPopulation` when `n_clusters` cannot be fitted.
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &PipelineConfig,
) -> crate::Result<KMeansModel> {
    if n_clusters < 2 {
        return Err(SegmentationError::InvalidClusterCount {
            requested: n_clusters,
        }
        .into());
    }
    check_population(features, n_clusters)?;

    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(config.seed);

    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(config.n_runs)
        .max_n_iterations(config.max_iters as u64)
        .tolerance(config.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    debug!(k = n_clusters, inertia, "fitted k-means");

    Ok(KMeansModel {
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Fit every candidate cluster count and record inertia and silhouette.
///
/// # Arguments
///
/// * `features` - Standardized feature matrix, one row per customer
/// * `config` - Candidate ks and K-Means settings
///
/// # Returns
///
/// One [`DiagnosticPoint`] per candidate, in candidate order. Candidates
/// larger than the number of distinct customers are skipped with a warning;
/// the call fails with `InsufficientPopulation` only when none is left.
pub fn evaluate_candidates(
    features: &Array2<f64>,
    config: &PipelineConfig,
) -> crate::Result<Vec<DiagnosticPoint>> {
    let smallest = config
        .candidate_ks
        .iter()
        .copied()
        .min()
        .ok_or(SegmentationError::EmptyCandidateSet)?;

    let (customers, distinct) = population(features);
    let usable = customers.min(distinct);

    let mut points = Vec::with_capacity(config.candidate_ks.len());
    for &k in &config.candidate_ks {
        if k > usable {
            warn!(k, customers, distinct, "skipping candidate k larger than the population");
            continue;
        }
        let model = fit_kmeans(features, k, config)?;
        let silhouette = silhouette_score(features, &model.labels, k);
        debug!(k, inertia = model.inertia, silhouette, "evaluated candidate");
        points.push(DiagnosticPoint {
            k,
            inertia: model.inertia,
            silhouette,
        });
    }

    if points.is_empty() {
        return Err(SegmentationError::InsufficientPopulation {
            customers,
            distinct,
            requested: smallest,
        }
        .into());
    }
    Ok(points)
}

/// Fail unless there are at least `n_clusters` customers and distinct feature vectors
pub fn check_population(features: &Array2<f64>, n_clusters: usize) -> crate::Result<()> {
    let (customers, distinct) = population(features);
    if customers < n_clusters || distinct < n_clusters {
        return Err(SegmentationError::InsufficientPopulation {
            customers,
            distinct,
            requested: n_clusters,
        }
        .into());
    }
    Ok(())
}

/// Number of rows and of distinct rows
fn population(features: &Array2<f64>) -> (usize, usize) {
    let distinct = features
        .outer_iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
        .collect::<HashSet<_>>()
        .len();
    (features.nrows(), distinct)
}

/// Mean silhouette coefficient over all points.
///
/// A point alone in its cluster scores 0, and so does every point when only
/// one cluster is populated. Labels outside `0..n_clusters` are treated as
/// their own clusters, so a mislabelled point never panics.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>, n_clusters: usize) -> f64 {
    let n_samples = features.nrows().min(labels.len());
    if n_samples < 2 {
        return 0.0;
    }

    let n_clusters = labels
        .iter()
        .take(n_samples)
        .map(|&label| label + 1)
        .fold(n_clusters, usize::max);
    let mut cluster_sizes = vec![0usize; n_clusters];
    for &label in labels.iter().take(n_samples) {
        cluster_sizes[label] += 1;
    }
    if cluster_sizes.iter().filter(|&&size| size > 0).count() < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;
    let mut distance_sums = vec![0.0; n_clusters];

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        distance_sums.iter_mut().for_each(|d| *d = 0.0);
        for j in 0..n_samples {
            if i != j {
                distance_sums[labels[j]] += euclidean_distance(&point, &features.row(j));
            }
        }

        let own_size = cluster_sizes[cluster_label];
        if own_size < 2 {
            continue;
        }

        // a(i): mean distance to the rest of its own cluster
        let a_i = distance_sums[cluster_label] / (own_size - 1) as f64;

        // b(i): smallest mean distance to another cluster
        let b_i = (0..n_clusters)
            .filter(|&c| c != cluster_label && cluster_sizes[c] > 0)
            .map(|c| distance_sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denominator = a_i.max(b_i);
        if denominator > 0.0 && denominator.is_finite() {
            silhouette_sum += (b_i - a_i) / denominator;
        }
    }

    silhouette_sum / n_samples as f64
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let distance = euclidean_distance(&features.row(i), &centroids.row(cluster));
            inertia += distance * distance;
        }
    }

    inertia
}

fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
