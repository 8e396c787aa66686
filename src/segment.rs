//! Final segmentation: cluster assignment and profile-based segment labels

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::model::{fit_kmeans, KMeansModel};
use crate::rfm::{CustomerProfile, RfmData};

/// Behavioral segment a cluster is mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentLabel {
    Vip,
    Loyal,
    AtRisk,
    Inactive,
}

impl SegmentLabel {
    pub const ALL: [SegmentLabel; 4] = [
        SegmentLabel::Vip,
        SegmentLabel::Loyal,
        SegmentLabel::AtRisk,
        SegmentLabel::Inactive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentLabel::Vip => "VIP",
            SegmentLabel::Loyal => "Loyal",
            SegmentLabel::AtRisk => "At Risk",
            SegmentLabel::Inactive => "Inactive",
        }
    }

    /// Static marketing playbook for the segment
    pub fn recommended_action(&self) -> &'static str {
        match self {
            SegmentLabel::Vip => "Offer exclusives, early access, and premium service.",
            SegmentLabel::Loyal => "Nurture with loyalty programs and personal touches.",
            SegmentLabel::AtRisk => "Send win-back campaigns and ask for feedback.",
            SegmentLabel::Inactive => "Suppress or retarget with special offers.",
        }
    }
}

impl fmt::Display for SegmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        SegmentLabel::ALL
            .into_iter()
            .find(|label| label.as_str().replace(' ', "").to_ascii_lowercase() == wanted)
            .ok_or_else(|| {
                anyhow::anyhow!("unknown segment '{s}', expected one of: VIP, Loyal, At Risk, Inactive")
            })
    }
}

/// Cluster id and segment label attached to one customer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub cluster: usize,
    pub label: SegmentLabel,
}

/// A customer profile with its segment attached
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedProfile {
    pub profile: CustomerProfile,
    pub assignment: ClusterAssignment,
}

/// Fitted model plus the label chosen for each cluster id
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub model: KMeansModel,
    /// Indexed by cluster id
    pub cluster_labels: Vec<SegmentLabel>,
}

impl Segmentation {
    pub fn label_of(&self, cluster: usize) -> SegmentLabel {
        self.cluster_labels[cluster]
    }

    /// One assignment per training row, in row order
    pub fn assignments(&self) -> Vec<ClusterAssignment> {
        self.model
            .labels
            .iter()
            .map(|&cluster| ClusterAssignment {
                cluster,
                label: self.label_of(cluster),
            })
            .collect()
    }

    /// Attach assignments to the profiles the model was fitted on
    pub fn label_profiles(&self, profiles: &[CustomerProfile]) -> Vec<SegmentedProfile> {
        profiles
            .iter()
            .cloned()
            .zip(self.assignments())
            .map(|(profile, assignment)| SegmentedProfile {
                profile,
                assignment,
            })
            .collect()
    }

    /// Assign raw (recency, frequency, monetary) values of a new customer
    pub fn classify(&self, rfm_data: &RfmData, rfm_values: &[f64; 3]) -> crate::Result<ClusterAssignment> {
        let scaled = rfm_data.scale_new_data(rfm_values)?;
        let cluster = self.model.predict(&scaled)?;
        Ok(ClusterAssignment {
            cluster,
            label: self.label_of(cluster),
        })
    }
}

/// Fit the final model at `config.n_clusters` and label its clusters.
///
/// # Arguments
///
/// * `rfm_data` - Profiles with their standardized features
/// * `config` - Final cluster count and K-Means settings
///
/// # Returns
///
/// A [`Segmentation`] mapping every cluster id to a segment label. Fails with
/// `InsufficientPopulation` when there are fewer distinct customers than clusters.
pub fn segment_customers(rfm_data: &RfmData, config: &PipelineConfig) -> crate::Result<Segmentation> {
    let model = fit_kmeans(&rfm_data.features, config.n_clusters, config)?;
    let cluster_labels = label_clusters(&model.centroids);

    for (cluster, label) in cluster_labels.iter().enumerate() {
        debug!(cluster, %label, centroid = ?model.centroids.row(cluster).to_vec(), "labelled cluster");
    }
    info!(
        k = model.n_clusters,
        inertia = model.inertia,
        sizes = ?model.cluster_sizes(),
        "segmented customers"
    );

    Ok(Segmentation {
        model,
        cluster_labels,
    })
}

/// Value score of a standardized (recency, frequency, monetary) centroid:
/// recent, frequent and high-spending is better.
fn value_score(centroid: &ArrayView1<f64>) -> f64 {
    -centroid[0] + centroid[1] + centroid[2]
}

/// Map each centroid to a segment from its profile rather than its id.
///
/// The highest value score is VIP and the lowest is Inactive. The clusters in
/// between are ordered by recency: the more recent half is Loyal, the rest
/// At Risk. With more than four clusters several share a label.
pub fn label_clusters(centroids: &Array2<f64>) -> Vec<SegmentLabel> {
    let k = centroids.nrows();
    let mut labels = vec![SegmentLabel::Loyal; k];
    if k == 0 {
        return labels;
    }

    let mut by_value: Vec<usize> = (0..k).collect();
    by_value.sort_by(|&a, &b| {
        value_score(&centroids.row(b))
            .total_cmp(&value_score(&centroids.row(a)))
            .then(a.cmp(&b))
    });

    labels[by_value[0]] = SegmentLabel::Vip;
    if k == 1 {
        return labels;
    }
    labels[by_value[k - 1]] = SegmentLabel::Inactive;

    let mut middle = by_value[1..k - 1].to_vec();
    middle.sort_by(|&a, &b| {
        centroids[[a, 0]]
            .total_cmp(&centroids[[b, 0]])
            .then(a.cmp(&b))
    });
    let loyal = (middle.len() + 1) / 2;
    for (rank, &cluster) in middle.iter().enumerate() {
        labels[cluster] = if rank < loyal {
            SegmentLabel::Loyal
        } else {
            SegmentLabel::AtRisk
        };
    }

    labels
}
