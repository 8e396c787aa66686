//! RFM feature computation and standardization

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, Axis};
use tracing::{info, warn};

use crate::data::CleanedRecord;
use crate::error::SegmentationError;

/// Feature names in column order of every RFM matrix
pub const FEATURE_NAMES: [&str; 3] = ["Recency", "Frequency", "Monetary"];

/// Recency, frequency and monetary value of one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerProfile {
    pub customer_id: String,
    /// Days between the dataset's latest transaction and this customer's latest
    pub recency_days: u32,
    /// Distinct invoices
    pub frequency: u32,
    /// Sum of line totals
    pub monetary: f64,
}

impl CustomerProfile {
    pub fn as_features(&self) -> [f64; 3] {
        [
            self.recency_days as f64,
            self.frequency as f64,
            self.monetary,
        ]
    }
}

#[derive(Default)]
struct CustomerAccumulator<'a> {
    latest: Option<NaiveDateTime>,
    invoices: HashSet<&'a str>,
    line_totals: Vec<f64>,
}

/// Reduce cleaned records to one profile per customer, sorted by customer id.
///
/// Recency is measured against a single reference date: the latest timestamp
/// across all records.
pub fn aggregate_rfm(records: &[CleanedRecord]) -> crate::Result<Vec<CustomerProfile>> {
    let global_max = records
        .iter()
        .map(|r| r.invoice_date)
        .max()
        .ok_or(SegmentationError::EmptyProfileSet)?;

    let mut groups: BTreeMap<&str, CustomerAccumulator<'_>> = BTreeMap::new();
    for record in records {
        let acc = groups.entry(record.customer_id.as_str()).or_default();
        acc.latest = acc.latest.max(Some(record.invoice_date));
        acc.invoices.insert(record.invoice_no.as_str());
        acc.line_totals.push(record.line_total);
    }

    let profiles: Vec<CustomerProfile> = groups
        .into_iter()
        .map(|(customer_id, mut acc)| {
            let latest = acc.latest.unwrap_or(global_max);
            let days = (global_max - latest).num_days().max(0);
            // summed in sorted order so the total does not depend on row order
            acc.line_totals.sort_by(f64::total_cmp);
            CustomerProfile {
                customer_id: customer_id.to_string(),
                recency_days: u32::try_from(days).unwrap_or(u32::MAX),
                frequency: u32::try_from(acc.invoices.len()).unwrap_or(u32::MAX),
                monetary: acc.line_totals.iter().sum(),
            }
        })
        .collect();

    info!(customers = profiles.len(), reference_date = %global_max, "computed RFM profiles");
    Ok(profiles)
}

/// Raw (n_customers, 3) feature matrix in [`FEATURE_NAMES`] order
pub fn feature_matrix(profiles: &[CustomerProfile]) -> Array2<f64> {
    let mut matrix = Array2::zeros((profiles.len(), 3));
    for (mut row, profile) in matrix.outer_iter_mut().zip(profiles) {
        row.assign(&Array1::from(profile.as_features().to_vec()));
    }
    matrix
}

/// Per-feature standardization to zero mean and unit (population) variance
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Zero for a constant feature
    pub std: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> Self {
        let n_features = features.ncols();
        let mut mean = Array1::zeros(n_features);
        let mut std = Array1::zeros(n_features);

        for (j, column) in features.axis_iter(Axis(1)).enumerate() {
            let Some(&first) = column.iter().next() else {
                continue;
            };
            let n = column.len() as f64;
            let m = column.sum() / n;
            mean[j] = m;
            // an exact check: a rounded mean would leave tiny nonzero deviations
            if column.iter().all(|&v| v == first) {
                std[j] = 0.0;
            } else {
                std[j] = (column.iter().map(|&v| (v - m).powi(2)).sum::<f64>() / n).sqrt();
            }
        }

        Self { mean, std }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        let mut scaled = features.clone();
        for mut row in scaled.outer_iter_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = self.scale_value(j, *value);
            }
        }
        scaled
    }

    /// Scale one (recency, frequency, monetary) triple with the fitted parameters
    pub fn transform_one(&self, rfm: &[f64; 3]) -> crate::Result<Array1<f64>> {
        if self.mean.len() != rfm.len() {
            anyhow::bail!(
                "scaler was fit on {} features, got {}",
                self.mean.len(),
                rfm.len()
            );
        }
        Ok(rfm
            .iter()
            .enumerate()
            .map(|(j, &v)| self.scale_value(j, v))
            .collect())
    }

    /// Features that had zero variance when fitted
    pub fn degenerate_features(&self) -> Vec<usize> {
        self.std
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == 0.0)
            .map(|(j, _)| j)
            .collect()
    }

    fn scale_value(&self, feature: usize, value: f64) -> f64 {
        let std = self.std[feature];
        if std == 0.0 {
            0.0
        } else {
            (value - self.mean[feature]) / std
        }
    }
}

/// RFM profiles with their raw and standardized feature matrices
#[derive(Debug, Clone)]
pub struct RfmData {
    pub profiles: Vec<CustomerProfile>,
    /// Raw RFM values, one row per profile
    pub raw_features: Array2<f64>,
    /// Standardized features, one row per profile
    pub features: Array2<f64>,
    /// Scaler fitted on `raw_features`, kept for scaling new customers
    pub scaler: StandardScaler,
}

impl RfmData {
    pub fn from_profiles(profiles: Vec<CustomerProfile>) -> crate::Result<Self> {
        if profiles.is_empty() {
            return Err(SegmentationError::EmptyProfileSet.into());
        }

        let raw_features = feature_matrix(&profiles);
        let scaler = StandardScaler::fit(&raw_features);
        for j in scaler.degenerate_features() {
            warn!(feature = FEATURE_NAMES[j], "feature has zero variance; scaled to 0");
        }
        let features = scaler.transform(&raw_features);

        Ok(Self {
            profiles,
            raw_features,
            features,
            scaler,
        })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Scale new RFM values using the fitted scaler
    pub fn scale_new_data(&self, rfm: &[f64; 3]) -> crate::Result<Array1<f64>> {
        self.scaler.transform_one(rfm)
    }
}
