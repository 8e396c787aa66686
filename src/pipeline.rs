//! End-to-end segmentation run
//!
//! Each stage takes the previous stage's output by value or reference and
//! returns a fresh result; no fitted state outlives a run.

use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{
    clean_records, load_transaction_table, record_columns, CleanedRecord, CleaningReport,
    ColumnProfile, TransactionRecord, TransactionTable,
};
use crate::model::{evaluate_candidates, DiagnosticPoint};
use crate::report::{audit_data, summarize_segments, DataAudit, SegmentSummary};
use crate::rfm::{aggregate_rfm, RfmData};
use crate::segment::{segment_customers, SegmentedProfile, Segmentation};

/// Every table the presentation layer renders
#[derive(Debug, Clone)]
pub struct SegmentationReport {
    pub cleaning: CleaningReport,
    pub audit: DataAudit,
    pub cleaned: Vec<CleanedRecord>,
    pub rfm: RfmData,
    /// One point per candidate cluster count, in candidate order
    pub diagnostics: Vec<DiagnosticPoint>,
    pub segmentation: Segmentation,
    /// Profiles joined with their cluster id and segment label
    pub segmented: Vec<SegmentedProfile>,
    pub summaries: Vec<SegmentSummary>,
}

/// Clean, profile, scale, segment `raw` and evaluate candidate ks.
///
/// # Arguments
///
/// * `raw` - Transaction lines, in any order
/// * `config` - Cluster counts and K-Means settings, validated before any work
///
/// # Returns
///
/// A [`SegmentationReport`] holding every intermediate table. Fails with
/// `EmptyProfileSet` when cleaning leaves no customer, and with
/// `InsufficientPopulation` when the final cluster count cannot be fitted.
pub fn run_pipeline(
    raw: &[TransactionRecord],
    config: &PipelineConfig,
) -> crate::Result<SegmentationReport> {
    run_stages(raw, &record_columns(raw), config)
}

/// Run the pipeline on a loaded table, auditing its source columns
pub fn run_table(table: &TransactionTable, config: &PipelineConfig) -> crate::Result<SegmentationReport> {
    run_stages(&table.records, &table.columns, config)
}

fn run_stages(
    raw: &[TransactionRecord],
    columns: &[ColumnProfile],
    config: &PipelineConfig,
) -> crate::Result<SegmentationReport> {
    config.validate()?;
    let start = Instant::now();

    let (cleaned, cleaning) = clean_records(raw);
    let audit = audit_data(raw, &cleaned, columns);

    let profiles = aggregate_rfm(&cleaned)?;
    let rfm = RfmData::from_profiles(profiles)?;

    // the final fit decides whether the run can succeed at all
    let segmentation = segment_customers(&rfm, config)?;
    let diagnostics = evaluate_candidates(&rfm.features, config)?;
    let segmented = segmentation.label_profiles(&rfm.profiles);
    let summaries = summarize_segments(&segmented);

    info!(
        customers = rfm.len(),
        segments = summaries.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "pipeline complete"
    );

    Ok(SegmentationReport {
        cleaning,
        audit,
        cleaned,
        rfm,
        diagnostics,
        segmentation,
        segmented,
        summaries,
    })
}

/// Load a transaction CSV and run the pipeline on it
pub fn run_from_csv<P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
) -> crate::Result<SegmentationReport> {
    let table = load_transaction_table(path)?;
    run_table(&table, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::record;
    use crate::error::SegmentationError;

    #[test]
    fn test_all_records_filtered_is_fatal() {
        let raw = vec![
            record(None, "1", 1, 1.0, "2011-01-01"),
            record(Some("A"), "C2", -1, 1.0, "2011-01-01"),
        ];
        let err = run_pipeline(&raw, &PipelineConfig::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SegmentationError>(),
            Some(&SegmentationError::EmptyProfileSet)
        );
    }

    #[test]
    fn test_too_few_customers_is_fatal() {
        let raw = vec![
            record(Some("A"), "1", 1, 10.0, "2011-01-01"),
            record(Some("B"), "2", 2, 20.0, "2011-02-01"),
            record(Some("C"), "3", 3, 30.0, "2011-03-01"),
        ];
        let config = PipelineConfig {
            candidate_ks: vec![2],
            ..Default::default()
        };
        let err = run_pipeline(&raw, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SegmentationError>(),
            Some(SegmentationError::InsufficientPopulation {
                customers: 3,
                requested: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_default_config_on_exactly_four_customers() {
        let raw = vec![
            record(Some("A"), "1", 1, 10.0, "2011-01-01"),
            record(Some("B"), "2", 2, 20.0, "2011-02-01"),
            record(Some("B"), "3", 2, 20.0, "2011-02-15"),
            record(Some("C"), "4", 3, 30.0, "2011-03-01"),
            record(Some("D"), "5", 9, 90.0, "2011-04-01"),
        ];
        let report = run_pipeline(&raw, &PipelineConfig::default()).unwrap();

        assert_eq!(report.segmented.len(), 4);
        assert!(report.segmented.iter().all(|r| r.assignment.cluster < 4));
        assert_eq!(
            report.diagnostics.iter().map(|p| p.k).collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let config = PipelineConfig {
            n_clusters: 0,
            ..Default::default()
        };
        assert!(run_pipeline(&[], &config).is_err());
    }
}
