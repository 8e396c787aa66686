//! rfmforge: customer segmentation from retail transactions
//!
//! Loads transactions, cleans them, builds RFM profiles, evaluates candidate
//! cluster counts, segments customers and exports the resulting tables.

use std::fs;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rfmforge::report::{cleaned_frame, segmented_frame, summary_frame, write_csv};
use rfmforge::{run_from_csv, viz, Args, SegmentationReport};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.to_config()?;
    let segment = args.parse_segment()?;
    let rfm_values = args.parse_rfm_values()?;
    let start_time = Instant::now();

    let report = run_from_csv(&args.input, &config)
        .with_context(|| format!("segmentation of '{}' failed", args.input.display()))?;

    if let Some(rfm_values) = rfm_values {
        run_prediction_mode(&report, rfm_values)?;
    } else {
        export_report(&args, &report)?;
        viz::print_strategies(segment);
    }

    println!("\nTotal processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Classify a single customer against the fitted segmentation
fn run_prediction_mode(report: &SegmentationReport, rfm_values: [f64; 3]) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input RFM values: R={}, F={}, M={}",
        rfm_values[0], rfm_values[1], rfm_values[2]
    );

    let assignment = report.segmentation.classify(&report.rfm, &rfm_values)?;
    let model = &report.segmentation.model;
    let cluster = assignment.cluster;

    println!("\n✓ Predicted segment: {} (cluster {})", assignment.label, cluster);
    println!("  Strategy: {}", assignment.label.recommended_action());

    let cluster_sizes = model.cluster_sizes();
    let cluster_percentage = (cluster_sizes[cluster] as f64 / report.rfm.len() as f64) * 100.0;
    println!(
        "  Cluster size: {} customers ({:.1}% of total)",
        cluster_sizes[cluster], cluster_percentage
    );
    println!(
        "  Centroid (normalized): R={:.2}, F={:.2}, M={:.2}",
        model.centroids[[cluster, 0]],
        model.centroids[[cluster, 1]],
        model.centroids[[cluster, 2]]
    );

    Ok(())
}

/// Write CSV exports and charts, then print the console report
fn export_report(args: &Args, report: &SegmentationReport) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create '{}'", args.output_dir.display()))?;

    write_csv(&mut cleaned_frame(&report.cleaned)?, args.output_dir.join("crm_cleaned.csv"))?;
    write_csv(&mut segmented_frame(&report.segmented)?, args.output_dir.join("rfm_segmented.csv"))?;
    write_csv(&mut summary_frame(&report.summaries)?, args.output_dir.join("segment_summary.csv"))?;

    let charts = viz::generate_visualization_report(report, &args.output_dir)?;

    println!(
        "\nCleaned {} of {} rows ({} without customer, {} returns, {} duplicates)",
        report.cleaning.cleaned_count,
        report.cleaning.raw_count,
        report.cleaning.missing_customer,
        report.cleaning.negative_quantity,
        report.cleaning.duplicates
    );
    println!("Exports written to: {}", args.output_dir.display());
    for chart in charts {
        println!("Chart saved to: {}", chart.display());
    }

    Ok(())
}
