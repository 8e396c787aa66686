//! Charts (SVG via Plotters) and console tables for a segmentation report

use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::model::DiagnosticPoint;
use crate::pipeline::SegmentationReport;
use crate::report::{segment_counts, strategy_table, DataAudit, SegmentSummary};
use crate::segment::SegmentLabel;

/// Color of each segment in every chart
fn segment_color(label: SegmentLabel) -> RGBColor {
    match label {
        SegmentLabel::Vip => GREEN,
        SegmentLabel::Loyal => BLUE,
        SegmentLabel::AtRisk => RGBColor(255, 140, 0),
        SegmentLabel::Inactive => RED,
    }
}

/// Inertia (elbow) and silhouette curves over the candidate cluster counts
pub fn create_elbow_chart(points: &[DiagnosticPoint], output_path: &Path) -> crate::Result<()> {
    if points.is_empty() {
        anyhow::bail!("no diagnostic points to plot");
    }

    let k_min = points.iter().map(|p| p.k).min().unwrap_or(0) as f64 - 0.5;
    let k_max = points.iter().map(|p| p.k).max().unwrap_or(0) as f64 + 0.5;
    let inertia_max = points.iter().map(|p| p.inertia).fold(0.0, f64::max);
    let inertia_max = if inertia_max > 0.0 { inertia_max * 1.1 } else { 1.0 };
    let sil_min = points.iter().map(|p| p.silhouette).fold(0.0, f64::min) - 0.1;
    let sil_max = points.iter().map(|p| p.silhouette).fold(0.0, f64::max) + 0.1;

    let root = SVGBackend::new(output_path, (1000, 450)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(500);

    let mut chart = ChartBuilder::on(&left)
        .caption("Elbow Method", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(k_min..k_max, 0f64..inertia_max)?;

    chart
        .configure_mesh()
        .x_desc("k")
        .y_desc("Inertia")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(LineSeries::new(
        points.iter().map(|p| (p.k as f64, p.inertia)),
        &BLUE,
    ))?;
    chart.draw_series(
        points
            .iter()
            .map(|p| Circle::new((p.k as f64, p.inertia), 4, BLUE.filled())),
    )?;

    let mut chart = ChartBuilder::on(&right)
        .caption("Silhouette Score", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(k_min..k_max, sil_min.max(-1.0)..sil_max.min(1.0))?;

    chart
        .configure_mesh()
        .x_desc("k")
        .y_desc("Silhouette")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(LineSeries::new(
        points.iter().map(|p| (p.k as f64, p.silhouette)),
        &MAGENTA,
    ))?;
    chart.draw_series(
        points
            .iter()
            .map(|p| Circle::new((p.k as f64, p.silhouette), 4, MAGENTA.filled())),
    )?;

    root.present()?;
    Ok(())
}

/// Bar chart of customers per segment, largest first
pub fn create_segment_size_chart(counts: &[(SegmentLabel, usize)], output_path: &Path) -> crate::Result<()> {
    if counts.is_empty() {
        anyhow::bail!("no segments to plot");
    }

    let max_size = counts.iter().map(|c| c.1).max().unwrap_or(1) as u32;
    let names: Vec<&str> = counts.iter().map(|(label, _)| label.as_str()).collect();

    let root = SVGBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per Segment", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            (0u32..counts.len() as u32).into_segmented(),
            0u32..(max_size + max_size / 10 + 1),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(i) => names.get(*i as usize).map(|s| s.to_string()).unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &(label, size))| {
        let i = i as u32;
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(i), 0),
                (SegmentValue::Exact(i + 1), size as u32),
            ],
            segment_color(label).filled(),
        );
        bar.set_margin(0, 0, 10, 10);
        bar
    }))?;

    root.present()?;
    Ok(())
}

pub fn print_data_audit(audit: &DataAudit) {
    println!("\n=== Data Audit ===");
    println!("Total rows: {}", audit.total_rows);
    println!("Total columns: {}", audit.total_columns);
    println!("\nMissing values by column:");
    for (column, missing) in &audit.missing_by_column {
        println!("  {:<12} {:>8}", column, missing);
    }
    println!("\nTop countries by transaction volume:");
    for (country, count) in &audit.top_countries {
        println!("  {:<24} {:>8}", country, count);
    }
    println!("\nMonthly invoices:");
    for (month, invoices) in &audit.monthly_invoices {
        println!("  {}  {:>6}", month, invoices);
    }
    println!(
        "\nData quality score: {:.1} / 100 (missing customer {:.1}%, duplicates {:.1}%, returns {:.1}%)",
        audit.quality_score,
        audit.missing_customer_pct,
        audit.duplicate_pct,
        audit.negative_quantity_pct
    );
}

pub fn print_diagnostics(points: &[DiagnosticPoint]) {
    println!("\n=== Optimal Cluster Selection ===");
    println!("  k | Inertia      | Silhouette");
    println!("  --|--------------|-----------");
    for p in points {
        println!("  {:>1} | {:>12.2} | {:>9.3}", p.k, p.inertia, p.silhouette);
    }
}

pub fn print_segment_summary(summaries: &[SegmentSummary]) {
    println!("\n=== Segment Profile ===");
    println!("  Segment  | Recency | Frequency | Monetary   | Customers");
    println!("  ---------|---------|-----------|------------|----------");
    for s in summaries {
        println!(
            "  {:<8} | {:7.1} | {:9.1} | {:10.2} | {:9}",
            s.label.as_str(),
            s.mean_recency,
            s.mean_frequency,
            s.mean_monetary,
            s.count
        );
    }
}

/// Print the recommended action for one segment, or all of them
pub fn print_strategies(segment: Option<SegmentLabel>) {
    println!("\n=== Segment Strategy Recommendations ===");
    for (label, action) in strategy_table() {
        if segment.map_or(true, |wanted| wanted == label) {
            println!("  {:<8}  {}", label.as_str(), action);
        }
    }
}

/// Write both charts into `output_dir` and print the console report.
///
/// Returns the paths of the written charts.
pub fn generate_visualization_report(
    report: &SegmentationReport,
    output_dir: &Path,
) -> crate::Result<Vec<PathBuf>> {
    let elbow_path = output_dir.join("elbow.svg");
    create_elbow_chart(&report.diagnostics, &elbow_path)?;

    let sizes_path = output_dir.join("segment_sizes.svg");
    create_segment_size_chart(&segment_counts(&report.segmented), &sizes_path)?;

    print_data_audit(&report.audit);
    print_diagnostics(&report.diagnostics);
    print_segment_summary(&report.summaries);

    Ok(vec![elbow_path, sizes_path])
}
