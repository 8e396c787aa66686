//! Summary tables, data audit and CSV export for the presentation layer

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use chrono::Datelike;
use polars::prelude::*;
use tracing::info;

use crate::data::{count_duplicates, CleanedRecord, ColumnProfile, TransactionRecord};
use crate::segment::{SegmentLabel, SegmentedProfile};

/// Mean RFM values and size of one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub label: SegmentLabel,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
    pub count: usize,
}

/// One row per segment present, in [`SegmentLabel::ALL`] order
pub fn summarize_segments(rows: &[SegmentedProfile]) -> Vec<SegmentSummary> {
    let mut sums: BTreeMap<SegmentLabel, ([f64; 3], usize)> = BTreeMap::new();
    for row in rows {
        let (totals, count) = sums.entry(row.assignment.label).or_insert(([0.0; 3], 0));
        for (total, value) in totals.iter_mut().zip(row.profile.as_features()) {
            *total += value;
        }
        *count += 1;
    }

    sums.into_iter()
        .map(|(label, (totals, count))| {
            let n = count as f64;
            SegmentSummary {
                label,
                mean_recency: totals[0] / n,
                mean_frequency: totals[1] / n,
                mean_monetary: totals[2] / n,
                count,
            }
        })
        .collect()
}

/// Customers per segment, largest first
pub fn segment_counts(rows: &[SegmentedProfile]) -> Vec<(SegmentLabel, usize)> {
    let mut counts: BTreeMap<SegmentLabel, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.assignment.label).or_default() += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    counts
}

/// Segment to recommended action, for every segment
pub fn strategy_table() -> Vec<(SegmentLabel, &'static str)> {
    SegmentLabel::ALL
        .into_iter()
        .map(|label| (label, label.recommended_action()))
        .collect()
}

/// Data quality overview of the raw and cleaned tables
#[derive(Debug, Clone, PartialEq)]
pub struct DataAudit {
    pub total_rows: usize,
    pub total_columns: usize,
    /// Missing values per source column, most missing first
    pub missing_by_column: Vec<(String, usize)>,
    pub missing_customer_pct: f64,
    pub duplicate_pct: f64,
    pub negative_quantity_pct: f64,
    /// 100 − missing% − 0.5·duplicate% − 0.5·negative-quantity%
    pub quality_score: f64,
    /// Cleaned transaction lines per country, ten largest
    pub top_countries: Vec<(String, usize)>,
    /// Distinct cleaned invoices per calendar month ("YYYY-MM"), chronological
    pub monthly_invoices: Vec<(String, usize)>,
}

/// Audit the raw table read from `columns` and the cleaned table derived from it
pub fn audit_data(
    raw: &[TransactionRecord],
    cleaned: &[CleanedRecord],
    columns: &[ColumnProfile],
) -> DataAudit {
    let total_rows = raw.len();
    let pct = |count: usize| {
        if total_rows == 0 {
            0.0
        } else {
            count as f64 / total_rows as f64 * 100.0
        }
    };

    let missing_customer = raw.iter().filter(|r| r.customer_id.is_none()).count();
    let mut missing_by_column: Vec<(String, usize)> = columns
        .iter()
        .map(|c| (c.name.clone(), c.missing))
        .collect();
    // stable: ties keep source column order
    missing_by_column.sort_by(|a, b| b.1.cmp(&a.1));

    let missing_customer_pct = pct(missing_customer);
    let duplicate_pct = pct(count_duplicates(raw));
    let negative_quantity_pct = pct(raw.iter().filter(|r| r.quantity < 0).count());
    let quality_score =
        100.0 - missing_customer_pct - duplicate_pct * 0.5 - negative_quantity_pct * 0.5;

    let mut countries: HashMap<&str, usize> = HashMap::new();
    for record in cleaned {
        *countries.entry(record.country.as_str()).or_default() += 1;
    }
    let mut top_countries: Vec<(String, usize)> = countries
        .into_iter()
        .map(|(country, count)| (country.to_string(), count))
        .collect();
    top_countries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_countries.truncate(10);

    let mut months: BTreeMap<(i32, u32), HashSet<&str>> = BTreeMap::new();
    for record in cleaned {
        let date = record.invoice_date;
        months
            .entry((date.year(), date.month()))
            .or_default()
            .insert(record.invoice_no.as_str());
    }
    let monthly_invoices = months
        .into_iter()
        .map(|((year, month), invoices)| (format!("{year:04}-{month:02}"), invoices.len()))
        .collect();

    DataAudit {
        total_rows,
        total_columns: columns.len(),
        missing_by_column,
        missing_customer_pct,
        duplicate_pct,
        negative_quantity_pct,
        quality_score,
        top_countries,
        monthly_invoices,
    }
}

/// Cleaned records as a frame, with the line total in a `Total` column
pub fn cleaned_frame(records: &[CleanedRecord]) -> crate::Result<DataFrame> {
    let df = df!(
        "InvoiceNo" => records.iter().map(|r| r.invoice_no.as_str()).collect::<Vec<_>>(),
        "StockCode" => records.iter().map(|r| r.stock_code.as_deref()).collect::<Vec<_>>(),
        "Description" => records.iter().map(|r| r.description.as_deref()).collect::<Vec<_>>(),
        "Quantity" => records.iter().map(|r| r.quantity).collect::<Vec<u64>>(),
        "InvoiceDate" => records
            .iter()
            .map(|r| r.invoice_date.format("%Y-%m-%d %H:%M:%S").to_string())
            .collect::<Vec<_>>(),
        "UnitPrice" => records.iter().map(|r| r.unit_price).collect::<Vec<f64>>(),
        "CustomerID" => records.iter().map(|r| r.customer_id.as_str()).collect::<Vec<_>>(),
        "Country" => records.iter().map(|r| r.country.as_str()).collect::<Vec<_>>(),
        "Total" => records.iter().map(|r| r.line_total).collect::<Vec<f64>>()
    )?;
    Ok(df)
}

/// RFM table with cluster id and segment label
pub fn segmented_frame(rows: &[SegmentedProfile]) -> crate::Result<DataFrame> {
    let df = df!(
        "CustomerID" => rows.iter().map(|r| r.profile.customer_id.as_str()).collect::<Vec<_>>(),
        "Recency" => rows.iter().map(|r| r.profile.recency_days).collect::<Vec<u32>>(),
        "Frequency" => rows.iter().map(|r| r.profile.frequency).collect::<Vec<u32>>(),
        "Monetary" => rows.iter().map(|r| r.profile.monetary).collect::<Vec<f64>>(),
        "Segment" => rows.iter().map(|r| r.assignment.cluster as u32).collect::<Vec<u32>>(),
        "SegmentLabel" => rows.iter().map(|r| r.assignment.label.as_str()).collect::<Vec<_>>()
    )?;
    Ok(df)
}

pub fn summary_frame(summaries: &[SegmentSummary]) -> crate::Result<DataFrame> {
    let df = df!(
        "SegmentLabel" => summaries.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(),
        "Recency" => summaries.iter().map(|s| s.mean_recency).collect::<Vec<f64>>(),
        "Frequency" => summaries.iter().map(|s| s.mean_frequency).collect::<Vec<f64>>(),
        "Monetary" => summaries.iter().map(|s| s.mean_monetary).collect::<Vec<f64>>(),
        "Customer Count" => summaries.iter().map(|s| s.count as u32).collect::<Vec<u32>>()
    )?;
    Ok(df)
}

pub fn write_csv<P: AsRef<Path>>(df: &mut DataFrame, path: P) -> crate::Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!(path = %path.display(), rows = df.height(), "wrote CSV");
    Ok(())
}
