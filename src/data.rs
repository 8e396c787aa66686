//! Transaction loading and cleaning
//!
//! Raw rows are read with Polars as plain strings and converted into typed
//! [`TransactionRecord`]s. Cleaning turns them into [`CleanedRecord`]s, which
//! carry a guaranteed customer id, a non-negative quantity and the line total.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info};

/// Column names of the Online Retail export
pub const COL_INVOICE: &str = "InvoiceNo";
pub const COL_STOCK_CODE: &str = "StockCode";
pub const COL_DESCRIPTION: &str = "Description";
pub const COL_QUANTITY: &str = "Quantity";
pub const COL_INVOICE_DATE: &str = "InvoiceDate";
pub const COL_UNIT_PRICE: &str = "UnitPrice";
pub const COL_CUSTOMER: &str = "CustomerID";
pub const COL_COUNTRY: &str = "Country";

/// One retail transaction line as loaded, before any filtering
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub invoice_no: String,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    /// Negative for returns
    pub quantity: i64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub customer_id: Option<String>,
    pub country: String,
}

impl TransactionRecord {
    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    fn row_key(&self) -> RowKey<'_> {
        RowKey {
            invoice_no: &self.invoice_no,
            stock_code: self.stock_code.as_deref(),
            description: self.description.as_deref(),
            quantity: self.quantity,
            invoice_date: self.invoice_date,
            // +0.0 and -0.0 are the same price
            unit_price: if self.unit_price == 0.0 {
                0
            } else {
                self.unit_price.to_bits()
            },
            customer_id: self.customer_id.as_deref(),
            country: &self.country,
        }
    }
}

/// Every field of a row; two rows with equal keys are exact duplicates
#[derive(PartialEq, Eq, Hash)]
struct RowKey<'a> {
    invoice_no: &'a str,
    stock_code: Option<&'a str>,
    description: Option<&'a str>,
    quantity: i64,
    invoice_date: NaiveDateTime,
    unit_price: u64,
    customer_id: Option<&'a str>,
    country: &'a str,
}

/// A transaction line that survived cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub invoice_no: String,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    pub quantity: u64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub customer_id: String,
    pub country: String,
    /// quantity × unit price, derived once at cleaning time
    pub line_total: f64,
}

/// How many rows each cleaning rule removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleaningReport {
    pub raw_count: usize,
    pub missing_customer: usize,
    pub negative_quantity: usize,
    pub duplicates: usize,
    pub cleaned_count: usize,
}

/// Drop rows without a customer, returns and exact duplicates, in that order.
///
/// The first occurrence of a duplicated row is kept and input order is preserved.
pub fn clean_records(raw: &[TransactionRecord]) -> (Vec<CleanedRecord>, CleaningReport) {
    let mut report = CleaningReport {
        raw_count: raw.len(),
        ..Default::default()
    };

    let with_customer: Vec<&TransactionRecord> =
        raw.iter().filter(|r| r.customer_id.is_some()).collect();
    report.missing_customer = raw.len() - with_customer.len();

    let non_returns: Vec<&TransactionRecord> = with_customer
        .into_iter()
        .filter(|r| r.quantity >= 0)
        .collect();
    report.negative_quantity = raw.len() - report.missing_customer - non_returns.len();

    let mut seen = HashSet::with_capacity(non_returns.len());
    let mut cleaned = Vec::with_capacity(non_returns.len());
    for record in non_returns {
        if !seen.insert(record.row_key()) {
            report.duplicates += 1;
            continue;
        }
        if let Some(row) = to_cleaned(record) {
            cleaned.push(row);
        }
    }
    report.cleaned_count = cleaned.len();

    info!(
        raw = report.raw_count,
        missing_customer = report.missing_customer,
        negative_quantity = report.negative_quantity,
        duplicates = report.duplicates,
        cleaned = report.cleaned_count,
        "cleaned transaction records"
    );

    (cleaned, report)
}

fn to_cleaned(record: &TransactionRecord) -> Option<CleanedRecord> {
    let customer_id = record.customer_id.clone()?;
    let quantity = u64::try_from(record.quantity).ok()?;
    Some(CleanedRecord {
        invoice_no: record.invoice_no.clone(),
        stock_code: record.stock_code.clone(),
        description: record.description.clone(),
        quantity,
        invoice_date: record.invoice_date,
        unit_price: record.unit_price,
        customer_id,
        country: record.country.clone(),
        line_total: record.line_total(),
    })
}

/// Number of rows that exactly repeat an earlier row in the raw table
pub fn count_duplicates(raw: &[TransactionRecord]) -> usize {
    let mut seen = HashSet::with_capacity(raw.len());
    raw.iter().filter(|r| !seen.insert(r.row_key())).count()
}

/// A source column and how many of its cells are empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProfile {
    pub name: String,
    pub missing: usize,
}

/// Parsed transactions together with the columns they were read from
#[derive(Debug, Clone)]
pub struct TransactionTable {
    /// Every column of the source, in file order
    pub columns: Vec<ColumnProfile>,
    pub records: Vec<TransactionRecord>,
}

/// Load transaction lines from a CSV file in the Online Retail layout.
///
/// # Arguments
///
/// * `path` - CSV file with a header row; `StockCode` and `Description` may be absent
///
/// # Returns
///
/// One [`TransactionRecord`] per data row, in file order. Fails with the
/// offending line number on an unparseable quantity, price or date, and on a
/// missing required column.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> crate::Result<Vec<TransactionRecord>> {
    Ok(load_transaction_table(path)?.records)
}

/// Like [`load_transactions`], also keeping the empty-cell count of every source column
pub fn load_transaction_table<P: AsRef<Path>>(path: P) -> crate::Result<TransactionTable> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading transactions");

    // Every column is read as a string; typing happens row by row below so
    // the error can name the offending line.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("failed to read CSV file '{}'", path.display()))?;

    let records = parse_transactions(&df)?;
    let columns = profile_columns(&df)?;
    info!(
        rows = records.len(),
        columns = columns.len(),
        path = %path.display(),
        "loaded transactions"
    );
    Ok(TransactionTable { columns, records })
}

/// Empty-cell count of every column of a string-typed frame
pub fn profile_columns(df: &DataFrame) -> crate::Result<Vec<ColumnProfile>> {
    df.get_columns()
        .iter()
        .map(|column| -> crate::Result<ColumnProfile> {
            let missing = column
                .str()?
                .into_iter()
                .filter(|value| non_empty(*value).is_none())
                .count();
            Ok(ColumnProfile {
                name: column.name().to_string(),
                missing,
            })
        })
        .collect()
}

/// Column profile of records built in memory, which carry all eight retail columns
pub fn record_columns(raw: &[TransactionRecord]) -> Vec<ColumnProfile> {
    let count = |pred: fn(&TransactionRecord) -> bool| raw.iter().filter(|r| pred(r)).count();
    [
        (COL_INVOICE, count(|r| r.invoice_no.trim().is_empty())),
        (COL_STOCK_CODE, count(|r| r.stock_code.is_none())),
        (COL_DESCRIPTION, count(|r| r.description.is_none())),
        (COL_QUANTITY, 0),
        (COL_INVOICE_DATE, 0),
        (COL_UNIT_PRICE, 0),
        (COL_CUSTOMER, count(|r| r.customer_id.is_none())),
        (COL_COUNTRY, count(|r| r.country.is_empty())),
    ]
    .into_iter()
    .map(|(name, missing)| ColumnProfile {
        name: name.to_string(),
        missing,
    })
    .collect()
}

/// Convert a string-typed frame into transaction records
pub fn parse_transactions(df: &DataFrame) -> crate::Result<Vec<TransactionRecord>> {
    let invoices = required_column(df, COL_INVOICE)?;
    let quantities = required_column(df, COL_QUANTITY)?;
    let dates = required_column(df, COL_INVOICE_DATE)?;
    let prices = required_column(df, COL_UNIT_PRICE)?;
    let customers = required_column(df, COL_CUSTOMER)?;
    let countries = required_column(df, COL_COUNTRY)?;
    let stock_codes = optional_column(df, COL_STOCK_CODE)?;
    let descriptions = optional_column(df, COL_DESCRIPTION)?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        // header is line 1
        let line = i + 2;
        let invoice_no = non_empty(invoices[i])
            .with_context(|| format!("line {line}: missing {COL_INVOICE}"))?;
        let quantity = parse_quantity(quantities[i])
            .with_context(|| format!("line {line}: invalid {COL_QUANTITY} {:?}", quantities[i]))?;
        let invoice_date = dates[i]
            .and_then(parse_timestamp)
            .with_context(|| format!("line {line}: invalid {COL_INVOICE_DATE} {:?}", dates[i]))?;
        let unit_price = prices[i]
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|p| p.is_finite())
            .with_context(|| format!("line {line}: invalid {COL_UNIT_PRICE} {:?}", prices[i]))?;

        records.push(TransactionRecord {
            invoice_no,
            stock_code: stock_codes.as_ref().and_then(|c| non_empty(c[i])),
            description: descriptions.as_ref().and_then(|c| non_empty(c[i])),
            quantity,
            invoice_date,
            unit_price,
            customer_id: customers[i].and_then(normalize_customer_id),
            country: non_empty(countries[i]).unwrap_or_default(),
        });
    }

    Ok(records)
}

fn required_column<'a>(df: &'a DataFrame, name: &str) -> crate::Result<Vec<Option<&'a str>>> {
    let column = df
        .column(name)
        .with_context(|| format!("input is missing required column '{name}'"))?;
    Ok(column.str()?.into_iter().collect())
}

fn optional_column<'a>(df: &'a DataFrame, name: &str) -> crate::Result<Option<Vec<Option<&'a str>>>> {
    match df.column(name) {
        Ok(column) => Ok(Some(column.str()?.into_iter().collect())),
        Err(_) => Ok(None),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_quantity(value: Option<&str>) -> Option<i64> {
    let s = value?.trim();
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|q| q.is_finite() && q.fract() == 0.0)
            .map(|q| q as i64)
    })
}

/// Spreadsheet exports store numeric ids as floats ("17850.0")
pub fn normalize_customer_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    if id.is_empty() || id.eq_ignore_ascii_case("nan") {
        return None;
    }
    match id.strip_suffix(".0") {
        Some(int_part) if !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit()) => {
            Some(int_part.to_string())
        }
        _ => Some(id.to_string()),
    }
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse an invoice timestamp in any of the layouts seen in retail exports
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub(crate) fn record(customer: Option<&str>, invoice: &str, quantity: i64, price: f64, date: &str) -> TransactionRecord {
        TransactionRecord {
            invoice_no: invoice.to_string(),
            stock_code: Some("85123A".to_string()),
            description: Some("WHITE HANGING HEART T-LIGHT HOLDER".to_string()),
            quantity,
            invoice_date: parse_timestamp(date).unwrap(),
            unit_price: price,
            customer_id: customer.map(str::to_string),
            country: "United Kingdom".to_string(),
        }
    }

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01T08:26:00Z,2.55,17850,United Kingdom").unwrap();
        writeln!(file, "536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850.0,United Kingdom").unwrap();
        writeln!(file, "536366,22633,HAND WARMER UNION JACK,6,2010-12-01 08:28:00,1.85,,United Kingdom").unwrap();
        writeln!(file, "C536379,D,Discount,-1,2010-12-01T09:41:00,27.50,14527,United Kingdom").unwrap();
        file
    }

    #[test]
    fn test_load_transactions() {
        let file = create_test_csv();
        let records = load_transactions(file.path()).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].customer_id.as_deref(), Some("17850"));
        assert_eq!(records[1].customer_id.as_deref(), Some("17850"));
        assert_eq!(records[2].customer_id, None);
        assert_eq!(records[3].quantity, -1);
        assert_eq!(records[1].invoice_date, parse_timestamp("2010-12-01T08:26:00").unwrap());
        assert_eq!(records[1].description.as_deref(), Some("WHITE METAL LANTERN"));
    }

    #[test]
    fn test_load_table_profiles_source_columns() {
        let file = create_test_csv();
        let table = load_transaction_table(file.path()).unwrap();

        assert_eq!(table.records.len(), 4);
        assert_eq!(table.columns.len(), 8);
        assert_eq!(table.columns[0].name, COL_INVOICE);
        let customer = table.columns.iter().find(|c| c.name == COL_CUSTOMER).unwrap();
        assert_eq!(customer.missing, 1);
        assert!(table
            .columns
            .iter()
            .filter(|c| c.name != COL_CUSTOMER)
            .all(|c| c.missing == 0));
    }

    #[test]
    fn test_load_table_without_product_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "536365,6,2010-12-01T08:26:00,2.55,17850,").unwrap();

        let table = load_transaction_table(file.path()).unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![COL_INVOICE, COL_QUANTITY, COL_INVOICE_DATE, COL_UNIT_PRICE, COL_CUSTOMER, COL_COUNTRY]
        );
        assert_eq!(table.columns[5].missing, 1);
        assert_eq!(table.records[0].stock_code, None);
    }

    #[test]
    fn test_record_columns_counts_missing_fields() {
        let mut raw = vec![
            record(Some("1"), "1", 1, 1.0, "2011-01-01"),
            record(None, "2", 1, 1.0, "2011-01-02"),
        ];
        raw[1].description = None;

        let columns = record_columns(&raw);
        assert_eq!(columns.len(), 8);
        let missing = |name: &str| columns.iter().find(|c| c.name == name).unwrap().missing;
        assert_eq!(missing(COL_CUSTOMER), 1);
        assert_eq!(missing(COL_DESCRIPTION), 1);
        assert_eq!(missing(COL_STOCK_CODE), 0);
    }

    #[test]
    fn test_load_rejects_bad_quantity() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,Quantity,InvoiceDate,UnitPrice,CustomerID,Country").unwrap();
        writeln!(file, "536365,six,2010-12-01T08:26:00,2.55,17850,United Kingdom").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "InvoiceNo,Quantity,InvoiceDate,UnitPrice,Country").unwrap();
        writeln!(file, "536365,6,2010-12-01T08:26:00,2.55,United Kingdom").unwrap();

        let err = load_transactions(file.path()).unwrap_err();
        assert!(err.to_string().contains("CustomerID"), "{err}");
    }

    #[test]
    fn test_clean_records_applies_rules_in_order() {
        let raw = vec![
            record(Some("A"), "1", 2, 5.0, "2011-01-01"),
            record(Some("A"), "1", 2, 5.0, "2011-01-01"),
            record(None, "2", 1, 3.0, "2011-01-02"),
            record(None, "2", 1, 3.0, "2011-01-02"),
            record(Some("B"), "C3", -4, 1.0, "2011-01-03"),
            record(Some("B"), "4", 0, 1.0, "2011-01-04"),
        ];

        let (cleaned, report) = clean_records(&raw);

        assert_eq!(report.raw_count, 6);
        assert_eq!(report.missing_customer, 2);
        assert_eq!(report.negative_quantity, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.cleaned_count, 2);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].line_total, 10.0);
        assert_eq!(cleaned[1].quantity, 0);
        assert!(cleaned.len() <= raw.len());
    }

    #[test]
    fn test_rows_differing_only_in_product_are_kept() {
        let mut other = record(Some("A"), "1", 2, 5.0, "2011-01-01");
        other.stock_code = Some("71053".to_string());
        let raw = vec![record(Some("A"), "1", 2, 5.0, "2011-01-01"), other];

        let (cleaned, report) = clean_records(&raw);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.duplicates, 0);
    }

    #[test]
    fn test_count_duplicates_on_raw_rows() {
        let raw = vec![
            record(None, "2", 1, 3.0, "2011-01-02"),
            record(None, "2", 1, 3.0, "2011-01-02"),
            record(None, "2", 1, 3.0, "2011-01-02"),
        ];
        assert_eq!(count_duplicates(&raw), 2);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2010, 12, 1)
            .unwrap()
            .and_hms_opt(8, 26, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2010-12-01T08:26:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2010-12-01T08:26:00"), Some(expected));
        assert_eq!(parse_timestamp("2010-12-01 08:26:00"), Some(expected));
        assert_eq!(parse_timestamp("12/1/2010 8:26"), Some(expected));
        assert_eq!(
            parse_timestamp("2010-12-01"),
            NaiveDate::from_ymd_opt(2010, 12, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_normalize_customer_id() {
        assert_eq!(normalize_customer_id("17850.0").as_deref(), Some("17850"));
        assert_eq!(normalize_customer_id(" 17850 ").as_deref(), Some("17850"));
        assert_eq!(normalize_customer_id("AB.0").as_deref(), Some("AB.0"));
        assert_eq!(normalize_customer_id(""), None);
        assert_eq!(normalize_customer_id("NaN"), None);
    }
}
