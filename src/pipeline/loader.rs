//! Raw CSV loading.
//!
//! Reads the sales CSV into typed `SalesRecord`s. Schema problems and an
//! unreadable file are fatal; a bad value only takes its own row out of the
//! typed table and is reported as a `MalformedValue`/`MissingData` issue.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::constants::{
    COL_CATEGORY, COL_DATE, COL_DISCOUNT, COL_LOCATION, COL_PLATFORM, COL_PRICE, COL_PRODUCT_NAME,
    COL_REVENUE, COL_UNITS_RETURNED, COL_UNITS_SOLD, DATETIME_FORMAT, DATE_FORMATS, REQUIRED_COLUMNS,
};
use crate::error::{CleanerError, Result};
use crate::pipeline::issues::{QualityIssue, QualityIssueType};
use crate::types::{RawSalesRow, SalesRecord};

/// The in-memory table produced by the loader
#[derive(Debug, Clone, Default)]
pub struct LoadedTable {
    /// Header row as found in the file
    pub headers: Vec<String>,
    /// Rows that parsed into typed records
    pub records: Vec<SalesRecord>,
    /// Parse problems, one or more per rejected row
    pub issues: Vec<QualityIssue>,
    /// Number of data rows in the file, parsed or not
    pub rows_read: usize,
}

impl LoadedTable {
    /// Lines that could not be turned into a typed record
    pub fn malformed_lines(&self) -> BTreeSet<usize> {
        self.issues.iter().filter_map(|i| i.line).collect()
    }
}

/// Read the whole input file into memory
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| CleanerError::io(path.display().to_string(), e))
}

/// Load and parse the CSV at `path`
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_file(path: &Path) -> Result<LoadedTable> {
    let bytes = read_input(path)?;
    let table = load(bytes.as_slice())?;
    if table.rows_read == 0 {
        return Err(CleanerError::EmptyInput(path.display().to_string()));
    }
    Ok(table)
}

/// Load and parse sales rows from any reader
pub fn load<R: Read>(reader: R) -> Result<LoadedTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let header_names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
    validate_schema(&header_names)?;

    // Trimmed header names so that " Price" still maps onto the Price field
    let trimmed_headers = csv::StringRecord::from(header_names.clone());

    let mut table = LoadedTable {
        headers: header_names,
        ..Default::default()
    };

    for result in csv_reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                table.rows_read += 1;
                let line = e.position().map(|p| p.line() as usize).unwrap_or(table.rows_read + 1);
                table.issues.push(QualityIssue::error(
                    line,
                    QualityIssueType::MalformedValue,
                    "*",
                    format!("Row could not be read: {}", e),
                ));
                continue;
            }
        };
        table.rows_read += 1;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(table.rows_read + 1);

        let raw: RawSalesRow = match record.deserialize(Some(&trimmed_headers)) {
            Ok(raw) => raw,
            Err(e) => {
                table.issues.push(QualityIssue::error(
                    line,
                    QualityIssueType::MalformedValue,
                    "*",
                    format!("Row does not match the expected columns: {}", e),
                ));
                continue;
            }
        };

        match parse_row(line, &raw) {
            Ok(parsed) => table.records.push(parsed),
            Err(row_issues) => table.issues.extend(row_issues),
        }
    }

    info!(
        rows_read = table.rows_read,
        parsed = table.records.len(),
        malformed = table.malformed_lines().len(),
        "Loaded raw sales table"
    );
    crate::metrics::loader::rows_read(table.rows_read);
    crate::metrics::loader::rows_malformed(table.malformed_lines().len());

    Ok(table)
}

/// Fail when any required column is absent from the header
pub fn validate_schema(headers: &[String]) -> Result<()> {
    let present: BTreeSet<&str> = headers.iter().map(String::as_str).collect();
    let missing: BTreeSet<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CleanerError::MissingColumns(
            missing.into_iter().map(str::to_string).collect(),
        ))
    }
}

/// Turn a raw text row into a typed record, collecting every field problem
pub fn parse_row(line: usize, raw: &RawSalesRow) -> std::result::Result<SalesRecord, Vec<QualityIssue>> {
    let mut issues = Vec::new();

    let date = collect(&mut issues, parse_date(line, &raw.date));
    let product_name = collect(&mut issues, required_text(line, COL_PRODUCT_NAME, &raw.product_name));
    let category = collect(&mut issues, required_text(line, COL_CATEGORY, &raw.category));
    let units_sold = collect(&mut issues, parse_units(line, COL_UNITS_SOLD, &raw.units_sold));
    let price = collect(&mut issues, parse_decimal(line, COL_PRICE, &raw.price));
    let revenue = collect(&mut issues, parse_decimal(line, COL_REVENUE, &raw.revenue));
    let discount = collect(&mut issues, parse_decimal(line, COL_DISCOUNT, &raw.discount));
    let units_returned = collect(&mut issues, parse_units(line, COL_UNITS_RETURNED, &raw.units_returned));
    let location = collect(&mut issues, required_text(line, COL_LOCATION, &raw.location));
    let platform = collect(&mut issues, required_text(line, COL_PLATFORM, &raw.platform));

    match (
        date,
        product_name,
        category,
        units_sold,
        price,
        revenue,
        discount,
        units_returned,
        location,
        platform,
    ) {
        (
            Some(date),
            Some(product_name),
            Some(category),
            Some(units_sold),
            Some(price),
            Some(revenue),
            Some(discount),
            Some(units_returned),
            Some(location),
            Some(platform),
        ) => Ok(SalesRecord {
            line,
            date,
            product_name,
            category,
            units_sold,
            price,
            revenue,
            discount,
            units_returned,
            location,
            platform,
        }),
        _ => {
            debug!(line, issues = issues.len(), "Row rejected at load");
            Err(issues)
        }
    }
}

fn collect<T>(issues: &mut Vec<QualityIssue>, result: std::result::Result<T, QualityIssue>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(issue) => {
            issues.push(issue);
            None
        }
    }
}

fn missing(line: usize, field: &str) -> QualityIssue {
    QualityIssue::error(line, QualityIssueType::MissingData, field, format!("{} is missing", field))
}

fn required_text(line: usize, field: &str, value: &str) -> std::result::Result<String, QualityIssue> {
    if value.trim().is_empty() {
        return Err(missing(line, field));
    }
    // Surrounding whitespace is kept; it is the normalizer's job
    Ok(value.to_string())
}

/// Parse a date in any of the accepted layouts
pub fn parse_date(line: usize, value: &str) -> std::result::Result<NaiveDate, QualityIssue> {
    let value = value.trim();
    if value.is_empty() {
        return Err(missing(line, COL_DATE));
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
        .ok_or_else(|| {
            QualityIssue::error(
                line,
                QualityIssueType::MalformedValue,
                COL_DATE,
                format!("Unparseable date '{}'", value),
            )
            .with_suggestion("Use YYYY-MM-DD")
        })
}

fn parse_decimal(line: usize, field: &str, value: &str) -> std::result::Result<f64, QualityIssue> {
    let value = value.trim();
    if value.is_empty() {
        return Err(missing(line, field));
    }

    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(QualityIssue::error(
            line,
            QualityIssueType::MalformedValue,
            field,
            format!("{} '{}' is not a number", field, value),
        )),
    }
}

/// Units are whole numbers; "12.0" is accepted, "12.5" is not
fn parse_units(line: usize, field: &str, value: &str) -> std::result::Result<i64, QualityIssue> {
    let trimmed = value.trim();
    if let Ok(units) = trimmed.parse::<i64>() {
        return Ok(units);
    }

    let number = parse_decimal(line, field, value)?;
    if number.fract() != 0.0 || number.abs() > i64::MAX as f64 {
        return Err(QualityIssue::error(
            line,
            QualityIssueType::MalformedValue,
            field,
            format!("{} '{}' is not a whole number", field, trimmed),
        ));
    }
    Ok(number as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::issues::QualitySeverity;

    const HEADER: &str =
        "Date,Product Name,Category,Units Sold,Price,Revenue,Discount,Units Returned,Location,Platform";

    fn csv_with(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out.push('\n');
        out
    }

    #[test]
    fn test_load_parses_valid_rows() {
        let data = csv_with(&[
            "2023-01-02,Vitamin C,Vitamin,10,5.00,50.00,0.1,1, usa ,amazon",
            "2023-01-09,Zinc,Mineral,4,12.5,50,0.0,0,Canada,Walmart",
        ]);

        let table = load(data.as_bytes()).unwrap();
        assert_eq!(table.rows_read, 2);
        assert_eq!(table.records.len(), 2);
        assert!(table.issues.is_empty());

        let first = &table.records[0];
        assert_eq!(first.line, 2);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2023, 1, 2).unwrap());
        assert_eq!(first.units_sold, 10);
        assert!((first.price - 5.0).abs() < 1e-9);
        assert_eq!(first.location, " usa ");
        assert_eq!(table.records[1].line, 3);
    }

    #[test]
    fn test_load_reports_malformed_rows_without_dropping_them_silently() {
        let data = csv_with(&[
            "2023-01-02,Vitamin C,Vitamin,10,5.00,50.00,0.1,1,USA,Amazon",
            "not-a-date,Zinc,Mineral,ten,12.5,50,0.0,0,Canada,Walmart",
            "2023-01-16,Zinc,Mineral,4.5,12.5,,0.0,0,Canada,Walmart",
        ]);

        let table = load(data.as_bytes()).unwrap();
        assert_eq!(table.rows_read, 3);
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.malformed_lines().into_iter().collect::<Vec<_>>(), vec![3, 4]);
        assert!(table.issues.iter().all(|i| i.severity == QualitySeverity::Error));

        let fields: Vec<_> = table
            .issues
            .iter()
            .filter(|i| i.line == Some(3))
            .filter_map(|i| i.field.clone())
            .collect();
        assert_eq!(fields, vec![COL_DATE.to_string(), COL_UNITS_SOLD.to_string()]);

        assert!(table
            .issues
            .iter()
            .any(|i| i.line == Some(4) && i.issue_type == QualityIssueType::MissingData));
    }

    #[test]
    fn test_load_accepts_whole_float_units_and_reordered_columns() {
        let data = "Platform,Location,Units Returned,Discount,Revenue,Price,Units Sold,Category,Product Name,Date\n\
                    iHerb,UK,0,0.2,40.0,5.0,8.0,Herbal,Ashwagandha,01/30/2023\n";

        let table = load(data.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 1);
        let record = &table.records[0];
        assert_eq!(record.units_sold, 8);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2023, 1, 30).unwrap());
        assert_eq!(record.platform, "iHerb");
    }

    #[test]
    fn test_missing_columns_are_fatal() {
        let data = "Date,Product Name,Category,Units Sold,Price\n2023-01-02,Zinc,Mineral,1,2.0\n";

        match load(data.as_bytes()) {
            Err(CleanerError::MissingColumns(columns)) => {
                assert_eq!(
                    columns,
                    vec!["Discount", "Location", "Platform", "Revenue", "Units Returned"]
                );
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_short_row_is_reported() {
        let data = csv_with(&["2023-01-02,Zinc,Mineral,1"]);

        let table = load(data.as_bytes()).unwrap();
        assert_eq!(table.rows_read, 1);
        assert!(table.records.is_empty());
        assert_eq!(table.issues.len(), 1);
        assert_eq!(table.issues[0].issue_type, QualityIssueType::MalformedValue);
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(parse_date(2, "2024-03-04").unwrap(), expected);
        assert_eq!(parse_date(2, "2024/03/04").unwrap(), expected);
        assert_eq!(parse_date(2, "03/04/2024").unwrap(), expected);
        assert_eq!(parse_date(2, "2024-03-04 00:00:00").unwrap(), expected);
        assert!(parse_date(2, "March 4th").is_err());
    }
}
