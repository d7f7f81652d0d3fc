use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::constants::REQUIRED_COLUMNS;
use crate::error::{CleanerError, Result};
use crate::types::CleanSalesRecord;

/// Output columns for an input header: the dataset columns in the order the
/// input lists them. Falls back to the canonical order for an empty header.
pub fn output_columns(headers: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(REQUIRED_COLUMNS.len());
    for header in headers {
        if REQUIRED_COLUMNS.contains(&header.as_str()) && !columns.contains(header) {
            columns.push(header.clone());
        }
    }
    if columns.is_empty() {
        columns = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    }
    columns
}

/// Serialize cleaned records as CSV into any writer, one field per entry of
/// `columns`
pub fn write<W: Write>(writer: W, columns: &[String], records: &[CleanSalesRecord]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    csv_writer.write_record(columns)?;
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| record.value(column).unwrap_or_default())
            .collect();
        csv_writer.write_record(&row)?;
    }
    csv_writer
        .flush()
        .map_err(|e| CleanerError::io("<csv writer>", e))?;
    Ok(())
}

/// Write the cleaned table to `path`, replacing any previous file.
///
/// Rows go to a temporary file in the same directory, which is renamed over
/// `path` only once everything is flushed.
#[instrument(skip(columns, records), fields(path = %path.display(), rows = records.len()))]
pub fn write_file(path: &Path, columns: &[String], records: &[CleanSalesRecord]) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| CleanerError::io(parent.display().to_string(), e))?;
            parent
        }
        None => Path::new("."),
    };

    let staged = NamedTempFile::new_in(dir).map_err(|e| CleanerError::io(dir.display().to_string(), e))?;
    write(std::io::BufWriter::new(staged.as_file()), columns, records)?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| CleanerError::io(staged.path().display().to_string(), e))?;
    staged
        .persist(path)
        .map_err(|e| CleanerError::io(path.display().to_string(), e.error))?;

    info!("Wrote {} cleaned rows to {}", records.len(), path.display());
    crate::metrics::writer::rows_written(records.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, Platform};
    use chrono::NaiveDate;

    fn clean_record() -> CleanSalesRecord {
        CleanSalesRecord {
            date: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            product_name: "Vitamin C".to_string(),
            category: "Vitamin".to_string(),
            units_sold: 10,
            price: 5.0,
            revenue: 50.0,
            discount: 0.1,
            units_returned: 1,
            location: Location::Usa,
            platform: Platform::IHerb,
        }
    }

    fn canonical() -> Vec<String> {
        output_columns(&[])
    }

    fn headers(names: &str) -> Vec<String> {
        names.split(',').map(str::to_string).collect()
    }

    #[test]
    fn test_write_uses_dataset_header_and_canonical_values() {
        let mut buf = Vec::new();
        write(&mut buf, &canonical(), &[clean_record()]).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Product Name,Category,Units Sold,Price,Revenue,Discount,Units Returned,Location,Platform")
        );
        assert_eq!(lines.next(), Some("2023-01-02,Vitamin C,Vitamin,10,5.0,50.0,0.1,1,USA,iHerb"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_write_follows_input_column_order() {
        let columns = output_columns(&headers(
            "Date,Product Name,Category,Units Sold,Units Returned,Price,Discount,Revenue,Location,Platform",
        ));

        let mut buf = Vec::new();
        write(&mut buf, &columns, &[clean_record()]).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Product Name,Category,Units Sold,Units Returned,Price,Discount,Revenue,Location,Platform")
        );
        assert_eq!(lines.next(), Some("2023-01-02,Vitamin C,Vitamin,10,1,5.0,0.1,50.0,USA,iHerb"));
    }

    #[test]
    fn test_output_columns_skip_unknown_headers() {
        let columns = output_columns(&headers(
            "Platform,Notes,Location,Revenue,Discount,Price,Units Returned,Units Sold,Category,Product Name,Date",
        ));
        assert_eq!(columns.len(), 10);
        assert_eq!(columns[0], "Platform");
        assert_eq!(columns[9], "Date");
        assert!(!columns.contains(&"Notes".to_string()));
    }

    #[test]
    fn test_write_empty_table_keeps_header() {
        let mut buf = Vec::new();
        write(&mut buf, &canonical(), &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Date,Product Name,"));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_write_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned").join("out.csv");

        write_file(&path, &canonical(), &[clean_record(), clean_record()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_write_file_replaces_previous_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale\nstale\nstale\nstale\n").unwrap();

        write_file(&path, &canonical(), &[clean_record()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains("stale"));

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_file_failure_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::create_dir(&path).unwrap();

        // A directory in the way makes the final rename fail
        assert!(write_file(&path, &canonical(), &[clean_record()]).is_err());
        assert!(path.is_dir());

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
