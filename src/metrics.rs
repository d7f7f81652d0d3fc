//! Run metrics.
//!
//! Stages record through the `metrics` facade. Nothing is exported unless a
//! recorder is installed with [`install_recorder`]; the binary does that when
//! `run.metrics_path` is configured and writes the Prometheus text exposition
//! to that file when the run ends.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

use crate::error::{CleanerError, Result};

/// Catalog of metric names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    RowsRead,
    RowsMalformed,
    IssuesDetected,
    FormulaMatches,
    ValuesCorrected,
    RowsWritten,
    RowsRejected,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsRead => "sales_cleaner_rows_read_total",
            MetricName::RowsMalformed => "sales_cleaner_rows_malformed_total",
            MetricName::IssuesDetected => "sales_cleaner_issues_detected_total",
            MetricName::FormulaMatches => "sales_cleaner_formula_matches",
            MetricName::ValuesCorrected => "sales_cleaner_values_corrected_total",
            MetricName::RowsWritten => "sales_cleaner_rows_written_total",
            MetricName::RowsRejected => "sales_cleaner_rows_rejected_total",
            MetricName::RunDuration => "sales_cleaner_run_duration_seconds",
        }
    }
}

/// Install the Prometheus recorder as the global metrics sink
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CleanerError::Config(format!("Failed to install metrics recorder: {}", e)))
}

/// Render the current metrics into a text file
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CleanerError::io(parent.display().to_string(), e))?;
    }
    std::fs::write(path, handle.render()).map_err(|e| CleanerError::io(path.display().to_string(), e))
}

pub mod loader {
    use super::MetricName;

    pub fn rows_read(count: usize) {
        ::metrics::counter!(MetricName::RowsRead.as_str()).increment(count as u64);
    }

    pub fn rows_malformed(count: usize) {
        ::metrics::counter!(MetricName::RowsMalformed.as_str()).increment(count as u64);
    }
}

pub mod validation {
    use super::MetricName;
    use crate::pipeline::issues::{QualityIssueType, QualitySeverity};

    /// Record that a quality issue was detected
    pub fn issue_detected(issue_type: QualityIssueType, severity: QualitySeverity) {
        ::metrics::counter!(MetricName::IssuesDetected.as_str(),
            "issue_type" => format!("{:?}", issue_type),
            "severity" => format!("{:?}", severity)
        )
        .increment(1);
    }
}

pub mod formula {
    use super::MetricName;
    use crate::pipeline::formula::RevenueFormula;

    pub fn matches_recorded(formula: RevenueFormula, matches: usize) {
        ::metrics::gauge!(MetricName::FormulaMatches.as_str(),
            "formula" => format!("{:?}", formula)
        )
        .set(matches as f64);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn values_corrected(column: &str, count: usize) {
        ::metrics::counter!(MetricName::ValuesCorrected.as_str(),
            "column" => column.to_string()
        )
        .increment(count as u64);
    }
}

pub mod writer {
    use super::MetricName;

    pub fn rows_written(count: usize) {
        ::metrics::counter!(MetricName::RowsWritten.as_str()).increment(count as u64);
    }

    pub fn rows_rejected(count: usize) {
        ::metrics::counter!(MetricName::RowsRejected.as_str()).increment(count as u64);
    }
}

pub mod run {
    use super::MetricName;

    pub fn duration_recorded(seconds: f64) {
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(seconds);
    }
}
