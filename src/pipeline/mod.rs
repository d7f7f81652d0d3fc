//! The cleaning pipeline: load, validate, infer the revenue formula,
//! normalize, write. Each stage runs once over the whole table.

pub mod formula;
pub mod issues;
pub mod loader;
pub mod normalize;
pub mod text;
pub mod validator;
pub mod writer;

use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{CleanerConfig, InvalidRowPolicy};
use crate::error::{CleanerError, Result};
use crate::report::{sha256_hex, RunReport, RunStatus};
use crate::types::CleanSalesRecord;

use self::formula::{FormulaInferencer, FormulaSummary};
use self::issues::{invalid_lines, IssueCounts, QualityIssue};
use self::normalize::Normalizer;
use self::validator::Validator;

/// Whether the run ends by writing the cleaned table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Full run, cleaned CSV and run report are written when configured
    Clean,
    /// Every stage except the writer; nothing is written to disk
    Check,
}

pub struct Pipeline {
    config: CleanerConfig,
}

impl Pipeline {
    pub fn new(config: CleanerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Run all stages against the configured input.
    ///
    /// Fatal problems (unreadable input, missing columns, write failures) are
    /// returned as errors. Invalid rows are not: they end up in the report,
    /// whose status tells whether the cleaned file was written.
    #[instrument(skip(self), fields(input = %self.config.paths.input.display()))]
    pub fn run(&self, mode: RunMode) -> Result<RunReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let paths = &self.config.paths;
        let policy = self.config.run.policy;

        // Step 1: load
        let bytes = loader::read_input(&paths.input)?;
        let input_sha256 = sha256_hex(&bytes);
        let table = loader::load(bytes.as_slice())?;
        if table.rows_read == 0 {
            return Err(CleanerError::EmptyInput(paths.input.display().to_string()));
        }

        // Step 2: validate
        let mut issues: Vec<QualityIssue> = table.issues.clone();
        issues.extend(Validator::new(self.config.validation.clone()).validate(&table.records));

        // Step 3: infer the revenue formula
        let inference = FormulaInferencer::new(
            self.config.validation.revenue_tolerance,
            self.config.validation.required_formula(),
        )
        .infer(&table.records);
        issues.extend(inference.issues);

        // Step 4: normalize
        let normalized = Normalizer::with_config(&self.config.normalize)
            .with_strict_dictionaries(self.config.validation.strict_dictionaries)
            .normalize(&table.records);
        issues.extend(normalized.issues);

        issues.sort_by_key(|i| (i.line.unwrap_or(0), std::cmp::Reverse(i.severity)));
        for issue in &issues {
            issue.log();
        }

        let invalid = invalid_lines(&issues);
        let clean: Vec<CleanSalesRecord> = normalized
            .rows
            .into_iter()
            .filter(|row| !invalid.contains(&row.line))
            .map(|row| row.record)
            .collect();

        // Step 5: write
        let (status, output, rows_written) = match mode {
            RunMode::Check => (RunStatus::Checked, None, 0),
            RunMode::Clean if !invalid.is_empty() && policy == InvalidRowPolicy::Abort => {
                warn!(invalid_rows = invalid.len(), "Invalid rows found, cleaned file will not be written");
                (RunStatus::Aborted, None, 0)
            }
            RunMode::Clean => {
                if !invalid.is_empty() {
                    warn!(rejected_rows = invalid.len(), "Rejecting invalid rows");
                    crate::metrics::writer::rows_rejected(invalid.len());
                }
                writer::write_file(&paths.output, &writer::output_columns(&table.headers), &clean)?;
                (RunStatus::Written, Some(paths.output.display().to_string()), clean.len())
            }
        };

        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            input: paths.input.display().to_string(),
            input_sha256,
            output,
            status,
            policy,
            rows_read: table.rows_read,
            rows_parsed: table.records.len(),
            rows_written,
            invalid_lines: invalid.into_iter().collect(),
            issue_counts: IssueCounts::tally(&issues),
            formula: inference.summary,
            normalization: normalized.summary,
            issues,
        };

        if let (RunMode::Clean, Some(report_path)) = (mode, &paths.report) {
            report.write_json(report_path)?;
        }

        crate::metrics::run::duration_recorded(timer.elapsed().as_secs_f64());
        info!(
            status = ?report.status,
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            invalid_rows = report.invalid_lines.len(),
            "Pipeline finished"
        );

        Ok(report)
    }
}

/// Outcome of a formula-only pass over a file
#[derive(Debug, Clone)]
pub struct FormulaCheck {
    /// Rows that could not be parsed and were left out of the inference
    pub malformed_rows: usize,
    pub summary: FormulaSummary,
}

/// Load `path` and infer the revenue formula without enforcing any of them
#[instrument(skip(path), fields(path = %path.display()))]
pub fn check_formula(path: &Path, tolerance: f64) -> Result<FormulaCheck> {
    let table = loader::load_file(path)?;
    let inference = FormulaInferencer::new(tolerance, None).infer(&table.records);
    Ok(FormulaCheck {
        malformed_rows: table.malformed_lines().len(),
        summary: inference.summary,
    })
}
