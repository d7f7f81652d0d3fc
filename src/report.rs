use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::config::InvalidRowPolicy;
use crate::error::{CleanerError, Result};
use crate::pipeline::formula::{FormulaSummary, FormulaVerdict};
use crate::pipeline::issues::{IssueCounts, QualityIssue, QualitySeverity};
use crate::pipeline::normalize::NormalizationSummary;

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Cleaned CSV was written
    Written,
    /// Check-only run, nothing written by design
    Checked,
    /// Invalid rows under the abort policy, nothing written
    Aborted,
}

/// Everything a human needs to review one cleaning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: String,
    pub input_sha256: String,
    pub output: Option<String>,
    pub status: RunStatus,
    pub policy: InvalidRowPolicy,
    pub rows_read: usize,
    pub rows_parsed: usize,
    pub rows_written: usize,
    /// Source lines dropped (reject policy) or blocking the write (abort policy)
    pub invalid_lines: Vec<usize>,
    pub issue_counts: IssueCounts,
    pub formula: FormulaSummary,
    pub normalization: NormalizationSummary,
    pub issues: Vec<QualityIssue>,
}

/// Hex SHA-256 of the raw input bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl RunReport {
    /// Turn an aborted run into the corresponding error
    pub fn into_result(self) -> Result<RunReport> {
        match self.status {
            RunStatus::Aborted => Err(CleanerError::ValidationFailed {
                invalid_rows: self.invalid_lines.len(),
            }),
            _ => Ok(self),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CleanerError::io(parent.display().to_string(), e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| CleanerError::io(path.display().to_string(), e))?;
        info!("Run report written to {}", path.display());
        Ok(())
    }

    /// Console summary in the same style as the rest of the CLI
    pub fn print_summary(&self) {
        println!("\n📊 Cleaning results for {}:", self.input);
        println!("   Run id: {}", self.run_id);
        println!("   Rows read: {}", self.rows_read);
        println!("   Rows parsed: {}", self.rows_parsed);
        println!("   Rows written: {}", self.rows_written);
        println!("   Invalid rows: {}", self.invalid_lines.len());
        println!(
            "   Issues: {} error(s), {} warning(s), {} info",
            self.issue_counts.error, self.issue_counts.warning, self.issue_counts.info
        );

        print_formula_summary(&self.formula);

        if !self.normalization.corrected.is_empty() {
            println!("\n🔧 Normalized values:");
            for (column, count) in &self.normalization.corrected {
                println!("   {}: {}", column, count);
            }
        }

        let notable: Vec<&QualityIssue> = self
            .issues
            .iter()
            .filter(|i| i.severity >= QualitySeverity::Warning)
            .collect();
        if !notable.is_empty() {
            println!("\n⚠️  Issues for review:");
            for issue in notable.iter().take(25) {
                let line = issue.line.map(|l| format!("line {}", l)).unwrap_or_else(|| "dataset".to_string());
                println!("   - [{:?}] {}: {}", issue.severity, line, issue.description);
            }
            if notable.len() > 25 {
                println!("   ... and {} more (see the JSON report)", notable.len() - 25);
            }
        }

        match self.status {
            RunStatus::Written => {
                if let Some(output) = &self.output {
                    println!("\n✅ Cleaned file written to {}", output);
                }
            }
            RunStatus::Checked => println!("\n✅ Check finished, nothing written"),
            RunStatus::Aborted => println!(
                "\n❌ {} invalid row(s), cleaned file not written (use --policy reject to drop them)",
                self.invalid_lines.len()
            ),
        }
    }
}

/// Print match counts per formula and the verdict
pub fn print_formula_summary(summary: &FormulaSummary) {
    println!("\n🧮 Revenue formula inference ({} rows, tolerance {}):", summary.rows_checked, summary.tolerance);
    for m in &summary.matches {
        println!("   {}: {} / {} rows", m.formula, m.matches, summary.rows_checked);
    }
    println!("   Rows matching no formula: {}", summary.unmatched_rows);
    match &summary.verdict {
        FormulaVerdict::Confirmed(f) => println!("   Verdict: confirmed {}", f),
        FormulaVerdict::Ambiguous(fs) => {
            let names: Vec<String> = fs.iter().map(|f| f.to_string()).collect();
            println!("   Verdict: ambiguous between {} (needs review)", names.join(" and "));
        }
        FormulaVerdict::Inconsistent => println!("   Verdict: no single formula explains every row (needs review)"),
        FormulaVerdict::NoData => println!("   Verdict: no rows to compare"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
