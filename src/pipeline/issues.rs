use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// A single data-quality finding raised by any stage of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Source line the issue refers to, `None` for dataset-level findings
    pub line: Option<usize>,
    /// The type of quality issue
    pub issue_type: QualityIssueType,
    /// Severity level of the issue
    pub severity: QualitySeverity,
    /// Column that triggered this issue
    pub field: Option<String>,
    /// Human-readable description of the issue
    pub description: String,
    /// Expected or suggested value
    pub suggestion: Option<String>,
}

/// Types of quality issues that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityIssueType {
    /// Blank value in a required column
    MissingData,
    /// Value could not be parsed into its column type
    MalformedValue,
    /// Data outside expected ranges
    OutOfRange,
    /// Suspicious but legal values
    SuspiciousValue,
    /// Two columns of the same row disagree
    InconsistentValue,
    /// Several spellings of what looks like the same value
    DuplicationConcern,
    /// Revenue does not match the candidate formulas
    RevenueMismatch,
    /// Categorical value outside its dictionary after normalization
    UnrecognizedValue,
}

/// Severity levels for quality issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualitySeverity {
    /// Informational, nothing to fix
    Info,
    /// Worth a human look, row is kept
    Warning,
    /// Row is invalid
    Error,
}

impl QualityIssue {
    pub fn new(
        line: Option<usize>,
        issue_type: QualityIssueType,
        severity: QualitySeverity,
        field: Option<&str>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            line,
            issue_type,
            severity,
            field: field.map(str::to_string),
            description: description.into(),
            suggestion: None,
        }
    }

    /// Row-level issue that invalidates the row
    pub fn error(line: usize, issue_type: QualityIssueType, field: &str, description: impl Into<String>) -> Self {
        Self::new(Some(line), issue_type, QualitySeverity::Error, Some(field), description)
    }

    /// Row-level issue that is reported but keeps the row
    pub fn warning(line: usize, issue_type: QualityIssueType, field: &str, description: impl Into<String>) -> Self {
        Self::new(Some(line), issue_type, QualitySeverity::Warning, Some(field), description)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == QualitySeverity::Error
    }

    /// Emit this issue through tracing at a level matching its severity
    pub fn log(&self) {
        let line = self.line.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
        let field = self.field.as_deref().unwrap_or("-");
        match self.severity {
            QualitySeverity::Error => {
                error!(line = %line, field, issue = ?self.issue_type, "{}", self.description)
            }
            QualitySeverity::Warning => {
                warn!(line = %line, field, issue = ?self.issue_type, "{}", self.description)
            }
            QualitySeverity::Info => {
                debug!(line = %line, field, issue = ?self.issue_type, "{}", self.description)
            }
        }
    }
}

/// Issue totals per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
}

impl IssueCounts {
    pub fn tally(issues: &[QualityIssue]) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            match issue.severity {
                QualitySeverity::Info => counts.info += 1,
                QualitySeverity::Warning => counts.warning += 1,
                QualitySeverity::Error => counts.error += 1,
            }
        }
        counts
    }
}

/// Lines carrying at least one Error-severity issue
pub fn invalid_lines(issues: &[QualityIssue]) -> BTreeSet<usize> {
    issues
        .iter()
        .filter(|i| i.is_error())
        .filter_map(|i| i.line)
        .collect()
}
