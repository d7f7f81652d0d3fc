//! Revenue formula inference.
//!
//! Every row gets three candidate revenues. Comparing them against the
//! recorded Revenue tells which formula the dataset was produced with. The
//! candidates live only inside [`FormulaInferencer::infer`] and never reach
//! the cleaned table.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::constants::COL_REVENUE;
use crate::pipeline::issues::{QualityIssue, QualityIssueType, QualitySeverity};
use crate::types::SalesRecord;

/// The candidate ways Revenue may have been computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueFormula {
    /// units_sold × price
    Gross,
    /// units_sold × price × (1 − discount)
    Discounted,
    /// units_sold × price × discount
    DiscountOnly,
}

impl RevenueFormula {
    pub const ALL: [RevenueFormula; 3] = [
        RevenueFormula::Gross,
        RevenueFormula::Discounted,
        RevenueFormula::DiscountOnly,
    ];

    pub fn apply(&self, units_sold: i64, price: f64, discount: f64) -> f64 {
        let gross = units_sold as f64 * price;
        match self {
            RevenueFormula::Gross => gross,
            RevenueFormula::Discounted => gross * (1.0 - discount),
            RevenueFormula::DiscountOnly => gross * discount,
        }
    }

    pub fn expression(&self) -> &'static str {
        match self {
            RevenueFormula::Gross => "units_sold * price",
            RevenueFormula::Discounted => "units_sold * price * (1 - discount)",
            RevenueFormula::DiscountOnly => "units_sold * price * discount",
        }
    }
}

impl fmt::Display for RevenueFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RevenueFormula::Gross => "c1",
            RevenueFormula::Discounted => "c2",
            RevenueFormula::DiscountOnly => "c3",
        };
        write!(f, "{} ({})", label, self.expression())
    }
}

/// Temporary per-row annotation: the three candidate revenues
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateRevenue {
    pub gross: f64,
    pub discounted: f64,
    pub discount_only: f64,
}

impl CandidateRevenue {
    pub fn for_record(record: &SalesRecord) -> Self {
        let calc = |f: RevenueFormula| f.apply(record.units_sold, record.price, record.discount);
        Self {
            gross: calc(RevenueFormula::Gross),
            discounted: calc(RevenueFormula::Discounted),
            discount_only: calc(RevenueFormula::DiscountOnly),
        }
    }

    pub fn value(&self, formula: RevenueFormula) -> f64 {
        match formula {
            RevenueFormula::Gross => self.gross,
            RevenueFormula::Discounted => self.discounted,
            RevenueFormula::DiscountOnly => self.discount_only,
        }
    }

    /// Formulas whose candidate equals `revenue` within `tolerance`
    pub fn matching(&self, revenue: f64, tolerance: f64) -> Vec<RevenueFormula> {
        RevenueFormula::ALL
            .into_iter()
            .filter(|f| within_tolerance(self.value(*f), revenue, tolerance))
            .collect()
    }
}

fn within_tolerance(candidate: f64, revenue: f64, tolerance: f64) -> bool {
    // Slack for binary rounding of values like 0.1
    (candidate - revenue).abs() <= tolerance + 1e-9
}

/// Number of rows a formula reproduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaMatchCount {
    pub formula: RevenueFormula,
    pub matches: usize,
}

/// Dataset-level conclusion of the inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "formulas", rename_all = "snake_case")]
pub enum FormulaVerdict {
    /// Exactly one formula reproduces every row
    Confirmed(RevenueFormula),
    /// Several formulas reproduce every row; left to a human
    Ambiguous(Vec<RevenueFormula>),
    /// No formula reproduces every row
    Inconsistent,
    /// Nothing to compare
    NoData,
}

/// Match counts per formula plus the verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSummary {
    pub rows_checked: usize,
    pub tolerance: f64,
    pub matches: Vec<FormulaMatchCount>,
    /// Rows no candidate reproduced
    pub unmatched_rows: usize,
    pub verdict: FormulaVerdict,
}

impl FormulaSummary {
    pub fn matches_for(&self, formula: RevenueFormula) -> usize {
        self.matches
            .iter()
            .find(|m| m.formula == formula)
            .map(|m| m.matches)
            .unwrap_or(0)
    }

    pub fn confirmed(&self) -> Option<RevenueFormula> {
        match self.verdict {
            FormulaVerdict::Confirmed(f) => Some(f),
            _ => None,
        }
    }
}

/// Summary plus the row-level findings
#[derive(Debug, Clone)]
pub struct FormulaInference {
    pub summary: FormulaSummary,
    pub issues: Vec<QualityIssue>,
}

pub struct FormulaInferencer {
    tolerance: f64,
    /// When set, rows must follow this formula
    required: Option<RevenueFormula>,
}

impl FormulaInferencer {
    pub fn new(tolerance: f64, required: Option<RevenueFormula>) -> Self {
        Self { tolerance, required }
    }

    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn infer(&self, records: &[SalesRecord]) -> FormulaInference {
        let mut counts = [0usize; 3];
        let mut unmatched_rows = 0;
        let mut issues = Vec::new();

        for record in records {
            let candidates = CandidateRevenue::for_record(record);
            let matched = candidates.matching(record.revenue, self.tolerance);

            for formula in &matched {
                counts[formula_index(*formula)] += 1;
            }

            if matched.is_empty() {
                unmatched_rows += 1;
                issues.push(
                    QualityIssue::error(
                        record.line,
                        QualityIssueType::RevenueMismatch,
                        COL_REVENUE,
                        format!(
                            "Revenue {:.2} matches no candidate formula (c1={:.2}, c2={:.2}, c3={:.2})",
                            record.revenue, candidates.gross, candidates.discounted, candidates.discount_only
                        ),
                    )
                    .with_suggestion(format!("Expected about {:.2}", self.suggested(&candidates))),
                );
            } else if let Some(required) = self.required {
                if !matched.contains(&required) {
                    issues.push(
                        QualityIssue::error(
                            record.line,
                            QualityIssueType::RevenueMismatch,
                            COL_REVENUE,
                            format!(
                                "Revenue {:.2} follows {} instead of {}",
                                record.revenue,
                                matched[0],
                                required
                            ),
                        )
                        .with_suggestion(format!("{:.2}", candidates.value(required))),
                    );
                }
            }
        }

        let matches: Vec<FormulaMatchCount> = RevenueFormula::ALL
            .into_iter()
            .map(|formula| FormulaMatchCount {
                formula,
                matches: counts[formula_index(formula)],
            })
            .collect();
        let verdict = verdict_for(records.len(), &matches);

        match &verdict {
            FormulaVerdict::Confirmed(f) => info!("Revenue formula confirmed: {}", f),
            FormulaVerdict::Ambiguous(fs) => {
                warn!(candidates = ?fs, "Revenue formula is ambiguous, leaving the choice to review")
            }
            FormulaVerdict::Inconsistent => {
                warn!(unmatched_rows, "No single revenue formula reproduces every row")
            }
            FormulaVerdict::NoData => warn!("No rows available for revenue formula inference"),
        }

        if let Some(required) = self.required {
            if let FormulaVerdict::Confirmed(found) = verdict {
                if found != required {
                    issues.push(QualityIssue::new(
                        None,
                        QualityIssueType::RevenueMismatch,
                        QualitySeverity::Warning,
                        Some(COL_REVENUE),
                        format!("Dataset follows {} but {} is expected", found, required),
                    ));
                }
            }
        }

        for m in &matches {
            crate::metrics::formula::matches_recorded(m.formula, m.matches);
        }

        FormulaInference {
            summary: FormulaSummary {
                rows_checked: records.len(),
                tolerance: self.tolerance,
                matches,
                unmatched_rows,
                verdict,
            },
            issues,
        }
    }

    fn suggested(&self, candidates: &CandidateRevenue) -> f64 {
        candidates.value(self.required.unwrap_or(RevenueFormula::Gross))
    }
}

fn formula_index(formula: RevenueFormula) -> usize {
    match formula {
        RevenueFormula::Gross => 0,
        RevenueFormula::Discounted => 1,
        RevenueFormula::DiscountOnly => 2,
    }
}

fn verdict_for(rows: usize, matches: &[FormulaMatchCount]) -> FormulaVerdict {
    if rows == 0 {
        return FormulaVerdict::NoData;
    }
    let complete: Vec<RevenueFormula> = matches
        .iter()
        .filter(|m| m.matches == rows)
        .map(|m| m.formula)
        .collect();

    match complete.as_slice() {
        [] => FormulaVerdict::Inconsistent,
        [only] => FormulaVerdict::Confirmed(*only),
        _ => FormulaVerdict::Ambiguous(complete),
    }
}
