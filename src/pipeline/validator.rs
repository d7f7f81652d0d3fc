use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::config::ValidationConfig;
use crate::constants::{
    COL_CATEGORY, COL_DATE, COL_DISCOUNT, COL_LOCATION, COL_PLATFORM, COL_PRICE, COL_PRODUCT_NAME,
    COL_REVENUE, COL_UNITS_RETURNED, COL_UNITS_SOLD,
};
use crate::pipeline::issues::{QualityIssue, QualityIssueType, QualitySeverity};
use crate::pipeline::text::fold_key;
use crate::types::SalesRecord;

/// Observational checks over the loaded table. Never mutates a record.
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Inspect every record and the categorical columns as a whole
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn validate(&self, records: &[SalesRecord]) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        for record in records {
            issues.extend(self.assess_date(record));
            issues.extend(self.assess_numbers(record));
        }

        issues.extend(near_duplicates(COL_PRODUCT_NAME, records.iter().map(|r| r.product_name.as_str())));
        issues.extend(near_duplicates(COL_CATEGORY, records.iter().map(|r| r.category.as_str())));
        issues.extend(near_duplicates(COL_LOCATION, records.iter().map(|r| r.location.as_str())));
        issues.extend(near_duplicates(COL_PLATFORM, records.iter().map(|r| r.platform.as_str())));

        for issue in &issues {
            crate::metrics::validation::issue_detected(issue.issue_type, issue.severity);
        }
        info!(issues = issues.len(), "Validation finished");

        issues
    }

    fn assess_date(&self, record: &SalesRecord) -> Option<QualityIssue> {
        let (start, end) = (self.config.date_start, self.config.date_end);
        if record.date < start || record.date > end {
            Some(
                QualityIssue::warning(
                    record.line,
                    QualityIssueType::OutOfRange,
                    COL_DATE,
                    format!("Date {} is outside {} ..= {}", record.date, start, end),
                )
                .with_suggestion("Verify the week is part of this extract"),
            )
        } else {
            None
        }
    }

    fn assess_numbers(&self, record: &SalesRecord) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        let line = record.line;

        if record.units_sold < 0 {
            issues.push(QualityIssue::error(
                line,
                QualityIssueType::OutOfRange,
                COL_UNITS_SOLD,
                format!("Units Sold is negative ({})", record.units_sold),
            ));
        } else if record.units_sold == 0 {
            issues.push(QualityIssue::new(
                Some(line),
                QualityIssueType::SuspiciousValue,
                QualitySeverity::Info,
                Some(COL_UNITS_SOLD),
                "No units sold this week",
            ));
        }

        if record.units_returned < 0 {
            issues.push(QualityIssue::error(
                line,
                QualityIssueType::OutOfRange,
                COL_UNITS_RETURNED,
                format!("Units Returned is negative ({})", record.units_returned),
            ));
        } else if record.units_sold >= 0 && record.units_returned > record.units_sold {
            issues.push(QualityIssue::error(
                line,
                QualityIssueType::InconsistentValue,
                COL_UNITS_RETURNED,
                format!(
                    "Units Returned ({}) exceeds Units Sold ({})",
                    record.units_returned, record.units_sold
                ),
            ));
        }

        if record.price <= 0.0 {
            issues.push(QualityIssue::error(
                line,
                QualityIssueType::OutOfRange,
                COL_PRICE,
                format!("Price must be positive, got {}", record.price),
            ));
        }

        if !(0.0..=1.0).contains(&record.discount) {
            issues.push(
                QualityIssue::error(
                    line,
                    QualityIssueType::OutOfRange,
                    COL_DISCOUNT,
                    format!("Discount {} is outside 0..=1", record.discount),
                )
                .with_suggestion("Discount is a fraction; 15% is 0.15"),
            );
        }

        if record.revenue < 0.0 {
            issues.push(QualityIssue::error(
                line,
                QualityIssueType::OutOfRange,
                COL_REVENUE,
                format!("Revenue is negative ({})", record.revenue),
            ));
        }

        issues
    }
}

/// Report groups of distinct spellings that fold to the same key
fn near_duplicates<'a>(field: &str, values: impl Iterator<Item = &'a str>) -> Vec<QualityIssue> {
    let mut groups: BTreeMap<String, BTreeMap<&'a str, usize>> = BTreeMap::new();
    for value in values {
        *groups.entry(fold_key(value)).or_default().entry(value).or_default() += 1;
    }

    groups
        .into_values()
        .filter(|spellings| spellings.len() > 1)
        .map(|spellings| {
            let listed: Vec<String> = spellings
                .iter()
                .map(|(spelling, count)| format!("'{}' x{}", spelling, count))
                .collect();
            QualityIssue::new(
                None,
                QualityIssueType::DuplicationConcern,
                QualitySeverity::Warning,
                Some(field),
                format!("{} has near-duplicate spellings: {}", field, listed.join(", ")),
            )
            .with_suggestion("Normalization maps these onto one value")
        })
        .collect()
}
