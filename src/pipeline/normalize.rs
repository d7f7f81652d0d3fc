//! Categorical normalization.
//!
//! Location and Platform are closed sets: a value that cannot be mapped onto
//! one of them invalidates the row. Product Name and Category are corrected
//! against their dictionaries; an unlisted value invalidates the row too,
//! unless strict dictionaries are turned off, in which case it is kept
//! (tidied) with a warning.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument};

use crate::config::NormalizeConfig;
use crate::constants::{
    ALLOWED_CATEGORIES, ALLOWED_PRODUCT_NAMES, COL_CATEGORY, COL_LOCATION, COL_PLATFORM, COL_PRODUCT_NAME,
};
use crate::pipeline::issues::{QualityIssue, QualityIssueType};
use crate::pipeline::text::{fold_key, tidy};
use crate::types::{CleanSalesRecord, Location, Platform, SalesRecord};

/// Built-in spellings, already in folded form
static LOCATION_ALIASES: Lazy<Vec<(&'static str, Location)>> = Lazy::new(|| {
    vec![
        ("us", Location::Usa),
        ("usa", Location::Usa),
        ("unitedstates", Location::Usa),
        ("unitedstatesofamerica", Location::Usa),
        ("america", Location::Usa),
        ("usaa", Location::Usa),
        ("ca", Location::Canada),
        ("can", Location::Canada),
        ("canada", Location::Canada),
        ("canda", Location::Canada),
        ("cananda", Location::Canada),
        ("uk", Location::Uk),
        ("gb", Location::Uk),
        ("gbr", Location::Uk),
        ("unitedkingdom", Location::Uk),
        ("greatbritain", Location::Uk),
        ("britain", Location::Uk),
        ("england", Location::Uk),
    ]
});

static PLATFORM_ALIASES: Lazy<Vec<(&'static str, Platform)>> = Lazy::new(|| {
    vec![
        ("iherb", Platform::IHerb),
        ("iherbcom", Platform::IHerb),
        ("iheb", Platform::IHerb),
        ("iherbs", Platform::IHerb),
        ("amazon", Platform::Amazon),
        ("amazoncom", Platform::Amazon),
        ("amzn", Platform::Amazon),
        ("amazom", Platform::Amazon),
        ("amzon", Platform::Amazon),
        ("amazn", Platform::Amazon),
        ("walmart", Platform::Walmart),
        ("walmartcom", Platform::Walmart),
        ("wallmart", Platform::Walmart),
        ("walmrt", Platform::Walmart),
        ("wlmart", Platform::Walmart),
    ]
});

/// Folded-key lookup table from raw spellings to canonical values
#[derive(Debug, Clone)]
pub struct Dictionary<T: Clone> {
    entries: HashMap<String, T>,
}

impl<T: Clone> Dictionary<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, spelling: &str, value: T) {
        self.entries.insert(fold_key(spelling), value);
    }

    pub fn lookup(&self, raw: &str) -> Option<T> {
        self.entries.get(&fold_key(raw)).cloned()
    }
}

impl<T: Clone> Default for Dictionary<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-column count of values that were rewritten
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub corrected: BTreeMap<String, usize>,
    /// Rows with at least one unrecognized categorical value that invalidates them
    pub unrecognized_rows: usize,
}

/// A normalized row, still tied to its source line
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub line: usize,
    pub record: CleanSalesRecord,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizationOutcome {
    pub rows: Vec<NormalizedRow>,
    pub issues: Vec<QualityIssue>,
    pub summary: NormalizationSummary,
}

pub struct Normalizer {
    locations: Dictionary<Location>,
    platforms: Dictionary<Platform>,
    products: Dictionary<String>,
    categories: Dictionary<String>,
    strict_dictionaries: bool,
}

impl Normalizer {
    /// Normalizer with only the built-in tables
    pub fn new() -> Self {
        Self::with_config(&NormalizeConfig::default())
    }

    /// Built-in tables extended with configured aliases.
    /// Aliases are expected to be validated by `CleanerConfig::validate`.
    pub fn with_config(config: &NormalizeConfig) -> Self {
        let mut locations = Dictionary::new();
        for (spelling, location) in LOCATION_ALIASES.iter() {
            locations.insert(spelling, *location);
        }
        for (spelling, target) in &config.location_aliases {
            if let Some(location) = Location::from_canonical(target) {
                locations.insert(spelling, location);
            }
        }

        let mut platforms = Dictionary::new();
        for (spelling, platform) in PLATFORM_ALIASES.iter() {
            platforms.insert(spelling, *platform);
        }
        for (spelling, target) in &config.platform_aliases {
            if let Some(platform) = Platform::from_canonical(target) {
                platforms.insert(spelling, platform);
            }
        }

        Self {
            locations,
            platforms,
            products: dictionary_of(&ALLOWED_PRODUCT_NAMES, &config.product_aliases),
            categories: dictionary_of(&ALLOWED_CATEGORIES, &config.category_aliases),
            strict_dictionaries: true,
        }
    }

    /// Whether unlisted products and categories are errors (the default)
    pub fn with_strict_dictionaries(mut self, strict: bool) -> Self {
        self.strict_dictionaries = strict;
        self
    }

    pub fn location(&self, raw: &str) -> Option<Location> {
        self.locations.lookup(raw)
    }

    pub fn platform(&self, raw: &str) -> Option<Platform> {
        self.platforms.lookup(raw)
    }

    /// Normalize every record. Rows with an unmappable Location or Platform
    /// are left out of `rows`; every unrecognized value is reported.
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn normalize(&self, records: &[SalesRecord]) -> NormalizationOutcome {
        let mut outcome = NormalizationOutcome::default();

        for record in records {
            let issues_before = outcome.issues.len();
            let product_name = self.dictionary_value(
                &mut outcome,
                record.line,
                COL_PRODUCT_NAME,
                &self.products,
                &record.product_name,
            );
            let category = self.dictionary_value(
                &mut outcome,
                record.line,
                COL_CATEGORY,
                &self.categories,
                &record.category,
            );

            let location = self.location(&record.location);
            let platform = self.platform(&record.platform);

            if let Some(location) = location {
                note_change(&mut outcome.summary, COL_LOCATION, &record.location, location.as_str());
            } else {
                outcome.issues.push(unrecognized(record.line, COL_LOCATION, &record.location, &Location::ALL.map(|l| l.as_str())));
            }
            if let Some(platform) = platform {
                note_change(&mut outcome.summary, COL_PLATFORM, &record.platform, platform.as_str());
            } else {
                outcome.issues.push(unrecognized(record.line, COL_PLATFORM, &record.platform, &Platform::ALL.map(|p| p.as_str())));
            }

            let unrecognized_here = outcome.issues[issues_before..].iter().any(QualityIssue::is_error);
            if unrecognized_here {
                debug!(line = record.line, "Row has unrecognized categorical values");
                outcome.summary.unrecognized_rows += 1;
            }

            if let (Some(location), Some(platform)) = (location, platform) {
                outcome.rows.push(NormalizedRow {
                    line: record.line,
                    record: CleanSalesRecord {
                        date: record.date,
                        product_name,
                        category,
                        units_sold: record.units_sold,
                        price: record.price,
                        revenue: record.revenue,
                        discount: record.discount,
                        units_returned: record.units_returned,
                        location,
                        platform,
                    },
                });
            }
        }

        for (column, count) in &outcome.summary.corrected {
            crate::metrics::normalize::values_corrected(column, *count);
        }
        info!(
            normalized = outcome.rows.len(),
            unrecognized = outcome.summary.unrecognized_rows,
            corrected = ?outcome.summary.corrected,
            "Normalization finished"
        );

        outcome
    }

    /// Canonical dictionary value, or the tidied raw value with an issue
    fn dictionary_value(
        &self,
        outcome: &mut NormalizationOutcome,
        line: usize,
        field: &str,
        dictionary: &Dictionary<String>,
        raw: &str,
    ) -> String {
        match dictionary.lookup(raw) {
            Some(canonical) => {
                note_change(&mut outcome.summary, field, raw, &canonical);
                canonical
            }
            None => {
                let tidied = tidy(raw);
                note_change(&mut outcome.summary, field, raw, &tidied);
                let description = format!("{} '{}' is not in the known list", field, tidied);
                let issue = if self.strict_dictionaries {
                    QualityIssue::error(line, QualityIssueType::UnrecognizedValue, field, description)
                } else {
                    QualityIssue::warning(line, QualityIssueType::UnrecognizedValue, field, description)
                };
                outcome
                    .issues
                    .push(issue.with_suggestion("Add an alias under [normalize] if this is a misspelling"));
                tidied
            }
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn dictionary_of(allowed: &[&str], aliases: &BTreeMap<String, String>) -> Dictionary<String> {
    let mut dictionary = Dictionary::new();
    for name in allowed {
        dictionary.insert(name, name.to_string());
    }
    for (spelling, target) in aliases {
        if allowed.contains(&target.as_str()) {
            dictionary.insert(spelling, target.clone());
        }
    }
    dictionary
}

fn note_change(summary: &mut NormalizationSummary, field: &str, raw: &str, canonical: &str) {
    if raw != canonical {
        *summary.corrected.entry(field.to_string()).or_default() += 1;
    }
}

fn unrecognized(line: usize, field: &str, raw: &str, allowed: &[&str]) -> QualityIssue {
    QualityIssue::error(
        line,
        QualityIssueType::UnrecognizedValue,
        field,
        format!("{} '{}' does not map onto {}", field, raw.trim(), allowed.join(" / ")),
    )
    .with_suggestion("Add an alias under [normalize] or fix the source row")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::issues::QualitySeverity;
    use chrono::NaiveDate;

    fn record(line: usize, product: &str, location: &str, platform: &str) -> SalesRecord {
        SalesRecord {
            line,
            date: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            product_name: product.to_string(),
            category: "Vitamin".to_string(),
            units_sold: 10,
            price: 5.0,
            revenue: 50.0,
            discount: 0.1,
            units_returned: 0,
            location: location.to_string(),
            platform: platform.to_string(),
        }
    }

    #[test]
    fn test_location_and_platform_variants() {
        let n = Normalizer::new();
        for raw in [" usa ", "USA", "u.s.", "United States", "us"] {
            assert_eq!(n.location(raw), Some(Location::Usa), "{}", raw);
        }
        for raw in ["canada", " CANADA", "Canda"] {
            assert_eq!(n.location(raw), Some(Location::Canada), "{}", raw);
        }
        for raw in ["uk", "U.K.", "United Kingdom", "great britain"] {
            assert_eq!(n.location(raw), Some(Location::Uk), "{}", raw);
        }
        for raw in ["iherb", "IHERB", "i-Herb", "iHerb.com"] {
            assert_eq!(n.platform(raw), Some(Platform::IHerb), "{}", raw);
        }
        for raw in ["amazon", " Amazon ", "amzn", "Amzon"] {
            assert_eq!(n.platform(raw), Some(Platform::Amazon), "{}", raw);
        }
        for raw in ["walmart", "Wal-Mart", "WALLMART"] {
            assert_eq!(n.platform(raw), Some(Platform::Walmart), "{}", raw);
        }
        assert_eq!(n.location("Mexico"), None);
        assert_eq!(n.platform("eBay"), None);
    }

    #[test]
    fn test_normalizes_reference_row() {
        let n = Normalizer::new();
        let outcome = n.normalize(&[record(2, "Vitamín C", " usa ", "amazon")]);

        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.rows.len(), 1);
        let row = &outcome.rows[0].record;
        assert_eq!(row.product_name, "Vitamin C");
        assert_eq!(row.location, Location::Usa);
        assert_eq!(row.platform, Platform::Amazon);
        assert_eq!(outcome.summary.corrected.get(COL_PRODUCT_NAME), Some(&1));
        assert_eq!(outcome.summary.corrected.get(COL_LOCATION), Some(&1));
        assert_eq!(outcome.summary.corrected.get(COL_PLATFORM), Some(&1));
        assert_eq!(outcome.summary.corrected.get(COL_CATEGORY), None);
    }

    #[test]
    fn test_unrecognized_location_rejects_row() {
        let n = Normalizer::new();
        let outcome = n.normalize(&[
            record(2, "Zinc", "Mexico", "Amazon"),
            record(3, "Zinc", "UK", "Walmart"),
        ]);

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].line, 3);
        assert_eq!(outcome.summary.unrecognized_rows, 1);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].severity, QualitySeverity::Error);
        assert_eq!(outcome.issues[0].line, Some(2));
    }

    #[test]
    fn test_unknown_product_and_category_are_errors() {
        let n = Normalizer::new();
        let mut row = record(2, "Snake Oil", "USA", "Amazon");
        row.category = "Quackery".to_string();
        let outcome = n.normalize(&[row]);

        assert_eq!(outcome.issues.len(), 2);
        assert!(outcome
            .issues
            .iter()
            .all(|i| i.severity == QualitySeverity::Error && i.issue_type == QualityIssueType::UnrecognizedValue));
        assert_eq!(outcome.issues[0].field.as_deref(), Some(COL_PRODUCT_NAME));
        assert_eq!(outcome.issues[1].field.as_deref(), Some(COL_CATEGORY));
        assert_eq!(outcome.summary.unrecognized_rows, 1);
    }

    #[test]
    fn test_lenient_dictionaries_keep_unknown_product_with_warning() {
        let n = Normalizer::new().with_strict_dictionaries(false);
        let outcome = n.normalize(&[record(2, "  Turmeric   Root ", "USA", "iHerb")]);

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].record.product_name, "Turmeric Root");
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].severity, QualitySeverity::Warning);
        assert_eq!(outcome.issues[0].issue_type, QualityIssueType::UnrecognizedValue);
        assert_eq!(outcome.summary.unrecognized_rows, 0);
    }

    #[test]
    fn test_configured_aliases() {
        let mut config = NormalizeConfig::default();
        config.location_aliases.insert("The States".to_string(), "USA".to_string());
        config.product_aliases.insert("Omega 3".to_string(), "Fish Oil".to_string());

        let n = Normalizer::with_config(&config);
        assert_eq!(n.location("the states"), Some(Location::Usa));

        let outcome = n.normalize(&[record(2, "omega-3", "The States", "Amazon")]);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.rows[0].record.product_name, "Fish Oil");
    }
}
