use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{
    ALLOWED_CATEGORIES, ALLOWED_PRODUCT_NAMES, DEFAULT_CLEAN_PATH, DEFAULT_CONFIG_PATH, DEFAULT_LOG_DIR,
    DEFAULT_RAW_PATH, DEFAULT_REPORT_PATH, DEFAULT_REVENUE_TOLERANCE,
};
use crate::error::{CleanerError, Result};
use crate::pipeline::formula::RevenueFormula;
use crate::types::{Location, Platform};

/// Environment variable that points at the config file
pub const CONFIG_ENV_VAR: &str = "SALES_CLEANER_CONFIG";

/// Full cleaner configuration, loaded from `cleaner.toml`.
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub paths: PathsConfig,
    pub validation: ValidationConfig,
    pub normalize: NormalizeConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// JSON run report; omitted when `None`
    pub report: Option<PathBuf>,
    pub log_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_RAW_PATH),
            output: PathBuf::from(DEFAULT_CLEAN_PATH),
            report: Some(PathBuf::from(DEFAULT_REPORT_PATH)),
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

/// Rules applied by the validator and the formula inferencer
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// First date considered in range (inclusive)
    pub date_start: NaiveDate,
    /// Last date considered in range (inclusive)
    pub date_end: NaiveDate,
    /// Absolute tolerance for revenue comparisons
    pub revenue_tolerance: f64,
    /// Flag every row whose revenue does not follow `expected_formula`
    pub enforce_formula: bool,
    pub expected_formula: RevenueFormula,
    /// Product Name and Category outside their allowed lists invalidate the
    /// row; when off they are kept with a warning
    pub strict_dictionaries: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            date_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            date_end: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap_or_default(),
            revenue_tolerance: DEFAULT_REVENUE_TOLERANCE,
            enforce_formula: true,
            expected_formula: RevenueFormula::Gross,
            strict_dictionaries: true,
        }
    }
}

impl ValidationConfig {
    /// The formula rows must follow, if enforcement is on
    pub fn required_formula(&self) -> Option<RevenueFormula> {
        self.enforce_formula.then_some(self.expected_formula)
    }
}

/// Extra spelling corrections on top of the built-in tables.
/// Keys are raw spellings, values must be canonical names.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub location_aliases: BTreeMap<String, String>,
    pub platform_aliases: BTreeMap<String, String>,
    pub product_aliases: BTreeMap<String, String>,
    pub category_aliases: BTreeMap<String, String>,
}

/// What to do with rows that carry Error-severity issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRowPolicy {
    /// Report everything, write nothing, fail the run
    #[default]
    Abort,
    /// Drop invalid rows, list them in the report, write the rest
    Reject,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub policy: InvalidRowPolicy,
    /// Prometheus text file written at the end of the run
    pub metrics_path: Option<PathBuf>,
}

impl CleanerConfig {
    /// Load configuration.
    ///
    /// An explicit path (argument or `SALES_CLEANER_CONFIG`) must exist. The
    /// default `cleaner.toml` is optional; without it the defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV_VAR).ok().filter(|v| !v.trim().is_empty());
        let (path, required) = match (explicit, from_env) {
            (Some(path), _) => (path.to_path_buf(), true),
            (None, Some(env_path)) => (PathBuf::from(env_path), true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !path.exists() {
            debug!("No {} found, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            CleanerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CleanerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the run meaningless
    pub fn validate(&self) -> Result<()> {
        let v = &self.validation;
        if v.date_start > v.date_end {
            return Err(CleanerError::Config(format!(
                "validation.date_start {} is after validation.date_end {}",
                v.date_start, v.date_end
            )));
        }
        if !v.revenue_tolerance.is_finite() || v.revenue_tolerance < 0.0 {
            return Err(CleanerError::Config(format!(
                "validation.revenue_tolerance must be a non-negative number, got {}",
                v.revenue_tolerance
            )));
        }

        let n = &self.normalize;
        check_aliases("location_aliases", &n.location_aliases, |t| {
            Location::from_canonical(t).is_some()
        })?;
        check_aliases("platform_aliases", &n.platform_aliases, |t| {
            Platform::from_canonical(t).is_some()
        })?;
        check_aliases("product_aliases", &n.product_aliases, |t| {
            ALLOWED_PRODUCT_NAMES.contains(&t)
        })?;
        check_aliases("category_aliases", &n.category_aliases, |t| {
            ALLOWED_CATEGORIES.contains(&t)
        })?;

        Ok(())
    }
}

fn check_aliases(
    section: &str,
    aliases: &BTreeMap<String, String>,
    is_canonical: impl Fn(&str) -> bool,
) -> Result<()> {
    for (alias, target) in aliases {
        if !is_canonical(target) {
            return Err(CleanerError::Config(format!(
                "normalize.{}: '{}' maps to unknown value '{}'",
                section, alias, target
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CleanerConfig::from_toml("").unwrap();
        assert_eq!(config.paths.input, PathBuf::from(DEFAULT_RAW_PATH));
        assert_eq!(config.paths.output, PathBuf::from(DEFAULT_CLEAN_PATH));
        assert_eq!(config.run.policy, InvalidRowPolicy::Abort);
        assert_eq!(config.validation.required_formula(), Some(RevenueFormula::Gross));
        assert!((config.validation.revenue_tolerance - 0.01).abs() < 1e-12);
        assert!(config.validation.strict_dictionaries);
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
            [paths]
            input = "in.csv"
            output = "out/clean.csv"

            [validation]
            date_start = "2021-01-04"
            date_end = "2021-12-27"
            revenue_tolerance = 0.05
            enforce_formula = false
            expected_formula = "discounted"
            strict_dictionaries = false

            [normalize.location_aliases]
            "the states" = "USA"

            [run]
            policy = "reject"
            metrics_path = "out/metrics.prom"
        "#;

        let config = CleanerConfig::from_toml(content).unwrap();
        assert_eq!(config.paths.input, PathBuf::from("in.csv"));
        assert_eq!(config.paths.report, Some(PathBuf::from(DEFAULT_REPORT_PATH)));
        assert_eq!(config.validation.date_start, NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        assert_eq!(config.validation.expected_formula, RevenueFormula::Discounted);
        assert_eq!(config.validation.required_formula(), None);
        assert!(!config.validation.strict_dictionaries);
        assert_eq!(config.run.policy, InvalidRowPolicy::Reject);
        assert_eq!(config.normalize.location_aliases.get("the states").map(String::as_str), Some("USA"));
    }

    #[test]
    fn test_rejects_inverted_date_range() {
        let content = r#"
            [validation]
            date_start = "2025-01-01"
            date_end = "2024-01-01"
        "#;
        assert!(matches!(CleanerConfig::from_toml(content), Err(CleanerError::Config(_))));
    }

    #[test]
    fn test_rejects_alias_to_unknown_value() {
        let content = r#"
            [normalize.platform_aliases]
            ebay = "eBay"
        "#;
        let err = CleanerConfig::from_toml(content).unwrap_err();
        assert!(err.to_string().contains("eBay"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(CleanerConfig::load(Some(&missing)), Err(CleanerError::Config(_))));
    }
}
