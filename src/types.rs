use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    COL_CATEGORY, COL_DATE, COL_DISCOUNT, COL_LOCATION, COL_PLATFORM, COL_PRICE, COL_PRODUCT_NAME,
    COL_REVENUE, COL_UNITS_RETURNED, COL_UNITS_SOLD, OUTPUT_DATE_FORMAT,
};

/// A sales row exactly as it appears in the raw CSV, before any parsing
#[derive(Debug, Clone, Deserialize)]
pub struct RawSalesRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Product Name")]
    pub product_name: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Units Sold")]
    pub units_sold: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Revenue")]
    pub revenue: String,
    #[serde(rename = "Discount")]
    pub discount: String,
    #[serde(rename = "Units Returned")]
    pub units_returned: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Platform")]
    pub platform: String,
}

/// One typed row of the loaded sales table.
///
/// Numeric fields are parsed but not yet range-checked, so negative units or
/// an out-of-range discount survive loading and are reported by the validator.
/// Categorical columns keep their raw spelling until normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    /// 1-based line in the source file (the header is line 1)
    pub line: usize,
    pub date: NaiveDate,
    pub product_name: String,
    pub category: String,
    pub units_sold: i64,
    pub price: f64,
    pub revenue: f64,
    pub discount: f64,
    pub units_returned: i64,
    pub location: String,
    pub platform: String,
}

/// A cleaned row ready to be written. The output column order comes from the
/// input header, see `CleanSalesRecord::value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanSalesRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Product Name")]
    pub product_name: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Units Sold")]
    pub units_sold: i64,
    #[serde(rename = "Price")]
    pub price: f64,
    #[serde(rename = "Revenue")]
    pub revenue: f64,
    #[serde(rename = "Discount")]
    pub discount: f64,
    #[serde(rename = "Units Returned")]
    pub units_returned: i64,
    #[serde(rename = "Location")]
    pub location: Location,
    #[serde(rename = "Platform")]
    pub platform: Platform,
}

impl CleanSalesRecord {
    /// Output text of one dataset column, `None` for an unknown column name
    pub fn value(&self, column: &str) -> Option<String> {
        let text = match column {
            COL_DATE => self.date.format(OUTPUT_DATE_FORMAT).to_string(),
            COL_PRODUCT_NAME => self.product_name.clone(),
            COL_CATEGORY => self.category.clone(),
            COL_UNITS_SOLD => self.units_sold.to_string(),
            COL_PRICE => format_decimal(self.price),
            COL_REVENUE => format_decimal(self.revenue),
            COL_DISCOUNT => format_decimal(self.discount),
            COL_UNITS_RETURNED => self.units_returned.to_string(),
            COL_LOCATION => self.location.as_str().to_string(),
            COL_PLATFORM => self.platform.as_str().to_string(),
            _ => return None,
        };
        Some(text)
    }
}

/// Shortest round-trip text of a decimal, always with a fractional part
fn format_decimal(value: f64) -> String {
    let text = value.to_string();
    if text.contains('.') || !value.is_finite() {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Sales region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "USA")]
    Usa,
    #[serde(rename = "Canada")]
    Canada,
    #[serde(rename = "UK")]
    Uk,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Usa, Location::Canada, Location::Uk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Usa => "USA",
            Location::Canada => "Canada",
            Location::Uk => "UK",
        }
    }

    /// Exact match against the canonical spelling
    pub fn from_canonical(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == value)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sales platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iHerb")]
    IHerb,
    #[serde(rename = "Amazon")]
    Amazon,
    #[serde(rename = "Walmart")]
    Walmart,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::IHerb, Platform::Amazon, Platform::Walmart];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::IHerb => "iHerb",
            Platform::Amazon => "Amazon",
            Platform::Walmart => "Walmart",
        }
    }

    pub fn from_canonical(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        for location in Location::ALL {
            assert_eq!(Location::from_canonical(location.as_str()), Some(location));
        }
        for platform in Platform::ALL {
            assert_eq!(Platform::from_canonical(platform.as_str()), Some(platform));
        }
    }

    #[test]
    fn test_value_by_column_name() {
        let record = CleanSalesRecord {
            date: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
            product_name: "Fish Oil".to_string(),
            category: "Omega".to_string(),
            units_sold: 8,
            price: 12.45,
            revenue: 99.6,
            discount: 0.0,
            units_returned: 2,
            location: Location::Uk,
            platform: Platform::Walmart,
        };

        assert_eq!(record.value(COL_DATE).as_deref(), Some("2023-01-02"));
        assert_eq!(record.value(COL_PRICE).as_deref(), Some("12.45"));
        assert_eq!(record.value(COL_REVENUE).as_deref(), Some("99.6"));
        assert_eq!(record.value(COL_DISCOUNT).as_deref(), Some("0.0"));
        assert_eq!(record.value(COL_UNITS_RETURNED).as_deref(), Some("2"));
        assert_eq!(record.value(COL_LOCATION).as_deref(), Some("UK"));
        assert_eq!(record.value("Notes"), None);
    }

    #[test]
    fn test_from_canonical_is_exact() {
        assert_eq!(Location::from_canonical("usa"), None);
        assert_eq!(Platform::from_canonical("iherb"), None);
    }
}
