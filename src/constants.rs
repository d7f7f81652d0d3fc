/// Column names of the sales dataset
pub const COL_DATE: &str = "Date";
pub const COL_PRODUCT_NAME: &str = "Product Name";
pub const COL_CATEGORY: &str = "Category";
pub const COL_UNITS_SOLD: &str = "Units Sold";
pub const COL_PRICE: &str = "Price";
pub const COL_REVENUE: &str = "Revenue";
pub const COL_DISCOUNT: &str = "Discount";
pub const COL_UNITS_RETURNED: &str = "Units Returned";
pub const COL_LOCATION: &str = "Location";
pub const COL_PLATFORM: &str = "Platform";

/// Canonical column order, used when no input header order is known
pub const REQUIRED_COLUMNS: [&str; 10] = [
    COL_DATE,
    COL_PRODUCT_NAME,
    COL_CATEGORY,
    COL_UNITS_SOLD,
    COL_PRICE,
    COL_REVENUE,
    COL_DISCOUNT,
    COL_UNITS_RETURNED,
    COL_LOCATION,
    COL_PLATFORM,
];

// Default file locations
pub const DEFAULT_RAW_PATH: &str = "data/raw/Supplement_Sales_Weekly_Expanded.csv";
pub const DEFAULT_CLEAN_PATH: &str = "data/cleaned/supplement_sales_cleaned.csv";
pub const DEFAULT_REPORT_PATH: &str = "data/cleaned/cleaning_report.json";
pub const DEFAULT_CONFIG_PATH: &str = "cleaner.toml";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Absolute tolerance when comparing a candidate revenue to the recorded one
pub const DEFAULT_REVENUE_TOLERANCE: f64 = 0.01;

/// Accepted input date layouts, tried in order
pub const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

pub const ALLOWED_PRODUCT_NAMES: [&str; 16] = [
    "Whey Protein",
    "Vitamin C",
    "Fish Oil",
    "Multivitamin",
    "Pre-Workout",
    "BCAA",
    "Creatine",
    "Zinc",
    "Collagen Peptides",
    "Magnesium",
    "Ashwagandha",
    "Melatonin",
    "Biotin",
    "Green Tea Extract",
    "Iron Supplement",
    "Electrolyte Powder",
];

pub const ALLOWED_CATEGORIES: [&str; 10] = [
    "Vitamin",
    "Mineral",
    "Protein",
    "Performance",
    "Omega",
    "Amino Acid",
    "Herbal",
    "Sleep Aid",
    "Fat Burner",
    "Hydration",
];
