use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema validation failed. Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Input file '{0}' has a header but no data rows")]
    EmptyInput(String),

    #[error("Validation failed: {invalid_rows} row(s) carry errors, cleaned file was not written")]
    ValidationFailed { invalid_rows: usize },
}

impl CleanerError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CleanerError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanerError>;
