/// Error types for loading the satellite source tables
use thiserror::Error;

/// Startup data errors. Any of these aborts the pipeline before
/// anything is served.
#[derive(Error, Debug)]
pub enum SatError {
    /// Source file missing or unreadable
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV data
    #[error("Failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// A required column is absent from the header row
    #[error("{table} table is missing required column '{column}'")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Type alias for Results using SatError
pub type Result<T> = std::result::Result<T, SatError>;
