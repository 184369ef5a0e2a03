use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a failed evaluation.
///
/// None of these are cached; a later request for the same parcel retries.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("parcel key must not be empty")]
    EmptyParcelKey,

    /// The text-generation collaborator failed or returned nothing usable.
    #[error("report generation failed: {message}")]
    Report { message: String },

    /// The economic series could not be fetched or parsed.
    #[error("economic data fetch failed: {message}")]
    Economic { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the derived table failed.
    #[error("query failed: {0}")]
    Query(String),

    #[error("not enough overlapping years to fit a regression for '{parcel}'")]
    InsufficientData { parcel: String },

    #[error("evaluation of '{parcel}' timed out after {after:?}")]
    Timeout { parcel: String, after: Duration },
}

impl From<anyhow::Error> for EvalError {
    fn from(e: anyhow::Error) -> Self {
        EvalError::Query(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
