//! Error taxonomy for the ETL core
//!
//! Stage code returns [`EtlError`]; the CLI and config layers wrap these in
//! `eyre` reports at the application edge.

use thiserror::Error;

/// Result alias used across the ETL core
pub type EtlResult<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A source locator does not exist
    #[error("source not found: {0}")]
    NotFound(String),

    /// Extraction finished without a single usable row
    #[error("no data extracted: {0}")]
    NoData(String),

    /// A remote call kept failing after every retry attempt
    #[error("remote call failed after {attempts} attempt(s): {message}")]
    TransientSource { attempts: u32, message: String },

    /// A remote call failed in a way retrying cannot fix (4xx, bad payload)
    #[error("source error: {0}")]
    Source(String),

    /// The job definition contradicts itself
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An explicit validation rule was violated in strict mode
    #[error("validation failed: {0}")]
    Validation(String),

    /// A directive could not be applied
    #[error("transform failed: {0}")]
    Transform(String),

    /// Table shape mismatch (column lengths, duplicate names)
    #[error("schema error: {0}")]
    Schema(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientSource { .. })
    }

    /// Short machine-readable name used in step log details
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NoData(_) => "no_data",
            Self::TransientSource { .. } => "transient_source",
            Self::Source(_) => "source",
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::Transform(_) => "transform",
            Self::Schema(_) => "schema",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Csv(_) => "csv",
            Self::Json(_) => "json",
        }
    }
}
