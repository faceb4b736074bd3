//! Custom error types for the cleaning pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Configuration
//! mistakes (unknown columns, cyclic indicator definitions, bad thresholds)
//! are fatal and fail the whole run before any record is touched; per-value
//! problems (non-numeric entries, empty groups) are tolerated and surfaced
//! through the run summary instead.

use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Indicator definitions form a dependency cycle.
    #[error("Cyclic indicator definition involving: {0}")]
    CyclicDefinition(String),

    /// No CSV files were found under the input directory.
    #[error("No CSV files found under '{0}'")]
    NoInputFiles(String),

    /// Reading or combining input files failed.
    #[error("Failed to ingest input data: {0}")]
    IngestionFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable code for logs and reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::CyclicDefinition(_) => "CYCLIC_DEFINITION",
            Self::NoInputFiles(_) => "NO_INPUT_FILES",
            Self::IngestionFailed(_) => "INGESTION_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is a configuration mistake (as opposed to a data
    /// or environment failure).
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_) | Self::InvalidConfig(_) | Self::CyclicDefinition(_) => true,
            Self::WithContext { source, .. } => source.is_config_error(),
            _ => false,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}
