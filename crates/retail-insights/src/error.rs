//! Error types for dashboard loading and analysis.
//!
//! Every failure a section can hit is a variant of [`DashboardError`]. The
//! dashboard never aborts on one of these: it turns the error into a skipped
//! section carrying the error code and message.
//!
//! Errors serialize as `{ "code": ..., "message": ... }` so a front end can
//! show them next to the section they belong to.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the analytics library.
#[derive(Error, Debug)]
pub enum DashboardError {
    /// A source CSV file does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A source table failed to load earlier in the run.
    #[error("{table} is unavailable: {reason}")]
    SourceUnavailable { table: String, reason: String },

    /// One or more required columns are absent from a table.
    #[error("Missing columns in {table}: {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// A single column lookup failed on an intermediate frame.
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A filter value refers to something that does not exist.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Filters removed every row.
    #[error("No data matches the selected filters: {0}")]
    EmptySelection(String),

    /// Not enough rows to compute a result.
    #[error("Not enough data: {0}")]
    InsufficientData(String),

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
        source: Box<DashboardError>,
    },
}

impl DashboardError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DashboardError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a [`DashboardError::MissingColumns`] from borrowed names.
    pub fn missing_columns(table: impl Into<String>, columns: &[&str]) -> Self {
        DashboardError::MissingColumns {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Stable error code for front ends and JSON output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::MissingColumns { .. } => "MISSING_COLUMNS",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::EmptySelection(_) => "EMPTY_SELECTION",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error comes from the input data rather than a bug or IO
    /// fault. Data errors are expected on real exports and are reported to the
    /// user as-is.
    pub fn is_data_issue(&self) -> bool {
        match self {
            Self::FileNotFound(_)
            | Self::SourceUnavailable { .. }
            | Self::MissingColumns { .. }
            | Self::EmptySelection(_)
            | Self::InsufficientData(_)
            | Self::InvalidFilter(_) => true,
            Self::WithContext { source, .. } => source.is_data_issue(),
            _ => false,
        }
    }
}

impl Serialize for DashboardError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DashboardError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, DashboardError>;

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
        self.map_err(|e| DashboardError::Polars(e).with_context(context))
    }
}
