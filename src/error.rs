use std::borrow::Cow;
use std::io;

/// Result type used across the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// High-level error type surfaced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure while reading or writing the underlying byte streams.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Upstream cursor failure or schema discovery failure. Fatal.
    #[error("row source failed: {details}")]
    Source { details: Cow<'static, str> },

    /// I/O failure inside the file sink; the sink is closed afterwards.
    #[error("file sink failed: {details}")]
    Sink { details: Cow<'static, str> },

    /// A CSV header column resolves to no database column and auto-skip
    /// is disabled. Raised before any row is bound.
    #[error("no matching table column for '{column}'")]
    SchemaMismatch { column: String },

    /// A value failed to decode for its target column. Per-row; the
    /// loader diverts the row and keeps going until the error cap.
    #[error("{details}")]
    TypeMismatch { details: Cow<'static, str> },

    /// The driver reported per-row failures for an executed batch.
    /// `update_counts` mirrors the driver's array; `FAILED_ROW` marks
    /// rejected positions.
    #[error("batch execution failed: {details}")]
    Batch {
        details: Cow<'static, str>,
        update_counts: Vec<i64>,
    },

    /// The caller-owned cancel token was set.
    #[error("operation aborted")]
    Aborted,

    /// The configured per-row error cap was reached.
    #[error("error limit of {limit} reached")]
    ErrorLimit { limit: u64 },

    /// Invalid option name or value.
    #[error("invalid configuration: {details}")]
    Config { details: Cow<'static, str> },

    /// Failure to convert bytes between character encodings.
    #[error("encoding conversion from {encoding} failed: {details}")]
    Encoding {
        encoding: Cow<'static, str>,
        details: Cow<'static, str>,
    },

    /// Error reported by the CSV reader/writer layer.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Sentinel used in batch update-count arrays for rejected rows.
pub const FAILED_ROW: i64 = -3;

impl Error {
    pub fn source(details: impl Into<Cow<'static, str>>) -> Self {
        Self::Source {
            details: details.into(),
        }
    }

    pub fn sink(details: impl Into<Cow<'static, str>>) -> Self {
        Self::Sink {
            details: details.into(),
        }
    }

    pub fn type_mismatch(details: impl Into<Cow<'static, str>>) -> Self {
        Self::TypeMismatch {
            details: details.into(),
        }
    }

    pub fn config(details: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }

    /// Whether the loader may recover from this error by diverting the
    /// offending row and continuing.
    #[must_use]
    pub const fn is_row_recoverable(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}
