//! Error types for the comad library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum ComadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not move output into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Invalid count value '{value}' at row {row}, column {col}")]
    InvalidCount {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Row {row} has {actual} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Rarefaction error: {0}")]
    Rarefaction(String),

    #[error("Fit did not converge after {iterations} iterations: {reason}")]
    FitConvergence { iterations: usize, reason: String },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Run {run_id} failed: {source}")]
    Run {
        run_id: String,
        #[source]
        source: Box<ComadError>,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ComadError {
    /// Whether this error was caused by invalid input rather than by the analysis itself.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::InvalidCount { .. }
            | Self::RaggedRow { .. }
            | Self::DimensionMismatch { .. }
            | Self::EmptyData(_)
            | Self::InvalidParameter(_) => true,
            Self::Run { source, .. } => source.is_input_error(),
            _ => false,
        }
    }

    /// Attach a run identifier to an error.
    pub fn in_run(self, run_id: &str) -> Self {
        match self {
            Self::Run { .. } => self,
            other => Self::Run {
                run_id: run_id.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ComadError>;
