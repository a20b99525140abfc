//! Error types for grid and message handling.

use thiserror::Error;

use crate::step::StepRange;

/// Errors raised while describing grids or collecting messages.
#[derive(Error, Debug)]
pub enum GridError {
    /// A grid description is internally inconsistent.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// A message does not fit the geometry of the resolution it belongs to,
    /// or a third resolution appeared in the series.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// The same step range was collected twice.
    #[error("duplicate step range {0}")]
    DuplicateStep(StepRange),

    /// A step range could not be parsed or is reversed.
    #[error("invalid step range: {0}")]
    InvalidStepRange(String),

    /// A step type name is not recognised.
    #[error("unknown step type: {0}")]
    UnknownStepType(String),
}

impl GridError {
    /// Create an InvalidGrid error.
    pub fn invalid_grid(msg: impl Into<String>) -> Self {
        Self::InvalidGrid(msg.into())
    }

    /// Create a GridMismatch error.
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::GridMismatch(msg.into())
    }
}

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
