//! Error types for temporal aggregation.

use thiserror::Error;

use grid_common::StepRange;

/// Errors that can occur during aggregation.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// Aggregation step, window or source type cannot work together.
    #[error("aggregation config error: {0}")]
    Config(String),

    /// A window needs raw steps that are not in the series.
    #[error("aggregation window {window} lies outside the available raw steps: {reason}")]
    OutsideRawSteps { window: StepRange, reason: String },

    /// Raw arrays of one series have different lengths.
    #[error("raw message {step} has {actual} values, expected {expected}")]
    LengthMismatch {
        step: StepRange,
        expected: usize,
        actual: usize,
    },
}

impl AggregationError {
    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an OutsideRawSteps error.
    pub fn outside(window: StepRange, reason: impl Into<String>) -> Self {
        Self::OutsideRawSteps {
            window,
            reason: reason.into(),
        }
    }
}

/// Result type for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregationError>;
