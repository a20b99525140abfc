//! Error types for pipeline runs.

use thiserror::Error;

use aggregation::AggregationError;
use grid_common::GridError;
use intertable::TableError;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The selection matched no raw message.
    #[error("no messages found for selection [{0}]")]
    NoMessagesFound(String),

    /// Source grid and target raster do not overlap.
    #[error("{0}")]
    InterpolationDomainError(TableError),

    /// Grids of one run disagree with each other or with the target.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// Aggregation step, window or types are unusable for the series.
    #[error("{0}")]
    AggregationConfigError(AggregationError),

    /// Table build, load or apply failed.
    #[error("interpolation table error: {0}")]
    Table(TableError),

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The source reader failed.
    #[error("reader error: {0}")]
    Reader(String),

    /// The output writer failed.
    #[error("writer error: {0}")]
    Writer(String),

    /// Storage/IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Reader error.
    pub fn reader(msg: impl Into<String>) -> Self {
        Self::Reader(msg.into())
    }

    /// Create a Writer error.
    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer(msg.into())
    }
}

impl From<TableError> for PipelineError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Domain { .. } => Self::InterpolationDomainError(err),
            TableError::SizeMismatch { .. } | TableError::InvalidTarget(_) => {
                Self::GridMismatch(err.to_string())
            }
            TableError::InvalidParams(_) => Self::Config(err.to_string()),
            other => Self::Table(other),
        }
    }
}

impl From<GridError> for PipelineError {
    fn from(err: GridError) -> Self {
        match err {
            GridError::GridMismatch(msg) => Self::GridMismatch(msg),
            other => Self::Reader(other.to_string()),
        }
    }
}

impl From<AggregationError> for PipelineError {
    fn from(err: AggregationError) -> Self {
        match err {
            AggregationError::LengthMismatch { .. } => Self::GridMismatch(err.to_string()),
            other => Self::AggregationConfigError(other),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use grid_common::GridId;

    #[test]
    fn test_domain_error_maps_to_domain_variant() {
        let err: PipelineError = TableError::Domain {
            source_grid: GridId::from_raw("abc"),
            target: "efas".to_string(),
            max_radius: 1000.0,
        }
        .into();
        assert!(matches!(err, PipelineError::InterpolationDomainError(_)));
        assert!(err.to_string().contains("interpolation domain error"));
    }

    #[test]
    fn test_aggregation_config_error() {
        let err: PipelineError = AggregationError::config("step 0").into();
        assert!(matches!(err, PipelineError::AggregationConfigError(_)));
    }

    #[test]
    fn test_grid_mismatch() {
        let err: PipelineError = GridError::mismatch("same point count").into();
        assert!(matches!(err, PipelineError::GridMismatch(_)));
    }
}
