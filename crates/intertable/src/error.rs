//! Error types for interpolation tables.

use std::path::PathBuf;
use thiserror::Error;

use grid_common::GridId;

/// Errors that can occur while building, storing or applying tables.
#[derive(Error, Debug)]
pub enum TableError {
    /// No target cell has a source point within the search radius.
    #[error(
        "interpolation domain error: no cell of target {target} is covered by source grid {source_grid} within {max_radius} m"
    )]
    Domain {
        source_grid: GridId,
        target: String,
        max_radius: f64,
    },

    /// Method parameters out of range.
    #[error("invalid interpolation parameters: {0}")]
    InvalidParams(String),

    /// A persisted table could not be read back.
    #[error("failed to load interpolation table {path}: {reason}")]
    CacheLoad { path: PathBuf, reason: String },

    /// Serialized table content is inconsistent.
    #[error("corrupt interpolation table: {0}")]
    Corrupt(String),

    /// Value array length does not match the table's source grid.
    #[error("value array has {actual} points, table expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Target raster description is unusable.
    #[error("invalid target grid: {0}")]
    InvalidTarget(String),

    /// Storage/IO error.
    #[error("table storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl TableError {
    /// Create a CacheLoad error.
    pub fn cache_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CacheLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;
