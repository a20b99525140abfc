//! Common types shared by the forecast-to-raster conversion crates.
//!
//! This crate holds the value objects every other stage agrees on:
//!
//! - [`StepRange`] / [`StepType`]: the time slice a field value belongs to
//! - [`Grid`] / [`GridId`]: source grid geometry and its stable identity
//! - [`MultiResolutionGrid`]: primary grid plus optional second resolution
//! - [`MessageCollection`]: raw values keyed by step range, split by resolution
//! - [`Criteria`]: message selection predicates used by readers
//! - [`Conversion`]: optional unit conversion applied to raw values
//!
//! # Architecture
//!
//! ```text
//! Reader ──► MessageCollectionBuilder ──► MessageCollection
//!                   │                         │
//!                   │ (point count changes)   ├─► primary values
//!                   ▼                         └─► secondary values
//!            ResolutionState::DualResolution
//! ```

pub mod conversion;
pub mod error;
pub mod grid;
pub mod messages;
pub mod select;
pub mod step;

pub use conversion::Conversion;
pub use error::{GridError, Result};
pub use grid::{Coordinates, Grid, GridId, GridSpec};
pub use messages::{
    MessageCollection, MessageCollectionBuilder, MultiResolutionGrid, Resolution, ResolutionState,
};
pub use select::{AttrValue, Criteria, Criterion};
pub use step::{StepRange, StepType};

/// Summary statistics of the non-missing values of a field.
///
/// Returns `(avg, min, max)`, or `None` when every value is missing.
pub fn field_stats(values: &[f32], missing_value: f32) -> Option<(f64, f64, f64)> {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for &v in values {
        if is_missing(v, missing_value) {
            continue;
        }
        let v = v as f64;
        count += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }

    if count == 0 {
        None
    } else {
        Some((sum / count as f64, min, max))
    }
}

/// Whether `value` equals the missing-value sentinel.
///
/// NaN sentinels are matched with `is_nan`, everything else exactly.
#[inline]
pub fn is_missing(value: f32, missing_value: f32) -> bool {
    if missing_value.is_nan() {
        value.is_nan()
    } else {
        value == missing_value
    }
}
