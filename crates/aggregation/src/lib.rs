//! Temporal aggregation of raw forecast step series.
//!
//! Raw messages arrive keyed by [`StepRange`](grid_common::StepRange) at the
//! model's input step (e.g. 6-hourly running totals). The [`Aggregator`]
//! turns them into windows of `agg_step` hours:
//!
//! - **cumulative**: running total at the window end minus the one at its start
//! - **average**: duration-weighted mean of the raw values covering the window
//! - **instant**: the raw value at the window end
//!
//! Series whose input step changes part way (see [`scan_step_info`]) are
//! windowed in two sequences split at the change.

pub mod aggregator;
pub mod error;
pub mod steps;
pub mod window;

pub use aggregator::{AggregationParams, Aggregator};
pub use error::{AggregationError, Result};
pub use steps::{scan_step_info, StepInfo, TimeResolutionChange};
pub use window::{AggregationWindow, WindowSource};
