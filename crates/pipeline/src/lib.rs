//! Forecast-to-raster conversion runs.
//!
//! A [`Pipeline`] reads raw forecast messages through a [`SourceReader`],
//! optionally aggregates them in time, interpolates every step onto the
//! target raster with a cached table per source grid, and hands the maps to
//! an [`OutputWriter`] one at a time.
//!
//! Sources that change grid part way (e.g. a higher resolution for the first
//! days) are aggregated per resolution and interpolated with one table each.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reader;
pub mod writer;

pub use config::{AggregationConfig, InterpolationConfig, OutputConfig, RunConfig, TargetConfig, TimeConfig};
pub use error::{PipelineError, Result};
pub use orchestrator::{Pipeline, RunReport};
pub use reader::{with_step_window, AuxGrids, SourceReader, END_STEP, START_STEP};
pub use writer::{map_name, map_number, OutputWriter};
