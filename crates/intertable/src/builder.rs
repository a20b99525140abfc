//! Table construction from a source grid and a target raster.

use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

use grid_common::Grid;

use crate::error::{Result, TableError};
use crate::method::InterpolationMethod;
use crate::spatial::SourceIndex;
use crate::table::InterpolationTable;
use crate::target::TargetGrid;

/// Distances below this (metres) count as an exact coincidence.
const COINCIDENT_M: f64 = 1e-6;

/// Build an interpolation table for `source` onto `target`.
///
/// Fails with [`TableError::Domain`] when no target cell has a source point
/// within the search radius.
pub fn build_table(
    source: &Grid,
    target: &dyn TargetGrid,
    method: &InterpolationMethod,
) -> Result<InterpolationTable> {
    method.validate()?;
    let start = Instant::now();

    let index = SourceIndex::build(&source.coordinates());
    let targets = target.coordinates();
    let k = method.neighbours();
    let max_radius = method.max_radius();

    debug!(
        grid_id = %source.id(),
        target = target.id(),
        source_points = index.len(),
        target_cells = targets.len(),
        method = %method,
        "Building interpolation table"
    );

    let rows: Vec<Option<Vec<(u32, f32)>>> = targets
        .lats
        .par_iter()
        .zip(targets.lons.par_iter())
        .map(|(&lat, &lon)| {
            if !lat.is_finite() || !lon.is_finite() {
                return None;
            }
            let hits = index.nearest_within(lat, lon, k, max_radius);
            match method {
                InterpolationMethod::Nearest { .. } => hits.first().map(|&(idx, _)| vec![(idx, 1.0)]),
                InterpolationMethod::InverseDistance { power, .. } => idw_weights(&hits, *power),
            }
        })
        .collect();

    let table = InterpolationTable::from_rows(*method, source.point_count(), rows);
    let covered = table.covered_count();
    if covered == 0 {
        return Err(TableError::Domain {
            source_grid: source.id().clone(),
            target: target.id().to_string(),
            max_radius,
        });
    }

    info!(
        grid_id = %source.id(),
        target = target.id(),
        method = %method,
        covered_cells = covered,
        total_cells = table.cell_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Built interpolation table"
    );

    Ok(table)
}

/// Normalised `1 / d^p` weights. A coincident point takes all the weight.
fn idw_weights(hits: &[(u32, f64)], power: f64) -> Option<Vec<(u32, f32)>> {
    let &(first, nearest) = hits.first()?;
    if nearest < COINCIDENT_M {
        return Some(vec![(first, 1.0)]);
    }

    let raw: Vec<f64> = hits.iter().map(|&(_, d)| 1.0 / d.powf(power)).collect();
    let total: f64 = raw.iter().sum();
    Some(
        hits.iter()
            .zip(raw)
            .map(|(&(idx, _), w)| (idx, (w / total) as f32))
            .collect(),
    )
}
