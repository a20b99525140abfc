//! Run orchestration.
//!
//! ```text
//! SourceReader::step_ranges ──► window planning ──► SourceReader::select
//!                                                        │
//!                      conversion ◄──────────────────────┘
//!                          │
//!                          ├─► primary values ──► Aggregator (window ends at split)
//!                          └─► secondary values ─► Aggregator (window starts at split)
//!                                                        │
//!   InterpolationTableCache::build_or_load (once per grid)│
//!                          │                             ▼
//!                          └────────► per step: apply ──► OutputWriter
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use aggregation::window::check_window;
use aggregation::{scan_step_info, AggregationParams, Aggregator};
use grid_common::{
    field_stats, Criteria, Grid, MultiResolutionGrid, Resolution, StepRange, StepType,
};
use intertable::{InterpolationTableCache, LoadedTable, TableKey, TableOrigin, TargetGrid, TargetRaster};

use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use crate::reader::{with_step_window, SourceReader};
use crate::writer::OutputWriter;

type StepValues = BTreeMap<StepRange, Vec<f32>>;

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub maps_written: usize,
    pub first_step: Option<StepRange>,
    pub last_step: Option<StepRange>,
    /// Tables used, in order of first use.
    pub tables: Vec<(TableKey, TableOrigin)>,
    /// First output step interpolated from the secondary grid.
    pub resolution_switch: Option<StepRange>,
}

/// Selection and aggregation decided before any value is read.
struct RunPlan {
    selection: Criteria,
    aggregation: Option<AggregationParams>,
}

/// Interpolation tables of the run, one per resolution in use.
struct ResolutionTables {
    primary: LoadedTable,
    secondary: Option<LoadedTable>,
}

impl ResolutionTables {
    fn get(&self, resolution: Resolution) -> Result<&LoadedTable> {
        match resolution {
            Resolution::Primary => Ok(&self.primary),
            Resolution::Secondary => self.secondary.as_ref().ok_or_else(|| {
                PipelineError::GridMismatch("secondary values without a secondary grid".to_string())
            }),
        }
    }
}

/// Sequences selection, aggregation, interpolation and writing for one
/// parameter.
pub struct Pipeline {
    config: RunConfig,
    target: TargetRaster,
    cache: Arc<InterpolationTableCache>,
}

impl Pipeline {
    /// Validate the configuration and build the target raster it describes.
    pub fn new(config: RunConfig, cache: Arc<InterpolationTableCache>) -> Result<Self> {
        config.validate()?;
        let target = config.interpolation.target.to_raster()?;
        Ok(Self {
            config,
            target,
            cache,
        })
    }

    /// Use an explicit target raster instead of the configured one.
    pub fn with_target(mut self, target: TargetRaster) -> Self {
        self.target = target;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn target(&self) -> &TargetRaster {
        &self.target
    }

    pub fn cache(&self) -> &InterpolationTableCache {
        &self.cache
    }

    /// Convert every message matching `criteria` to target maps.
    ///
    /// Maps are handed to `writer` in increasing step order. Maps written
    /// before a failure stay written.
    pub fn run(
        &self,
        reader: &mut dyn SourceReader,
        writer: &mut dyn OutputWriter,
        criteria: &Criteria,
    ) -> Result<RunReport> {
        let plan = self.plan(reader, criteria)?;

        let mut collection = reader.select(&plan.selection)?;
        if collection.is_empty() {
            return Err(PipelineError::NoMessagesFound(plan.selection.to_string()));
        }
        info!(
            messages = collection.len(),
            unit = collection.unit(),
            step_type = %collection.step_type(),
            dual_resolution = collection.grids().is_dual(),
            "Selected messages"
        );

        collection.convert_values(&self.config.conversion);
        let missing_value = collection.missing_value();
        let source_step_type = collection.step_type();
        let (primary_raw, secondary_raw, grids) = collection.into_parts();

        let (primary, secondary) = match plan.aggregation {
            Some(mut params) => {
                params.source_step_type = source_step_type;
                params.missing_value = missing_value;
                self.aggregate(params, primary_raw, secondary_raw, &grids)?
            }
            None => (primary_raw, secondary_raw),
        };

        let mut outputs: BTreeMap<StepRange, (Resolution, Vec<f32>)> = BTreeMap::new();
        for (resolution, series) in [
            (Resolution::Primary, primary),
            (Resolution::Secondary, secondary),
        ] {
            for (step, mut values) in series {
                self.config
                    .conversion
                    .cut_off_negative(&mut values, missing_value);
                if outputs.insert(step, (resolution, values)).is_some() {
                    return Err(PipelineError::GridMismatch(format!(
                        "step {} produced on both resolutions",
                        step
                    )));
                }
            }
        }

        let needs_secondary = outputs
            .values()
            .any(|(resolution, _)| *resolution == Resolution::Secondary);
        let tables = self.load_tables(reader, &grids, needs_secondary)?;

        self.write_all(outputs, &tables, missing_value, writer)
    }

    /// Decide the time window and the selection before reading values.
    fn plan(&self, reader: &mut dyn SourceReader, criteria: &Criteria) -> Result<RunPlan> {
        let steps = reader.step_ranges(criteria)?;
        if steps.is_empty() {
            return Err(PipelineError::NoMessagesFound(criteria.to_string()));
        }
        let time = self.config.time;

        let Some(agg) = &self.config.aggregation else {
            let selection = match (time.tstart, time.tend) {
                (None, None) => criteria.clone(),
                (start, end) => {
                    with_step_window(criteria, start.unwrap_or(0), end.unwrap_or(u32::MAX))
                }
            };
            return Ok(RunPlan {
                selection,
                aggregation: None,
            });
        };

        let info = scan_step_info(&steps)?;
        let window_start = time.tstart.unwrap_or(info.start);
        let window_end = match time.tend {
            Some(end) => end,
            None => {
                let end =
                    window_start + info.end.saturating_sub(window_start) / agg.step * agg.step;
                if end != info.end {
                    info!(
                        last_raw_step = info.end,
                        window_end = end,
                        "Trimmed aggregation window to whole steps"
                    );
                }
                end
            }
        };
        check_window(window_start, window_end, agg.step)?;

        info!(
            input_step = info.input_step,
            second_input_step = info.change.map(|c| c.input_step),
            change_step_at = %info.change.map(|c| c.at.to_string()).unwrap_or_default(),
            window_start,
            window_end,
            "Planned aggregation"
        );

        let params = AggregationParams::new(
            agg.step,
            agg.agg_type,
            info.input_step,
            agg.agg_type,
            window_start,
            window_end,
            self.config.output.missing_value,
        )
        .with_force_zero_array(agg.force_zero_array)
        .with_unit_time(agg.unit_time)
        .with_time_change(info.change);

        let (first, last) = params.real_start_end_steps();
        Ok(RunPlan {
            selection: with_step_window(criteria, first, last),
            aggregation: Some(params),
        })
    }

    /// Aggregate one or both resolutions.
    ///
    /// With two grids the primary windows end at the last whole window before
    /// the grid change, and the secondary windows continue from there.
    fn aggregate(
        &self,
        params: AggregationParams,
        primary_raw: StepValues,
        mut secondary_raw: StepValues,
        grids: &MultiResolutionGrid,
    ) -> Result<(StepValues, StepValues)> {
        if !grids.is_dual() || secondary_raw.is_empty() {
            let aggregated = Aggregator::new(params)?.aggregate(primary_raw)?;
            return Ok((aggregated, BTreeMap::new()));
        }

        let (agg_step, window_start, window_end) =
            (params.agg_step, params.window_start, params.window_end);
        let last_primary = primary_raw
            .keys()
            .map(|s| s.end)
            .max()
            .unwrap_or(window_start)
            .min(window_end);
        let split = window_start + last_primary.saturating_sub(window_start) / agg_step * agg_step;

        // Cumulative secondary windows need a running total at the split.
        // Without one the primary total there is carried over to the
        // secondary grid.
        let seed = if params.agg_type == StepType::Cumulative
            && split > 0
            && !secondary_raw.keys().any(|s| s.end == split)
        {
            let seed = primary_raw
                .iter()
                .find(|(step, _)| step.end == split)
                .map(|(step, values)| (*step, values.clone()))
                .ok_or_else(|| {
                    PipelineError::GridMismatch(format!(
                        "no running total at step {} on either grid",
                        split
                    ))
                })?;
            Some(seed)
        } else {
            None
        };

        let primary = if split > window_start {
            Aggregator::new(AggregationParams {
                window_end: split,
                ..params.clone()
            })?
            .aggregate(primary_raw)?
        } else {
            warn!(
                last_primary_step = last_primary,
                "No whole aggregation window on the primary grid"
            );
            BTreeMap::new()
        };

        if let Some((step, values)) = seed {
            warn!(
                step = %step,
                "No secondary running total at the grid change, seeding it from the primary grid"
            );
            let regridded = self.regrid(grids, &values, params.missing_value)?;
            secondary_raw.insert(step, regridded);
        }

        let secondary_end =
            split + window_end.saturating_sub(split) / agg_step * agg_step;
        if secondary_end != window_end {
            warn!(
                window_end,
                secondary_end, "Secondary aggregation window trimmed to whole steps"
            );
        }

        let secondary = if secondary_end > split {
            Aggregator::new(AggregationParams {
                window_start: split,
                window_end: secondary_end,
                resolution: Resolution::Secondary,
                ..params
            })?
            .aggregate(secondary_raw)?
        } else {
            BTreeMap::new()
        };

        info!(
            split,
            primary_windows = primary.len(),
            secondary_windows = secondary.len(),
            "Aggregated both resolutions"
        );
        Ok((primary, secondary))
    }

    /// Interpolate a primary-grid field onto the secondary grid.
    fn regrid(
        &self,
        grids: &MultiResolutionGrid,
        values: &[f32],
        missing_value: f32,
    ) -> Result<Vec<f32>> {
        let secondary = grids.secondary().ok_or_else(|| {
            PipelineError::GridMismatch("secondary values without a secondary grid".to_string())
        })?;
        let loaded = self.cache.build_or_load(
            grids.primary(),
            &**secondary,
            &self.config.interpolation.method,
        )?;
        debug!(table = %loaded.key, origin = ?loaded.origin, "Regridding running total");
        Ok(loaded.table.apply(values, missing_value, missing_value)?)
    }

    /// Build or load each needed table exactly once.
    fn load_tables(
        &self,
        reader: &dyn SourceReader,
        grids: &MultiResolutionGrid,
        needs_secondary: bool,
    ) -> Result<ResolutionTables> {
        let aux = reader.aux_for_table_generation()?;
        let method = &self.config.interpolation.method;

        check_aux_grid(&aux.primary, grids.primary(), aux.primary_values.len())?;
        let primary = self.cache.build_or_load(&aux.primary, &self.target, method)?;

        let secondary = if needs_secondary {
            let expected = grids.secondary().ok_or_else(|| {
                PipelineError::GridMismatch("secondary values without a secondary grid".to_string())
            })?;
            let grid = aux.secondary.as_ref().unwrap_or(expected);
            let sample_len = aux
                .secondary_values
                .as_ref()
                .map(Vec::len)
                .unwrap_or(grid.point_count());
            check_aux_grid(grid, expected, sample_len)?;
            Some(self.cache.build_or_load(grid, &self.target, method)?)
        } else {
            None
        };

        Ok(ResolutionTables { primary, secondary })
    }

    fn write_all(
        &self,
        mut outputs: BTreeMap<StepRange, (Resolution, Vec<f32>)>,
        tables: &ResolutionTables,
        input_mv: f32,
        writer: &mut dyn OutputWriter,
    ) -> Result<RunReport> {
        let output_mv = self.config.output.missing_value;
        let mut report = RunReport::default();
        let mut current: Option<Resolution> = None;

        info!(
            maps = outputs.len(),
            target = self.target.id(),
            "Writing maps"
        );

        let mut index = 0usize;
        while let Some((step, (resolution, values))) = outputs.pop_first() {
            index += 1;
            let loaded = tables.get(resolution)?;

            // First step on this table: observability only.
            if current != Some(resolution) {
                info!(
                    step = %step,
                    resolution = %resolution,
                    table = %loaded.key,
                    origin = ?loaded.origin,
                    new_table = loaded.is_new(),
                    "Interpolating with table"
                );
                if resolution == Resolution::Secondary && current.is_some() {
                    info!(step = %step, "Change of resolution");
                }
                if resolution == Resolution::Secondary && report.resolution_switch.is_none() {
                    report.resolution_switch = Some(step);
                }
                if !report.tables.iter().any(|(key, _)| *key == loaded.key) {
                    report.tables.push((loaded.key.clone(), loaded.origin));
                }
                current = Some(resolution);
            }

            if let Some((avg, min, max)) = field_stats(&values, input_mv) {
                debug!(step = %step, avg, min, max, "Source values");
            }

            let interpolated = loaded.table.apply(&values, input_mv, output_mv)?;
            drop(values);

            if let Some((avg, min, max)) = field_stats(&interpolated, output_mv) {
                debug!(step = %step, avg, min, max, "Interpolated values");
            }

            writer.write(index, step, &interpolated, output_mv)?;

            report.maps_written += 1;
            report.first_step.get_or_insert(step);
            report.last_step = Some(step);
        }

        info!(
            maps_written = report.maps_written,
            cache_hits = self.cache.stats().hits,
            tables_built = self.cache.stats().builds,
            "Run complete"
        );
        Ok(report)
    }
}

fn check_aux_grid(aux: &Grid, expected: &Grid, sample_len: usize) -> Result<()> {
    if aux.id() != expected.id() {
        return Err(PipelineError::GridMismatch(format!(
            "table grid {} differs from message grid {}",
            aux.id(),
            expected.id()
        )));
    }
    if sample_len != aux.point_count() {
        return Err(PipelineError::GridMismatch(format!(
            "sample values have {} points, grid {} has {}",
            sample_len,
            aux.id(),
            aux.point_count()
        )));
    }
    Ok(())
}
