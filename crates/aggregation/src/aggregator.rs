//! The aggregator: raw step series in, aggregated step series out.

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use grid_common::{field_stats, is_missing, Resolution, StepRange, StepType};

use crate::error::{AggregationError, Result};
use crate::steps::TimeResolutionChange;
use crate::window::{check_window, coverage, window_bounds, AggregationWindow, WindowSource};

/// Differences smaller than this, in source units, are zero. Larger totals
/// also clamp differences within their own `f32` rounding.
const CLAMP_EPSILON: f64 = 1e-5;

/// Parameters of one aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationParams {
    /// Output window length in hours.
    pub agg_step: u32,
    /// What each output window represents.
    pub agg_type: StepType,
    /// Distance between raw messages in hours.
    pub input_step: u32,
    /// Step type reported by the raw messages.
    pub source_step_type: StepType,
    pub window_start: u32,
    pub window_end: u32,
    pub missing_value: f32,
    /// Write 0 instead of the sentinel where every contributor is missing.
    pub force_zero_array: bool,
    /// Rescale cumulative windows to an amount per `unit_time` hours.
    pub unit_time: Option<u32>,
    /// Second input step of the raw series, if any.
    pub time_change: Option<TimeResolutionChange>,
    /// Spatial resolution the raw values belong to, carried into windows.
    pub resolution: Resolution,
}

impl AggregationParams {
    pub fn new(
        agg_step: u32,
        agg_type: StepType,
        input_step: u32,
        source_step_type: StepType,
        window_start: u32,
        window_end: u32,
        missing_value: f32,
    ) -> Self {
        Self {
            agg_step,
            agg_type,
            input_step,
            source_step_type,
            window_start,
            window_end,
            missing_value,
            force_zero_array: false,
            unit_time: None,
            time_change: None,
            resolution: Resolution::Primary,
        }
    }

    pub fn with_force_zero_array(mut self, force: bool) -> Self {
        self.force_zero_array = force;
        self
    }

    pub fn with_unit_time(mut self, unit_time: Option<u32>) -> Self {
        self.unit_time = unit_time;
        self
    }

    pub fn with_time_change(mut self, change: Option<TimeResolutionChange>) -> Self {
        self.time_change = change;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// First and last raw step a reader must select for this run.
    ///
    /// Cumulative windows need the running total at the window start as a
    /// baseline; instantaneous windows only need the window ends.
    pub fn real_start_end_steps(&self) -> (u32, u32) {
        match self.agg_type {
            StepType::Instant => (self.window_start + self.agg_step, self.window_end),
            StepType::Cumulative | StepType::Average => (self.window_start, self.window_end),
        }
    }
}

/// Validated aggregation run.
#[derive(Debug, Clone)]
pub struct Aggregator {
    params: AggregationParams,
}

impl Aggregator {
    /// Validate parameters.
    ///
    /// Fails when the step does not tile the window, the input step is zero,
    /// or the source step type cannot produce the requested aggregation.
    pub fn new(params: AggregationParams) -> Result<Self> {
        check_window(params.window_start, params.window_end, params.agg_step)?;
        if params.input_step == 0 {
            return Err(AggregationError::config("input step must be positive"));
        }
        if params.unit_time == Some(0) {
            return Err(AggregationError::config("unit time must be positive"));
        }
        match (params.agg_type, params.source_step_type) {
            (StepType::Cumulative, StepType::Cumulative)
            | (StepType::Average, StepType::Instant | StepType::Average)
            | (StepType::Instant, _) => {}
            (agg, source) => {
                return Err(AggregationError::config(format!(
                    "cannot compute {} windows from {} messages",
                    agg, source
                )));
            }
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &AggregationParams {
        &self.params
    }

    /// Same run with a different last window end, e.g. cut at a spatial
    /// resolution change.
    pub fn change_end_step(&self, window_end: u32) -> Result<Self> {
        Self::new(AggregationParams {
            window_end,
            ..self.params.clone()
        })
    }

    pub fn real_start_end_steps(&self) -> (u32, u32) {
        self.params.real_start_end_steps()
    }

    /// Plan the output windows against the raw steps that are available.
    pub fn windows<'a, I>(&self, raw_steps: I) -> Result<Vec<AggregationWindow>>
    where
        I: IntoIterator<Item = &'a StepRange>,
    {
        let p = &self.params;
        let raw: Vec<StepRange> = raw_steps
            .into_iter()
            .copied()
            .filter(|s| !(p.agg_type == StepType::Cumulative && is_step_zero_quirk(s)))
            .collect();

        // First raw range ending at each step, preferring instantaneous ones
        // for value lookups.
        let mut by_end: BTreeMap<u32, StepRange> = BTreeMap::new();
        for step in &raw {
            by_end
                .entry(step.end)
                .and_modify(|found| {
                    if step.is_instant() && !found.is_instant() {
                        *found = *step;
                    }
                })
                .or_insert(*step);
        }

        let bounds = window_bounds(
            p.window_start,
            p.window_end,
            p.agg_step,
            p.input_step,
            p.time_change.as_ref(),
        )?;

        bounds
            .into_iter()
            .map(|(output, input_step)| -> Result<AggregationWindow> {
                let source = match p.agg_type {
                    StepType::Cumulative => self.plan_difference(output, &by_end)?,
                    StepType::Average => self.plan_weighted(output, &raw)?,
                    StepType::Instant => WindowSource::Value(
                        *by_end.get(&output.end).ok_or_else(|| {
                            AggregationError::outside(output, "no raw message at window end")
                        })?,
                    ),
                };
                Ok(AggregationWindow {
                    output,
                    input_step,
                    resolution: p.resolution,
                    source,
                })
            })
            .collect()
    }

    fn plan_difference(
        &self,
        output: StepRange,
        by_end: &BTreeMap<u32, StepRange>,
    ) -> Result<WindowSource> {
        let end = by_end
            .get(&output.end)
            .copied()
            .ok_or_else(|| AggregationError::outside(output, "no running total at window end"))?;
        let baseline = if output.start == 0 {
            None
        } else {
            Some(by_end.get(&output.start).copied().ok_or_else(|| {
                AggregationError::outside(output, "no running total at window start")
            })?)
        };
        Ok(WindowSource::Difference { end, baseline })
    }

    fn plan_weighted(&self, output: StepRange, raw: &[StepRange]) -> Result<WindowSource> {
        let p = &self.params;
        let inputs: Vec<(StepRange, f64)> = raw
            .iter()
            .filter_map(|&step| {
                let (from, to) = coverage(step, p.input_step, p.time_change.as_ref());
                let overlap = to.min(output.end) as i64 - from.max(output.start) as i64;
                (overlap > 0).then_some((step, overlap as f64))
            })
            .collect();

        let covered: f64 = inputs.iter().map(|(_, w)| w).sum();
        if inputs.is_empty() {
            return Err(AggregationError::outside(output, "no raw message covers the window"));
        }
        if covered < p.agg_step as f64 {
            warn!(
                window = %output,
                covered_hours = covered,
                "Aggregation window only partially covered by raw messages"
            );
        }
        Ok(WindowSource::Weighted(inputs))
    }

    /// Aggregate a raw series.
    ///
    /// # Arguments
    /// * `raw` - Raw values keyed by step range, all of one resolution
    ///
    /// # Returns
    /// Aggregated values keyed by output step range. The raw map is consumed.
    pub fn aggregate(
        &self,
        mut raw: BTreeMap<StepRange, Vec<f32>>,
    ) -> Result<BTreeMap<StepRange, Vec<f32>>> {
        let p = &self.params;
        let points = check_lengths(&raw)?;

        if p.agg_type == StepType::Cumulative {
            let quirks: Vec<StepRange> = raw.keys().copied().filter(is_step_zero_quirk).collect();
            for step in quirks {
                warn!(
                    step = %step,
                    "Cumulative series reports step 0 as an instantaneous value; using a zero baseline instead"
                );
                raw.remove(&step);
            }
        }

        let windows = self.windows(raw.keys())?;
        info!(
            agg_type = %p.agg_type,
            agg_step = p.agg_step,
            resolution = %p.resolution,
            windows = windows.len(),
            first = %windows.first().map(|w| w.output.to_string()).unwrap_or_default(),
            last = %windows.last().map(|w| w.output.to_string()).unwrap_or_default(),
            "Aggregating raw series"
        );

        let mut aggregated = BTreeMap::new();
        for window in &windows {
            let values = match &window.source {
                WindowSource::Difference { end, baseline } => {
                    let end_values = lookup(&raw, *end)?;
                    let base_values = baseline.map(|b| lookup(&raw, b)).transpose()?;
                    self.difference(end_values, base_values)
                }
                WindowSource::Weighted(inputs) => {
                    let arrays = inputs
                        .iter()
                        .map(|(step, w)| lookup(&raw, *step).map(|values| (values, *w)))
                        .collect::<Result<Vec<_>>>()?;
                    self.weighted_mean(&arrays, points)
                }
                WindowSource::Value(step) => self.pass_through(lookup(&raw, *step)?),
            };

            if let Some((avg, min, max)) = field_stats(&values, p.missing_value) {
                debug!(
                    window = %window.output,
                    consumed = window.consumed().len(),
                    avg = avg,
                    min = min,
                    max = max,
                    "Aggregated window"
                );
            }
            aggregated.insert(window.output, values);
        }

        Ok(aggregated)
    }

    /// Cumulative window: `end - baseline`, zero baseline when absent.
    fn difference(&self, end: &[f32], baseline: Option<&[f32]>) -> Vec<f32> {
        let p = &self.params;
        let mv = p.missing_value;
        let contributors = if baseline.is_some() { 2 } else { 1 };
        let scale = p
            .unit_time
            .map(|u| u as f64 / p.agg_step as f64)
            .unwrap_or(1.0);

        end.par_iter()
            .enumerate()
            .map(|(i, &a)| {
                let b = baseline.map(|base| base[i]);
                let missing = is_missing(a, mv) as usize
                    + b.map(|b| is_missing(b, mv) as usize).unwrap_or(0);
                if let Some(v) = self.missing_cell(missing, contributors) {
                    return v;
                }

                let (a, b) = (a as f64, b.unwrap_or(0.0) as f64);
                let diff = a - b;
                let noise = CLAMP_EPSILON.max(f32::EPSILON as f64 * a.abs().max(b.abs()));
                if diff.abs() < noise {
                    0.0
                } else {
                    (diff * scale) as f32
                }
            })
            .collect()
    }

    /// Average window: duration-weighted mean of the covering raw values.
    fn weighted_mean(&self, inputs: &[(&[f32], f64)], points: usize) -> Vec<f32> {
        let mv = self.params.missing_value;
        (0..points)
            .into_par_iter()
            .map(|i| {
                let mut sum = 0.0f64;
                let mut weight = 0.0f64;
                let mut missing = 0usize;
                for (values, w) in inputs {
                    let v = values[i];
                    if is_missing(v, mv) {
                        missing += 1;
                        continue;
                    }
                    sum += v as f64 * w;
                    weight += w;
                }
                match self.missing_cell(missing, inputs.len()) {
                    Some(v) => v,
                    None => (sum / weight) as f32,
                }
            })
            .collect()
    }

    /// Instant window: raw value as is.
    fn pass_through(&self, values: &[f32]) -> Vec<f32> {
        let mv = self.params.missing_value;
        values
            .iter()
            .map(|&v| {
                if is_missing(v, mv) {
                    self.missing_cell(1, 1).unwrap_or(mv)
                } else {
                    v
                }
            })
            .collect()
    }

    /// Output of a cell with `missing` of `total` contributors missing, or
    /// `None` when every contributor has a value.
    #[inline]
    fn missing_cell(&self, missing: usize, total: usize) -> Option<f32> {
        if missing == 0 {
            None
        } else if missing == total && self.params.force_zero_array {
            Some(0.0)
        } else {
            Some(self.params.missing_value)
        }
    }
}

/// `(0, 0)` in a cumulative series: an instantaneous step-0 message in
/// different units, never a usable running total.
fn is_step_zero_quirk(step: &StepRange) -> bool {
    step.start == 0 && step.end == 0
}

fn lookup(raw: &BTreeMap<StepRange, Vec<f32>>, step: StepRange) -> Result<&[f32]> {
    raw.get(&step)
        .map(Vec::as_slice)
        .ok_or_else(|| AggregationError::outside(step, "raw message disappeared"))
}

fn check_lengths(raw: &BTreeMap<StepRange, Vec<f32>>) -> Result<usize> {
    let mut iter = raw.iter();
    let Some((_, first)) = iter.next() else {
        return Err(AggregationError::config("no raw messages to aggregate"));
    };
    let expected = first.len();
    for (step, values) in iter {
        if values.len() != expected {
            return Err(AggregationError::LengthMismatch {
                step: *step,
                expected,
                actual: values.len(),
            });
        }
    }
    Ok(expected)
}
