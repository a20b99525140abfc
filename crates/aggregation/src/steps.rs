//! Step structure of a raw series.

use grid_common::StepRange;

use crate::error::{AggregationError, Result};

/// Input step change within a raw series, e.g. 6-hourly messages up to
/// hour 48 followed by 3-hourly ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeResolutionChange {
    /// First raw range arriving at the new input step.
    pub at: StepRange,
    /// Input step after the change, in hours.
    pub input_step: u32,
}

impl TimeResolutionChange {
    /// Last hour covered at the old input step.
    pub fn boundary(&self) -> u32 {
        self.at.end.saturating_sub(self.input_step)
    }
}

/// Summary of the step ranges found in a raw series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    /// Smallest start step.
    pub start: u32,
    /// Largest end step.
    pub end: u32,
    /// Distance between the first two end steps.
    pub input_step: u32,
    /// Where and to what the input step changes, if it does.
    pub change: Option<TimeResolutionChange>,
}

/// Derive first/last step, input step and an optional second input step
/// from step adjacency.
///
/// Ends and starts are sorted independently. The input step is the gap
/// between the first two ends; the first later gap that differs marks the
/// change, reported at `(starts[i], ends[i])`.
pub fn scan_step_info(step_ranges: &[StepRange]) -> Result<StepInfo> {
    if step_ranges.len() < 2 {
        return Err(AggregationError::config(format!(
            "need at least two raw messages to derive the input step, got {}",
            step_ranges.len()
        )));
    }

    let mut ends: Vec<u32> = step_ranges.iter().map(|s| s.end).collect();
    let mut starts: Vec<u32> = step_ranges.iter().map(|s| s.start).collect();
    ends.sort_unstable();
    starts.sort_unstable();

    let input_step = ends[1] - ends[0];
    if input_step == 0 {
        return Err(AggregationError::config(format!(
            "two raw messages end at step {}",
            ends[0]
        )));
    }

    let change = (2..ends.len())
        .find(|&i| ends[i] - ends[i - 1] != input_step)
        .map(|i| TimeResolutionChange {
            at: StepRange::new(starts[i].min(ends[i]), ends[i]),
            input_step: ends[i] - ends[i - 1],
        });

    Ok(StepInfo {
        start: starts[0],
        end: ends[ends.len() - 1],
        input_step,
        change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instants(steps: &[u32]) -> Vec<StepRange> {
        steps.iter().map(|&s| StepRange::instant(s)).collect()
    }

    #[test]
    fn test_uniform_series() {
        let info = scan_step_info(&instants(&[0, 6, 12, 18, 24])).unwrap();
        assert_eq!(info.start, 0);
        assert_eq!(info.end, 24);
        assert_eq!(info.input_step, 6);
        assert!(info.change.is_none());
    }

    #[test]
    fn test_detects_second_time_resolution() {
        let info = scan_step_info(&instants(&[0, 6, 12, 18, 24, 30, 36, 42, 48, 51, 54])).unwrap();
        assert_eq!(info.input_step, 6);
        let change = info.change.unwrap();
        assert_eq!(change.at, StepRange::instant(51));
        assert_eq!(change.input_step, 3);
        assert_eq!(change.boundary(), 48);
    }

    #[test]
    fn test_cumulative_ranges_from_zero() {
        let steps: Vec<StepRange> = [6, 12, 18, 21]
            .iter()
            .map(|&e| StepRange::new(0, e))
            .collect();
        let info = scan_step_info(&steps).unwrap();
        let change = info.change.unwrap();
        assert_eq!(change.at, StepRange::new(0, 21));
        assert_eq!(change.boundary(), 18);
    }

    #[test]
    fn test_too_few_messages() {
        assert!(scan_step_info(&instants(&[6])).is_err());
        assert!(scan_step_info(&[StepRange::new(0, 6), StepRange::instant(6)]).is_err());
    }
}
