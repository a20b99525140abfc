//! Aggregation windows and the raw steps they consume.

use std::fmt;

use grid_common::{Resolution, StepRange};

use crate::error::{AggregationError, Result};
use crate::steps::TimeResolutionChange;

/// How a window's output is derived from raw messages.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowSource {
    /// Running total at `end` minus running total at `baseline`.
    /// `None` baseline means a zero start (window starts at step 0).
    Difference {
        end: StepRange,
        baseline: Option<StepRange>,
    },
    /// Raw ranges with the hours each one covers inside the window.
    Weighted(Vec<(StepRange, f64)>),
    /// Single raw value taken as is.
    Value(StepRange),
}

/// One output slice of an aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationWindow {
    /// Output step range `(start, end)`.
    pub output: StepRange,
    /// Raw input step in effect for this window.
    pub input_step: u32,
    pub resolution: Resolution,
    pub source: WindowSource,
}

impl AggregationWindow {
    /// Raw ranges read by this window, in ascending order.
    pub fn consumed(&self) -> Vec<StepRange> {
        let mut steps = match &self.source {
            WindowSource::Difference { end, baseline } => {
                baseline.iter().copied().chain(Some(*end)).collect()
            }
            WindowSource::Weighted(inputs) => inputs.iter().map(|(s, _)| *s).collect(),
            WindowSource::Value(step) => vec![*step],
        };
        steps.sort();
        steps
    }
}

impl fmt::Display for AggregationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} resolution]", self.output, self.resolution)
    }
}

/// Output step ranges covering `[window_start, window_end]` in `agg_step`
/// increments, each paired with its input step.
///
/// With a time resolution change inside the window, the sequence is split at
/// the last window end not after the change boundary and restarted there with
/// the new input step.
pub fn window_bounds(
    window_start: u32,
    window_end: u32,
    agg_step: u32,
    input_step: u32,
    change: Option<&TimeResolutionChange>,
) -> Result<Vec<(StepRange, u32)>> {
    check_window(window_start, window_end, agg_step)?;

    let segments = match change {
        Some(change) => {
            let boundary = change.boundary();
            if boundary <= window_start {
                vec![(window_start, window_end, change.input_step)]
            } else if boundary >= window_end {
                vec![(window_start, window_end, input_step)]
            } else {
                let split = window_start + (boundary - window_start) / agg_step * agg_step;
                vec![
                    (window_start, split, input_step),
                    (split, window_end, change.input_step),
                ]
            }
        }
        None => vec![(window_start, window_end, input_step)],
    };

    let mut bounds = Vec::with_capacity(((window_end - window_start) / agg_step) as usize);
    for (from, to, step) in segments {
        let mut start = from;
        while start < to {
            bounds.push((StepRange::new(start, start + agg_step), step));
            start += agg_step;
        }
    }
    Ok(bounds)
}

/// Validate that `agg_step` tiles a non-empty window exactly.
pub fn check_window(window_start: u32, window_end: u32, agg_step: u32) -> Result<()> {
    if agg_step == 0 {
        return Err(AggregationError::config("aggregation step must be positive"));
    }
    if window_end <= window_start {
        return Err(AggregationError::config(format!(
            "empty aggregation window {}-{}",
            window_start, window_end
        )));
    }
    if (window_end - window_start) % agg_step != 0 {
        return Err(AggregationError::config(format!(
            "aggregation step {} does not evenly divide the window {}-{}",
            agg_step, window_start, window_end
        )));
    }
    Ok(())
}

/// Hours `[from, to)` a raw range stands for.
///
/// Ranges with duration cover themselves; an instantaneous value holds until
/// the next message, one input step later. An instant at `t` therefore
/// covers `[t, t + input_step)`: one on a window's start counts towards that
/// window, one on a window's end belongs to the next window.
pub fn coverage(
    step: StepRange,
    input_step: u32,
    change: Option<&TimeResolutionChange>,
) -> (u32, u32) {
    if !step.is_instant() {
        return (step.start, step.end);
    }
    let held = match change {
        Some(c) if step.end + c.input_step >= c.at.end => c.input_step,
        _ => input_step,
    };
    (step.end, step.end + held)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ends(bounds: &[(StepRange, u32)]) -> Vec<u32> {
        bounds.iter().map(|(s, _)| s.end).collect()
    }

    #[test]
    fn test_single_sequence() {
        let bounds = window_bounds(0, 72, 24, 6, None).unwrap();
        assert_eq!(ends(&bounds), vec![24, 48, 72]);
        assert_eq!(bounds[0].0, StepRange::new(0, 24));
        assert!(bounds.iter().all(|(_, step)| *step == 6));
    }

    #[test]
    fn test_split_at_time_resolution_change() {
        let change = TimeResolutionChange {
            at: StepRange::instant(51),
            input_step: 3,
        };
        let bounds = window_bounds(0, 96, 24, 6, Some(&change)).unwrap();
        assert_eq!(ends(&bounds), vec![24, 48, 72, 96]);
        let steps: Vec<u32> = bounds.iter().map(|(_, s)| *s).collect();
        assert_eq!(steps, vec![6, 6, 3, 3]);
    }

    #[test]
    fn test_unaligned_change_restarts_at_last_full_window() {
        let change = TimeResolutionChange {
            at: StepRange::instant(39),
            input_step: 3,
        };
        let bounds = window_bounds(0, 72, 24, 6, Some(&change)).unwrap();
        assert_eq!(ends(&bounds), vec![24, 48, 72]);
        let steps: Vec<u32> = bounds.iter().map(|(_, s)| *s).collect();
        assert_eq!(steps, vec![6, 3, 3]);
    }

    #[test]
    fn test_invalid_windows() {
        assert!(window_bounds(0, 24, 0, 6, None).is_err());
        assert!(window_bounds(24, 24, 24, 6, None).is_err());
        assert!(window_bounds(0, 30, 24, 6, None).is_err());
    }

    #[test]
    fn test_coverage() {
        assert_eq!(coverage(StepRange::new(6, 12), 6, None), (6, 12));
        assert_eq!(coverage(StepRange::instant(6), 6, None), (6, 12));

        let change = TimeResolutionChange {
            at: StepRange::instant(51),
            input_step: 3,
        };
        assert_eq!(coverage(StepRange::instant(42), 6, Some(&change)), (42, 48));
        assert_eq!(coverage(StepRange::instant(48), 6, Some(&change)), (48, 51));
        assert_eq!(coverage(StepRange::instant(51), 6, Some(&change)), (51, 54));
    }

    #[test]
    fn test_instant_on_window_end_belongs_to_next_window() {
        let overlap = |step: StepRange, window: (u32, u32)| {
            let (from, to) = coverage(step, 6, None);
            to.min(window.1) as i64 - from.max(window.0) as i64
        };
        assert_eq!(overlap(StepRange::instant(0), (0, 24)), 6);
        assert!(overlap(StepRange::instant(24), (0, 24)) <= 0);
        assert_eq!(overlap(StepRange::instant(24), (24, 48)), 6);
        assert!(overlap(StepRange::instant(48), (24, 48)) <= 0);
    }

    #[test]
    fn test_consumed_is_sorted() {
        let window = AggregationWindow {
            output: StepRange::new(24, 48),
            input_step: 6,
            resolution: Resolution::Primary,
            source: WindowSource::Difference {
                end: StepRange::new(42, 48),
                baseline: Some(StepRange::new(18, 24)),
            },
        };
        assert_eq!(
            window.consumed(),
            vec![StepRange::new(18, 24), StepRange::new(42, 48)]
        );
    }
}
