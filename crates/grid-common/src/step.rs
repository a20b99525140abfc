//! Forecast step ranges and step types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::GridError;

/// A `(start, end)` pair of forecast hour offsets identifying one time slice.
///
/// Ordering compares `end` first and `start` second, so sorting a series
/// puts it in the order outputs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStepRange")]
pub struct StepRange {
    pub start: u32,
    pub end: u32,
}

/// Unchecked wire form, validated through [`StepRange::try_new`].
#[derive(Deserialize)]
struct RawStepRange {
    start: u32,
    end: u32,
}

impl TryFrom<RawStepRange> for StepRange {
    type Error = GridError;

    fn try_from(raw: RawStepRange) -> Result<Self, Self::Error> {
        Self::try_new(raw.start, raw.end)
    }
}

impl StepRange {
    /// Create a new step range.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`. Use [`StepRange::try_new`] for untrusted input.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "step range start {} after end {}", start, end);
        Self { start, end }
    }

    /// Create a step range, rejecting reversed bounds.
    pub fn try_new(start: u32, end: u32) -> Result<Self, GridError> {
        if start > end {
            return Err(GridError::InvalidStepRange(format!("{}-{}", start, end)));
        }
        Ok(Self { start, end })
    }

    /// A zero-length range at `step`, as carried by instantaneous messages.
    pub fn instant(step: u32) -> Self {
        Self {
            start: step,
            end: step,
        }
    }

    /// Length of the range in hours.
    pub fn duration(&self) -> u32 {
        self.end - self.start
    }

    /// True for zero-length ranges.
    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }
}

impl Ord for StepRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end
            .cmp(&other.end)
            .then_with(|| self.start.cmp(&other.start))
    }
}

impl PartialOrd for StepRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StepRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for StepRange {
    type Err = GridError;

    /// Parse `"start-end"` or a single `"step"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| GridError::InvalidStepRange(s.to_string()))
        };

        match s.split_once('-') {
            Some((start, end)) => Self::try_new(parse(start)?, parse(end)?),
            None => Ok(Self::instant(parse(s)?)),
        }
    }
}

/// How a field's value relates to its step range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Value valid at the end of the range.
    Instant,
    /// Running total since forecast start.
    Cumulative,
    /// Mean over the range.
    Average,
}

impl FromStr for StepType {
    type Err = GridError;

    /// Case-insensitive; accepts the usual GRIB `stepType` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instant" | "instantaneous" => Ok(Self::Instant),
            "accum" | "cumul" | "cumulative" | "accumulation" => Ok(Self::Cumulative),
            "avg" | "average" => Ok(Self::Average),
            _ => Err(GridError::UnknownStepType(s.to_string())),
        }
    }
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Cumulative => "cumulative",
            Self::Average => "average",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_range_orders_by_end() {
        let mut steps = vec![
            StepRange::new(12, 18),
            StepRange::new(0, 6),
            StepRange::new(0, 12),
            StepRange::new(6, 12),
        ];
        steps.sort();

        assert_eq!(
            steps,
            vec![
                StepRange::new(0, 6),
                StepRange::new(0, 12),
                StepRange::new(6, 12),
                StepRange::new(12, 18),
            ]
        );
    }

    #[test]
    fn test_step_range_parse() {
        assert_eq!("6-12".parse::<StepRange>().unwrap(), StepRange::new(6, 12));
        assert_eq!("24".parse::<StepRange>().unwrap(), StepRange::instant(24));
        assert!("12-6".parse::<StepRange>().is_err());
        assert!("a-b".parse::<StepRange>().is_err());
    }

    #[test]
    fn test_step_range_display() {
        assert_eq!(StepRange::new(48, 51).to_string(), "48-51");
        assert_eq!(StepRange::new(48, 51).duration(), 3);
        assert!(StepRange::instant(0).is_instant());
    }

    #[test]
    fn test_step_type_from_str() {
        assert_eq!("accum".parse::<StepType>().unwrap(), StepType::Cumulative);
        assert_eq!("AVG".parse::<StepType>().unwrap(), StepType::Average);
        assert_eq!("instant".parse::<StepType>().unwrap(), StepType::Instant);
        assert!(matches!(
            "max".parse::<StepType>(),
            Err(GridError::UnknownStepType(_))
        ));
    }

    #[test]
    fn test_step_range_deserialize_is_validated() {
        let step: StepRange = serde_json::from_str(r#"{"start": 0, "end": 6}"#).unwrap();
        assert_eq!(step, StepRange::new(0, 6));
        assert!(serde_json::from_str::<StepRange>(r#"{"start": 6, "end": 0}"#).is_err());
    }
}
