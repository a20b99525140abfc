//! Raw message collections and the primary/secondary resolution model.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::conversion::Conversion;
use crate::error::{GridError, Result};
use crate::grid::Grid;
use crate::step::{StepRange, StepType};

/// Which of the two spatial resolutions a value array belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Primary,
    Secondary,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// A source series' geometry: a primary grid, and optionally a second grid
/// the series switches to at `change_at`.
#[derive(Debug, Clone)]
pub struct MultiResolutionGrid {
    primary: Arc<Grid>,
    secondary: Option<(Arc<Grid>, StepRange)>,
}

impl MultiResolutionGrid {
    /// Single-resolution series.
    pub fn single(primary: Arc<Grid>) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    /// Series that switches to `secondary` at `change_at`.
    ///
    /// The secondary grid must have a different point count than the primary.
    pub fn dual(primary: Arc<Grid>, secondary: Arc<Grid>, change_at: StepRange) -> Result<Self> {
        if primary.point_count() == secondary.point_count() {
            return Err(GridError::mismatch(format!(
                "secondary resolution has the same point count ({}) as the primary",
                primary.point_count()
            )));
        }
        Ok(Self {
            primary,
            secondary: Some((secondary, change_at)),
        })
    }

    pub fn primary(&self) -> &Arc<Grid> {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&Arc<Grid>> {
        self.secondary.as_ref().map(|(grid, _)| grid)
    }

    /// First step range reported at the secondary resolution.
    pub fn change_at(&self) -> Option<StepRange> {
        self.secondary.as_ref().map(|(_, step)| *step)
    }

    pub fn is_dual(&self) -> bool {
        self.secondary.is_some()
    }

    /// Grid used for a given resolution. Falls back to the primary grid
    /// when the series has a single resolution.
    pub fn grid(&self, resolution: Resolution) -> &Arc<Grid> {
        match (resolution, &self.secondary) {
            (Resolution::Secondary, Some((grid, _))) => grid,
            _ => &self.primary,
        }
    }
}

/// State of resolution detection while messages are collected.
///
/// The only transition is `SinglePrimary → DualResolution`, taken on the
/// first message whose point count differs from the primary grid.
#[derive(Debug, Clone)]
pub enum ResolutionState {
    SinglePrimary {
        primary: Arc<Grid>,
    },
    DualResolution {
        primary: Arc<Grid>,
        secondary: Arc<Grid>,
        boundary: StepRange,
    },
}

impl ResolutionState {
    /// Classify a message grid, transitioning if it is the first message at a
    /// second resolution.
    fn classify(&mut self, step: StepRange, grid: &Arc<Grid>) -> Result<Resolution> {
        match self {
            Self::SinglePrimary { primary } => {
                if grid.id() == primary.id() {
                    return Ok(Resolution::Primary);
                }
                if grid.point_count() == primary.point_count() {
                    return Err(GridError::mismatch(format!(
                        "message {} has grid {} with the primary point count {} but different geometry",
                        step,
                        grid.id(),
                        primary.point_count()
                    )));
                }
                info!(
                    step = %step,
                    primary_points = primary.point_count(),
                    secondary_points = grid.point_count(),
                    "Found second spatial resolution"
                );
                let primary = primary.clone();
                *self = Self::DualResolution {
                    primary,
                    secondary: grid.clone(),
                    boundary: step,
                };
                Ok(Resolution::Secondary)
            }
            Self::DualResolution {
                primary,
                secondary,
                boundary,
            } => {
                if grid.id() == primary.id() {
                    Ok(Resolution::Primary)
                } else if grid.id() == secondary.id() {
                    if step < *boundary {
                        *boundary = step;
                    }
                    Ok(Resolution::Secondary)
                } else {
                    Err(GridError::mismatch(format!(
                        "message {} has a third grid geometry {}",
                        step,
                        grid.id()
                    )))
                }
            }
        }
    }
}

/// Collects raw messages, routing each to the primary or secondary mapping.
#[derive(Debug)]
pub struct MessageCollectionBuilder {
    state: Option<ResolutionState>,
    primary: BTreeMap<StepRange, Vec<f32>>,
    secondary: BTreeMap<StepRange, Vec<f32>>,
    missing_value: f32,
    unit: String,
    step_type: StepType,
}

impl MessageCollectionBuilder {
    pub fn new(missing_value: f32, unit: impl Into<String>, step_type: StepType) -> Self {
        Self {
            state: None,
            primary: BTreeMap::new(),
            secondary: BTreeMap::new(),
            missing_value,
            unit: unit.into(),
            step_type,
        }
    }

    /// Add one message.
    pub fn push(&mut self, step: StepRange, grid: Arc<Grid>, values: Vec<f32>) -> Result<()> {
        if values.len() != grid.point_count() {
            return Err(GridError::mismatch(format!(
                "message {} has {} values for a grid of {} points",
                step,
                values.len(),
                grid.point_count()
            )));
        }
        if self.primary.contains_key(&step) || self.secondary.contains_key(&step) {
            return Err(GridError::DuplicateStep(step));
        }

        let resolution = if let Some(state) = self.state.as_mut() {
            state.classify(step, &grid)?
        } else {
            self.state = Some(ResolutionState::SinglePrimary { primary: grid });
            Resolution::Primary
        };

        match resolution {
            Resolution::Primary => self.primary.insert(step, values),
            Resolution::Secondary => self.secondary.insert(step, values),
        };
        Ok(())
    }

    /// Number of messages collected so far.
    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finish collection.
    ///
    /// Returns `Ok(None)` when no message was pushed.
    pub fn build(self) -> Result<Option<MessageCollection>> {
        let grids = match self.state {
            None => return Ok(None),
            Some(ResolutionState::SinglePrimary { primary }) => MultiResolutionGrid::single(primary),
            Some(ResolutionState::DualResolution {
                primary,
                secondary,
                boundary,
            }) => {
                if let Some((last, _)) = self.primary.last_key_value() {
                    if last.end > boundary.end {
                        return Err(GridError::mismatch(format!(
                            "primary-resolution message {} after resolution change at {}",
                            last, boundary
                        )));
                    }
                }
                MultiResolutionGrid::dual(primary, secondary, boundary)?
            }
        };

        debug!(
            primary = self.primary.len(),
            secondary = self.secondary.len(),
            "Collected messages"
        );

        Ok(Some(MessageCollection {
            primary: self.primary,
            secondary: self.secondary,
            grids,
            missing_value: self.missing_value,
            unit: self.unit,
            step_type: self.step_type,
        }))
    }
}

/// Raw values of one selected parameter, keyed by step range and split by
/// spatial resolution.
#[derive(Debug, Clone)]
pub struct MessageCollection {
    primary: BTreeMap<StepRange, Vec<f32>>,
    secondary: BTreeMap<StepRange, Vec<f32>>,
    grids: MultiResolutionGrid,
    missing_value: f32,
    unit: String,
    step_type: StepType,
}

impl MessageCollection {
    pub fn grids(&self) -> &MultiResolutionGrid {
        &self.grids
    }

    pub fn missing_value(&self) -> f32 {
        self.missing_value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn step_type(&self) -> StepType {
        self.step_type
    }

    pub fn primary_values(&self) -> &BTreeMap<StepRange, Vec<f32>> {
        &self.primary
    }

    pub fn secondary_values(&self) -> &BTreeMap<StepRange, Vec<f32>> {
        &self.secondary
    }

    /// Every step range in the collection, in ascending order.
    pub fn step_ranges(&self) -> Vec<StepRange> {
        let mut steps: Vec<StepRange> = self
            .primary
            .keys()
            .chain(self.secondary.keys())
            .copied()
            .collect();
        steps.sort();
        steps
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a unit conversion to every value array in place.
    pub fn convert_values(&mut self, conversion: &Conversion) {
        if conversion.is_identity() {
            return;
        }
        let mv = self.missing_value;
        for values in self.primary.values_mut().chain(self.secondary.values_mut()) {
            conversion.apply(values, mv);
        }
    }

    /// Take ownership of the value mappings, dropping the collection.
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<StepRange, Vec<f32>>,
        BTreeMap<StepRange, Vec<f32>>,
        MultiResolutionGrid,
    ) {
        (self.primary, self.secondary, self.grids)
    }
}
