//! Source reader boundary.

use std::sync::Arc;

use grid_common::{Criteria, Grid, MessageCollection, StepRange};

use crate::error::Result;

/// Grids and sample values a reader exposes for building interpolation
/// tables, taken from the first selected message of each resolution.
#[derive(Debug, Clone)]
pub struct AuxGrids {
    pub primary: Arc<Grid>,
    pub primary_values: Vec<f32>,
    pub secondary: Option<Arc<Grid>>,
    pub secondary_values: Option<Vec<f32>>,
    pub missing_value: f32,
}

/// A source of raw forecast messages.
pub trait SourceReader {
    /// Step ranges of the messages matching `criteria`, without reading values.
    fn step_ranges(&mut self, criteria: &Criteria) -> Result<Vec<StepRange>>;

    /// Read every message matching `criteria`.
    ///
    /// Implementations return [`PipelineError::NoMessagesFound`] when nothing
    /// matches.
    ///
    /// [`PipelineError::NoMessagesFound`]: crate::PipelineError::NoMessagesFound
    fn select(&mut self, criteria: &Criteria) -> Result<MessageCollection>;

    /// Grids of the last selection, for table generation.
    fn aux_for_table_generation(&self) -> Result<AuxGrids>;
}

/// Attribute holding a message's start step.
pub const START_STEP: &str = "startStep";
/// Attribute holding a message's end step.
pub const END_STEP: &str = "endStep";

/// Restrict `criteria` to messages ending within `[first, last]`.
pub fn with_step_window(criteria: &Criteria, first: u32, last: u32) -> Criteria {
    let (first, last) = (first as f64, last as f64);
    criteria.clone().predicate(END_STEP, move |v| {
        v.as_f64().map(|e| e >= first && e <= last).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_common::AttrValue;

    #[test]
    fn test_step_window_predicate() {
        let criteria = with_step_window(&Criteria::new().equals("shortName", "tp"), 6, 24);
        let lookup = |end: i64| {
            move |key: &str| match key {
                "shortName" => Some(AttrValue::from("tp")),
                END_STEP => Some(AttrValue::from(end)),
                _ => None,
            }
        };
        assert!(criteria.matches(lookup(6)));
        assert!(criteria.matches(lookup(24)));
        assert!(!criteria.matches(lookup(0)));
        assert!(!criteria.matches(lookup(30)));
    }
}
