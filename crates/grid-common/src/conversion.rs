//! Linear unit conversion of raw field values.

use serde::{Deserialize, Serialize};

use crate::is_missing;

/// `value * scale + offset`, applied to non-missing values only.
///
/// `cutoff_negative` is applied separately (after aggregation) through
/// [`Conversion::cut_off_negative`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversion {
    pub scale: f64,
    pub offset: f64,
    pub cutoff_negative: bool,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            cutoff_negative: false,
        }
    }
}

impl Conversion {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self {
            scale,
            offset,
            cutoff_negative: false,
        }
    }

    /// Whether [`Conversion::apply`] leaves values unchanged.
    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }

    pub fn apply(&self, values: &mut [f32], missing_value: f32) {
        for v in values.iter_mut() {
            if !is_missing(*v, missing_value) {
                *v = (*v as f64 * self.scale + self.offset) as f32;
            }
        }
    }

    /// Set negative non-missing values to zero, if enabled.
    pub fn cut_off_negative(&self, values: &mut [f32], missing_value: f32) {
        if !self.cutoff_negative {
            return;
        }
        for v in values.iter_mut() {
            if !is_missing(*v, missing_value) && *v < 0.0 {
                *v = 0.0;
            }
        }
    }
}
