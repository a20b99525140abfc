//! Run configuration.
//!
//! Loaded from YAML, then overridden by `G2R_*` environment variables.
//!
//! ```yaml
//! aggregation:
//!   step: 24
//!   type: cumulative
//!   force_zero_array: false
//! interpolation:
//!   method: idw
//!   neighbours: 4
//!   power: 2.0
//!   max_radius: 50000.0
//!   table_dir: /var/cache/g2r/intertables
//!   target:
//!     rows: 950
//!     cols: 1000
//!     north: 72.0
//!     west: -25.0
//!     d_lat: 0.05
//!     d_lon: 0.05
//! output:
//!   dir: ./out
//!   prefix: pr
//! time:
//!   tstart: 0
//!   tend: 240
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use grid_common::{Conversion, StepType};
use intertable::{InterpolationMethod, TargetRaster};

use crate::error::{PipelineError, Result};

/// Complete configuration of one conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Temporal aggregation; raw steps are passed through when absent.
    pub aggregation: Option<AggregationConfig>,
    pub interpolation: InterpolationConfig,
    pub output: OutputConfig,
    pub time: TimeConfig,
    pub conversion: Conversion,
}

/// Temporal aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Output window length in hours.
    pub step: u32,
    #[serde(rename = "type")]
    pub agg_type: StepType,
    #[serde(default)]
    pub force_zero_array: bool,
    /// Express cumulative windows per this many hours.
    #[serde(default)]
    pub unit_time: Option<u32>,
}

/// Spatial interpolation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationConfig {
    #[serde(flatten)]
    pub method: InterpolationMethod,
    /// Persisted tables live here; tables are kept in memory only when unset.
    #[serde(default)]
    pub table_dir: Option<PathBuf>,
    pub target: TargetConfig,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            method: InterpolationMethod::InverseDistance {
                neighbours: 4,
                power: 2.0,
                max_radius: 50_000.0,
            },
            table_dir: None,
            target: TargetConfig::default(),
        }
    }
}

/// Regular lat/lon target raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Name used in table keys instead of the geometry-derived id.
    #[serde(default)]
    pub id: Option<String>,
    pub rows: usize,
    pub cols: usize,
    /// Latitude of the northern edge.
    pub north: f64,
    /// Longitude of the western edge.
    pub west: f64,
    pub d_lat: f64,
    pub d_lon: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        // 5 km European raster
        Self {
            id: None,
            rows: 950,
            cols: 1000,
            north: 72.0,
            west: -25.0,
            d_lat: 0.05,
            d_lon: 0.05,
        }
    }
}

impl TargetConfig {
    pub fn to_raster(&self) -> Result<TargetRaster> {
        let raster = TargetRaster::regular(
            self.rows,
            self.cols,
            self.north,
            self.west,
            self.d_lat,
            self.d_lon,
        )?;
        Ok(match &self.id {
            Some(id) => raster.with_id(id.clone()),
            None => raster,
        })
    }
}

/// Output map settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Map name prefix, at most 8 characters.
    pub prefix: String,
    /// Number of the first map.
    pub first_map: u32,
    /// Increment between map numbers.
    pub map_step: u32,
    /// Sentinel for cells without a value.
    pub missing_value: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./out"),
            prefix: "map".to_string(),
            first_map: 1,
            map_step: 1,
            missing_value: -9999.0,
        }
    }
}

/// Requested time window in forecast hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub tstart: Option<u32>,
    pub tend: Option<u32>,
}

impl RunConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| PipelineError::config(e.to_string()))
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override fields from `G2R_*` environment variables.
    pub fn with_env(mut self) -> Self {
        if let Ok(val) = std::env::var("G2R_AGG_STEP") {
            if let Ok(step) = val.parse() {
                match self.aggregation.as_mut() {
                    Some(agg) => agg.step = step,
                    None => {
                        self.aggregation = Some(AggregationConfig {
                            step,
                            agg_type: StepType::Cumulative,
                            force_zero_array: false,
                            unit_time: None,
                        })
                    }
                }
            }
        }

        if let Ok(val) = std::env::var("G2R_AGG_TYPE") {
            if let (Some(agg), Ok(agg_type)) = (self.aggregation.as_mut(), val.parse::<StepType>()) {
                agg.agg_type = agg_type;
            }
        }

        if let Ok(val) = std::env::var("G2R_FORCE_ZERO_ARRAY") {
            if let Some(agg) = self.aggregation.as_mut() {
                agg.force_zero_array = val.to_lowercase() == "true" || val == "1";
            }
        }

        if let Ok(val) = std::env::var("G2R_MAX_RADIUS") {
            if let Ok(radius) = val.parse() {
                match &mut self.interpolation.method {
                    InterpolationMethod::Nearest { max_radius }
                    | InterpolationMethod::InverseDistance { max_radius, .. } => {
                        *max_radius = radius
                    }
                }
            }
        }

        if let Ok(val) = std::env::var("G2R_INTERPOLATION") {
            let max_radius = self.interpolation.method.max_radius();
            match val.to_lowercase().as_str() {
                "nearest" => {
                    self.interpolation.method = InterpolationMethod::Nearest { max_radius }
                }
                "idw" | "invdist" => {
                    if let InterpolationMethod::Nearest { .. } = self.interpolation.method {
                        self.interpolation.method = InterpolationMethod::InverseDistance {
                            neighbours: 4,
                            power: 2.0,
                            max_radius,
                        };
                    }
                }
                _ => {}
            }
        }

        if let Ok(val) = std::env::var("G2R_TABLE_DIR") {
            self.interpolation.table_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("G2R_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("G2R_OUTPUT_PREFIX") {
            self.output.prefix = val;
        }

        if let Ok(val) = std::env::var("G2R_TSTART") {
            if let Ok(step) = val.parse() {
                self.time.tstart = Some(step);
            }
        }

        if let Ok(val) = std::env::var("G2R_TEND") {
            if let Ok(step) = val.parse() {
                self.time.tend = Some(step);
            }
        }

        self
    }

    /// Range and membership checks.
    pub fn validate(&self) -> Result<()> {
        if let Some(agg) = &self.aggregation {
            if agg.step == 0 {
                return Err(PipelineError::AggregationConfigError(
                    aggregation::AggregationError::config("aggregation step must be > 0"),
                ));
            }
            if agg.unit_time == Some(0) {
                return Err(PipelineError::config("unit_time must be > 0"));
            }
        }

        if let (Some(start), Some(end)) = (self.time.tstart, self.time.tend) {
            if start >= end {
                return Err(PipelineError::config(format!(
                    "tstart {} must be before tend {}",
                    start, end
                )));
            }
        }

        self.interpolation.method.validate()?;

        let target = &self.interpolation.target;
        if target.rows == 0 || target.cols == 0 {
            return Err(PipelineError::config("target raster must have cells"));
        }
        if target.d_lat <= 0.0 || target.d_lon <= 0.0 {
            return Err(PipelineError::config("target cell size must be > 0"));
        }

        if self.output.prefix.is_empty() || self.output.prefix.len() > 8 {
            return Err(PipelineError::config(
                "output prefix must be 1-8 characters",
            ));
        }
        if self.output.map_step == 0 {
            return Err(PipelineError::config("output map_step must be > 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
aggregation:
  step: 24
  type: cumulative
  force_zero_array: true
interpolation:
  method: nearest
  max_radius: 30000.0
  target:
    id: efas
    rows: 2
    cols: 3
    north: 50.0
    west: 10.0
    d_lat: 0.5
    d_lon: 0.5
output:
  prefix: pr
time:
  tend: 240
conversion:
  scale: 1000.0
  cutoff_negative: true
"#;

    #[test]
    fn test_parse_yaml() {
        let config = RunConfig::from_yaml_str(SAMPLE).unwrap();
        let agg = config.aggregation.as_ref().unwrap();
        assert_eq!(agg.step, 24);
        assert_eq!(agg.agg_type, StepType::Cumulative);
        assert!(agg.force_zero_array);
        assert_eq!(
            config.interpolation.method,
            InterpolationMethod::Nearest {
                max_radius: 30_000.0
            }
        );
        assert_eq!(config.output.prefix, "pr");
        assert_eq!(config.output.first_map, 1);
        assert_eq!(config.time.tend, Some(240));
        assert_eq!(config.time.tstart, None);
        assert_eq!(config.conversion.scale, 1000.0);
        assert!(config.conversion.cutoff_negative);
        assert!(config.validate().is_ok());

        let raster = config.interpolation.target.to_raster().unwrap();
        assert_eq!(intertable::TargetGrid::id(&raster), "efas");
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.aggregation.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RunConfig::default();
        config.time = TimeConfig {
            tstart: Some(24),
            tend: Some(24),
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = RunConfig::default();
        config.aggregation = Some(AggregationConfig {
            step: 0,
            agg_type: StepType::Average,
            force_zero_array: false,
            unit_time: None,
        });
        assert!(matches!(
            config.validate(),
            Err(PipelineError::AggregationConfigError(_))
        ));

        let mut config = RunConfig::default();
        config.output.prefix = "much_too_long".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        assert!(matches!(
            RunConfig::from_yaml_str("aggregation: [1, 2"),
            Err(PipelineError::Config(_))
        ));
    }
}
