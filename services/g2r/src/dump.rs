//! Message dump reader.
//!
//! A dump is a JSON document (optionally gzip-compressed) holding decoded
//! forecast messages:
//!
//! ```json
//! {
//!   "missing_value": -9999.0,
//!   "grids": {
//!     "n320": { "type": "regular", "ni": 9, "nj": 5, "first_lat": 52.0,
//!               "first_lon": 6.0, "d_lat": -0.5, "d_lon": 0.5 }
//!   },
//!   "messages": [
//!     { "attributes": { "shortName": "tp", "stepType": "accum",
//!                       "startStep": 0, "endStep": 6, "units": "m" },
//!       "grid": "n320",
//!       "values": [0.0, 0.1, ...] }
//!   ]
//! }
//! ```

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use grid_common::{
    AttrValue, Criteria, Grid, GridSpec, MessageCollection, MessageCollectionBuilder, StepRange,
    StepType,
};
use pipeline::{AuxGrids, PipelineError, Result, SourceReader, END_STEP, START_STEP};

const STEP_TYPE: &str = "stepType";
const UNITS: &str = "units";

#[derive(Debug, Deserialize)]
struct DumpFile {
    missing_value: f32,
    grids: HashMap<String, GridSpec>,
    messages: Vec<DumpMessage>,
}

#[derive(Debug, Deserialize)]
struct DumpMessage {
    attributes: BTreeMap<String, AttrValue>,
    grid: String,
    values: Vec<f32>,
}

impl DumpMessage {
    fn attr(&self, key: &str) -> Option<AttrValue> {
        self.attributes.get(key).cloned()
    }

    fn step(&self) -> Result<StepRange> {
        let read = |key: &str| -> Result<u32> {
            self.attributes
                .get(key)
                .and_then(AttrValue::as_f64)
                .filter(|v| *v >= 0.0 && v.fract() == 0.0)
                .map(|v| v as u32)
                .ok_or_else(|| PipelineError::reader(format!("message without a valid {}", key)))
        };
        let end = read(END_STEP)?;
        let start = match self.attributes.get(START_STEP) {
            Some(_) => read(START_STEP)?,
            None => end,
        };
        Ok(StepRange::try_new(start, end)?)
    }

    fn step_type(&self) -> Option<StepType> {
        match self.attributes.get(STEP_TYPE) {
            Some(AttrValue::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Reads decoded messages from a dump file.
pub struct DumpReader {
    missing_value: f32,
    grids: HashMap<String, Arc<Grid>>,
    messages: Vec<DumpMessage>,
    aux: Option<AuxGrids>,
}

impl DumpReader {
    /// Open a dump; files ending in `.gz` are decompressed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::reader(format!("cannot open {}: {}", path.display(), e))
        })?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let dump: DumpFile = serde_json::from_reader(reader)
            .map_err(|e| PipelineError::reader(format!("{}: {}", path.display(), e)))?;
        let dump_reader = Self::from_dump(dump)?;
        info!(
            path = %path.display(),
            messages = dump_reader.messages.len(),
            grids = dump_reader.grids.len(),
            "Opened message dump"
        );
        Ok(dump_reader)
    }

    /// Parse a dump held in memory.
    pub fn from_json(contents: &str) -> Result<Self> {
        let dump: DumpFile =
            serde_json::from_str(contents).map_err(|e| PipelineError::reader(e.to_string()))?;
        Self::from_dump(dump)
    }

    fn from_dump(dump: DumpFile) -> Result<Self> {
        let mut grids = HashMap::with_capacity(dump.grids.len());
        for (name, spec) in dump.grids {
            grids.insert(name, Arc::new(Grid::new(spec)?));
        }
        for message in &dump.messages {
            if !grids.contains_key(&message.grid) {
                return Err(PipelineError::reader(format!(
                    "message refers to unknown grid {}",
                    message.grid
                )));
            }
        }
        Ok(Self {
            missing_value: dump.missing_value,
            grids,
            messages: dump.messages,
            aux: None,
        })
    }

    fn matching(&self, criteria: &Criteria) -> Vec<&DumpMessage> {
        self.messages
            .iter()
            .filter(|m| criteria.matches(|key: &str| m.attr(key)))
            .collect()
    }

    fn grid(&self, name: &str) -> Result<Arc<Grid>> {
        self.grids
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::reader(format!("unknown grid {}", name)))
    }
}

impl SourceReader for DumpReader {
    fn step_ranges(&mut self, criteria: &Criteria) -> Result<Vec<StepRange>> {
        self.matching(criteria).iter().map(|m| m.step()).collect()
    }

    fn select(&mut self, criteria: &Criteria) -> Result<MessageCollection> {
        let mut selected = Vec::new();
        for message in self.matching(criteria) {
            selected.push((message.step()?, message));
        }
        selected.sort_by_key(|(step, _)| *step);

        // Cumulative series report step 0 as an instantaneous value, so the
        // series is described by its first message after step 0.
        let Some((_, first)) = selected
            .iter()
            .find(|(step, _)| *step != StepRange::instant(0))
            .or_else(|| selected.first())
        else {
            return Err(PipelineError::NoMessagesFound(criteria.to_string()));
        };
        let step_type = first.step_type().unwrap_or(StepType::Instant);
        let unit = match first.attr(UNITS) {
            Some(AttrValue::Text(unit)) => unit,
            _ => String::new(),
        };

        let mut builder = MessageCollectionBuilder::new(self.missing_value, unit, step_type);
        for (step, message) in &selected {
            let step_zero_quirk =
                *step == StepRange::instant(0) && step_type == StepType::Cumulative;
            if !step_zero_quirk && message.step_type().is_some_and(|t| t != step_type) {
                return Err(PipelineError::reader(format!(
                    "message {} is not {}",
                    step, step_type
                )));
            }
            builder.push(*step, self.grid(&message.grid)?, message.values.clone())?;
        }
        let collection = builder
            .build()?
            .ok_or_else(|| PipelineError::NoMessagesFound(criteria.to_string()))?;
        debug!(messages = collection.len(), "Selected from dump");

        let grids = collection.grids();
        let primary_values = collection
            .primary_values()
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| vec![self.missing_value; grids.primary().point_count()]);
        self.aux = Some(AuxGrids {
            primary: grids.primary().clone(),
            primary_values,
            secondary: grids.secondary().cloned(),
            secondary_values: collection.secondary_values().values().next().cloned(),
            missing_value: self.missing_value,
        });

        Ok(collection)
    }

    fn aux_for_table_generation(&self) -> Result<AuxGrids> {
        self.aux
            .clone()
            .ok_or_else(|| PipelineError::reader("no selection made yet"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump() -> String {
        let coarse = r#"{ "type": "regular", "ni": 3, "nj": 2, "first_lat": 50.0,
                          "first_lon": 5.0, "d_lat": -1.0, "d_lon": 1.0 }"#;
        let fine = r#"{ "type": "regular", "ni": 5, "nj": 3, "first_lat": 50.0,
                        "first_lon": 5.0, "d_lat": -0.5, "d_lon": 0.5 }"#;
        let message = |name: &str, start: u32, end: u32, grid: &str, n: usize| {
            format!(
                r#"{{ "attributes": {{ "shortName": "{}", "stepType": "accum", "startStep": {},
                      "endStep": {}, "units": "m" }}, "grid": "{}", "values": {:?} }}"#,
                name,
                start,
                end,
                grid,
                vec![end as f32; n]
            )
        };
        let messages = [
            message("tp", 0, 12, "coarse", 6),
            message("tp", 0, 6, "coarse", 6),
            message("tp", 0, 18, "fine", 15),
            message("2t", 0, 6, "coarse", 6),
        ];
        format!(
            r#"{{ "missing_value": -9999.0, "grids": {{ "coarse": {}, "fine": {} }},
                 "messages": [{}] }}"#,
            coarse,
            fine,
            messages.join(",")
        )
    }

    #[test]
    fn test_step_ranges_follow_criteria() {
        let mut reader = DumpReader::from_json(&dump()).unwrap();
        let mut steps = reader
            .step_ranges(&Criteria::new().equals("shortName", "tp"))
            .unwrap();
        steps.sort();
        assert_eq!(
            steps,
            vec![
                StepRange::new(0, 6),
                StepRange::new(0, 12),
                StepRange::new(0, 18)
            ]
        );
    }

    #[test]
    fn test_select_sorts_and_splits_resolutions() {
        let mut reader = DumpReader::from_json(&dump()).unwrap();
        let collection = reader
            .select(&Criteria::new().one_of("shortName", ["tp"]))
            .unwrap();

        assert_eq!(collection.step_type(), StepType::Cumulative);
        assert_eq!(collection.unit(), "m");
        assert_eq!(collection.primary_values().len(), 2);
        assert_eq!(collection.secondary_values().len(), 1);
        assert!(collection.grids().is_dual());

        let aux = reader.aux_for_table_generation().unwrap();
        assert_eq!(aux.primary.point_count(), 6);
        assert_eq!(aux.primary_values, vec![6.0; 6]);
        assert_eq!(aux.secondary.as_ref().map(|g| g.point_count()), Some(15));
    }

    #[test]
    fn test_cumulative_selection_keeps_step_zero_instant() {
        let grid = r#"{ "type": "regular", "ni": 2, "nj": 2, "first_lat": 50.0,
                        "first_lon": 5.0, "d_lat": -1.0, "d_lon": 1.0 }"#;
        let message = |step_type: &str, start: u32, end: u32, units: &str| {
            format!(
                r#"{{ "attributes": {{ "shortName": "tp", "stepType": "{}", "startStep": {},
                      "endStep": {}, "units": "{}" }}, "grid": "g", "values": [1.0, 1.0, 1.0, 1.0] }}"#,
                step_type, start, end, units
            )
        };
        let json = format!(
            r#"{{ "missing_value": -9999.0, "grids": {{ "g": {} }}, "messages": [{}] }}"#,
            grid,
            [
                message("instant", 0, 0, "kg m**-2"),
                message("accum", 0, 6, "m"),
                message("accum", 0, 12, "m"),
            ]
            .join(",")
        );

        let mut reader = DumpReader::from_json(&json).unwrap();
        let collection = reader
            .select(&Criteria::new().equals("shortName", "tp"))
            .unwrap();

        assert_eq!(collection.step_type(), StepType::Cumulative);
        assert_eq!(collection.unit(), "m");
        assert_eq!(
            collection.step_ranges(),
            vec![
                StepRange::instant(0),
                StepRange::new(0, 6),
                StepRange::new(0, 12)
            ]
        );
    }

    #[test]
    fn test_select_nothing() {
        let mut reader = DumpReader::from_json(&dump()).unwrap();
        let result = reader.select(&Criteria::new().equals("shortName", "sd"));
        assert!(matches!(result, Err(PipelineError::NoMessagesFound(_))));
        assert!(reader.aux_for_table_generation().is_err());
    }

    #[test]
    fn test_unknown_grid_is_rejected() {
        let json = r#"{ "missing_value": -1.0, "grids": {},
            "messages": [ { "attributes": { "endStep": 6 }, "grid": "x", "values": [] } ] }"#;
        assert!(matches!(
            DumpReader::from_json(json),
            Err(PipelineError::Reader(_))
        ));
    }
}
