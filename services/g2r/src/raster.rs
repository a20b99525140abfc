//! Raw raster map writer.
//!
//! Each map is a headerless little-endian `f32` array in row-major order,
//! named with the 8.3 map naming scheme (`pr000000.024`).

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use grid_common::StepRange;
use pipeline::{map_name, map_number, OutputConfig, OutputWriter, PipelineError, Result};

pub struct RasterWriter {
    dir: PathBuf,
    prefix: String,
    first_map: u32,
    map_step: u32,
    written: Vec<PathBuf>,
}

impl RasterWriter {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir.clone(),
            prefix: config.prefix.clone(),
            first_map: config.first_map,
            map_step: config.map_step,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the maps written so far, in write order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl OutputWriter for RasterWriter {
    fn write(
        &mut self,
        output_index: usize,
        step: StepRange,
        values: &[f32],
        _missing_value: f32,
    ) -> Result<()> {
        let name = map_name(
            &self.prefix,
            map_number(self.first_map, self.map_step, output_index),
        );
        let path = self.dir.join(&name);

        let tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file());
            for v in values {
                out.write_all(&v.to_le_bytes())?;
            }
            out.flush()?;
        }
        tmp.persist(&path)
            .map_err(|e| PipelineError::writer(format!("{}: {}", path.display(), e)))?;

        debug!(map = %name, step = %step, "Wrote map");
        self.written.push(path);
        Ok(())
    }
}
