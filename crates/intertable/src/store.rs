//! On-disk table store: one gzip-compressed file per cache key.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, TableError};
use crate::method::TableKey;
use crate::table::InterpolationTable;

/// Directory of persisted interpolation tables.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`'s table.
    pub fn path(&self, key: &TableKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Load a persisted table.
    ///
    /// Returns `Ok(None)` when no file exists and [`TableError::CacheLoad`]
    /// when one exists but cannot be decoded.
    pub fn load(&self, key: &TableKey) -> Result<Option<InterpolationTable>> {
        let path = self.path(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TableError::cache_load(path, e)),
        };

        let decoder = GzDecoder::new(BufReader::new(file));
        match InterpolationTable::read_from(decoder) {
            Ok(table) => {
                debug!(path = %path.display(), "Loaded interpolation table");
                Ok(Some(table))
            }
            Err(e) => Err(TableError::cache_load(path, e)),
        }
    }

    /// Persist a table, replacing any existing file atomically.
    pub fn save(&self, key: &TableKey, table: &InterpolationTable) -> Result<PathBuf> {
        let path = self.path(key);
        let tmp = NamedTempFile::new_in(&self.dir)?;

        {
            let mut encoder = GzEncoder::new(BufWriter::new(tmp.as_file()), Compression::fast());
            table.write_to(&mut encoder)?;
            encoder.finish()?.into_inner().map_err(|e| e.into_error())?;
        }

        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %path.display(), "Saved interpolation table");
        Ok(path)
    }

    /// Delete a persisted table if present.
    pub(crate) fn remove(&self, key: &TableKey) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
