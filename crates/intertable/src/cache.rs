//! Build-once cache of interpolation tables.
//!
//! Each [`TableKey`] owns a slot guarded by its own mutex. The first caller
//! for a key loads or builds the table while holding the slot lock; callers
//! racing on the same key wait and then share the result. Different keys
//! never block each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use grid_common::Grid;

use crate::builder::build_table;
use crate::error::{Result, TableError};
use crate::method::{InterpolationMethod, TableKey};
use crate::store::TableStore;
use crate::table::InterpolationTable;
use crate::target::TargetGrid;

type Slot = Arc<Mutex<Option<Arc<InterpolationTable>>>>;

/// Where a returned table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    /// Already held by this cache.
    Memory,
    /// Read from the table store.
    Disk,
    /// Built by this call.
    Built,
}

/// A table handed out by the cache.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Arc<InterpolationTable>,
    pub key: TableKey,
    pub origin: TableOrigin,
}

impl LoadedTable {
    /// Whether this call loaded or built the table rather than reusing it.
    pub fn is_new(&self) -> bool {
        self.origin != TableOrigin::Memory
    }
}

/// Counters of cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub load_failures: u64,
}

impl TableCacheStats {
    /// Fraction of lookups served without building (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache of interpolation tables keyed by `(GridId, target id, method, params)`.
pub struct InterpolationTableCache {
    store: Option<TableStore>,
    slots: Mutex<HashMap<TableKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    load_failures: AtomicU64,
}

impl InterpolationTableCache {
    /// Cache persisting tables under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_store(Some(TableStore::open(dir)?)))
    }

    /// Cache that keeps tables in memory only.
    pub fn in_memory() -> Self {
        Self::with_store(None)
    }

    fn with_store(store: Option<TableStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> Option<&TableStore> {
        self.store.as_ref()
    }

    /// Return the table for `source` onto `target`, loading or building it
    /// at most once per key.
    pub fn build_or_load(
        &self,
        source: &Grid,
        target: &dyn TargetGrid,
        method: &InterpolationMethod,
    ) -> Result<LoadedTable> {
        method.validate()?;
        let key = TableKey::new(source.id().clone(), target.id(), *method);

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key.clone()).or_default().clone()
        };

        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(table) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(LoadedTable {
                table: table.clone(),
                key,
                origin: TableOrigin::Memory,
            });
        }

        if let Some(table) = self.load_persisted(&key, source, target) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let table = Arc::new(table);
            *guard = Some(table.clone());
            return Ok(LoadedTable {
                table,
                key,
                origin: TableOrigin::Disk,
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let table = build_table(source, target, method)?;
        self.builds.fetch_add(1, Ordering::Relaxed);

        if let Some(store) = &self.store {
            // A table that cannot be written is still usable for this run.
            if let Err(e) = store.save(&key, &table) {
                warn!(key = %key, error = %e, "Failed to persist interpolation table");
            }
        }

        let table = Arc::new(table);
        *guard = Some(table.clone());
        Ok(LoadedTable {
            table,
            key,
            origin: TableOrigin::Built,
        })
    }

    /// Read a persisted table, treating unreadable or mismatched files as a miss.
    fn load_persisted(
        &self,
        key: &TableKey,
        source: &Grid,
        target: &dyn TargetGrid,
    ) -> Option<InterpolationTable> {
        let store = self.store.as_ref()?;
        let failure = match store.load(key) {
            Ok(None) => return None,
            Ok(Some(table)) => {
                if table.source_points() == source.point_count()
                    && table.cell_count() == target.cell_count()
                    && *table.method() == key.method
                {
                    debug!(key = %key, "Interpolation table loaded from store");
                    return Some(table);
                }
                TableError::cache_load(
                    store.path(key),
                    format!(
                        "table shape {}->{} does not match {}->{}",
                        table.source_points(),
                        table.cell_count(),
                        source.point_count(),
                        target.cell_count()
                    ),
                )
            }
            Err(e) => e,
        };

        self.load_failures.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, error = %failure, "Discarding unreadable interpolation table, rebuilding");
        if let Err(e) = store.remove(key) {
            warn!(key = %key, error = %e, "Failed to delete unreadable interpolation table");
        }
        None
    }

    /// Number of tables currently held in memory.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .filter(|slot| slot.lock().map(|s| s.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TableCacheStats {
        TableCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetRaster;

    fn source() -> Grid {
        Grid::regular(5, 5, 52.0, 8.0, -0.5, 0.5).unwrap()
    }

    fn target() -> TargetRaster {
        TargetRaster::regular(4, 4, 52.0, 8.0, 0.5, 0.5).unwrap()
    }

    fn nearest() -> InterpolationMethod {
        InterpolationMethod::Nearest {
            max_radius: 60_000.0,
        }
    }

    #[test]
    fn test_memory_hit_after_build() {
        let cache = InterpolationTableCache::in_memory();
        let first = cache.build_or_load(&source(), &target(), &nearest()).unwrap();
        let second = cache.build_or_load(&source(), &target(), &nearest()).unwrap();

        assert_eq!(first.origin, TableOrigin::Built);
        assert_eq!(second.origin, TableOrigin::Memory);
        assert!(!second.is_new());
        assert!(Arc::ptr_eq(&first.table, &second.table));

        let stats = cache.stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalid_params_rejected_before_lookup() {
        let cache = InterpolationTableCache::in_memory();
        let bad = InterpolationMethod::Nearest { max_radius: -1.0 };
        assert!(matches!(
            cache.build_or_load(&source(), &target(), &bad),
            Err(TableError::InvalidParams(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let stats = TableCacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
        assert_eq!(TableCacheStats::default().hit_rate(), 0.0);
    }
}
