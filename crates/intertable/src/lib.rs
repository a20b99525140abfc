//! Interpolation tables from source grids to a target raster.
//!
//! An [`InterpolationTable`] maps every target cell to a small set of
//! weighted source-grid indices (or marks it as not covered). Tables are
//! expensive to build and cheap to apply, so they are persisted and shared
//! through an [`InterpolationTableCache`].
//!
//! # Architecture
//!
//! ```text
//! InterpolationTableCache::build_or_load(source, target, method)
//!      │
//!      ├─► TableKey = (GridId, target id, method, params)
//!      │
//!      ├─► per-key slot already filled ──► return shared table
//!      │
//!      ├─► TableStore::load(key) ──► hit: return persisted table
//!      │         │
//!      │         └─► unreadable file: warn, treat as miss
//!      │
//!      └─► build_table()
//!               │
//!               ├─► SourceIndex (R*-tree over Earth-centred xyz)
//!               ├─► nearest / inverse-distance query per target cell
//!               └─► TableStore::save(key, table)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use intertable::{InterpolationMethod, InterpolationTableCache, TargetRaster};
//!
//! let cache = InterpolationTableCache::new("/var/cache/g2r/intertables")?;
//! let target = TargetRaster::regular(950, 1000, 72.0, -25.0, 0.05, 0.05)?;
//! let method = InterpolationMethod::InverseDistance { neighbours: 4, power: 2.0, max_radius: 50_000.0 };
//!
//! let loaded = cache.build_or_load(&source_grid, &target, &method)?;
//! let output = loaded.table.apply(&values, -9999.0, -9999.0)?;
//! ```

pub mod builder;
pub mod cache;
pub mod error;
pub mod method;
pub mod spatial;
pub mod store;
pub mod table;
pub mod target;

pub use builder::build_table;
pub use cache::{InterpolationTableCache, LoadedTable, TableCacheStats, TableOrigin};
pub use error::{Result, TableError};
pub use method::{InterpolationMethod, TableKey};
pub use spatial::{SourceIndex, EARTH_RADIUS_M};
pub use store::TableStore;
pub use table::InterpolationTable;
pub use target::{TargetGrid, TargetRaster};
