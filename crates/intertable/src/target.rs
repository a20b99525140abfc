//! Target rasters that tables interpolate onto.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use grid_common::{Coordinates, Grid};

use crate::error::{Result, TableError};

/// Something a table can be built for: a fixed set of cells with
/// coordinates and a stable identifier.
pub trait TargetGrid: Send + Sync {
    /// Stable identifier, part of the table cache key.
    fn id(&self) -> &str;

    /// Number of output cells.
    fn cell_count(&self) -> usize;

    /// Cell centre coordinates in output order.
    fn coordinates(&self) -> Arc<Coordinates>;
}

/// Row-major lat/lon raster.
#[derive(Debug, Clone)]
pub struct TargetRaster {
    id: String,
    rows: usize,
    cols: usize,
    coords: Arc<Coordinates>,
}

impl TargetRaster {
    /// Regular raster with its north-west corner at `(north, west)` and
    /// cells of `d_lat` x `d_lon` degrees. Coordinates are cell centres.
    pub fn regular(
        rows: usize,
        cols: usize,
        north: f64,
        west: f64,
        d_lat: f64,
        d_lon: f64,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(TableError::InvalidTarget(format!(
                "raster with {}x{} cells",
                rows, cols
            )));
        }
        if !(d_lat.is_finite() && d_lon.is_finite() && d_lat > 0.0 && d_lon > 0.0) {
            return Err(TableError::InvalidTarget(format!(
                "cell size {}x{} must be positive",
                d_lat, d_lon
            )));
        }

        let mut lats = Vec::with_capacity(rows * cols);
        let mut lons = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let lat = north - (row as f64 + 0.5) * d_lat;
            for col in 0..cols {
                lats.push(lat);
                lons.push(west + (col as f64 + 0.5) * d_lon);
            }
        }

        let id = format!(
            "ll{}x{}-{}",
            rows,
            cols,
            short_hash(&[north, west, d_lat, d_lon])
        );

        Ok(Self {
            id,
            rows,
            cols,
            coords: Arc::new(Coordinates { lats, lons }),
        })
    }

    /// Raster from explicit per-cell latitude and longitude maps,
    /// e.g. cell centres of a projected grid.
    pub fn from_maps(rows: usize, cols: usize, lats: Vec<f64>, lons: Vec<f64>) -> Result<Self> {
        if rows * cols == 0 || lats.len() != rows * cols || lons.len() != rows * cols {
            return Err(TableError::InvalidTarget(format!(
                "{}x{} raster with {} latitudes and {} longitudes",
                rows,
                cols,
                lats.len(),
                lons.len()
            )));
        }

        let id = format!("map{}x{}-{}", rows, cols, short_hash_maps(&lats, &lons));
        Ok(Self {
            id,
            rows,
            cols,
            coords: Arc::new(Coordinates { lats, lons }),
        })
    }

    /// Replace the derived identifier, e.g. with a configured raster name.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

impl TargetGrid for TargetRaster {
    fn id(&self) -> &str {
        &self.id
    }

    fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    fn coordinates(&self) -> Arc<Coordinates> {
        self.coords.clone()
    }
}

/// Another source grid as target, e.g. to carry a field across a change of
/// resolution.
impl TargetGrid for Grid {
    fn id(&self) -> &str {
        Grid::id(self).as_str()
    }

    fn cell_count(&self) -> usize {
        self.point_count()
    }

    fn coordinates(&self) -> Arc<Coordinates> {
        Grid::coordinates(self)
    }
}

fn short_hash(values: &[f64]) -> String {
    let mut hasher = Sha256::new();
    for v in values {
        hasher.update(((v * 1e6).round() as i64).to_le_bytes());
    }
    hex8(&hasher.finalize())
}

fn short_hash_maps(lats: &[f64], lons: &[f64]) -> String {
    let mut hasher = Sha256::new();
    for v in lats.iter().chain(lons) {
        hasher.update(((v * 1e6).round() as i64).to_le_bytes());
    }
    hex8(&hasher.finalize())
}

fn hex8(digest: &[u8]) -> String {
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_cell_centres() {
        let raster = TargetRaster::regular(2, 3, 50.0, 10.0, 1.0, 0.5).unwrap();
        assert_eq!(raster.cell_count(), 6);

        let coords = raster.coordinates();
        assert!((coords.lats[0] - 49.5).abs() < 1e-9);
        assert!((coords.lons[0] - 10.25).abs() < 1e-9);
        assert!((coords.lats[5] - 48.5).abs() < 1e-9);
        assert!((coords.lons[5] - 11.25).abs() < 1e-9);
    }

    #[test]
    fn test_id_depends_on_geometry_only() {
        let a = TargetRaster::regular(2, 3, 50.0, 10.0, 1.0, 0.5).unwrap();
        let b = TargetRaster::regular(2, 3, 50.0, 10.0, 1.0, 0.5).unwrap();
        let c = TargetRaster::regular(2, 3, 51.0, 10.0, 1.0, 0.5).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.with_id("efas").id(), "efas");
    }

    #[test]
    fn test_from_maps_checks_lengths() {
        assert!(TargetRaster::from_maps(1, 2, vec![1.0, 2.0], vec![3.0]).is_err());
        let raster = TargetRaster::from_maps(1, 2, vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
        assert!(raster.id().starts_with("map1x2-"));
    }

    #[test]
    fn test_rejects_empty_raster() {
        assert!(TargetRaster::regular(0, 3, 50.0, 10.0, 1.0, 1.0).is_err());
        assert!(TargetRaster::regular(1, 3, 50.0, 10.0, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_source_grid_as_target() {
        let grid = Grid::regular(3, 2, 50.0, 5.0, -1.0, 1.0).unwrap();
        let target: &dyn TargetGrid = &grid;
        assert_eq!(target.cell_count(), 6);
        assert_eq!(target.id(), grid.id().as_str());
        assert_eq!(target.coordinates().lats.len(), 6);
    }
}
