//! Source grid geometry and grid identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{GridError, Result};

/// Geometry of a source grid, as described by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridSpec {
    /// Regular lat/lon grid. Values are row-major, `nj` rows of `ni` points.
    Regular {
        /// Points along a parallel
        ni: usize,
        /// Points along a meridian
        nj: usize,
        first_lat: f64,
        first_lon: f64,
        /// Signed latitude increment (negative when rows go north to south)
        d_lat: f64,
        d_lon: f64,
    },
    /// Explicit coordinates per point (reduced or projected grids).
    Irregular {
        /// Points along a meridian
        nj: usize,
        lats: Vec<f64>,
        lons: Vec<f64>,
    },
}

/// Materialised per-point coordinates of a grid, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
}

impl Coordinates {
    pub fn len(&self) -> usize {
        self.lats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }

    /// Iterate `(lat, lon)` pairs in value order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.lats.iter().copied().zip(self.lons.iter().copied())
    }
}

/// Stable identifier of a grid's geometry.
///
/// Identical geometry always yields the identical id, across runs and
/// processes; field values never take part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridId(String);

impl GridId {
    /// Wrap an already computed identifier.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A source grid: validated geometry, its identity, and lazily built coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GridSpec", into = "GridSpec")]
pub struct Grid {
    spec: GridSpec,
    id: GridId,
    coords: OnceLock<Arc<Coordinates>>,
}

impl Grid {
    /// Validate a grid description and compute its identity.
    pub fn new(spec: GridSpec) -> Result<Self> {
        match &spec {
            GridSpec::Regular {
                ni,
                nj,
                d_lat,
                d_lon,
                ..
            } => {
                if *ni == 0 || *nj == 0 {
                    return Err(GridError::invalid_grid(format!(
                        "regular grid with {}x{} points",
                        ni, nj
                    )));
                }
                if !d_lat.is_finite() || !d_lon.is_finite() {
                    return Err(GridError::invalid_grid("non-finite grid increment"));
                }
            }
            GridSpec::Irregular { nj, lats, lons } => {
                if lats.is_empty() || lats.len() != lons.len() {
                    return Err(GridError::invalid_grid(format!(
                        "irregular grid with {} latitudes and {} longitudes",
                        lats.len(),
                        lons.len()
                    )));
                }
                if *nj == 0 || *nj > lats.len() {
                    return Err(GridError::invalid_grid(format!(
                        "irregular grid with {} points along meridian for {} points",
                        nj,
                        lats.len()
                    )));
                }
            }
        }

        let id = identity(&spec);
        Ok(Self {
            spec,
            id,
            coords: OnceLock::new(),
        })
    }

    /// Convenience constructor for a regular lat/lon grid.
    pub fn regular(
        ni: usize,
        nj: usize,
        first_lat: f64,
        first_lon: f64,
        d_lat: f64,
        d_lon: f64,
    ) -> Result<Self> {
        Self::new(GridSpec::Regular {
            ni,
            nj,
            first_lat,
            first_lon,
            d_lat,
            d_lon,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn id(&self) -> &GridId {
        &self.id
    }

    /// Total number of grid points (length of every value array).
    pub fn point_count(&self) -> usize {
        match &self.spec {
            GridSpec::Regular { ni, nj, .. } => ni * nj,
            GridSpec::Irregular { lats, .. } => lats.len(),
        }
    }

    /// Number of points along a meridian.
    pub fn points_along_meridian(&self) -> usize {
        match &self.spec {
            GridSpec::Regular { nj, .. } | GridSpec::Irregular { nj, .. } => *nj,
        }
    }

    /// Per-point coordinates, built on first call and shared afterwards.
    pub fn coordinates(&self) -> Arc<Coordinates> {
        self.coords
            .get_or_init(|| Arc::new(materialize(&self.spec)))
            .clone()
    }

    /// `(min_lat, max_lat, min_lon, max_lon)` of the grid points.
    pub fn extremes(&self) -> (f64, f64, f64, f64) {
        extremes(&self.spec)
    }
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl TryFrom<GridSpec> for Grid {
    type Error = GridError;

    fn try_from(spec: GridSpec) -> Result<Self> {
        Grid::new(spec)
    }
}

impl From<Grid> for GridSpec {
    fn from(grid: Grid) -> Self {
        grid.spec
    }
}

/// Compute the identity of a grid geometry.
///
/// SHA-256 over a canonical little-endian encoding of the grid kind, the
/// point counts and the coordinate extremes rounded to micro-degrees.
/// Rendered as the first 16 digest bytes in lowercase hex.
pub fn identity(spec: &GridSpec) -> GridId {
    let mut hasher = Sha256::new();

    let (kind, points, nj): (u8, usize, usize) = match spec {
        GridSpec::Regular { ni, nj, .. } => (0, ni * nj, *nj),
        GridSpec::Irregular { nj, lats, .. } => (1, lats.len(), *nj),
    };
    hasher.update([kind]);
    hasher.update((points as u64).to_le_bytes());
    hasher.update((nj as u64).to_le_bytes());

    let (min_lat, max_lat, min_lon, max_lon) = extremes(spec);
    for v in [min_lat, max_lat, min_lon, max_lon] {
        hasher.update(micro_degrees(v).to_le_bytes());
    }

    // Scan direction changes the meaning of a value index.
    if let GridSpec::Regular {
        first_lat,
        first_lon,
        ..
    } = spec
    {
        hasher.update(micro_degrees(*first_lat).to_le_bytes());
        hasher.update(micro_degrees(*first_lon).to_le_bytes());
    }

    let digest = hasher.finalize();
    let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
    GridId(hex)
}

#[inline]
fn micro_degrees(v: f64) -> i64 {
    (v * 1e6).round() as i64
}

fn extremes(spec: &GridSpec) -> (f64, f64, f64, f64) {
    match spec {
        GridSpec::Regular {
            ni,
            nj,
            first_lat,
            first_lon,
            d_lat,
            d_lon,
        } => {
            let last_lat = first_lat + (*nj - 1) as f64 * d_lat;
            let last_lon = first_lon + (*ni - 1) as f64 * d_lon;
            (
                first_lat.min(last_lat),
                first_lat.max(last_lat),
                first_lon.min(last_lon),
                first_lon.max(last_lon),
            )
        }
        GridSpec::Irregular { lats, lons, .. } => {
            let (min_lat, max_lat) = min_max(lats);
            let (min_lon, max_lon) = min_max(lons);
            (min_lat, max_lat, min_lon, max_lon)
        }
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn materialize(spec: &GridSpec) -> Coordinates {
    match spec {
        GridSpec::Regular {
            ni,
            nj,
            first_lat,
            first_lon,
            d_lat,
            d_lon,
        } => {
            let mut lats = Vec::with_capacity(ni * nj);
            let mut lons = Vec::with_capacity(ni * nj);
            for j in 0..*nj {
                let lat = first_lat + j as f64 * d_lat;
                for i in 0..*ni {
                    lats.push(lat);
                    lons.push(first_lon + i as f64 * d_lon);
                }
            }
            Coordinates { lats, lons }
        }
        GridSpec::Irregular { lats, lons, .. } => Coordinates {
            lats: lats.clone(),
            lons: lons.clone(),
        },
    }
}
