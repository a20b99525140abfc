//! Spatial index over source grid points.
//!
//! Points are placed on a sphere of mean Earth radius in 3-D Cartesian
//! coordinates, so straight-line (chord) distances stay meaningful across
//! the antimeridian and near the poles.

use rstar::primitives::GeomWithData;
use rstar::RTree;

use grid_common::Coordinates;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

type IndexedPoint = GeomWithData<[f64; 3], u32>;

/// Convert geographic coordinates (degrees) to Earth-centred Cartesian metres.
#[inline]
pub fn to_cartesian(lat: f64, lon: f64) -> [f64; 3] {
    let (lat, lon) = (lat.to_radians(), lon.to_radians());
    [
        EARTH_RADIUS_M * lat.cos() * lon.cos(),
        EARTH_RADIUS_M * lat.cos() * lon.sin(),
        EARTH_RADIUS_M * lat.sin(),
    ]
}

/// R*-tree over source grid points, keyed by value index.
pub struct SourceIndex {
    tree: RTree<IndexedPoint>,
}

impl SourceIndex {
    /// Bulk load the index from per-point coordinates.
    pub fn build(coords: &Coordinates) -> Self {
        let points: Vec<IndexedPoint> = coords
            .iter()
            .enumerate()
            .filter(|(_, (lat, lon))| lat.is_finite() && lon.is_finite())
            .map(|(idx, (lat, lon))| GeomWithData::new(to_cartesian(lat, lon), idx as u32))
            .collect();

        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Up to `k` closest points within `max_radius` metres of `(lat, lon)`,
    /// nearest first, as `(value index, distance)`.
    pub fn nearest_within(&self, lat: f64, lon: f64, k: usize, max_radius: f64) -> Vec<(u32, f64)> {
        let query = to_cartesian(lat, lon);
        self.tree
            .nearest_neighbor_iter(&query)
            .map(|entry| (entry.data, distance(entry.geom(), &query)))
            .take_while(|(_, d)| *d <= max_radius)
            .take(k)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[inline]
fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(points: &[(f64, f64)]) -> Coordinates {
        Coordinates {
            lats: points.iter().map(|p| p.0).collect(),
            lons: points.iter().map(|p| p.1).collect(),
        }
    }

    #[test]
    fn test_nearest_order() {
        let index = SourceIndex::build(&coords(&[(45.0, 10.0), (45.0, 10.1), (45.0, 11.0)]));
        assert_eq!(index.len(), 3);

        let hits = index.nearest_within(45.0, 10.08, 2, 100_000.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 0);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn test_radius_limits_results() {
        let index = SourceIndex::build(&coords(&[(45.0, 10.0), (45.0, 11.0)]));
        // 0.1 degree of longitude at 45N is roughly 7.9 km
        let hits = index.nearest_within(45.0, 10.1, 4, 10_000.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);

        assert!(index.nearest_within(0.0, 0.0, 4, 10_000.0).is_empty());
    }

    #[test]
    fn test_antimeridian_neighbours() {
        let index = SourceIndex::build(&coords(&[(0.0, 179.95), (0.0, 170.0)]));
        let hits = index.nearest_within(0.0, -179.95, 1, 20_000.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_skips_non_finite_points() {
        let index = SourceIndex::build(&coords(&[(f64::NAN, 0.0), (1.0, 1.0)]));
        assert_eq!(index.len(), 1);
    }
}
