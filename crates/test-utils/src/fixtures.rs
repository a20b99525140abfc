//! Common test fixtures: source grids and scratch directories.

use std::sync::Arc;

use grid_common::Grid;

/// Missing-value sentinel used throughout the fixtures.
pub const MISSING: f32 = -9999.0;

/// 0.5 degree regular grid over a 4x2 degree box in central Europe,
/// 9x5 points, rows north to south.
pub fn coarse_grid() -> Arc<Grid> {
    Arc::new(Grid::regular(9, 5, 52.0, 6.0, -0.5, 0.5).expect("valid fixture grid"))
}

/// 0.25 degree grid over the same box as [`coarse_grid`], 17x9 points.
pub fn fine_grid() -> Arc<Grid> {
    Arc::new(Grid::regular(17, 9, 52.0, 6.0, -0.25, 0.25).expect("valid fixture grid"))
}

/// Small grid far away from the fixture boxes (South Pacific).
pub fn remote_grid() -> Arc<Grid> {
    Arc::new(Grid::regular(4, 4, -40.0, -150.0, -0.5, 0.5).expect("valid fixture grid"))
}

/// Fresh temporary directory for table stores and output maps.
pub fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp dir")
}
