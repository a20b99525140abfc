//! Test data generators for synthetic forecast fields and series.
//!
//! These generators create predictable, verifiable patterns so aggregation
//! and interpolation results can be checked by hand.

use grid_common::StepRange;

/// Creates a test field with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that a value ended up at the right index
/// by checking that field[row * width + col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a field where every point has the same value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a zero field with the missing-value sentinel at the given
/// `(col, row)` positions.
pub fn create_grid_with_missing(
    width: usize,
    height: usize,
    missing_cells: &[(usize, usize)],
    missing_value: f32,
) -> Vec<f32> {
    let mut data = vec![0.0; width * height];
    for &(col, row) in missing_cells {
        if col < width && row < height {
            data[row * width + col] = missing_value;
        }
    }
    data
}

/// Creates a precipitation-like field in mm, mostly dry with scattered cells.
///
/// Deterministic for a given seed.
pub fn create_precipitation_grid(width: usize, height: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut data = Vec::with_capacity(width * height);
    for _ in 0..width * height {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = (state >> 33) as f32 / (1u64 << 31) as f32;
        data.push(if r < 0.7 { 0.0 } else { (r - 0.7) * 50.0 });
    }
    data
}

/// A cumulative series: message `i` is keyed
/// `(i*input_step, (i+1)*input_step)` and holds the running total since
/// step 0, `totals[i]`, at every point.
///
/// ```
/// use test_utils::cumulative_series;
///
/// let series = cumulative_series(6, &[10.0, 25.0], 3);
/// assert_eq!(series[1].0.end, 12);
/// assert_eq!(series[1].1, vec![25.0; 3]);
/// ```
pub fn cumulative_series(input_step: u32, totals: &[f32], points: usize) -> Vec<(StepRange, Vec<f32>)> {
    totals
        .iter()
        .enumerate()
        .map(|(i, &total)| {
            let i = i as u32;
            (
                StepRange::new(i * input_step, (i + 1) * input_step),
                vec![total; points],
            )
        })
        .collect()
}

/// An instantaneous series at `first, first + input_step, ...` with one
/// constant value per message.
pub fn instant_series(
    first: u32,
    input_step: u32,
    values: &[f32],
    points: usize,
) -> Vec<(StepRange, Vec<f32>)> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let step = first + i as u32 * input_step;
            (StepRange::instant(step), vec![v; points])
        })
        .collect()
}
