//! Interpolation table storage, application and binary format.
//!
//! Rows are kept in compressed-sparse-row form: `offsets[cell]..offsets[cell + 1]`
//! indexes into `indices`/`weights`. A validity bitmap marks covered cells;
//! uncovered cells have empty rows and are masked on output.
//!
//! # Memory Usage
//!
//! Per target cell: 4 bytes of offset plus 8 bytes per neighbour, plus one
//! bit of coverage. A 1000x950 raster with 4-neighbour IDW is ~34MB.

use rayon::prelude::*;
use std::io::{Read, Write};

use grid_common::is_missing;

use crate::error::{Result, TableError};
use crate::method::InterpolationMethod;

const MAGIC: &[u8; 4] = b"ITAB";
const FORMAT_VERSION: u32 = 1;
/// Largest cell or source point count a table can address.
const MAX_ENTRIES: u64 = u32::MAX as u64;

/// Immutable mapping from target cells to weighted source-grid indices.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTable {
    method: InterpolationMethod,
    source_points: usize,
    /// Bit N is 1 if target cell N has at least one source point.
    valid_bitmap: Vec<u64>,
    offsets: Vec<u32>,
    indices: Vec<u32>,
    weights: Vec<f32>,
}

impl InterpolationTable {
    /// Assemble a table from per-cell rows. `None` marks a cell without coverage.
    pub fn from_rows(
        method: InterpolationMethod,
        source_points: usize,
        rows: Vec<Option<Vec<(u32, f32)>>>,
    ) -> Self {
        let cells = rows.len();
        let nnz: usize = rows.iter().flatten().map(Vec::len).sum();

        let mut valid_bitmap = vec![0u64; cells.div_ceil(64)];
        let mut offsets = Vec::with_capacity(cells + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut weights = Vec::with_capacity(nnz);

        offsets.push(0u32);
        for (cell, row) in rows.into_iter().enumerate() {
            if let Some(row) = row.filter(|r| !r.is_empty()) {
                valid_bitmap[cell / 64] |= 1u64 << (cell % 64);
                for (idx, w) in row {
                    indices.push(idx);
                    weights.push(w);
                }
            }
            offsets.push(indices.len() as u32);
        }

        Self {
            method,
            source_points,
            valid_bitmap,
            offsets,
            indices,
            weights,
        }
    }

    pub fn method(&self) -> &InterpolationMethod {
        &self.method
    }

    /// Number of points of the source grid the table was built for.
    pub fn source_points(&self) -> usize {
        self.source_points
    }

    /// Number of target cells.
    pub fn cell_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Check if a target cell has source coverage.
    #[inline]
    pub fn is_covered(&self, cell: usize) -> bool {
        (self.valid_bitmap[cell / 64] & (1u64 << (cell % 64))) != 0
    }

    /// Source indices and weights of a cell, or `None` if it is not covered.
    #[inline]
    pub fn get(&self, cell: usize) -> Option<(&[u32], &[f32])> {
        if !self.is_covered(cell) {
            return None;
        }
        let (from, to) = (self.offsets[cell] as usize, self.offsets[cell + 1] as usize);
        Some((&self.indices[from..to], &self.weights[from..to]))
    }

    /// Count covered cells.
    pub fn covered_count(&self) -> usize {
        self.valid_bitmap
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Interpolate a source field onto the target cells.
    ///
    /// Uncovered cells get `output_mv`. Missing source values are dropped and
    /// the remaining weights renormalised; a cell whose sources are all
    /// missing gets `output_mv`.
    pub fn apply(&self, values: &[f32], input_mv: f32, output_mv: f32) -> Result<Vec<f32>> {
        if values.len() != self.source_points {
            return Err(TableError::SizeMismatch {
                expected: self.source_points,
                actual: values.len(),
            });
        }

        let output = (0..self.cell_count())
            .into_par_iter()
            .map(|cell| {
                let Some((indices, weights)) = self.get(cell) else {
                    return output_mv;
                };

                let mut sum = 0.0f64;
                let mut weight_sum = 0.0f64;
                for (&idx, &w) in indices.iter().zip(weights) {
                    let v = values[idx as usize];
                    if is_missing(v, input_mv) {
                        continue;
                    }
                    sum += v as f64 * w as f64;
                    weight_sum += w as f64;
                }

                if weight_sum > 0.0 {
                    (sum / weight_sum) as f32
                } else {
                    output_mv
                }
            })
            .collect();

        Ok(output)
    }

    /// Serialize the table.
    ///
    /// Layout (little-endian): magic, version, method tag, neighbours, power,
    /// radius, source points, cell count, coverage bitmap, row offsets,
    /// indices, weights.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;

        let (tag, neighbours, power, radius) = match self.method {
            InterpolationMethod::Nearest { max_radius } => (0u8, 1u32, 0.0f64, max_radius),
            InterpolationMethod::InverseDistance {
                neighbours,
                power,
                max_radius,
            } => (1u8, neighbours as u32, power, max_radius),
        };
        writer.write_all(&[tag])?;
        writer.write_all(&neighbours.to_le_bytes())?;
        writer.write_all(&power.to_le_bytes())?;
        writer.write_all(&radius.to_le_bytes())?;

        writer.write_all(&(self.source_points as u64).to_le_bytes())?;
        writer.write_all(&(self.cell_count() as u64).to_le_bytes())?;

        for &word in &self.valid_bitmap {
            writer.write_all(&word.to_le_bytes())?;
        }
        for &offset in &self.offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        for &idx in &self.indices {
            writer.write_all(&idx.to_le_bytes())?;
        }
        for &w in &self.weights {
            writer.write_all(&w.to_le_bytes())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Deserialize a table written by [`InterpolationTable::write_to`].
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(TableError::Corrupt("invalid magic bytes".to_string()));
        }

        let version = read_u32(&mut reader)?;
        if version != FORMAT_VERSION {
            return Err(TableError::Corrupt(format!(
                "unsupported table version {}",
                version
            )));
        }

        let mut tag = [0u8; 1];
        reader.read_exact(&mut tag)?;
        let neighbours = read_u32(&mut reader)? as usize;
        let power = read_f64(&mut reader)?;
        let max_radius = read_f64(&mut reader)?;
        let method = match tag[0] {
            0 => InterpolationMethod::Nearest { max_radius },
            1 => InterpolationMethod::InverseDistance {
                neighbours,
                power,
                max_radius,
            },
            other => {
                return Err(TableError::Corrupt(format!("unknown method tag {}", other)));
            }
        };

        let source_points = read_u64(&mut reader)?;
        let cells = read_u64(&mut reader)?;
        // Indices and offsets are u32, so larger headers cannot be genuine.
        if source_points > MAX_ENTRIES || cells > MAX_ENTRIES {
            return Err(TableError::Corrupt(format!(
                "implausible header: {} source points, {} cells",
                source_points, cells
            )));
        }
        let (source_points, cells) = (source_points as usize, cells as usize);

        // Vectors grow with the bytes actually present, never with header counts.
        let mut valid_bitmap = Vec::new();
        for _ in 0..cells.div_ceil(64) {
            valid_bitmap.push(read_u64(&mut reader)?);
        }

        let mut offsets = Vec::new();
        for _ in 0..=cells {
            offsets.push(read_u32(&mut reader)?);
        }
        if offsets[0] != 0 || offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(TableError::Corrupt("row offsets are not monotonic".to_string()));
        }

        let nnz = offsets[cells] as usize;
        let mut indices = Vec::new();
        for _ in 0..nnz {
            let idx = read_u32(&mut reader)?;
            if idx as usize >= source_points {
                return Err(TableError::Corrupt(format!(
                    "source index {} out of range for {} points",
                    idx, source_points
                )));
            }
            indices.push(idx);
        }

        let mut weights = Vec::new();
        for _ in 0..nnz {
            weights.push(f32::from_le_bytes(read_array(&mut reader)?));
        }

        let table = Self {
            method,
            source_points,
            valid_bitmap,
            offsets,
            indices,
            weights,
        };

        for cell in 0..cells {
            let empty = table.offsets[cell] == table.offsets[cell + 1];
            if empty == table.is_covered(cell) {
                return Err(TableError::Corrupt(format!(
                    "coverage bit of cell {} disagrees with its row",
                    cell
                )));
            }
        }

        Ok(table)
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(reader)?))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array(reader)?))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    Ok(f64::from_le_bytes(read_array(reader)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> InterpolationTable {
        InterpolationTable::from_rows(
            InterpolationMethod::InverseDistance {
                neighbours: 2,
                power: 2.0,
                max_radius: 1000.0,
            },
            4,
            vec![
                Some(vec![(0, 0.75), (1, 0.25)]),
                None,
                Some(vec![(3, 1.0)]),
            ],
        )
    }

    #[test]
    fn test_rows_and_coverage() {
        let table = sample_table();
        assert_eq!(table.cell_count(), 3);
        assert_eq!(table.covered_count(), 2);
        assert!(table.is_covered(0));
        assert!(!table.is_covered(1));
        assert!(table.get(1).is_none());

        let (indices, weights) = table.get(0).unwrap();
        assert_eq!(indices, &[0, 1]);
        assert_eq!(weights, &[0.75, 0.25]);
    }

    #[test]
    fn test_apply_masks_uncovered_and_missing() {
        let table = sample_table();
        let out = table.apply(&[4.0, 8.0, 0.0, -1.0], -1.0, -9999.0).unwrap();
        assert!((out[0] - 5.0).abs() < 1e-6);
        assert_eq!(out[1], -9999.0);
        // Only source is missing
        assert_eq!(out[2], -9999.0);
    }

    #[test]
    fn test_apply_renormalises_around_missing_neighbour() {
        let table = sample_table();
        let out = table.apply(&[4.0, -1.0, 0.0, 2.0], -1.0, -9999.0).unwrap();
        assert!((out[0] - 4.0).abs() < 1e-6);
        assert!((out[2] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_apply_rejects_wrong_size() {
        let table = sample_table();
        assert!(matches!(
            table.apply(&[1.0, 2.0], -1.0, -9999.0),
            Err(TableError::SizeMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_binary_roundtrip_is_exact() {
        let table = sample_table();
        let mut buffer = Vec::new();
        table.write_to(&mut buffer).unwrap();

        let restored = InterpolationTable::read_from(&buffer[..]).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert!(InterpolationTable::read_from(&b"NOPE...."[..]).is_err());

        let mut buffer = Vec::new();
        sample_table().write_to(&mut buffer).unwrap();
        buffer.truncate(buffer.len() - 3);
        assert!(InterpolationTable::read_from(&buffer[..]).is_err());
    }
}
