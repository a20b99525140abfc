//! Output writer boundary and map naming.

use grid_common::StepRange;

use crate::error::Result;

/// Receives interpolated maps in increasing step order.
pub trait OutputWriter {
    /// Write map number `output_index` (1-based) for `step`.
    fn write(
        &mut self,
        output_index: usize,
        step: StepRange,
        values: &[f32],
        missing_value: f32,
    ) -> Result<()>;
}

/// PCRaster style 8.3 map name: prefix padded with zeros to 11 characters
/// ending in `map_number`, with a dot after the eighth.
///
/// ```
/// assert_eq!(pipeline::map_name("pr", 1), "pr000000.001");
/// assert_eq!(pipeline::map_name("pr", 1234), "pr000001.234");
/// ```
pub fn map_name(prefix: &str, map_number: u32) -> String {
    let number = map_number.to_string();
    let zeros = 11usize.saturating_sub(prefix.len() + number.len());
    let name = format!("{}{}{}", prefix, "0".repeat(zeros), number);
    if name.len() > 8 {
        format!("{}.{}", &name[..8], &name[8..])
    } else {
        name
    }
}

/// Map number of the `output_index`-th map (1-based).
pub fn map_number(first_map: u32, map_step: u32, output_index: usize) -> u32 {
    first_map + (output_index as u32).saturating_sub(1) * map_step
}
