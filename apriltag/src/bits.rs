use crate::layout::Layout;
use crate::types::CellType;

/// A bit location in grid coordinates, shifted by border_start.
///
/// Coordinates can be negative for Standard/Circle layouts where
/// data bits extend outside the inner border.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitLocation {
    pub x: i32,
    pub y: i32,
}

/// Compute bit locations for a layout using quadrant-scan ordering.
///
/// This matches the Java `ImageLayout.getBitLocations()` algorithm:
/// 1. Scan the first quadrant (top-left triangle) for data cells
/// 2. Generate remaining three quadrants by rotating coordinates 90 degrees
/// 3. If grid_size is odd and center cell is data, add it as the final bit
/// 4. Shift all coordinates by subtracting border_start
pub fn bit_locations(layout: &Layout) -> Vec<BitLocation> {
    let size = layout.grid_size;
    let mut locations: Vec<(usize, usize)> = Vec::with_capacity(layout.nbits);

    // First quadrant: top-left triangle
    for y in 0..size / 2 {
        for x in y..size - 1 - y {
            if layout.cell(x, y) == CellType::Data {
                locations.push((x, y));
            }
        }
    }

    let step = locations.len();

    // Remaining three quadrants by successive 90-degree rotations
    // rotate90(x, y) = (size - 1 - y, x)
    while locations.len() < step * 4 {
        let idx = locations.len() - step;
        let (px, py) = locations[idx];
        locations.push((size - 1 - py, px));
    }

    // Center pixel (odd grid size only)
    if size % 2 == 1 && layout.cell(size / 2, size / 2) == CellType::Data {
        locations.push((size / 2, size / 2));
    }

    assert_eq!(locations.len(), layout.nbits);

    // Shift by border_start
    let bs = layout.border_start as i32;
    locations
        .into_iter()
        .map(|(x, y)| BitLocation {
            x: x as i32 - bs,
            y: y as i32 - bs,
        })
        .collect()
}
