mod circle;
mod classic;
mod standard;
mod validate;

use crate::error::LayoutError;
use crate::types::CellType;

/// A parsed tag layout defining the spatial arrangement of cells.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Grid dimension (the layout is grid_size x grid_size).
    pub grid_size: usize,
    /// Cell types in row-major order (top-to-bottom, left-to-right).
    pub cells: Vec<CellType>,
    /// Number of data bits in this layout.
    pub nbits: usize,
    /// Row/column index of the black border ring.
    pub border_start: usize,
    /// Width of the data region at the inner border edge.
    pub border_width: usize,
    /// Whether the border order is reversed (Standard/Circle = true, Classic = false).
    pub reversed_border: bool,
}

impl Layout {
    /// Parse a layout from a data string of `d`, `b`, `w`, `x` characters.
    ///
    /// The string length must be a perfect square. The layout must be
    /// rotationally symmetric and contain a valid border.
    pub fn from_data_string(data: &str) -> Result<Layout, LayoutError> {
        let len = data.len();
        let grid_size = (len as f64).sqrt() as usize;
        if grid_size * grid_size != len {
            return Err(LayoutError::NotSquare(len));
        }

        let cells: Vec<CellType> = data
            .chars()
            .enumerate()
            .map(|(i, c)| match c {
                'd' => Ok(CellType::Data),
                'b' => Ok(CellType::Black),
                'w' => Ok(CellType::White),
                'x' => Ok(CellType::Ignored),
                _ => Err(LayoutError::InvalidChar(c, i)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let nbits = cells.iter().filter(|&&c| c == CellType::Data).count();

        validate::check_symmetry(&cells, grid_size)?;
        let (border_start, reversed_border) = validate::detect_border(&cells, grid_size)?;
        validate::check_border_rings(&cells, grid_size, border_start, reversed_border)?;

        let border_width = grid_size - 2 * border_start;

        Ok(Layout {
            grid_size,
            cells,
            nbits,
            border_start,
            border_width,
            reversed_border,
        })
    }

    /// Build a classic layout (white outer ring, black inner ring) of the given grid size.
    pub fn classic(grid_size: usize) -> Result<Layout, LayoutError> {
        Layout::from_data_string(&classic::classic_data_string(grid_size))
    }

    /// Build a standard layout (black outer ring, white inner ring, square data region)
    /// of the given grid size.
    pub fn standard(grid_size: usize) -> Result<Layout, LayoutError> {
        Layout::from_data_string(&standard::standard_data_string(grid_size))
    }

    /// Build a circle layout (black outer ring, white inner ring, circular data region)
    /// of the given grid size.
    pub fn circle(grid_size: usize) -> Result<Layout, LayoutError> {
        Layout::from_data_string(&circle::circle_data_string(grid_size))
    }

    /// Get the cell type at grid position (x, y).
    pub fn cell(&self, x: usize, y: usize) -> CellType {
        self.cells[y * self.grid_size + x]
    }
}
