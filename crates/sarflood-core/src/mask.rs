use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::Grid;

/// Byte value marking a no-data mask cell. Valid cells hold 0 or 1.
pub const MASK_NODATA: u8 = 255;

/// A raster constrained to {0, 1, no-data}, stored as bytes so it can be
/// exported unchanged as a single-band byte image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryMask {
    pub grid: Grid,
    pub data: Vec<u8>,
}

impl BinaryMask {
    /// Build a mask from per-cell states; None is no-data.
    pub fn from_states(grid: Grid, states: impl IntoIterator<Item = Option<bool>>) -> Self {
        let data = states
            .into_iter()
            .map(|s| match s {
                Some(v) => u8::from(v),
                None => MASK_NODATA,
            })
            .collect();
        Self { grid, data }
    }

    /// None for no-data, otherwise the cell's truth value.
    #[inline]
    pub fn state(&self, index: usize) -> Option<bool> {
        match self.data[index] {
            MASK_NODATA => None,
            v => Some(v == 1),
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        self.state(self.grid.index(row, col))
    }

    /// Number of cells set to 1.
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&v| v == 1).count()
    }

    /// Number of cells that are not no-data.
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&v| v != MASK_NODATA).count()
    }

    /// Cell-wise logical AND. No-data in either operand yields no-data.
    pub fn and(&self, other: &BinaryMask) -> Result<BinaryMask> {
        self.grid.ensure_same(&other.grid, "mask and")?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| {
                if a == MASK_NODATA || b == MASK_NODATA {
                    MASK_NODATA
                } else {
                    a & b
                }
            })
            .collect();
        Ok(BinaryMask { grid: self.grid.clone(), data })
    }

    /// Nearest-neighbour resample onto `target`. Cells whose centre falls
    /// outside this mask are no-data.
    pub fn resample_nearest(&self, target: &Grid) -> BinaryMask {
        if self.grid.same_as(target) {
            return BinaryMask { grid: target.clone(), data: self.data.clone() };
        }
        let mut data = vec![MASK_NODATA; target.len()];
        for row in 0..target.height {
            let y = target.row_center_y(row);
            for col in 0..target.width {
                if let Some((r, c)) = self.grid.cell_at(target.col_center_x(col), y) {
                    data[target.index(row, col)] = self.data[self.grid.index(r, c)];
                }
            }
        }
        BinaryMask { grid: target.clone(), data }
    }
}
