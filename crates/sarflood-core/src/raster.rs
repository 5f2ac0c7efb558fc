use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::coverage::coverage;
use crate::error::Result;
use crate::grid::Grid;
use crate::mask::{BinaryMask, MASK_NODATA};

/// A single-band raster of f32 samples on a [`Grid`], row-major, S→N.
/// `NaN` marks no-data: outside the source footprint, outside a clip
/// geometry, or where no observation contributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    pub grid: Grid,
    pub data: Vec<f32>,
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn filled(grid: Grid, fill: f32) -> Self {
        let data = vec![fill; grid.len()];
        Self { grid, data }
    }

    /// Create an all-no-data raster.
    pub fn nodata(grid: Grid) -> Self {
        Self::filled(grid, f32::NAN)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[self.grid.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        let i = self.grid.index(row, col);
        self.data[i] = val;
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Sample at `(x, y)` using bilinear interpolation between cell centres.
    ///
    /// Returns None outside the extent or when the cell containing the point
    /// is no-data. Other no-data neighbours are dropped from the blend and
    /// the remaining weights renormalised.
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        let g = &self.grid;
        let e = &g.extent;
        if g.is_empty() || x < e.min_x || x > e.max_x || y < e.min_y || y > e.max_y {
            return None;
        }

        let home_col = (((x - e.min_x) / g.cell_width()) as usize).min(g.width - 1);
        let home_row = (((y - e.min_y) / g.cell_height()) as usize).min(g.height - 1);
        if self.get(home_row, home_col).is_nan() {
            return None;
        }

        let fx = ((x - e.min_x) / g.cell_width() - 0.5).clamp(0.0, (g.width - 1) as f64);
        let fy = ((y - e.min_y) / g.cell_height() - 0.5).clamp(0.0, (g.height - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(g.width - 1);
        let y1 = (y0 + 1).min(g.height - 1);

        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let taps = [
            (self.get(y0, x0), (1.0 - tx) * (1.0 - ty)),
            (self.get(y0, x1), tx * (1.0 - ty)),
            (self.get(y1, x0), (1.0 - tx) * ty),
            (self.get(y1, x1), tx * ty),
        ];

        let mut sum = 0.0f64;
        let mut weight = 0.0f64;
        for (v, w) in taps {
            if !v.is_nan() && w > 0.0 {
                sum += v as f64 * w;
                weight += w;
            }
        }
        (weight > 0.0).then(|| (sum / weight) as f32)
    }

    /// Resample onto `target` by bilinear interpolation at target cell centres.
    /// Target cells outside this raster's extent are no-data.
    pub fn resample_to(&self, target: &Grid) -> Raster {
        if self.grid.same_as(target) {
            return Raster { grid: target.clone(), data: self.data.clone() };
        }
        let mut out = Raster::nodata(target.clone());
        let fill = |(row, values): (usize, &mut [f32])| {
            let y = target.row_center_y(row);
            for (col, v) in values.iter_mut().enumerate() {
                if let Some(s) = self.sample(target.col_center_x(col), y) {
                    *v = s;
                }
            }
        };

        #[cfg(feature = "threading")]
        out.data.par_chunks_mut(target.width).enumerate().for_each(fill);
        #[cfg(not(feature = "threading"))]
        out.data.chunks_mut(target.width).enumerate().for_each(fill);

        out
    }

    /// Set every cell whose centre lies outside `geometry` to no-data.
    pub fn clip(&self, geometry: &MultiPolygon<f64>) -> Raster {
        let cov = coverage(&self.grid, geometry);
        let data = self
            .data
            .iter()
            .zip(&cov.cells)
            .map(|(&v, &inside)| if inside { v } else { f32::NAN })
            .collect();
        Raster { grid: self.grid.clone(), data }
    }

    /// Pixel-wise `self − other`. No-data in either operand yields no-data.
    pub fn subtract(&self, other: &Raster) -> Result<Raster> {
        self.grid.ensure_same(&other.grid, "subtract")?;
        Ok(self.zip_map(other, |a, b| a - b))
    }

    /// Pixel-wise `self < threshold` as a mask. No-data stays no-data.
    pub fn less_than(&self, threshold: f32) -> BinaryMask {
        let data = self
            .data
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    MASK_NODATA
                } else {
                    u8::from(v < threshold)
                }
            })
            .collect();
        BinaryMask { grid: self.grid.clone(), data }
    }

    /// Combine two rasters on the same grid cell by cell.
    /// No-data in either input yields no-data.
    fn zip_map(&self, other: &Raster, f: impl Fn(f32, f32) -> f32 + Sync + Send) -> Raster {
        let mut data = vec![f32::NAN; self.data.len()];

        #[cfg(feature = "threading")]
        data.par_iter_mut()
            .zip(self.data.par_iter().zip(other.data.par_iter()))
            .for_each(|(out, (&a, &b))| *out = if a.is_nan() || b.is_nan() { f32::NAN } else { f(a, b) });
        #[cfg(not(feature = "threading"))]
        data.iter_mut()
            .zip(self.data.iter().zip(other.data.iter()))
            .for_each(|(out, (&a, &b))| *out = if a.is_nan() || b.is_nan() { f32::NAN } else { f(a, b) });

        Raster { grid: self.grid.clone(), data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extent, GridCrs};
    use geo::polygon;

    fn grid(w: usize, h: usize) -> Grid {
        Grid::new(w, h, Extent::new(0.0, w as f64, 0.0, h as f64), GridCrs::EqualArea)
    }

    #[test]
    fn sample_at_cell_centres_returns_exact_values() {
        let mut r = Raster::filled(grid(4, 4), 0.0);
        r.set(0, 0, 10.0);
        r.set(0, 3, 20.0);
        r.set(3, 0, 30.0);
        r.set(3, 3, 40.0);

        assert!((r.sample(0.5, 0.5).unwrap() - 10.0).abs() < 1e-5);
        assert!((r.sample(3.5, 0.5).unwrap() - 20.0).abs() < 1e-5);
        assert!((r.sample(0.5, 3.5).unwrap() - 30.0).abs() < 1e-5);
        assert!((r.sample(3.5, 3.5).unwrap() - 40.0).abs() < 1e-5);
    }

    #[test]
    fn sample_out_of_bounds_returns_none() {
        let r = Raster::filled(grid(4, 4), 1.0);
        assert!(r.sample(-1.0, 0.0).is_none());
        assert!(r.sample(0.0, 4.5).is_none());
    }

    #[test]
    fn sample_skips_nodata_neighbours() {
        let mut r = Raster::filled(grid(2, 1), 6.0);
        r.set(0, 1, f32::NAN);
        assert!((r.sample(0.9, 0.5).unwrap() - 6.0).abs() < 1e-6);
        assert!(r.sample(1.5, 0.5).is_none());
    }

    #[test]
    fn subtract_propagates_nodata() {
        let mut pre = Raster::filled(grid(3, 1), -10.0);
        let mut during = Raster::filled(grid(3, 1), -15.0);
        pre.set(0, 1, f32::NAN);
        during.set(0, 2, f32::NAN);
        let diff = during.subtract(&pre).unwrap();
        assert_eq!(diff.data[0], -5.0);
        assert!(diff.data[1].is_nan());
        assert!(diff.data[2].is_nan());
    }

    #[test]
    fn subtract_rejects_mismatched_grids() {
        let a = Raster::filled(grid(3, 3), 0.0);
        let b = Raster::filled(grid(3, 4), 0.0);
        assert!(a.subtract(&b).is_err());
    }

    #[test]
    fn less_than_keeps_nodata_distinct_from_false() {
        let mut r = Raster::filled(grid(3, 1), 0.0);
        r.set(0, 0, -5.0);
        r.set(0, 2, f32::NAN);
        let m = r.less_than(-3.0);
        assert_eq!(m.data, vec![1, 0, MASK_NODATA]);
    }

    #[test]
    fn clip_blanks_cells_outside_geometry() {
        let r = Raster::filled(grid(4, 4), 1.0);
        let half = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)
        ]]);
        let clipped = r.clip(&half);
        assert_eq!(clipped.valid_count(), 8);
        assert!(clipped.get(0, 3).is_nan());
    }

    #[test]
    fn resample_to_coarser_grid_averages_neighbours() {
        let mut fine = Raster::filled(grid(4, 4), 0.0);
        for r in 0..4 {
            for c in 0..4 {
                fine.set(r, c, c as f32);
            }
        }
        let coarse = Grid::new(2, 2, Extent::new(0.0, 4.0, 0.0, 4.0), GridCrs::EqualArea);
        let out = fine.resample_to(&coarse);
        // Coarse centre x = 1.0 sits halfway between fine columns 0 and 1.
        assert!((out.get(0, 0) - 0.5).abs() < 1e-6);
        assert!((out.get(0, 1) - 2.5).abs() < 1e-6);
    }
}
