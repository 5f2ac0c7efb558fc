//! Slope (degrees) by Horn's method at every cell of an elevation raster,
//! plus a distribution summary for diagnostics.
use serde::Serialize;

#[cfg(feature = "threading")]
use rayon::prelude::*;

use super::gradient::horn_gradient;
use crate::raster::Raster;

/// Used when a row's ground cell size degenerates (e.g. at a pole).
const FALLBACK_CELLSIZE_M: f64 = 90.0;
const N_BINS: usize = 90;

/// Slope angle in degrees for every cell of `dem`, on `dem`'s own grid.
///
/// Cell sizes come from the grid, per row: in the geographic CRS
///   dy = Δlat × 111 320 m/°, dx = Δlon × 111 320 × cos(lat) m/°.
///
///   slope = atan(√(dz_dx² + dz_dy²)) × 180/π
///
/// No-data elevation yields no-data slope.
pub fn slope_raster(dem: &Raster) -> Raster {
    let grid = &dem.grid;
    let mut out = Raster::nodata(grid.clone());
    if grid.is_empty() {
        return out;
    }

    let fill = |(r, values): (usize, &mut [f32])| {
        let (dx, dy) = grid.row_cell_size_m(r);
        let dx = if dx < 1e-3 { FALLBACK_CELLSIZE_M } else { dx };
        let dy = if dy < 1e-3 { FALLBACK_CELLSIZE_M } else { dy };
        for (c, v) in values.iter_mut().enumerate() {
            if let Some((dz_dx, dz_dy)) = horn_gradient(dem, r, c, dx, dy) {
                let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
                *v = (slope_rad.to_degrees() as f32).max(0.0);
            }
        }
    };

    #[cfg(feature = "threading")]
    out.data.par_chunks_mut(grid.width).enumerate().for_each(fill);
    #[cfg(not(feature = "threading"))]
    out.data.chunks_mut(grid.width).enumerate().for_each(fill);

    out
}

#[derive(Debug, Clone, Serialize)]
pub struct SlopeSummary {
    /// Histogram mode (bin centre, degrees).
    pub mode_deg: f32,
    pub mean_deg: f32,
    pub std_deg: f32,
    /// Fraction of valid cells below `flat_threshold_deg`.
    pub flat_fraction: f32,
    pub valid_cells: usize,
}

/// Distribution of valid slope values. None when every cell is no-data.
pub fn summarize_slope(slope: &Raster, flat_threshold_deg: f32) -> Option<SlopeSummary> {
    let values: Vec<f32> = slope.data.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return None;
    }

    // 90 one-degree bins; bin k covers [k°, (k+1)°).
    let mut bins = [0u32; N_BINS];
    for &s in &values {
        bins[(s as usize).min(N_BINS - 1)] += 1;
    }
    let mode_bin = bins.iter().enumerate().max_by_key(|(_, &b)| b).map(|(i, _)| i).unwrap_or(0);

    let n = values.len() as f64;
    let mean = values.iter().map(|&s| s as f64).sum::<f64>() / n;
    let variance = values.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
    let flat = values.iter().filter(|&&s| s < flat_threshold_deg).count();

    Some(SlopeSummary {
        mode_deg: mode_bin as f32 + 0.5,
        mean_deg: mean as f32,
        std_deg: variance.sqrt() as f32,
        flat_fraction: flat as f32 / values.len() as f32,
        valid_cells: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extent, Grid, GridCrs, METRES_PER_DEGREE};

    /// Planar ramp rising eastwards at `target_deg`, ≈90 m cells at the equator.
    fn make_ramp(n: usize, target_deg: f64) -> Raster {
        let pixel_deg = 90.0 / METRES_PER_DEGREE;
        let extent = n as f64 * pixel_deg;
        let grid = Grid::new(n, n, Extent::new(0.0, extent, 0.0, extent), GridCrs::Geographic);
        let mut dem = Raster::filled(grid, 0.0);

        let rise_per_cell = 90.0 * target_deg.to_radians().tan();
        for r in 0..n {
            for c in 0..n {
                dem.set(r, c, (c as f64 * rise_per_cell) as f32);
            }
        }
        dem
    }

    #[test]
    fn ramp_slope_matches_target_in_interior() {
        let slope = slope_raster(&make_ramp(32, 10.0));
        for r in 1..31 {
            for c in 1..31 {
                assert!((slope.get(r, c) - 10.0).abs() < 0.1, "({r},{c}) = {}", slope.get(r, c));
            }
        }
        let summary = summarize_slope(&slope, 5.0).unwrap();
        assert!((summary.mode_deg - 10.0).abs() < 1.0);
    }

    #[test]
    fn flat_field_has_zero_slope_everywhere() {
        let grid = Grid::new(8, 8, Extent::new(0.0, 800.0, 0.0, 800.0), GridCrs::EqualArea);
        let slope = slope_raster(&Raster::filled(grid, 30.0));
        assert!(slope.data.iter().all(|&s| s == 0.0));
        let summary = summarize_slope(&slope, 5.0).unwrap();
        assert_eq!(summary.mode_deg, 0.5);
        assert_eq!(summary.flat_fraction, 1.0);
    }

    #[test]
    fn nodata_elevation_gives_nodata_slope_only_there() {
        let grid = Grid::new(5, 5, Extent::new(0.0, 500.0, 0.0, 500.0), GridCrs::EqualArea);
        let mut dem = Raster::filled(grid, 10.0);
        dem.set(2, 2, f32::NAN);
        let slope = slope_raster(&dem);
        assert!(slope.get(2, 2).is_nan());
        assert_eq!(slope.valid_count(), 24);
        assert_eq!(slope.get(1, 1), 0.0);
    }

    #[test]
    fn all_nodata_has_no_summary() {
        let grid = Grid::new(3, 3, Extent::new(0.0, 3.0, 0.0, 3.0), GridCrs::EqualArea);
        assert!(summarize_slope(&Raster::nodata(grid), 5.0).is_none());
    }
}
