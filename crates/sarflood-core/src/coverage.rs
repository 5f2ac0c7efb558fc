//! Polygon → grid cell coverage.
//!
//! A cell is covered when its centre lies inside the geometry. Each polygon is
//! scan-converted row by row with the even-odd rule and half-open edge
//! crossings, so cells whose centres sit on an edge shared by two adjacent
//! polygons are assigned to exactly one of them. A multi-polygon covers the
//! union of its members' cells.
use geo::{BoundingRect, MultiPolygon, Polygon};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::grid::{Extent, Grid};

/// Per-cell membership of a geometry on a grid, row-major like the grid.
#[derive(Debug, Clone)]
pub struct Coverage {
    pub cells: Vec<bool>,
    pub count: u64,
}

impl Coverage {
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.cells[index]
    }
}

/// Rasterise `geometry` onto `grid`.
pub fn coverage(grid: &Grid, geometry: &MultiPolygon<f64>) -> Coverage {
    let mut cells = vec![false; grid.len()];
    if grid.is_empty() {
        return Coverage { cells, count: 0 };
    }

    // Polygons whose bounding box misses the grid contribute nothing.
    let polygons: Vec<&Polygon<f64>> = geometry
        .0
        .iter()
        .filter(|p| {
            p.bounding_rect()
                .map(|r| Extent::from_rect(r).intersects(&grid.extent))
                .unwrap_or(false)
        })
        .collect();

    if !polygons.is_empty() {
        let fill = |(row, out): (usize, &mut [bool])| {
            let y = grid.row_center_y(row);
            let mut xs = Vec::new();
            for polygon in &polygons {
                xs.clear();
                crossings(polygon, y, &mut xs);
                fill_spans(grid, &mut xs, out);
            }
        };

        #[cfg(feature = "threading")]
        cells.par_chunks_mut(grid.width).enumerate().for_each(fill);
        #[cfg(not(feature = "threading"))]
        cells.chunks_mut(grid.width).enumerate().for_each(fill);
    }

    let count = cells.iter().filter(|&&c| c).count() as u64;
    Coverage { cells, count }
}

/// x-coordinates where the horizontal line at `y` crosses any ring of `polygon`.
/// An edge counts when exactly one endpoint lies strictly above `y`.
fn crossings(polygon: &Polygon<f64>, y: f64, xs: &mut Vec<f64>) {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
    for ring in rings {
        for line in ring.lines() {
            let (p, q) = (line.start, line.end);
            if (p.y > y) != (q.y > y) {
                xs.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
            }
        }
    }
}

/// Mark columns whose centre falls in `[xs[2k], xs[2k+1])`.
fn fill_spans(grid: &Grid, xs: &mut [f64], out: &mut [bool]) {
    if xs.len() < 2 {
        return;
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    let cw = grid.cell_width();
    let min_x = grid.extent.min_x;
    let first_col = |x: f64| -> usize {
        let c = ((x - min_x) / cw - 0.5).ceil();
        c.clamp(0.0, grid.width as f64) as usize
    };
    for span in xs.chunks_exact(2) {
        let start = first_col(span[0]);
        let end = first_col(span[1]);
        for cell in &mut out[start..end.max(start)] {
            *cell = true;
        }
    }
}
