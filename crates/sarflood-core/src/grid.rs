//! Grid geometry shared by rasters and masks: extent, shape and the
//! coordinate reference the cell sizes are expressed in.
//! All coordinate math uses f64 for precision.
use geo::{coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{FloodError, Result};

/// Ground distance of one degree of latitude (and of longitude at the equator).
pub const METRES_PER_DEGREE: f64 = 111_320.0;
/// Mean Earth radius (IUGG), used for spherical cell areas.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Relative tolerance used when deciding whether two grids coincide.
const GRID_TOLERANCE: f64 = 1e-9;

/// How grid coordinates map onto the ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridCrs {
    /// Longitude/latitude in degrees. Cell areas shrink towards the poles.
    #[default]
    Geographic,
    /// Projected equal-area coordinates in metres. Every cell has the same area.
    EqualArea,
}

/// Axis-aligned bounding box in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if the two boxes share interior area.
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    pub fn to_rect(self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.max().x, rect.min().y, rect.max().y)
    }
}

/// A regular grid of `width × height` cells over `extent`.
///
/// Storage order is row-major with row 0 at the southern edge (`min_y`), so
/// row index grows northwards. Cell `(r, c)` covers
/// `[min_x + c·dx, min_x + (c+1)·dx) × [min_y + r·dy, min_y + (r+1)·dy)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub extent: Extent,
    pub crs: GridCrs,
}

impl Grid {
    pub fn new(width: usize, height: usize, extent: Extent, crs: GridCrs) -> Self {
        Self { width, height, extent, crs }
    }

    /// Build the grid covering `bounds` at a nominal ground sampling distance
    /// of `scale_m` metres. The extent is anchored at the south-west corner
    /// of `bounds` and grown to a whole number of cells.
    pub fn for_bounds(bounds: Rect<f64>, scale_m: f64, crs: GridCrs) -> Result<Self> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(FloodError::InvalidConfig(format!(
                "analysis scale must be positive, got {scale_m}"
            )));
        }
        let cell = match crs {
            GridCrs::Geographic => scale_m / METRES_PER_DEGREE,
            GridCrs::EqualArea => scale_m,
        };
        let min = bounds.min();
        let max = bounds.max();
        let width = (((max.x - min.x) / cell).ceil() as usize).max(1);
        let height = (((max.y - min.y) / cell).ceil() as usize).max(1);
        let extent = Extent::new(
            min.x,
            min.x + width as f64 * cell,
            min.y,
            min.y + height as f64 * cell,
        );
        Ok(Self::new(width, height, extent, crs))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    pub fn cell_width(&self) -> f64 {
        self.extent.width() / self.width as f64
    }

    pub fn cell_height(&self) -> f64 {
        self.extent.height() / self.height as f64
    }

    #[inline]
    pub fn col_center_x(&self, col: usize) -> f64 {
        self.extent.min_x + (col as f64 + 0.5) * self.cell_width()
    }

    #[inline]
    pub fn row_center_y(&self, row: usize) -> f64 {
        self.extent.min_y + (row as f64 + 0.5) * self.cell_height()
    }

    /// Centre of cell `(row, col)` as `(x, y)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (self.col_center_x(col), self.row_center_y(row))
    }

    /// The cell containing `(x, y)`, or None outside the extent.
    /// The north and east edges are exclusive.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let e = &self.extent;
        if !(x >= e.min_x && x < e.max_x && y >= e.min_y && y < e.max_y) {
            return None;
        }
        let col = (((x - e.min_x) / self.cell_width()) as usize).min(self.width - 1);
        let row = (((y - e.min_y) / self.cell_height()) as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Nominal ground sampling distance in metres.
    pub fn nominal_scale_m(&self) -> f64 {
        match self.crs {
            GridCrs::Geographic => self.cell_height() * METRES_PER_DEGREE,
            GridCrs::EqualArea => (self.cell_width() * self.cell_height()).sqrt(),
        }
    }

    /// Ground cell size `(dx, dy)` in metres along row `row`.
    /// In the geographic CRS, longitude spacing is scaled by cos(latitude).
    pub fn row_cell_size_m(&self, row: usize) -> (f64, f64) {
        match self.crs {
            GridCrs::Geographic => {
                let lat = self.row_center_y(row).to_radians();
                (
                    self.cell_width() * METRES_PER_DEGREE * lat.cos(),
                    self.cell_height() * METRES_PER_DEGREE,
                )
            }
            GridCrs::EqualArea => (self.cell_width(), self.cell_height()),
        }
    }

    /// True ground area (m²) of every cell in row `row`.
    ///
    /// Geographic: area of a spherical lat/lon quadrangle,
    ///   `R² · Δλ · (sin φ_north − sin φ_south)`.
    /// Equal-area: `dx · dy`.
    pub fn cell_area_m2(&self, row: usize) -> f64 {
        match self.crs {
            GridCrs::Geographic => {
                let south = (self.extent.min_y + row as f64 * self.cell_height()).clamp(-90.0, 90.0);
                let north = (south + self.cell_height()).clamp(-90.0, 90.0);
                let dlon = self.cell_width().to_radians();
                EARTH_RADIUS_M * EARTH_RADIUS_M * dlon * (north.to_radians().sin() - south.to_radians().sin())
            }
            GridCrs::EqualArea => self.cell_width() * self.cell_height(),
        }
    }

    /// True if both grids have the same shape, CRS and (within tolerance) extent.
    pub fn same_as(&self, other: &Grid) -> bool {
        let close = |a: f64, b: f64| {
            (a - b).abs() <= GRID_TOLERANCE * a.abs().max(b.abs()).max(1.0)
        };
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && close(self.extent.min_x, other.extent.min_x)
            && close(self.extent.max_x, other.extent.max_x)
            && close(self.extent.min_y, other.extent.min_y)
            && close(self.extent.max_y, other.extent.max_y)
    }

    /// `Ok(())` when the grids coincide, `GridMismatch` naming `what` otherwise.
    pub fn ensure_same(&self, other: &Grid, what: &str) -> Result<()> {
        if self.same_as(other) {
            Ok(())
        } else {
            Err(FloodError::GridMismatch(format!(
                "{what}: {}×{} {:?} vs {}×{} {:?}",
                self.width, self.height, self.extent, other.width, other.height, other.extent
            )))
        }
    }
}
