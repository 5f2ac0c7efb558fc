//! Zonal area statistics: true ground area of mask cells inside a polygon.
use std::borrow::Cow;
use std::io::Write;

use geo::Intersects;
use serde::Serialize;
use tracing::{debug, warn};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::coverage::{coverage, Coverage};
use crate::error::{FloodError, Result};
use crate::grid::Grid;
use crate::mask::{BinaryMask, MASK_NODATA};
use crate::regions::Region;

pub const FLOOD_AREA_COLUMN: &str = "Flood_Area_sqkm";
pub const RISK_AREA_COLUMN: &str = "Risk_Area_sqkm";
pub const LABEL_COLUMN: &str = "Province";
pub const DEFAULT_MAX_PIXELS: u64 = 10_000_000_000_000;

/// Relative scale difference above which the mask is resampled first.
const SCALE_TOLERANCE: f64 = 1e-3;

/// One row of a statistics table.
///
/// `pixels` counts cells whose centre lies in the region, `valid_pixels`
/// those of them that are not no-data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalRecord {
    pub region_label: String,
    pub area_sq_km: f64,
    pub pixels: u64,
    pub valid_pixels: u64,
}

impl ZonalRecord {
    /// False when the region covers cells but every one of them is no-data;
    /// its zero area then means "not observed" rather than "not flooded".
    pub fn observed(&self) -> bool {
        self.pixels == 0 || self.valid_pixels > 0
    }

    /// The area, or None for an unobserved region.
    pub fn area(&self) -> Option<f64> {
        self.observed().then_some(self.area_sq_km)
    }
}

/// Ordered per-region areas plus an optional study-area total row.
#[derive(Debug, Clone, Serialize)]
pub struct StatsTable {
    pub value_column: String,
    pub records: Vec<ZonalRecord>,
    pub total: Option<ZonalRecord>,
}

impl StatsTable {
    /// Region rows in configured order, then the total row if present.
    pub fn rows(&self) -> impl Iterator<Item = &ZonalRecord> {
        self.records.iter().chain(self.total.iter())
    }

    /// Area of the row labelled `label`; None if absent or unobserved.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.rows().find(|r| r.region_label == label).and_then(ZonalRecord::area)
    }

    /// Sum of the region rows (excluding the total row).
    pub fn region_sum(&self) -> f64 {
        self.records.iter().map(|r| r.area_sq_km).sum()
    }

    /// Delimited text with header `Province,<value_column>`. Unobserved
    /// regions get an empty value, never 0.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([LABEL_COLUMN, self.value_column.as_str()])?;
        for row in self.rows() {
            let value = row.area().map(|a| a.to_string()).unwrap_or_default();
            csv.write_record([row.region_label.as_str(), value.as_str()])?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// True ground area in m² of the cells of each row of `grid`. Cell area
/// depends on latitude only, so one value per row covers every pixel.
pub fn pixel_area_m2(grid: &Grid) -> Vec<f64> {
    (0..grid.height).map(|r| grid.cell_area_m2(r)).collect()
}

/// Sums mask area within polygons at a fixed scale, refusing regions that
/// cover more than `max_pixels` cells.
#[derive(Debug, Clone, Copy)]
pub struct ZonalAggregator {
    pub scale_m: f64,
    pub max_pixels: u64,
}

impl ZonalAggregator {
    pub fn new(scale_m: f64, max_pixels: u64) -> Self {
        Self { scale_m, max_pixels }
    }

    /// The mask on a grid at `scale_m`, resampled (nearest) only if needed.
    fn at_scale<'a>(&self, mask: &'a BinaryMask) -> Result<Cow<'a, BinaryMask>> {
        let current = mask.grid.nominal_scale_m();
        if ((current - self.scale_m) / self.scale_m).abs() <= SCALE_TOLERANCE {
            return Ok(Cow::Borrowed(mask));
        }
        let target = Grid::for_bounds(mask.grid.extent.to_rect(), self.scale_m, mask.grid.crs)?;
        debug!(from_m = current, to_m = self.scale_m, "resampling mask for aggregation");
        Ok(Cow::Owned(mask.resample_nearest(&target)))
    }

    /// Area (km²) of cells set in `mask` whose centres lie inside `region`,
    /// with the covered and valid cell counts.
    ///
    /// `GeometryMismatch` if the region does not intersect the mask extent.
    /// An intersecting region that covers no cell centre, or covers valid
    /// cells none of which are set, has area 0. One whose covered cells are
    /// all no-data is returned unobserved.
    pub fn record(&self, mask: &BinaryMask, region: &Region) -> Result<ZonalRecord> {
        let mask = self.at_scale(mask)?;
        if !region.geometry.intersects(&mask.grid.extent.to_rect()) {
            return Err(FloodError::GeometryMismatch(region.label.clone()));
        }
        let cov = coverage(&mask.grid, &region.geometry);
        self.check_pixel_limit(&cov, region)?;

        let areas = pixel_area_m2(&mask.grid);
        let sum = masked_sum(&mask, &areas, &cov);
        debug!(region = %region.label, pixels = cov.count, valid = sum.valid, area_m2 = sum.area_m2, "zonal sum");
        let record = ZonalRecord {
            region_label: region.label.clone(),
            area_sq_km: sum.area_m2 / 1.0e6,
            pixels: cov.count,
            valid_pixels: sum.valid,
        };
        if !record.observed() {
            warn!(region = %region.label, pixels = cov.count, "region has no valid observation");
        }
        Ok(record)
    }

    /// Area in km², None when every covered cell is no-data.
    pub fn area_sq_km(&self, mask: &BinaryMask, region: &Region) -> Result<Option<f64>> {
        Ok(self.record(mask, region)?.area())
    }

    fn check_pixel_limit(&self, cov: &Coverage, region: &Region) -> Result<()> {
        if cov.count > self.max_pixels {
            return Err(FloodError::PixelLimitExceeded {
                region: region.label.clone(),
                pixels: cov.count,
                max_pixels: self.max_pixels,
            });
        }
        Ok(())
    }

    /// One record per region in the given order, plus the total row when
    /// `total` is given. Regions are independent and may run concurrently;
    /// any failure fails the whole table.
    pub fn aggregate(
        &self,
        mask: &BinaryMask,
        regions: &[Region],
        total: Option<&Region>,
        value_column: &str,
    ) -> Result<StatsTable> {
        let record = |region: &Region| self.record(mask, region);

        #[cfg(feature = "threading")]
        let records = regions.par_iter().map(&record).collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "threading"))]
        let records = regions.iter().map(&record).collect::<Result<Vec<_>>>()?;

        let total = total.map(&record).transpose()?;
        Ok(StatsTable { value_column: value_column.to_string(), records, total })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MaskedSum {
    area_m2: f64,
    valid: u64,
}

impl std::ops::Add for MaskedSum {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { area_m2: self.area_m2 + other.area_m2, valid: self.valid + other.valid }
    }
}

/// Σ over covered, set cells of the cell's ground area, plus the number of
/// covered valid cells, accumulated per row.
fn masked_sum(mask: &BinaryMask, row_area_m2: &[f64], cov: &Coverage) -> MaskedSum {
    let grid = &mask.grid;
    let row_sum = |r: usize| -> MaskedSum {
        let start = r * grid.width;
        let (mut set, mut valid) = (0u64, 0u64);
        for i in (start..start + grid.width).filter(|&i| cov.cells[i]) {
            match mask.data[i] {
                MASK_NODATA => {}
                1 => {
                    set += 1;
                    valid += 1;
                }
                _ => valid += 1,
            }
        }
        MaskedSum { area_m2: set as f64 * row_area_m2[r], valid }
    };

    #[cfg(feature = "threading")]
    let total = (0..grid.height).into_par_iter().map(row_sum).reduce(MaskedSum::default, |a, b| a + b);
    #[cfg(not(feature = "threading"))]
    let total = (0..grid.height).map(row_sum).fold(MaskedSum::default(), |a, b| a + b);

    total
}
