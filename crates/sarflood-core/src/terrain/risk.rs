use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::slope::{slope_raster, summarize_slope};
use crate::error::Result;
use crate::grid::Grid;
use crate::mask::BinaryMask;
use crate::raster::Raster;

pub const DEFAULT_ELEVATION_THRESHOLD_M: f32 = 50.0;
pub const DEFAULT_SLOPE_THRESHOLD_DEG: f32 = 5.0;

/// Static, event-independent flood risk proxy:
/// `risk = (elevation < elevation_threshold_m) AND (slope < slope_threshold_deg)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainRiskClassifier {
    pub elevation_threshold_m: f32,
    pub slope_threshold_deg: f32,
}

impl Default for TerrainRiskClassifier {
    fn default() -> Self {
        Self {
            elevation_threshold_m: DEFAULT_ELEVATION_THRESHOLD_M,
            slope_threshold_deg: DEFAULT_SLOPE_THRESHOLD_DEG,
        }
    }
}

/// Elevation and slope on the analysis grid, and the risk mask built from them.
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub elevation: Raster,
    pub slope: Raster,
    pub risk_mask: BinaryMask,
}

impl TerrainRiskClassifier {
    pub fn new(elevation_threshold_m: f32, slope_threshold_deg: f32) -> Self {
        Self { elevation_threshold_m, slope_threshold_deg }
    }

    /// Classify co-registered elevation and slope rasters. A cell that is
    /// no-data in either input is no-data in the mask.
    pub fn classify(&self, elevation: &Raster, slope: &Raster) -> Result<BinaryMask> {
        let low = elevation.less_than(self.elevation_threshold_m);
        let flat = slope.less_than(self.slope_threshold_deg);
        low.and(&flat)
    }

    /// Slope at the DEM's native resolution, then both layers resampled to
    /// `analysis_grid` and classified there.
    pub fn assess(&self, dem: &Raster, analysis_grid: &Grid) -> Result<RiskAssessment> {
        let native_slope = slope_raster(dem);
        match summarize_slope(&native_slope, self.slope_threshold_deg) {
            Some(s) => info!(
                mean_deg = s.mean_deg,
                mode_deg = s.mode_deg,
                flat_fraction = s.flat_fraction,
                "terrain slope"
            ),
            None => warn!("elevation raster has no valid cells inside the study area"),
        }

        let elevation = dem.resample_to(analysis_grid);
        let slope = native_slope.resample_to(analysis_grid);
        let risk_mask = self.classify(&elevation, &slope)?;
        info!(
            high_risk = risk_mask.count_true(),
            valid = risk_mask.count_valid(),
            "terrain risk classification"
        );
        Ok(RiskAssessment { elevation, slope, risk_mask })
    }
}
