//! Backscatter change detection.
//!
//! Open water is a specular reflector, so flooding darkens radar backscatter.
//! Differencing a during-event composite against a pre-event composite
//! cancels the terrain and soil response shared by both epochs; a fixed
//! decibel threshold on the difference then marks flooded pixels.
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::mask::BinaryMask;
use crate::raster::Raster;
use crate::source::DateRange;

/// Water-induced backscatter drop commonly used for Sentinel-1 VV.
pub const DEFAULT_THRESHOLD_DB: f32 = -3.0;

/// The two composite windows and the detection threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub pre_window: DateRange,
    pub during_window: DateRange,
    pub threshold_db: f32,
}

/// Output of one detection: the difference raster and the flood mask.
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub difference: Raster,
    pub flood_mask: BinaryMask,
}

/// Differences two composites and thresholds the result. Carries the
/// windows the composites are requested for alongside the threshold.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: DetectionConfig,
}

impl ChangeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn threshold_db(&self) -> f32 {
        self.config.threshold_db
    }

    pub fn pre_window(&self) -> DateRange {
        self.config.pre_window
    }

    pub fn during_window(&self) -> DateRange {
        self.config.during_window
    }

    /// `during − pre` in decibels. No-data in either epoch is no-data here.
    pub fn difference(&self, pre: &Raster, during: &Raster) -> Result<Raster> {
        during.subtract(pre)
    }

    /// Difference both epochs and threshold: flooded where the drop is
    /// strictly below `threshold_db`.
    pub fn detect(&self, pre: &Raster, during: &Raster) -> Result<ChangeResult> {
        let difference = self.difference(pre, during)?;
        let flood_mask = difference.less_than(self.threshold_db());
        info!(
            threshold_db = self.threshold_db(),
            pre = %self.config.pre_window,
            during = %self.config.during_window,
            flooded = flood_mask.count_true(),
            valid = flood_mask.count_valid(),
            "change detection"
        );
        Ok(ChangeResult { difference, flood_mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::grid::{Extent, Grid, GridCrs};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn grid(n: usize) -> Grid {
        Grid::new(n, n, Extent::new(0.0, n as f64, 0.0, n as f64), GridCrs::EqualArea)
    }

    fn detector(threshold_db: f32) -> ChangeDetector {
        ChangeDetector::new(DetectionConfig { threshold_db, ..AnalysisConfig::default().detection() })
    }

    fn random_pair(seed: u64, n: usize) -> (Raster, Raster) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pre = Raster::filled(grid(n), 0.0);
        let mut during = Raster::filled(grid(n), 0.0);
        for i in 0..n * n {
            pre.data[i] = rng.gen_range(-20.0..-5.0);
            during.data[i] = rng.gen_range(-25.0..-5.0);
            if rng.gen_bool(0.1) {
                pre.data[i] = f32::NAN;
            }
            if rng.gen_bool(0.1) {
                during.data[i] = f32::NAN;
            }
        }
        (pre, during)
    }

    #[test]
    fn nodata_in_either_epoch_is_never_classified() {
        let (pre, during) = random_pair(7, 32);
        let result = detector(DEFAULT_THRESHOLD_DB).detect(&pre, &during).unwrap();
        for i in 0..pre.data.len() {
            let missing = pre.data[i].is_nan() || during.data[i].is_nan();
            assert_eq!(result.flood_mask.state(i).is_none(), missing, "pixel {i}");
            assert_eq!(result.difference.data[i].is_nan(), missing, "pixel {i}");
        }
    }

    #[test]
    fn lowering_threshold_never_adds_flood_pixels() {
        let (pre, during) = random_pair(11, 48);
        let mut previous = usize::MAX;
        for step in 0..=20 {
            let threshold = -0.5 * step as f32;
            let flooded = detector(threshold).detect(&pre, &during).unwrap().flood_mask.count_true();
            assert!(flooded <= previous, "threshold {threshold}: {flooded} > {previous}");
            previous = flooded;
        }
    }

    #[test]
    fn threshold_is_strict() {
        let pre = Raster::filled(grid(1), -10.0);
        let during = Raster::filled(grid(1), -13.0);
        let result = detector(DEFAULT_THRESHOLD_DB).detect(&pre, &during).unwrap();
        assert_eq!(result.flood_mask.state(0), Some(false));
    }

    #[test]
    fn mismatched_composites_are_rejected() {
        let pre = Raster::filled(grid(2), -10.0);
        let during = Raster::filled(grid(3), -10.0);
        assert!(detector(DEFAULT_THRESHOLD_DB).detect(&pre, &during).is_err());
    }

    #[test]
    fn detector_exposes_configured_windows_and_threshold() {
        let config = AnalysisConfig { threshold_db: -2.5, ..AnalysisConfig::default() };
        let detector = ChangeDetector::new(config.detection());
        assert_eq!(detector.threshold_db(), -2.5);
        assert_eq!(detector.pre_window(), config.pre_window);
        assert_eq!(detector.during_window(), config.during_window);
    }
}
