//! Analysis configuration. Every field has a default; the defaults reproduce
//! the 2022 Pakistan flood run over Sindh, Balochistan, KPK and Punjab.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::change::{DetectionConfig, DEFAULT_THRESHOLD_DB};
use crate::error::{FloodError, Result};
use crate::grid::GridCrs;
use crate::regions::{AttributeFilter, MergePolicy};
use crate::source::{CompositeRequest, DateRange, Reducer, SensorFilter};
use crate::terrain::risk::{DEFAULT_ELEVATION_THRESHOLD_M, DEFAULT_SLOPE_THRESHOLD_DEG};
use crate::terrain::TerrainRiskClassifier;
use crate::zonal::{ZonalAggregator, DEFAULT_MAX_PIXELS};

const fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(y, m, d) {
        Some(d) => d,
        None => panic!("invalid built-in date"),
    }
}

const PRE_WINDOW: DateRange = DateRange { start: date(2022, 6, 1), end: date(2022, 6, 30) };
const DURING_WINDOW: DateRange = DateRange { start: date(2022, 8, 15), end: date(2022, 9, 30) };

/// A named administrative unit to aggregate over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub label: String,
    pub filter: AttributeFilter,
}

impl RegionSpec {
    pub fn new(label: &str, attribute: &str, value: &str) -> Self {
        Self { label: label.to_string(), filter: AttributeFilter::equals(attribute, value) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Boundary dataset the region filters are evaluated against.
    pub boundary_dataset: String,
    /// Regions in output order. The study area is their union.
    pub regions: Vec<RegionSpec>,
    pub merge_policy: MergePolicy,
    /// Label of the study-area total row.
    pub study_area_label: String,
    pub include_total_row: bool,

    pub collection_id: String,
    pub band: String,
    pub sensor_filters: Vec<SensorFilter>,
    pub reducer: Reducer,
    pub pre_window: DateRange,
    pub during_window: DateRange,
    /// Backscatter change (dB) below which a pixel is flooded.
    pub threshold_db: f32,

    pub elevation_image: String,
    pub elevation_threshold_m: f32,
    pub slope_threshold_deg: f32,

    /// Nominal ground sampling distance of the analysis grid.
    pub analysis_scale_m: f64,
    /// Ceiling on pixels per zonal sum.
    pub max_pixels: u64,
    pub crs: GridCrs,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            boundary_dataset: "FAO/GAUL/2015/level1".into(),
            regions: vec![
                RegionSpec::new("Sindh", "ADM1_NAME", "Sindh"),
                RegionSpec::new("Balochistan", "ADM1_NAME", "Balochistan"),
                RegionSpec::new("KPK", "ADM1_NAME", "Khyber Pakhtunkhwa"),
                RegionSpec::new("Punjab", "ADM1_NAME", "Punjab"),
            ],
            merge_policy: MergePolicy::Union,
            study_area_label: "Total".into(),
            include_total_row: true,
            collection_id: "COPERNICUS/S1_GRD".into(),
            band: "VV".into(),
            sensor_filters: vec![
                SensorFilter::equals("instrumentMode", "IW"),
                SensorFilter::list_contains("transmitterReceiverPolarisation", "VV"),
            ],
            reducer: Reducer::Mean,
            pre_window: PRE_WINDOW,
            during_window: DURING_WINDOW,
            threshold_db: DEFAULT_THRESHOLD_DB,
            elevation_image: "USGS/SRTMGL1_003".into(),
            elevation_threshold_m: DEFAULT_ELEVATION_THRESHOLD_M,
            slope_threshold_deg: DEFAULT_SLOPE_THRESHOLD_DEG,
            analysis_scale_m: 100.0,
            max_pixels: DEFAULT_MAX_PIXELS,
            crs: GridCrs::Geographic,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FloodError::InvalidConfig(msg));

        if self.regions.is_empty() {
            return invalid("at least one region is required".into());
        }
        let mut seen = HashSet::new();
        for r in &self.regions {
            if !seen.insert(r.label.as_str()) {
                return invalid(format!("duplicate region label {:?}", r.label));
            }
        }
        if self.include_total_row && seen.contains(self.study_area_label.as_str()) {
            return invalid(format!(
                "study area label {:?} collides with a region label",
                self.study_area_label
            ));
        }
        if !(self.analysis_scale_m.is_finite() && self.analysis_scale_m > 0.0) {
            return invalid(format!("analysis_scale_m must be positive, got {}", self.analysis_scale_m));
        }
        if self.max_pixels == 0 {
            return invalid("max_pixels must be at least 1".into());
        }
        for (name, v) in [
            ("threshold_db", self.threshold_db),
            ("elevation_threshold_m", self.elevation_threshold_m),
            ("slope_threshold_deg", self.slope_threshold_deg),
        ] {
            if !v.is_finite() {
                return invalid(format!("{name} must be finite"));
            }
        }
        self.pre_window.validate()?;
        self.during_window.validate()?;
        Ok(())
    }

    pub fn detection(&self) -> DetectionConfig {
        DetectionConfig {
            pre_window: self.pre_window,
            during_window: self.during_window,
            threshold_db: self.threshold_db,
        }
    }

    /// Composite query for one of the two detection windows.
    pub fn composite_request(&self, window: DateRange) -> CompositeRequest {
        CompositeRequest {
            collection_id: self.collection_id.clone(),
            date_range: window,
            filters: self.sensor_filters.clone(),
            band: self.band.clone(),
        }
    }

    pub fn classifier(&self) -> TerrainRiskClassifier {
        TerrainRiskClassifier::new(self.elevation_threshold_m, self.slope_threshold_deg)
    }

    pub fn aggregator(&self) -> ZonalAggregator {
        ZonalAggregator::new(self.analysis_scale_m, self.max_pixels)
    }
}
