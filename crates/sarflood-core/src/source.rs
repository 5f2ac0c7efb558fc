//! Query contract for the external raster store: time-bounded,
//! sensor-filtered collections reduced to one composite per request, plus
//! static single-band images such as a DEM.
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::error::{FloodError, Result};
use crate::grid::Grid;
use crate::raster::Raster;

/// Closed-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Parse two ISO-8601 dates (`YYYY-MM-DD`).
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| FloodError::InvalidConfig(format!("bad date {s:?}: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(FloodError::InvalidConfig(format!("empty date range {self}")));
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A scene metadata value: a single token (`instrumentMode = "IW"`) or a
/// list of tokens (`transmitterReceiverPolarisation = ["VV", "VH"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

/// Discrete predicate on scene metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SensorFilter {
    /// Text property equals `value`.
    Equals { property: String, value: String },
    /// List property contains `value` (a text property must equal it).
    ListContains { property: String, value: String },
}

impl SensorFilter {
    pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals { property: property.into(), value: value.into() }
    }

    pub fn list_contains(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ListContains { property: property.into(), value: value.into() }
    }

    pub fn matches(&self, properties: &BTreeMap<String, PropertyValue>) -> bool {
        match self {
            SensorFilter::Equals { property, value } => {
                matches!(properties.get(property), Some(PropertyValue::Text(t)) if t == value)
            }
            SensorFilter::ListContains { property, value } => match properties.get(property) {
                Some(PropertyValue::List(items)) => items.iter().any(|i| i == value),
                Some(PropertyValue::Text(t)) => t == value,
                None => false,
            },
        }
    }
}

/// Per-pixel statistic used to collapse a scene stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    #[default]
    Mean,
    Median,
    Min,
    Max,
}

impl Reducer {
    /// Reduce the valid observations of one pixel. `NaN` when there are none.
    pub fn reduce(self, values: &mut [f32]) -> f32 {
        if values.is_empty() {
            return f32::NAN;
        }
        match self {
            Reducer::Mean => {
                let sum: f64 = values.iter().map(|&v| v as f64).sum();
                (sum / values.len() as f64) as f32
            }
            Reducer::Median => {
                values.sort_by(|a, b| a.total_cmp(b));
                let n = values.len();
                if n % 2 == 1 {
                    values[n / 2]
                } else {
                    (values[n / 2 - 1] + values[n / 2]) / 2.0
                }
            }
            Reducer::Min => values.iter().copied().fold(f32::INFINITY, f32::min),
            Reducer::Max => values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }
}

/// Which scenes to composite: collection, window, sensor predicates, band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRequest {
    pub collection_id: String,
    pub date_range: DateRange,
    #[serde(default)]
    pub filters: Vec<SensorFilter>,
    pub band: String,
}

/// A raster reduced from a time-windowed, sensor-filtered stack, together
/// with the query that produced it.
#[derive(Debug, Clone)]
pub struct Composite {
    pub raster: Raster,
    pub request: CompositeRequest,
    pub reducer: Reducer,
    pub scene_count: usize,
}

/// The raster store the pipeline reads from.
///
/// Implementations resample onto the requested analysis grid; the core
/// algorithms never reproject.
pub trait RasterSource {
    /// Reduce every scene matching `request` and intersecting `bounds` to a
    /// single raster on `grid`, clipped exactly to `bounds`.
    ///
    /// Pixels with no contributing observation are no-data. Zero matching
    /// scenes is an `EmptyCollection` error, never an empty composite.
    fn composite_for(
        &self,
        request: &CompositeRequest,
        bounds: &MultiPolygon<f64>,
        grid: &Grid,
        reducer: Reducer,
    ) -> Result<Composite>;

    /// A static single-band image at its native resolution, clipped to `bounds`.
    fn image(&self, image_id: &str, bounds: &MultiPolygon<f64>) -> Result<Raster>;
}
