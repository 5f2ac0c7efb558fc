//! Terrain-based flood risk: slope from elevation, then low-and-flat cells.
mod gradient;
pub mod risk;
pub mod slope;

pub use risk::{RiskAssessment, TerrainRiskClassifier};
pub use slope::{slope_raster, summarize_slope, SlopeSummary};
