//! SAR flood mapping: Sentinel-1 backscatter change detection, terrain-based
//! flood risk, and per-region area statistics.

pub mod catalog;
pub mod change;
pub mod config;
pub mod coverage;
pub mod error;
pub mod export;
pub mod geotiff;
pub mod grid;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod regions;
pub mod source;
pub mod terrain;
pub mod zonal;

pub use error::{FloodError, Result};
