use thiserror::Error;

/// Every failure the analysis core can surface. None of these are retried;
/// they reflect configuration or data-availability problems.
#[derive(Debug, Error)]
pub enum FloodError {
    #[error("boundary dataset not registered: {0}")]
    UnknownDataset(String),

    #[error("no feature in {dataset} matches {attribute} = {value:?}")]
    RegionNotFound {
        dataset: String,
        attribute: String,
        value: String,
    },

    #[error("{matches} features in {dataset} match {attribute} = {value:?} but a unique match was required")]
    AmbiguousRegion {
        dataset: String,
        attribute: String,
        value: String,
        matches: usize,
    },

    #[error("no scenes in {collection} for band {band} between {start} and {end} matching the sensor filters")]
    EmptyCollection {
        collection: String,
        band: String,
        start: String,
        end: String,
    },

    #[error("static image not available: {0}")]
    UnknownImage(String),

    #[error("region {0} has no spatial overlap with the analysis grid")]
    GeometryMismatch(String),

    #[error("region {region} covers {pixels} pixels, above the max_pixels ceiling of {max_pixels}")]
    PixelLimitExceeded {
        region: String,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("raster grids differ: {0}")]
    GridMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FloodError>;
