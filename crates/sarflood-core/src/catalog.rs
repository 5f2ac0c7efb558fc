//! In-memory raster store backing [`RasterSource`]: a list of scenes with
//! acquisition metadata plus named static images, optionally loaded from a
//! JSON manifest of GeoTIFF files.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo::{Intersects, MultiPolygon};
use serde::Deserialize;
use tracing::{debug, info};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::error::{FloodError, Result};
use crate::geotiff;
use crate::grid::{Extent, Grid, GridCrs};
use crate::raster::Raster;
use crate::source::{Composite, CompositeRequest, PropertyValue, RasterSource, Reducer};

/// One acquisition: metadata plus one raster per band, all on one grid.
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub collection_id: String,
    pub acquired: NaiveDate,
    pub properties: BTreeMap<String, PropertyValue>,
    pub grid: Grid,
    pub bands: BTreeMap<String, Raster>,
}

impl Scene {
    fn footprint_intersects(&self, bounds: &MultiPolygon<f64>) -> bool {
        bounds.intersects(&self.grid.extent.to_rect())
    }

    fn matches(&self, request: &CompositeRequest, bounds: &MultiPolygon<f64>) -> bool {
        self.collection_id == request.collection_id
            && request.date_range.contains(self.acquired)
            && self.bands.contains_key(&request.band)
            && request.filters.iter().all(|f| f.matches(&self.properties))
            && self.footprint_intersects(bounds)
    }
}

#[derive(Debug, Default)]
pub struct SceneCatalog {
    scenes: Vec<Scene>,
    images: HashMap<String, Raster>,
}

impl SceneCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn add_image(&mut self, id: impl Into<String>, raster: Raster) {
        self.images.insert(id.into(), raster);
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Scenes satisfying collection, window, band, filters and footprint.
    pub fn select(&self, request: &CompositeRequest, bounds: &MultiPolygon<f64>) -> Vec<&Scene> {
        self.scenes.iter().filter(|s| s.matches(request, bounds)).collect()
    }

    /// Load a manifest. Relative GeoTIFF paths resolve against the
    /// manifest's directory.
    pub fn load_manifest(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let manifest: ManifestDef = serde_json::from_str(&text)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let resolve = |p: &Path| -> PathBuf {
            if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
        };

        let mut catalog = SceneCatalog::new();
        for collection in &manifest.collections {
            for s in &collection.scenes {
                let grid = Grid::new(s.width, s.height, s.extent, manifest.crs);
                let mut bands = BTreeMap::new();
                for (band, file) in &s.bands {
                    bands.insert(band.clone(), geotiff::read_band(&resolve(file), grid.clone(), s.nodata)?);
                }
                catalog.add_scene(Scene {
                    id: s.id.clone(),
                    collection_id: collection.id.clone(),
                    acquired: s.acquired,
                    properties: s.properties.clone(),
                    grid,
                    bands,
                });
            }
        }
        for img in &manifest.images {
            let grid = Grid::new(img.width, img.height, img.extent, manifest.crs);
            catalog.add_image(img.id.clone(), geotiff::read_band(&resolve(&img.path), grid, img.nodata)?);
        }

        info!(
            scenes = catalog.scenes.len(),
            images = catalog.images.len(),
            "loaded scene catalog from {}",
            path.display()
        );
        Ok(catalog)
    }
}

impl RasterSource for SceneCatalog {
    fn composite_for(
        &self,
        request: &CompositeRequest,
        bounds: &MultiPolygon<f64>,
        grid: &Grid,
        reducer: Reducer,
    ) -> Result<Composite> {
        request.date_range.validate()?;
        let scenes = self.select(request, bounds);
        if scenes.is_empty() {
            return Err(FloodError::EmptyCollection {
                collection: request.collection_id.clone(),
                band: request.band.clone(),
                start: request.date_range.start.to_string(),
                end: request.date_range.end.to_string(),
            });
        }
        debug!(
            collection = %request.collection_id,
            window = %request.date_range,
            scenes = scenes.len(),
            "compositing"
        );

        // Every scene onto the analysis grid first; reduction is then per cell.
        let stack: Vec<Raster> = scenes
            .iter()
            .filter_map(|s| s.bands.get(&request.band))
            .map(|band| band.resample_to(grid))
            .collect();

        let mut out = Raster::nodata(grid.clone());
        let reduce_row = |(row, values): (usize, &mut [f32])| {
            let mut obs = Vec::with_capacity(stack.len());
            for (col, v) in values.iter_mut().enumerate() {
                let i = grid.index(row, col);
                obs.clear();
                obs.extend(stack.iter().map(|r| r.data[i]).filter(|x| !x.is_nan()));
                *v = reducer.reduce(&mut obs);
            }
        };

        #[cfg(feature = "threading")]
        out.data.par_chunks_mut(grid.width).enumerate().for_each(reduce_row);
        #[cfg(not(feature = "threading"))]
        out.data.chunks_mut(grid.width).enumerate().for_each(reduce_row);

        Ok(Composite {
            raster: out.clip(bounds),
            request: request.clone(),
            reducer,
            scene_count: scenes.len(),
        })
    }

    fn image(&self, image_id: &str, bounds: &MultiPolygon<f64>) -> Result<Raster> {
        let raster = self
            .images
            .get(image_id)
            .ok_or_else(|| FloodError::UnknownImage(image_id.to_string()))?;
        Ok(raster.clip(bounds))
    }
}

// ── Manifest schema ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ManifestDef {
    #[serde(default)]
    crs: GridCrs,
    #[serde(default)]
    collections: Vec<CollectionDef>,
    #[serde(default)]
    images: Vec<ImageDef>,
}

#[derive(Deserialize)]
struct CollectionDef {
    id: String,
    scenes: Vec<SceneDef>,
}

#[derive(Deserialize)]
struct SceneDef {
    id: String,
    acquired: NaiveDate,
    extent: Extent,
    width: usize,
    height: usize,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
    bands: BTreeMap<String, PathBuf>,
    #[serde(default)]
    nodata: Option<f64>,
}

#[derive(Deserialize)]
struct ImageDef {
    id: String,
    extent: Extent,
    width: usize,
    height: usize,
    path: PathBuf,
    #[serde(default)]
    nodata: Option<f64>,
}
