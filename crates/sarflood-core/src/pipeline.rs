//! Pipeline orchestrator: regions → composites → change detection →
//! terrain risk → zonal statistics.
use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span};

use crate::change::ChangeDetector;
use crate::config::AnalysisConfig;
use crate::error::{FloodError, Result};
use crate::grid::Grid;
use crate::mask::BinaryMask;
use crate::raster::Raster;
use crate::regions::{union_all, GeometryRegistry, Region};
use crate::source::{Composite, RasterSource};
use crate::terrain::RiskAssessment;
use crate::zonal::{StatsTable, FLOOD_AREA_COLUMN, RISK_AREA_COLUMN};

/// Everything one run produces. Exporting is left to the caller.
#[derive(Debug, Clone)]
pub struct FloodAnalysis {
    pub study_area: Region,
    pub regions: Vec<Region>,
    pub grid: Grid,
    pub pre: Composite,
    pub during: Composite,
    pub difference: Raster,
    pub flood_mask: BinaryMask,
    pub terrain: RiskAssessment,
    pub flood_stats: StatsTable,
    pub risk_stats: StatsTable,
    pub elapsed_ms: u64,
}

/// Headline numbers of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub grid_width: usize,
    pub grid_height: usize,
    pub pre_scenes: usize,
    pub during_scenes: usize,
    pub flooded_pixels: usize,
    pub high_risk_pixels: usize,
    pub flood_stats: StatsTable,
    pub risk_stats: StatsTable,
    pub elapsed_ms: u64,
}

impl FloodAnalysis {
    pub fn risk_mask(&self) -> &BinaryMask {
        &self.terrain.risk_mask
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            grid_width: self.grid.width,
            grid_height: self.grid.height,
            pre_scenes: self.pre.scene_count,
            during_scenes: self.during.scene_count,
            flooded_pixels: self.flood_mask.count_true(),
            high_risk_pixels: self.terrain.risk_mask.count_true(),
            flood_stats: self.flood_stats.clone(),
            risk_stats: self.risk_stats.clone(),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

pub struct FloodPipeline {
    config: AnalysisConfig,
}

impl FloodPipeline {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The configured regions, in order, and their union as the study area.
    pub fn resolve_regions(&self, registry: &GeometryRegistry) -> Result<(Vec<Region>, Region)> {
        let regions = self
            .config
            .regions
            .iter()
            .map(|spec| registry.region_by_name(&self.config.boundary_dataset, &spec.filter, &spec.label))
            .collect::<Result<Vec<_>>>()?;
        let study_area = union_all(&self.config.study_area_label, &regions)?;
        Ok((regions, study_area))
    }

    /// Run every stage. Any failing stage fails the run; nothing partial is
    /// returned.
    ///
    ///   1. Resolve regions and the study area
    ///   2. Pre- and during-event composites on the analysis grid
    ///   3. Change detection
    ///   4. Terrain risk from the elevation image
    ///   5. Flood and risk area per region
    pub fn run(&self, registry: &GeometryRegistry, source: &dyn RasterSource) -> Result<FloodAnalysis> {
        let _run = info_span!("flood_pipeline").entered();
        let t0 = Instant::now();
        let cfg = &self.config;

        // ── 1. Regions ──────────────────────────────────────────────────────
        let (regions, study_area) = self.resolve_regions(registry)?;
        let bounds = study_area
            .bounds()
            .ok_or_else(|| FloodError::GeometryMismatch(study_area.label.clone()))?;
        let grid = Grid::for_bounds(bounds, cfg.analysis_scale_m, cfg.crs)?;
        info!(
            regions = regions.len(),
            width = grid.width,
            height = grid.height,
            scale_m = cfg.analysis_scale_m,
            "analysis grid"
        );

        // ── 2. Composites ───────────────────────────────────────────────────
        let detector = ChangeDetector::new(cfg.detection());
        let pre = source.composite_for(
            &cfg.composite_request(detector.pre_window()),
            &study_area.geometry,
            &grid,
            cfg.reducer,
        )?;
        let during = source.composite_for(
            &cfg.composite_request(detector.during_window()),
            &study_area.geometry,
            &grid,
            cfg.reducer,
        )?;
        info!(
            pre_scenes = pre.scene_count,
            during_scenes = during.scene_count,
            pre_valid = pre.raster.valid_count(),
            during_valid = during.raster.valid_count(),
            "composites ready"
        );

        // ── 3. Change detection ─────────────────────────────────────────────
        let change = detector.detect(&pre.raster, &during.raster)?;

        // ── 4. Terrain risk ─────────────────────────────────────────────────
        let dem = source.image(&cfg.elevation_image, &study_area.geometry)?;
        let terrain = cfg.classifier().assess(&dem, &grid)?;

        // ── 5. Zonal statistics ─────────────────────────────────────────────
        let aggregator = cfg.aggregator();
        let total = cfg.include_total_row.then_some(&study_area);
        let flood_stats = aggregator.aggregate(&change.flood_mask, &regions, total, FLOOD_AREA_COLUMN)?;
        let risk_stats = aggregator.aggregate(&terrain.risk_mask, &regions, total, RISK_AREA_COLUMN)?;
        for row in flood_stats.rows() {
            info!(region = %row.region_label, area_sq_km = row.area_sq_km, "flooded area");
        }

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        info!(elapsed_ms, "flood analysis complete");

        Ok(FloodAnalysis {
            study_area,
            regions,
            grid,
            pre,
            during,
            difference: change.difference,
            flood_mask: change.flood_mask,
            terrain,
            flood_stats,
            risk_stats,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Scene, SceneCatalog};
    use crate::config::RegionSpec;
    use crate::export::{export_analysis, DirectoryExporter};
    use crate::grid::{Extent, GridCrs};
    use crate::regions::{BoundaryDataset, MergePolicy};
    use crate::source::PropertyValue;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    const DATASET: &str = r#"{
        "id": "districts",
        "features": [
            {"properties": {"NAME": "SW"}, "polygons": [[[[0,0],[5000,0],[5000,5000],[0,5000]]]]},
            {"properties": {"NAME": "SE"}, "polygons": [[[[5000,0],[10000,0],[10000,5000],[5000,5000]]]]},
            {"properties": {"NAME": "NW"}, "polygons": [[[[0,5000],[5000,5000],[5000,10000],[0,10000]]]]},
            {"properties": {"NAME": "NE"}, "polygons": [[[[5000,5000],[10000,5000],[10000,10000],[5000,10000]]]]}
        ]
    }"#;

    /// 10×10 km study area of four 5 km quadrants on a 1 km equal-area grid.
    fn config() -> AnalysisConfig {
        AnalysisConfig {
            boundary_dataset: "districts".into(),
            regions: ["SW", "SE", "NW", "NE"]
                .iter()
                .map(|n| RegionSpec::new(n, "NAME", n))
                .collect(),
            elevation_image: "dem".into(),
            analysis_scale_m: 1000.0,
            crs: GridCrs::EqualArea,
            ..AnalysisConfig::default()
        }
    }

    fn registry() -> GeometryRegistry {
        GeometryRegistry::new(MergePolicy::Union)
            .with_dataset(BoundaryDataset::from_json_str(DATASET).unwrap())
    }

    fn grid() -> Grid {
        Grid::new(10, 10, Extent::new(0.0, 10_000.0, 0.0, 10_000.0), GridCrs::EqualArea)
    }

    fn scene(id: &str, date: &str, vv: Raster) -> Scene {
        let mut properties = BTreeMap::new();
        properties.insert("instrumentMode".to_string(), PropertyValue::Text("IW".into()));
        properties.insert(
            "transmitterReceiverPolarisation".to_string(),
            PropertyValue::List(vec!["VV".into()]),
        );
        Scene {
            id: id.into(),
            collection_id: "COPERNICUS/S1_GRD".into(),
            acquired: date.parse().unwrap(),
            properties,
            grid: grid(),
            bands: BTreeMap::from([("VV".to_string(), vv)]),
        }
    }

    /// Uniform −10 dB before; during, the central 4×4 km block drops to −15 dB.
    /// DEM is 30 m high and flat everywhere.
    fn catalog() -> SceneCatalog {
        let mut during = Raster::filled(grid(), -10.0);
        for r in 3..7 {
            for c in 3..7 {
                during.set(r, c, -15.0);
            }
        }
        let mut c = SceneCatalog::new();
        c.add_scene(scene("pre-1", "2022-06-10", Raster::filled(grid(), -10.0)));
        c.add_scene(scene("during-1", "2022-08-25", during));
        c.add_image("dem", Raster::filled(grid(), 30.0));
        c
    }

    #[test]
    fn central_block_floods_sixteen_square_km() {
        let result = FloodPipeline::new(config()).unwrap().run(&registry(), &catalog()).unwrap();

        assert_eq!(result.grid, grid());
        assert_eq!(result.flood_mask.count_true(), 16);
        let flood = &result.flood_stats;
        for quadrant in ["SW", "SE", "NW", "NE"] {
            assert_relative_eq!(flood.get(quadrant).unwrap(), 4.0, epsilon = 1e-9);
        }
        assert_relative_eq!(flood.get("Total").unwrap(), 16.0, epsilon = 1e-9);
        assert_relative_eq!(flood.region_sum(), 16.0, epsilon = 1e-9);
        let labels: Vec<&str> = flood.rows().map(|r| r.region_label.as_str()).collect();
        assert_eq!(labels, ["SW", "SE", "NW", "NE", "Total"]);
    }

    #[test]
    fn low_flat_dem_makes_whole_area_high_risk() {
        let result = FloodPipeline::new(config()).unwrap().run(&registry(), &catalog()).unwrap();
        assert_eq!(result.risk_mask().count_true(), 100);
        assert_relative_eq!(result.risk_stats.get("Total").unwrap(), 100.0, epsilon = 1e-9);
        assert_eq!(result.risk_stats.value_column, RISK_AREA_COLUMN);
    }

    #[test]
    fn missing_during_scenes_fail_the_run() {
        let mut c = SceneCatalog::new();
        c.add_scene(scene("pre-1", "2022-06-10", Raster::filled(grid(), -10.0)));
        c.add_image("dem", Raster::filled(grid(), 30.0));
        let err = FloodPipeline::new(config()).unwrap().run(&registry(), &c).unwrap_err();
        assert!(matches!(err, FloodError::EmptyCollection { .. }), "{err}");
    }

    #[test]
    fn unknown_region_fails_before_any_raster_work() {
        let mut cfg = config();
        cfg.regions.push(RegionSpec::new("Gilgit", "NAME", "Gilgit"));
        let err = FloodPipeline::new(cfg).unwrap().run(&registry(), &catalog()).unwrap_err();
        assert!(matches!(err, FloodError::RegionNotFound { .. }), "{err}");
    }

    #[test]
    fn total_row_is_optional() {
        let cfg = AnalysisConfig { include_total_row: false, ..config() };
        let result = FloodPipeline::new(cfg).unwrap().run(&registry(), &catalog()).unwrap();
        assert!(result.flood_stats.total.is_none());
        assert_eq!(result.flood_stats.rows().count(), 4);
    }

    #[test]
    fn finished_run_exports_all_artifacts() {
        let result = FloodPipeline::new(config()).unwrap().run(&registry(), &catalog()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let exporter = DirectoryExporter::new(dir.path());
        export_analysis(&result, &exporter).unwrap();
        exporter.write_summary(&result.summary()).unwrap();

        for file in [
            "Pakistan_Flood_Extent_2022.tif",
            "Pakistan_Flood_HighRisk_Zones.tif",
            "Flood_Statistics_by_Province.csv",
            "HighRisk_Statistics_by_Province.csv",
            "summary.json",
        ] {
            assert!(dir.path().join(file).is_file(), "missing {file}");
        }
        let csv = std::fs::read_to_string(dir.path().join("Flood_Statistics_by_Province.csv")).unwrap();
        assert_eq!(csv, "Province,Flood_Area_sqkm\nSW,4\nSE,4\nNW,4\nNE,4\nTotal,16\n");
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = AnalysisConfig { analysis_scale_m: -1.0, ..config() };
        assert!(matches!(FloodPipeline::new(cfg), Err(FloodError::InvalidConfig(_))));
    }
}
