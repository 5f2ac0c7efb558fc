//! Hand-off of result artifacts. The core never waits on delivery; callers
//! decide what to export and where.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::geotiff;
use crate::mask::BinaryMask;
use crate::pipeline::{AnalysisSummary, FloodAnalysis};
use crate::zonal::StatsTable;

pub const FLOOD_EXTENT_NAME: &str = "Pakistan_Flood_Extent_2022";
pub const HIGH_RISK_NAME: &str = "Pakistan_Flood_HighRisk_Zones";
pub const FLOOD_STATS_NAME: &str = "Flood_Statistics_by_Province";
pub const RISK_STATS_NAME: &str = "HighRisk_Statistics_by_Province";
pub const SUMMARY_FILE: &str = "summary.json";

/// Destination for masks and statistics tables.
pub trait ResultExporter {
    fn export_mask(&self, name: &str, mask: &BinaryMask) -> Result<()>;
    fn export_table(&self, name: &str, table: &StatsTable) -> Result<()>;
}

/// Writes `<name>.tif` for masks and `<name>.csv` for tables under one
/// directory, created on first use.
#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    root: PathBuf,
}

impl DirectoryExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str, ext: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        Ok(self.root.join(format!("{name}.{ext}")))
    }

    pub fn write_summary(&self, summary: &AnalysisSummary) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(SUMMARY_FILE);
        let mut out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut out, summary)?;
        out.flush()?;
        Ok(path)
    }
}

impl ResultExporter for DirectoryExporter {
    fn export_mask(&self, name: &str, mask: &BinaryMask) -> Result<()> {
        let path = self.path_for(name, "tif")?;
        geotiff::write_mask(&path, mask)?;
        info!(path = %path.display(), set = mask.count_true(), "exported mask");
        Ok(())
    }

    fn export_table(&self, name: &str, table: &StatsTable) -> Result<()> {
        let path = self.path_for(name, "csv")?;
        table.write_csv(BufWriter::new(File::create(&path)?))?;
        info!(path = %path.display(), rows = table.rows().count(), "exported table");
        Ok(())
    }
}

/// Both masks and both tables of a finished run.
pub fn export_analysis(analysis: &FloodAnalysis, exporter: &dyn ResultExporter) -> Result<()> {
    exporter.export_mask(FLOOD_EXTENT_NAME, &analysis.flood_mask)?;
    exporter.export_mask(HIGH_RISK_NAME, analysis.risk_mask())?;
    exporter.export_table(FLOOD_STATS_NAME, &analysis.flood_stats)?;
    exporter.export_table(RISK_STATS_NAME, &analysis.risk_stats)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extent, Grid, GridCrs};
    use crate::zonal::{ZonalRecord, FLOOD_AREA_COLUMN};

    fn row(label: &str, area_sq_km: f64) -> ZonalRecord {
        ZonalRecord { region_label: label.into(), area_sq_km, pixels: 40, valid_pixels: 40 }
    }

    fn table() -> StatsTable {
        StatsTable {
            value_column: FLOOD_AREA_COLUMN.into(),
            records: vec![row("Sindh", 12.5), row("Punjab", 3.0)],
            total: Some(row("Total", 15.5)),
        }
    }

    fn mask() -> BinaryMask {
        let grid = Grid::new(3, 2, Extent::new(60.0, 63.0, 24.0, 26.0), GridCrs::Geographic);
        BinaryMask::from_states(grid, [Some(true), Some(false), None, Some(false), Some(true), Some(true)])
    }

    #[test]
    fn directory_exporter_writes_tiff_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DirectoryExporter::new(dir.path().join("out"));
        assert_eq!(exporter.root(), dir.path().join("out"));

        exporter.export_mask("extent", &mask()).unwrap();
        exporter.export_table("stats", &table()).unwrap();

        let (w, h, data) = geotiff::read_u8_image(&dir.path().join("out/extent.tif")).unwrap();
        assert_eq!((w, h), (3, 2));
        // North row first on disk.
        assert_eq!(data, vec![0, 1, 1, 1, 0, 255]);

        let csv = fs::read_to_string(dir.path().join("out/stats.csv")).unwrap();
        assert_eq!(csv, "Province,Flood_Area_sqkm\nSindh,12.5\nPunjab,3\nTotal,15.5\n");
    }

    #[test]
    fn summary_json_carries_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DirectoryExporter::new(dir.path());
        let summary = AnalysisSummary {
            grid_width: 3,
            grid_height: 2,
            pre_scenes: 4,
            during_scenes: 9,
            flooded_pixels: 3,
            high_risk_pixels: 0,
            flood_stats: table(),
            risk_stats: table(),
            elapsed_ms: 12,
        };
        let path = exporter.write_summary(&summary).unwrap();
        assert_eq!(path, dir.path().join(SUMMARY_FILE));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["during_scenes"], 9);
        assert_eq!(json["flood_stats"]["total"]["area_sq_km"], 15.5);
        assert_eq!(json["flood_stats"]["records"][0]["region_label"], "Sindh");
        assert_eq!(json["flood_stats"]["records"][0]["valid_pixels"], 40);
    }
}
