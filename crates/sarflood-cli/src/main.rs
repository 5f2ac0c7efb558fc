//! Flood mapping run: loads configuration, boundaries and a scene catalog,
//! runs change detection and terrain risk, and writes masks and per-region
//! tables to an output directory.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sarflood_core::catalog::SceneCatalog;
use sarflood_core::config::AnalysisConfig;
use sarflood_core::export::{export_analysis, DirectoryExporter};
use sarflood_core::pipeline::{FloodAnalysis, FloodPipeline};
use sarflood_core::regions::{BoundaryDataset, GeometryRegistry};
use sarflood_core::zonal::StatsTable;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sarflood",
    about = "Map flood extent from SAR backscatter change and summarise it per region"
)]
struct Args {
    /// Analysis configuration (JSON). Defaults reproduce the 2022 Pakistan run.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Boundary dataset (JSON) holding the configured regions
    #[arg(short, long, default_value = "data/boundaries.json")]
    boundaries: PathBuf,

    /// Scene catalog manifest (JSON) naming the GeoTIFF scenes and images
    #[arg(long, default_value = "data/catalog.json")]
    catalog: PathBuf,

    /// Output directory for GeoTIFF masks, CSV tables and summary.json
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Override the change threshold (dB)
    #[arg(long, allow_negative_numbers = true)]
    threshold_db: Option<f32>,

    /// Run the analysis without writing any artifacts
    #[arg(long)]
    skip_export: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sarflood=info,sarflood_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("Cannot load configuration {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(t) = args.threshold_db {
        config.threshold_db = t;
    }
    Ok(config)
}

fn print_table(table: &StatsTable) {
    eprintln!("  {:<24} {:>16}", "Province", table.value_column);
    for row in table.rows() {
        match row.area() {
            Some(area) => eprintln!("  {:<24} {:>16.2}", row.region_label, area),
            None => eprintln!("  {:<24} {:>16}", row.region_label, "no data"),
        }
    }
}

fn report(analysis: &FloodAnalysis) {
    eprintln!(
        "[sarflood] grid {}×{}, {} pre / {} during scenes, {} ms",
        analysis.grid.width,
        analysis.grid.height,
        analysis.pre.scene_count,
        analysis.during.scene_count,
        analysis.elapsed_ms
    );
    print_table(&analysis.flood_stats);
    print_table(&analysis.risk_stats);
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = load_config(&args)?;
    let pipeline = FloodPipeline::new(config).context("Invalid analysis configuration")?;

    let dataset = BoundaryDataset::from_json_file(&args.boundaries)
        .with_context(|| format!("Cannot load boundaries {}", args.boundaries.display()))?;
    let registry = GeometryRegistry::new(pipeline.config().merge_policy).with_dataset(dataset);

    let catalog = SceneCatalog::load_manifest(&args.catalog)
        .with_context(|| format!("Cannot load scene catalog {}", args.catalog.display()))?;

    let analysis = pipeline.run(&registry, &catalog).context("Flood analysis failed")?;
    report(&analysis);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis.summary())?);
    }

    if args.skip_export {
        info!("export skipped");
        return Ok(());
    }
    let exporter = DirectoryExporter::new(&args.output);
    export_analysis(&analysis, &exporter)
        .with_context(|| format!("Cannot export results to {}", args.output.display()))?;
    exporter
        .write_summary(&analysis.summary())
        .with_context(|| format!("Cannot write summary to {}", args.output.display()))?;
    eprintln!("[sarflood] wrote artifacts to {}", exporter.root().display());

    Ok(())
}
