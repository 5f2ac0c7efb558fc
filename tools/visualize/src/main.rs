//! Diagnostic visualizer: renders the exported per-region table and masks
//! of a `sarflood` run as PNG images next to them.
//! Not part of the main pipeline; no tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use sarflood_core::export::{FLOOD_EXTENT_NAME, FLOOD_STATS_NAME, HIGH_RISK_NAME};
use sarflood_core::geotiff::read_u8_image;
use sarflood_core::mask::MASK_NODATA;

/// Sindh, Balochistan, Punjab, KPK in the reference chart; cycled beyond four.
const PALETTE: [[u8; 3]; 4] = [[0x2E, 0x86, 0xAB], [0xA2, 0x3B, 0x72], [0xF1, 0x8F, 0x01], [0xC7, 0x3E, 0x1D]];

const CHART_W: u32 = 800;
const CHART_H: u32 = 480;
const MARGIN: u32 = 40;

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render sarflood outputs to PNG")]
struct Args {
    /// Directory written by `sarflood`
    #[arg(short, long, default_value = "output")]
    input: PathBuf,

    /// Label of the study-area total row, excluded from the charts
    #[arg(long, default_value = "Total")]
    total_label: String,
}

// ── Table ────────────────────────────────────────────────────────────────────

fn read_table(path: &Path, total_label: &str) -> Result<Vec<(String, f64)>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let label = record.get(0).unwrap_or_default().to_string();
        if label == total_label {
            continue;
        }
        let field = record.get(1).unwrap_or_default();
        // Empty means the region had no valid observation.
        if field.is_empty() {
            eprintln!("  [warn] {label} has no data, skipping");
            continue;
        }
        let value: f64 = field
            .parse()
            .with_context(|| format!("Bad area for {label} in {}", path.display()))?;
        rows.push((label, value));
    }
    Ok(rows)
}

// ── Charts ───────────────────────────────────────────────────────────────────

fn fill_rect(img: &mut image::RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, rgb: [u8; 3]) {
    for y in y0..y1.min(img.height()) {
        for x in x0..x1.min(img.width()) {
            img.put_pixel(x, y, image::Rgb(rgb));
        }
    }
}

/// Vertical bar per region, heights relative to the largest area.
fn bar_chart(rows: &[(String, f64)]) -> image::RgbImage {
    let mut img = image::RgbImage::from_pixel(CHART_W, CHART_H, image::Rgb([255, 255, 255]));
    let max = rows.iter().map(|(_, v)| *v).fold(0.0f64, f64::max);
    let plot_h = CHART_H - 2 * MARGIN;
    let slot = (CHART_W - 2 * MARGIN) / rows.len().max(1) as u32;

    for (i, (_, v)) in rows.iter().enumerate() {
        let h = if max > 0.0 { (v / max * plot_h as f64) as u32 } else { 0 };
        let x0 = MARGIN + i as u32 * slot + slot / 6;
        let x1 = MARGIN + (i as u32 + 1) * slot - slot / 6;
        let base = CHART_H - MARGIN;
        // Black outline, then the bar colour inset by two pixels.
        if h > 0 {
            fill_rect(&mut img, x0, base - h, x1, base, [0, 0, 0]);
            fill_rect(&mut img, x0 + 2, base - h + 2, x1 - 2, base, PALETTE[i % PALETTE.len()]);
        }
    }
    // Axis.
    fill_rect(&mut img, MARGIN, CHART_H - MARGIN, CHART_W - MARGIN, CHART_H - MARGIN + 2, [0, 0, 0]);
    img
}

/// Horizontal 100 % strip: each region's share of the flooded area.
fn share_strip(rows: &[(String, f64)]) -> image::RgbImage {
    let mut img = image::RgbImage::from_pixel(CHART_W, 80, image::Rgb([255, 255, 255]));
    let total: f64 = rows.iter().map(|(_, v)| *v).sum();
    if total <= 0.0 {
        return img;
    }
    let span = (CHART_W - 2 * MARGIN) as f64;
    let mut x = MARGIN as f64;
    for (i, (_, v)) in rows.iter().enumerate() {
        let w = v / total * span;
        fill_rect(&mut img, x as u32, 20, (x + w) as u32, 60, PALETTE[i % PALETTE.len()]);
        x += w;
    }
    img
}

// ── Masks ────────────────────────────────────────────────────────────────────

/// 1 → `set`, 0 → light grey, no-data → white. TIFF rows are already N→S.
fn mask_preview(path: &Path, set: [u8; 3]) -> Result<image::RgbImage> {
    let (w, h, data) = read_u8_image(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let mut img = image::RgbImage::new(w as u32, h as u32);
    for (i, &v) in data.iter().enumerate() {
        let rgb = match v {
            1 => set,
            MASK_NODATA => [255, 255, 255],
            _ => [220, 220, 220],
        };
        img.put_pixel((i % w) as u32, (i / w) as u32, image::Rgb(rgb));
    }
    Ok(img)
}

fn save(img: &image::RgbImage, path: &Path) -> Result<()> {
    img.save(path).with_context(|| format!("Failed to save {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    let dir = &args.input;

    let rows = read_table(&dir.join(format!("{FLOOD_STATS_NAME}.csv")), &args.total_label)?;
    for (label, v) in &rows {
        println!("  {label:<24} {v:>12.1} km²");
    }
    let total: f64 = rows.iter().map(|(_, v)| *v).sum();
    println!("Total affected area: {total:.1} km²");

    save(&bar_chart(&rows), &dir.join("flood_area_by_region.png"))?;
    save(&share_strip(&rows), &dir.join("flood_share_by_region.png"))?;

    for (name, colour) in [(FLOOD_EXTENT_NAME, [0, 80, 220]), (HIGH_RISK_NAME, [220, 120, 0])] {
        let tif = dir.join(format!("{name}.tif"));
        if !tif.exists() {
            eprintln!("  [warn] {} not found, skipping", tif.display());
            continue;
        }
        save(&mask_preview(&tif, colour)?, &dir.join(format!("{name}.png")))?;
    }

    println!("Done.");
    Ok(())
}
