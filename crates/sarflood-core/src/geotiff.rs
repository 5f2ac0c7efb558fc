//! Single-band GeoTIFF reading and writing.
//!
//! TIFF storage order: row 0 = northernmost (N→S).
//! Grid storage order: row 0 = min_y (S→N).
//! Rows are reversed on every read and write.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::error::{FloodError, Result};
use crate::grid::{Grid, GridCrs};
use crate::mask::{BinaryMask, MASK_NODATA};
use crate::raster::Raster;

// GeoTIFF / GDAL private tags.
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Decode the first band of a TIFF into a raster on `grid`.
///
/// The image dimensions must match the grid. Samples equal to `nodata`, and
/// non-finite float samples, become `NaN`.
pub fn read_band(path: &Path, grid: Grid, nodata: Option<f64>) -> Result<Raster> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    if width as usize != grid.width || height as usize != grid.height {
        return Err(FloodError::GridMismatch(format!(
            "{}: image is {width}×{height}, grid is {}×{}",
            path.display(),
            grid.width,
            grid.height
        )));
    }

    let samples: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => {
            return Err(FloodError::InvalidConfig(format!(
                "{}: unsupported pixel type",
                path.display()
            )))
        }
    };

    let cols = grid.width;
    let rows = grid.height;
    let mut data = Vec::with_capacity(cols * rows);
    for tiff_row in (0..rows).rev() {
        for &s in &samples[tiff_row * cols..(tiff_row + 1) * cols] {
            let v = if !s.is_finite() || nodata == Some(s) { f32::NAN } else { s as f32 };
            data.push(v);
        }
    }
    Ok(Raster { grid, data })
}

/// Read a byte image as `(width, height, bytes)` in image order (N→S).
pub fn read_u8_image(path: &Path) -> Result<(usize, usize, Vec<u8>)> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    match decoder.read_image()? {
        DecodingResult::U8(v) => Ok((width as usize, height as usize, v)),
        _ => Err(FloodError::InvalidConfig(format!(
            "{}: expected an 8-bit image",
            path.display()
        ))),
    }
}

/// GeoKeyDirectory entries: header, then (key, location, count, value).
fn geo_keys(crs: GridCrs) -> Vec<u16> {
    match crs {
        // ModelTypeGeographic, RasterPixelIsArea, WGS 84.
        GridCrs::Geographic => vec![1, 1, 0, 3, 1024, 0, 1, 2, 1025, 0, 1, 1, 2048, 0, 1, 4326],
        // ModelTypeProjected, RasterPixelIsArea; projection left user-defined.
        GridCrs::EqualArea => vec![1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1],
    }
}

/// Write a mask as a single-band byte GeoTIFF with `255` as GDAL no-data.
pub fn write_mask(path: &Path, mask: &BinaryMask) -> Result<()> {
    let grid = &mask.grid;
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray8>(grid.width as u32, grid.height as u32)?;

    let pixel_scale = [grid.cell_width(), grid.cell_height(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, grid.extent.min_x, grid.extent.max_y, 0.0];
    let keys = geo_keys(grid.crs);
    let nodata = MASK_NODATA.to_string();

    image.encoder().write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &pixel_scale[..])?;
    image.encoder().write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
    image.encoder().write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &keys[..])?;
    image.encoder().write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str())?;

    let mut rows = Vec::with_capacity(mask.data.len());
    for row in (0..grid.height).rev() {
        rows.extend_from_slice(&mask.data[row * grid.width..(row + 1) * grid.width]);
    }
    image.write_data(&rows)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Extent;

    #[test]
    fn mask_roundtrip_restores_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flood.tif");
        let grid = Grid::new(3, 2, Extent::new(66.0, 69.0, 24.0, 26.0), GridCrs::Geographic);
        // Row 0 (south) = [1, 0, nodata]; row 1 (north) = [0, 0, 1].
        let mask = BinaryMask { grid: grid.clone(), data: vec![1, 0, MASK_NODATA, 0, 0, 1] };
        write_mask(&path, &mask).unwrap();

        let (w, h, bytes) = read_u8_image(&path).unwrap();
        assert_eq!((w, h), (3, 2));
        // Image order is N→S.
        assert_eq!(bytes, vec![0, 0, 1, 1, 0, MASK_NODATA]);

        let back = read_band(&path, grid, Some(MASK_NODATA as f64)).unwrap();
        assert_eq!(back.get(0, 0), 1.0);
        assert!(back.get(0, 2).is_nan());
        assert_eq!(back.get(1, 2), 1.0);
    }

    #[test]
    fn read_band_rejects_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.tif");
        let grid = Grid::new(2, 2, Extent::new(0.0, 2.0, 0.0, 2.0), GridCrs::EqualArea);
        write_mask(&path, &BinaryMask { grid, data: vec![0; 4] }).unwrap();
        let other = Grid::new(3, 2, Extent::new(0.0, 3.0, 0.0, 2.0), GridCrs::EqualArea);
        assert!(matches!(read_band(&path, other, None), Err(FloodError::GridMismatch(_))));
    }
}
