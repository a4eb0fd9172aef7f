use std::path::{Path, PathBuf};

use super::{check_window, GeoTransform, MaskedGrid, RasterReader, Window};
use crate::error::RasterError;

/// A raster held entirely in memory, row-major with row 0 at the north edge.
/// Pixel values use f32; georeferencing uses f64.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
    source: PathBuf,
}

impl MemoryRaster {
    /// Create a raster filled with the given value.
    pub fn new(width: usize, height: usize, transform: GeoTransform, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            transform,
            nodata: None,
            source: PathBuf::from("<memory>"),
        }
    }

    /// Create a whole-world raster (-180..180, -90..90) filled with `fill`.
    pub fn global(width: usize, height: usize, fill: f32) -> Self {
        let transform = GeoTransform::new(-180.0, 90.0, 360.0 / width as f64, 180.0 / height as f64);
        Self::new(width, height, transform, fill)
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    /// Set every pixel whose centre lies inside the lon/lat box.
    pub fn fill_box(&mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64, val: f32) {
        for row in 0..self.height {
            let lat = self.transform.origin_y - (row as f64 + 0.5) * self.transform.pixel_height;
            if lat < min_lat || lat > max_lat {
                continue;
            }
            for col in 0..self.width {
                let lon = self.transform.origin_x + (col as f64 + 0.5) * self.transform.pixel_width;
                if lon >= min_lon && lon <= max_lon {
                    self.set(row, col, val);
                }
            }
        }
    }
}

impl RasterReader for MemoryRaster {
    fn source(&self) -> &Path {
        &self.source
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn read_window(&self, window: &Window) -> Result<MaskedGrid, RasterError> {
        check_window(window, self.width, self.height)?;
        let mut data = Vec::with_capacity(window.width * window.height);
        for row in window.row_off..window.row_off + window.height {
            let start = row * self.width + window.col_off;
            data.extend_from_slice(&self.data[start..start + window.width]);
        }
        Ok(MaskedGrid::from_values(data, window.width, window.height, self.nodata))
    }
}
