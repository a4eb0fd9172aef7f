/// Raster access: georeferencing, pixel windows, masked window reads and the
/// reader/opener seam the classifiers are written against.
///
/// Rasters are north-up, single band, georeferenced in lon/lat degrees.
/// Row 0 is the northern edge (TIFF storage order).
use std::fmt;
use std::path::Path;

use geo::{Coord, Rect};

use crate::error::RasterError;

pub mod geotiff;
pub mod grid;
pub mod scope;

pub use geotiff::{GeoTiffOpener, GeoTiffReader};
pub use grid::MemoryRaster;
pub use scope::RasterScope;

/// Bytes per sampled cell when estimating window memory.
pub const BYTES_PER_CELL: u64 = 4;

/// Affine transform of a north-up raster (no rotation terms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// West edge of column 0.
    pub origin_x: f64,
    /// North edge of row 0.
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows advance southwards.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Cell rectangle of pixel (`row`, `col`).
    pub fn pixel_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let x0 = self.origin_x + col as f64 * self.pixel_width;
        let y0 = self.origin_y - row as f64 * self.pixel_height;
        Rect::new(
            Coord { x: x0, y: y0 - self.pixel_height },
            Coord { x: x0 + self.pixel_width, y: y0 },
        )
    }

    /// Transform of the sub-grid starting at `window`'s offsets.
    pub fn for_window(&self, window: &Window) -> GeoTransform {
        GeoTransform {
            origin_x: self.origin_x + window.col_off as f64 * self.pixel_width,
            origin_y: self.origin_y - window.row_off as f64 * self.pixel_height,
            ..*self
        }
    }

    /// Extent of a `width` × `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.origin_x,
                y: self.origin_y - height as f64 * self.pixel_height,
            },
            Coord {
                x: self.origin_x + width as f64 * self.pixel_width,
                y: self.origin_y,
            },
        )
    }
}

/// A pixel-aligned rectangular region of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn cells(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Estimated memory for materialising this window.
    pub fn byte_size(&self) -> u64 {
        self.cells() * BYTES_PER_CELL
    }

    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.col_off + self.width <= width && self.row_off + self.height <= height
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cols {}..{} rows {}..{}",
            self.col_off,
            self.col_off + self.width,
            self.row_off,
            self.row_off + self.height
        )
    }
}

/// Window pixels plus a validity flag per pixel (false = masked out).
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedGrid {
    /// Row-major values.
    pub data: Vec<f32>,
    pub valid: Vec<bool>,
    pub width: usize,
    pub height: usize,
}

impl MaskedGrid {
    /// Build from raw values; NaN and `nodata` become invalid.
    pub fn from_values(data: Vec<f32>, width: usize, height: usize, nodata: Option<f64>) -> Self {
        let valid = data
            .iter()
            .map(|&v| !v.is_nan() && nodata.map_or(true, |nd| v != nd as f32))
            .collect();
        Self {
            data,
            valid,
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[row * self.width + col]
    }

    pub fn all_masked(&self) -> bool {
        !self.valid.iter().any(|&v| v)
    }

    /// Invalidate every pixel flagged in `excluded` (same shape).
    pub fn exclude(&mut self, excluded: &[bool]) {
        for (valid, &ex) in self.valid.iter_mut().zip(excluded) {
            if ex {
                *valid = false;
            }
        }
    }

    /// Values of the still-valid pixels.
    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data
            .iter()
            .zip(&self.valid)
            .filter_map(|(&v, &ok)| ok.then_some(v))
    }
}

/// An opened raster. Readers are shared read-only by every division of a
/// hazardset and released when dropped.
pub trait RasterReader: Send + Sync {
    /// Where the raster came from, for log lines and errors.
    fn source(&self) -> &Path;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn transform(&self) -> &GeoTransform;

    fn bounds(&self) -> Rect<f64> {
        self.transform().bounds(self.width(), self.height())
    }

    /// Read `window` with nodata pixels masked.
    fn read_window(&self, window: &Window) -> Result<MaskedGrid, RasterError>;
}

/// Opens rasters by path. The production opener reads GeoTIFF files.
pub trait RasterOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterReader>, RasterError>;
}

pub(crate) fn check_window(window: &Window, width: usize, height: usize) -> Result<(), RasterError> {
    if window.fits_within(width, height) {
        Ok(())
    } else {
        Err(RasterError::WindowOutOfBounds {
            window: window.to_string(),
            width,
            height,
        })
    }
}
