/// Windowed GeoTIFF access.
///
/// Georeferencing comes from ModelPixelScale + ModelTiepoint (pixel-is-area),
/// nodata from the GDAL_NODATA ASCII tag. A window read decodes only the
/// strips or tiles it overlaps; the file stays open until the reader drops.
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use super::{check_window, GeoTransform, MaskedGrid, RasterOpener, RasterReader, Window};
use crate::error::RasterError;

pub struct GeoTiffReader {
    path: PathBuf,
    decoder: Mutex<Decoder<BufReader<File>>>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    nodata: Option<f64>,
}

impl GeoTiffReader {
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let file = File::open(path).map_err(|source| RasterError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let decode = |source| RasterError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut decoder = Decoder::new(BufReader::new(file)).map_err(decode)?;
        let (width, height) = decoder.dimensions().map_err(decode)?;

        let scale = decoder.find_tag(Tag::ModelPixelScaleTag).map_err(decode)?;
        let tiepoint = decoder.find_tag(Tag::ModelTiepointTag).map_err(decode)?;
        let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
            return Err(RasterError::NotGeoreferenced(path.to_path_buf()));
        };
        let scale = scale.into_f64_vec().map_err(decode)?;
        let tiepoint = tiepoint.into_f64_vec().map_err(decode)?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(RasterError::NotGeoreferenced(path.to_path_buf()));
        }
        // Tiepoint (I, J, K, X, Y, Z): raster (I, J) sits at model (X, Y).
        let transform = GeoTransform::new(
            tiepoint[3] - tiepoint[0] * scale[0],
            tiepoint[4] + tiepoint[1] * scale[1],
            scale[0],
            scale[1],
        );

        let nodata = match decoder.find_tag(Tag::GdalNodata).map_err(decode)? {
            Some(value) => value.into_string().map_err(decode)?.trim().trim_end_matches('\0').parse::<f64>().ok(),
            None => None,
        };

        debug!(path = %path.display(), width, height, "opened raster");
        Ok(Self {
            path: path.to_path_buf(),
            decoder: Mutex::new(decoder),
            width: width as usize,
            height: height as usize,
            transform,
            nodata,
        })
    }

    fn unsupported(&self, kind: &str) -> RasterError {
        RasterError::UnsupportedSampleType {
            path: self.path.clone(),
            kind: kind.to_string(),
        }
    }

    fn to_f32(&self, chunk: DecodingResult) -> Result<Vec<f32>, RasterError> {
        let values = match chunk {
            DecodingResult::F32(v) => v,
            DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
            #[allow(unreachable_patterns)]
            _ => return Err(self.unsupported("unknown")),
        };
        Ok(values)
    }
}

impl Drop for GeoTiffReader {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "closed raster");
    }
}

impl RasterReader for GeoTiffReader {
    fn source(&self) -> &Path {
        &self.path
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
        let mut data = vec![f32::NAN; window.width * window.height];
        if window.is_empty() {
            return Ok(MaskedGrid::from_values(data, window.width, window.height, self.nodata));
        }

        let decode = |source| RasterError::Decode {
            path: self.path.clone(),
            source,
        };
        // A poisoned lock only means another division panicked mid-read; the
        // decoder itself carries no partial state between chunk reads.
        let mut decoder = self.decoder.lock().unwrap_or_else(|e| e.into_inner());

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
        let chunks_across = self.width.div_ceil(chunk_w);

        let row_end = window.row_off + window.height;
        let col_end = window.col_off + window.width;

        for chunk_row in window.row_off / chunk_h..=(row_end - 1) / chunk_h {
            for chunk_col in window.col_off / chunk_w..=(col_end - 1) / chunk_w {
                let index = (chunk_row * chunks_across + chunk_col) as u32;
                let (data_w, data_h) = decoder.chunk_data_dimensions(index);
                let (data_w, data_h) = (data_w as usize, data_h as usize);
                let values = self.to_f32(decoder.read_chunk(index).map_err(decode)?)?;
                if values.len() != data_w * data_h {
                    return Err(self.unsupported("multi-sample pixels"));
                }

                let chunk_row0 = chunk_row * chunk_h;
                let chunk_col0 = chunk_col * chunk_w;
                let r0 = window.row_off.max(chunk_row0);
                let r1 = row_end.min(chunk_row0 + data_h);
                let c0 = window.col_off.max(chunk_col0);
                let c1 = col_end.min(chunk_col0 + data_w);
                for row in r0..r1 {
                    let src = (row - chunk_row0) * data_w + (c0 - chunk_col0);
                    let dst = (row - window.row_off) * window.width + (c0 - window.col_off);
                    data[dst..dst + (c1 - c0)].copy_from_slice(&values[src..src + (c1 - c0)]);
                }
            }
        }

        Ok(MaskedGrid::from_values(data, window.width, window.height, self.nodata))
    }
}

/// Opens layer files as GeoTIFF.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoTiffOpener;

impl RasterOpener for GeoTiffOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterReader>, RasterError> {
        Ok(Box::new(GeoTiffReader::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder};

    /// Write a `width`×`height` Float32 GeoTIFF at 1° per pixel whose NW corner
    /// is (`west`, `north`); pixel (r, c) holds `r * 100 + c`.
    fn write_geotiff(path: &Path, width: u32, height: u32, west: f64, north: f64, nodata: Option<&str>) {
        let data: Vec<f32> = (0..height)
            .flat_map(|r| (0..width).map(move |c| (r * 100 + c) as f32))
            .collect();
        let mut file = File::create(path).unwrap();
        let mut tiff = TiffEncoder::new(&mut file).unwrap();
        let mut image = tiff.new_image::<colortype::Gray32Float>(width, height).unwrap();
        image.rows_per_strip(2).unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &[1.0f64, 1.0, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &[0.0f64, 0.0, 0.0, west, north, 0.0][..])
            .unwrap();
        if let Some(nodata) = nodata {
            image.encoder().write_tag(Tag::GdalNodata, nodata).unwrap();
        }
        image.write_data(&data).unwrap();
    }

    #[test]
    fn open_reads_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tif");
        write_geotiff(&path, 6, 5, 10.0, 50.0, None);

        let reader = GeoTiffReader::open(&path).unwrap();
        assert_eq!((reader.width(), reader.height()), (6, 5));
        let b = reader.bounds();
        assert_eq!((b.min().x, b.min().y, b.max().x, b.max().y), (10.0, 45.0, 16.0, 50.0));
    }

    #[test]
    fn window_spanning_several_strips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tif");
        write_geotiff(&path, 6, 5, 0.0, 5.0, None);

        let reader = GeoTiffReader::open(&path).unwrap();
        let w = Window { col_off: 2, row_off: 1, width: 3, height: 3 };
        let g = reader.read_window(&w).unwrap();
        assert_eq!(
            g.data,
            vec![102.0, 103.0, 104.0, 202.0, 203.0, 204.0, 302.0, 303.0, 304.0]
        );
        // The last strip holds a single row.
        let w = Window { col_off: 0, row_off: 4, width: 2, height: 1 };
        assert_eq!(reader.read_window(&w).unwrap().data, vec![400.0, 401.0]);
    }

    #[test]
    fn gdal_nodata_masks_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tif");
        write_geotiff(&path, 3, 1, 0.0, 1.0, Some("1"));

        let reader = GeoTiffReader::open(&path).unwrap();
        let g = reader.read_window(&Window { col_off: 0, row_off: 0, width: 3, height: 1 }).unwrap();
        assert_eq!(g.valid, vec![true, false, true]);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = GeoTiffOpener.open(Path::new("/nonexistent/layer.tif")).err().unwrap();
        assert!(matches!(err, RasterError::Open { .. }));
    }

    #[test]
    fn plain_tiff_is_not_georeferenced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let mut file = File::create(&path).unwrap();
        let mut tiff = TiffEncoder::new(&mut file).unwrap();
        tiff.write_image::<colortype::Gray8>(2, 2, &[0u8, 1, 2, 3]).unwrap();
        drop(tiff);
        assert!(matches!(GeoTiffReader::open(&path), Err(RasterError::NotGeoreferenced(_))));
    }
}
