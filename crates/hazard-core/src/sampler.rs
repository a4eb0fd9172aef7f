/// Window sampling: bounding boxes to pixel windows, and the memory ceiling
/// that forces multi-part geometries to be sampled one polygon at a time.
use geo::{BoundingRect, MultiPolygon, Rect};
use tracing::debug;

use crate::raster::{RasterReader, Window};

/// Smallest pixel-aligned window covering `bounds`, clipped to the raster.
/// Empty when the box lies outside the raster.
pub fn window_for_bounds(reader: &dyn RasterReader, bounds: &Rect<f64>) -> Window {
    let t = reader.transform();
    let clamp = |v: f64, max: usize| v.clamp(0.0, max as f64) as usize;

    let col_off = clamp(((bounds.min().x - t.origin_x) / t.pixel_width).floor(), reader.width());
    let col_end = clamp(((bounds.max().x - t.origin_x) / t.pixel_width).ceil(), reader.width());
    let row_off = clamp(((t.origin_y - bounds.max().y) / t.pixel_height).floor(), reader.height());
    let row_end = clamp(((t.origin_y - bounds.min().y) / t.pixel_height).ceil(), reader.height());

    Window {
        col_off,
        row_off,
        width: col_end.saturating_sub(col_off),
        height: row_end.saturating_sub(row_off),
    }
}

/// Whether materialising `window` would exceed `max_bytes`.
pub fn exceeds_capacity(window: &Window, max_bytes: u64) -> bool {
    window.byte_size() > max_bytes
}

/// The geometries to sample for one division against a set of rasters read
/// together (the bands of a hazardset plus its mask).
///
/// Normally the whole geometry, as a single unit. When the widest window any
/// of `readers` would need exceeds `max_bytes` (typically a division
/// straddling the antimeridian, whose box spans the globe) each polygon part
/// becomes its own unit.
pub fn sampling_units(
    geometry: &MultiPolygon<f64>,
    readers: &[&dyn RasterReader],
    max_bytes: u64,
) -> Vec<MultiPolygon<f64>> {
    let Some(bounds) = geometry.bounding_rect() else {
        return Vec::new();
    };
    let widest = readers
        .iter()
        .map(|&reader| (reader, window_for_bounds(reader, &bounds)))
        .max_by_key(|(_, window)| window.byte_size());
    let Some((reader, window)) = widest else {
        return vec![geometry.clone()];
    };
    if !exceeds_capacity(&window, max_bytes) {
        return vec![geometry.clone()];
    }
    debug!(
        raster = %reader.source().display(),
        window = %window,
        bytes = window.byte_size(),
        parts = geometry.0.len(),
        "window over capacity, sampling polygon parts"
    );
    geometry
        .0
        .iter()
        .map(|polygon| MultiPolygon::new(vec![polygon.clone()]))
        .collect()
}
