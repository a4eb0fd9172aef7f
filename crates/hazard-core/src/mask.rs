/// Division masks: which pixels of a window a division geometry covers.
///
/// Work happens in pixel space, where cell (row, col) is the closed square
/// `[col, col + 1] x [row, row + 1]`. A cell touches a polygon exactly when
/// its centre lies inside the polygon or a ring segment passes through it, so
/// the mask is the union of a per-row centre fill and a walk along every ring.
use geo::{Coord, LineString, MultiPolygon};

use crate::raster::GeoTransform;

/// Rasterise `geometry` onto a `width` × `height` grid with `all_touched`
/// semantics: a pixel is inside when its cell touches the geometry at all.
///
/// Returns exclusion flags, `true` for pixels outside the geometry, ready for
/// [`MaskedGrid::exclude`](crate::raster::MaskedGrid::exclude).
pub fn outside_geometry(
    geometry: &MultiPolygon<f64>,
    transform: &GeoTransform,
    width: usize,
    height: usize,
) -> Vec<bool> {
    let mut inside = vec![false; width * height];
    for polygon in &geometry.0 {
        let rings: Vec<Vec<Coord<f64>>> = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| pixel_ring(ring, transform))
            .collect();
        fill_centres(&rings, &mut inside, width, height);
        for ring in &rings {
            for segment in ring.windows(2) {
                mark_segment(segment[0], segment[1], &mut inside, width, height);
            }
        }
    }
    inside.into_iter().map(|i| !i).collect()
}

/// Ring vertices in pixel coordinates, closed.
fn pixel_ring(ring: &LineString<f64>, t: &GeoTransform) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = ring
        .0
        .iter()
        .map(|c| Coord {
            x: (c.x - t.origin_x) / t.pixel_width,
            y: (t.origin_y - c.y) / t.pixel_height,
        })
        .collect();
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last {
            coords.push(first);
        }
    }
    coords
}

/// Even-odd fill of the cells whose centre lies inside the rings of one
/// polygon (exterior plus holes).
fn fill_centres(rings: &[Vec<Coord<f64>>], inside: &mut [bool], width: usize, height: usize) {
    let mut crossings: Vec<f64> = Vec::new();
    for row in 0..height {
        let v = row as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            for segment in ring.windows(2) {
                let (a, b) = (segment[0], segment[1]);
                if (a.y <= v) != (b.y <= v) {
                    crossings.push(a.x + (v - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            let first = (span[0] - 0.5).ceil().max(0.0);
            let last = (span[1] - 0.5).floor().min(width as f64 - 1.0);
            if first > last {
                continue;
            }
            for col in first as usize..=last as usize {
                inside[row * width + col] = true;
            }
        }
    }
}

/// Mark every cell the segment `a`-`b` passes through, one row band at a time.
fn mark_segment(a: Coord<f64>, b: Coord<f64>, inside: &mut [bool], width: usize, height: usize) {
    let Some((first_row, last_row)) = cell_span(a.y.min(b.y), a.y.max(b.y), height) else {
        return;
    };
    for row in first_row..=last_row {
        let (u0, u1) = if a.y == b.y {
            (a.x, b.x)
        } else {
            let t0 = ((row as f64 - a.y) / (b.y - a.y)).clamp(0.0, 1.0);
            let t1 = ((row as f64 + 1.0 - a.y) / (b.y - a.y)).clamp(0.0, 1.0);
            (a.x + t0 * (b.x - a.x), a.x + t1 * (b.x - a.x))
        };
        let Some((first_col, last_col)) = cell_span(u0.min(u1), u0.max(u1), width) else {
            continue;
        };
        for col in first_col..=last_col {
            inside[row * width + col] = true;
        }
    }
}

/// Indices of the closed unit cells `[i, i + 1]` meeting `[lo, hi]`, within `0..n`.
fn cell_span(lo: f64, hi: f64, n: usize) -> Option<(usize, usize)> {
    let first = (lo.ceil() - 1.0).max(0.0);
    let last = hi.floor().min(n as f64 - 1.0);
    (first <= last).then_some((first as usize, last as usize))
}
