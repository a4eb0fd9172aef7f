/// Reprojection between spherical Web Mercator (EPSG:3857), in which division
/// geometries are stored, and geographic lon/lat (EPSG:4326), in which hazard
/// rasters are georeferenced. All coordinate math uses f64.
use geo::{Coord, MapCoords, MultiPolygon, Rect};

/// WGS84 semi-major axis, the sphere radius of Web Mercator.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Web Mercator metres → (lon, lat) degrees.
pub fn mercator_to_lonlat(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    Coord { x: lon, y: lat }
}

/// (lon, lat) degrees → Web Mercator metres. Latitude must be inside ±90°.
pub fn lonlat_to_mercator(c: Coord<f64>) -> Coord<f64> {
    let x = EARTH_RADIUS_M * c.x.to_radians();
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln();
    Coord { x, y }
}

/// Reproject a stored division geometry into raster (lon/lat) space.
pub fn to_geographic(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    geometry.map_coords(mercator_to_lonlat)
}

/// Reproject a lon/lat geometry into Web Mercator.
pub fn to_mercator(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    geometry.map_coords(lonlat_to_mercator)
}

/// Intersection of two rectangles, `None` when they are disjoint.
pub fn rect_intersection(a: &Rect<f64>, b: &Rect<f64>) -> Option<Rect<f64>> {
    let min_x = a.min().x.max(b.min().x);
    let min_y = a.min().y.max(b.min().y);
    let max_x = a.max().x.min(b.max().x);
    let max_y = a.max().y.min(b.max().y);
    if min_x > max_x || min_y > max_y {
        return None;
    }
    Some(Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn origin_maps_to_origin() {
        let c = mercator_to_lonlat(Coord { x: 0.0, y: 0.0 });
        assert_abs_diff_eq!(c.x, 0.0);
        assert_abs_diff_eq!(c.y, 0.0);
    }

    #[test]
    fn antimeridian_edge_is_half_circumference() {
        let half = std::f64::consts::PI * EARTH_RADIUS_M;
        let c = mercator_to_lonlat(Coord { x: half, y: 0.0 });
        assert_abs_diff_eq!(c.x, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn roundtrip_within_tolerance() {
        let mut rng_state: u64 = 42;
        for _ in 0..1000 {
            // LCG for deterministic pseudo-random
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let lat = (rng_state as f64 / u64::MAX as f64) * 170.0 - 85.0;
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let lon = (rng_state as f64 / u64::MAX as f64) * 360.0 - 180.0;

            let back = mercator_to_lonlat(lonlat_to_mercator(Coord { x: lon, y: lat }));
            assert_abs_diff_eq!(back.x, lon, epsilon = 1e-9);
            assert_abs_diff_eq!(back.y, lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn rect_intersection_of_disjoint_rects_is_none() {
        let a = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 });
        let b = Rect::new(Coord { x: 2.0, y: 2.0 }, Coord { x: 3.0, y: 3.0 });
        assert!(rect_intersection(&a, &b).is_none());

        let c = Rect::new(Coord { x: 0.5, y: -1.0 }, Coord { x: 4.0, y: 0.5 });
        let i = rect_intersection(&a, &c).unwrap();
        assert_eq!(i.min(), Coord { x: 0.5, y: 0.0 });
        assert_eq!(i.max(), Coord { x: 1.0, y: 0.5 });
    }
}
