/// Division classification: one administrative division, one hazardset, one
/// severity label (or none).
///
/// Two strategies exist. Preprocessed hazard types carry categorical codes in
/// a single raster; the label is the most severe level whose codes occur
/// inside the division. Threshold hazard types carry one raster per severity
/// band; the first band (most severe first) with a pixel beyond its threshold
/// inside the division wins.
///
/// Geometries passed in are already in raster coordinates (lon/lat).
use geo::{BoundingRect, MultiPolygon};

use crate::config::HazardTypeSettings;
use crate::error::{EngineError, EngineResult, RasterError};
use crate::levels::{HazardLevel, LayerRole};
use crate::mask::outside_geometry;
use crate::model::{Catalog, HazardSet};
use crate::raster::{GeoTransform, MaskedGrid, RasterReader, RasterScope, Window};
use crate::sampler::{sampling_units, window_for_bounds};
use crate::threshold::{resolve_threshold, ThresholdQuery};

/// Layer roles a hazard type needs opened, in classification order.
pub fn required_roles(settings: &HazardTypeSettings) -> Vec<LayerRole> {
    if settings.preprocessed {
        return vec![LayerRole::Preprocessed];
    }
    let mut roles: Vec<LayerRole> = HazardLevel::BANDS.iter().map(|&l| LayerRole::Band(l)).collect();
    if settings.uses_mask() {
        roles.push(LayerRole::Mask);
    }
    roles
}

/// One severity band with its resolved threshold.
pub struct Band<'a> {
    pub level: HazardLevel,
    pub reader: &'a dyn RasterReader,
    pub threshold: f64,
}

/// The exclusion mask layer with its resolved threshold.
pub struct MaskLayer<'a> {
    pub reader: &'a dyn RasterReader,
    pub threshold: f64,
}

/// A classifier bound to the open rasters of one hazardset.
pub enum Classifier<'a> {
    Preprocessed {
        reader: &'a dyn RasterReader,
        /// Recognised codes, most severe level first.
        codes: Vec<(HazardLevel, Vec<f64>)>,
    },
    Thresholds {
        /// Most severe band first.
        bands: Vec<Band<'a>>,
        mask: Option<MaskLayer<'a>>,
        inverted: bool,
    },
}

impl<'a> Classifier<'a> {
    /// Bind the hazardset's layers to their readers and resolve every
    /// threshold up front.
    pub fn prepare(
        hazardset: &HazardSet,
        catalog: &Catalog,
        settings: &HazardTypeSettings,
        scope: &'a RasterScope,
    ) -> EngineResult<Self> {
        let reader = |role: LayerRole| {
            scope
                .get(role)
                .ok_or_else(|| EngineError::missing("layer", format!("{}/{role}", hazardset.id)))
        };

        if settings.preprocessed {
            let codes = HazardLevel::DESCENDING
                .iter()
                .map(|&level| (level, settings.values_for(level).to_vec()))
                .filter(|(_, codes)| !codes.is_empty())
                .collect();
            return Ok(Classifier::Preprocessed {
                reader: reader(LayerRole::Preprocessed)?,
                codes,
            });
        }

        let threshold = |role: LayerRole| -> EngineResult<f64> {
            let layer = catalog
                .layer_by_role(&hazardset.id, role)
                .ok_or_else(|| EngineError::missing("layer", format!("{}/{role}", hazardset.id)))?;
            let query = ThresholdQuery {
                local: layer.local,
                role,
                unit: layer.hazard_unit.as_deref(),
            };
            Ok(resolve_threshold(&hazardset.hazard_type, settings, &query)?)
        };

        let mut bands = Vec::with_capacity(HazardLevel::BANDS.len());
        for level in HazardLevel::BANDS {
            let role = LayerRole::Band(level);
            bands.push(Band {
                level,
                reader: reader(role)?,
                threshold: threshold(role)?,
            });
        }
        let mask = if settings.uses_mask() {
            Some(MaskLayer {
                reader: reader(LayerRole::Mask)?,
                threshold: threshold(LayerRole::Mask)?,
            })
        } else {
            None
        };

        Ok(Classifier::Thresholds {
            bands,
            mask,
            inverted: settings.inverted_comparison,
        })
    }

    pub fn classify(&self, geometry: &MultiPolygon<f64>, max_window_bytes: u64) -> EngineResult<Option<HazardLevel>> {
        let level = match self {
            Classifier::Preprocessed { reader, codes } => classify_preprocessed(*reader, codes, geometry, max_window_bytes)?,
            Classifier::Thresholds { bands, mask, inverted } => {
                classify_thresholds(bands, mask.as_ref(), *inverted, geometry, max_window_bytes)?
            }
        };
        Ok(level)
    }
}

/// Most severe level whose codes appear among the division's valid pixels.
pub fn classify_preprocessed(
    reader: &dyn RasterReader,
    codes: &[(HazardLevel, Vec<f64>)],
    geometry: &MultiPolygon<f64>,
    max_window_bytes: u64,
) -> Result<Option<HazardLevel>, RasterError> {
    let mut best: Option<HazardLevel> = None;
    for unit in sampling_units(geometry, &[reader], max_window_bytes) {
        let Some(grid) = read_inside(reader, &unit)? else {
            continue;
        };
        for (level, values) in codes {
            if best.is_some_and(|b| b >= *level) {
                break;
            }
            if grid.valid_values().any(|v| values.contains(&f64::from(v))) {
                best = Some(*level);
                break;
            }
        }
    }
    Ok(best)
}

/// First band, most severe first, with a hazardous pixel inside the division.
/// `VeryLow` when valid pixels exist but none is hazardous.
///
/// Sampling units are chosen once against every band and the mask, so no
/// read of any of them exceeds `max_window_bytes`.
pub fn classify_thresholds(
    bands: &[Band<'_>],
    mask: Option<&MaskLayer<'_>>,
    inverted: bool,
    geometry: &MultiPolygon<f64>,
    max_window_bytes: u64,
) -> Result<Option<HazardLevel>, RasterError> {
    let mut readers: Vec<&dyn RasterReader> = bands.iter().map(|b| b.reader).collect();
    if let Some(mask) = mask {
        readers.push(mask.reader);
    }
    let units = sampling_units(geometry, &readers, max_window_bytes);
    let mut exclusions: Vec<Vec<Exclusion>> = (0..units.len()).map(|_| Vec::new()).collect();

    let mut provisional = None;
    for band in bands {
        for (unit, cached) in units.iter().zip(exclusions.iter_mut()) {
            let Some(window) = non_empty_window(band.reader, unit) else {
                continue;
            };
            let mut grid = band.reader.read_window(&window)?;
            let transform = band.reader.transform().for_window(&window);
            let found = cached.iter().position(|e| e.fits(&transform, &grid));
            let index = match found {
                Some(index) => index,
                None => {
                    let mut excluded = outside_geometry(unit, &transform, grid.width, grid.height);
                    if let Some(mask) = mask {
                        let flagged = mask_exclusion(mask, inverted, unit, &transform, &grid)?;
                        for (ex, flag) in excluded.iter_mut().zip(flagged) {
                            *ex |= flag;
                        }
                    }
                    cached.push(Exclusion {
                        transform,
                        width: grid.width,
                        height: grid.height,
                        excluded,
                    });
                    cached.len() - 1
                }
            };
            grid.exclude(&cached[index].excluded);
            if grid.all_masked() {
                continue;
            }
            if grid.valid_values().any(|v| is_hazardous(v, band.threshold, inverted)) {
                return Ok(Some(band.level));
            }
            provisional.get_or_insert(HazardLevel::VeryLow);
        }
    }
    Ok(provisional)
}

/// Pixels of one sampling unit excluded on one band grid: outside the
/// geometry or flagged by the mask. Bands on the same grid share it.
struct Exclusion {
    transform: GeoTransform,
    width: usize,
    height: usize,
    excluded: Vec<bool>,
}

impl Exclusion {
    fn fits(&self, transform: &GeoTransform, grid: &MaskedGrid) -> bool {
        self.transform == *transform && self.width == grid.width && self.height == grid.height
    }
}

fn is_hazardous(value: f32, threshold: f64, inverted: bool) -> bool {
    if inverted {
        f64::from(value) < threshold
    } else {
        f64::from(value) > threshold
    }
}

fn non_empty_window(reader: &dyn RasterReader, unit: &MultiPolygon<f64>) -> Option<Window> {
    let window = window_for_bounds(reader, &unit.bounding_rect()?);
    (!window.is_empty()).then_some(window)
}

/// Window over `unit` with everything outside it masked; `None` when no
/// valid pixel is left.
fn read_inside(reader: &dyn RasterReader, unit: &MultiPolygon<f64>) -> Result<Option<MaskedGrid>, RasterError> {
    let Some(window) = non_empty_window(reader, unit) else {
        return Ok(None);
    };
    let mut grid = reader.read_window(&window)?;
    let transform = reader.transform().for_window(&window);
    grid.exclude(&outside_geometry(unit, &transform, grid.width, grid.height));
    Ok((!grid.all_masked()).then_some(grid))
}

/// Pixels of the band grid that the mask layer flags with its own
/// threshold. Mask pixels are matched by band pixel centre, so the mask may
/// sit on a different grid than the band.
fn mask_exclusion(
    mask: &MaskLayer<'_>,
    inverted: bool,
    unit: &MultiPolygon<f64>,
    band_transform: &GeoTransform,
    band_grid: &MaskedGrid,
) -> Result<Vec<bool>, RasterError> {
    let mut excluded = vec![false; band_grid.width * band_grid.height];
    let Some(mask_window) = non_empty_window(mask.reader, unit) else {
        return Ok(excluded);
    };
    let mask_grid = mask.reader.read_window(&mask_window)?;
    let mt = mask.reader.transform().for_window(&mask_window);

    for row in 0..band_grid.height {
        for col in 0..band_grid.width {
            let centre = band_transform.pixel_rect(row, col).center();
            let mc = ((centre.x - mt.origin_x) / mt.pixel_width).floor();
            let mr = ((mt.origin_y - centre.y) / mt.pixel_height).floor();
            if mc < 0.0 || mr < 0.0 {
                continue;
            }
            let (mr, mc) = (mr as usize, mc as usize);
            if mr >= mask_grid.height || mc >= mask_grid.width || !mask_grid.is_valid(mr, mc) {
                continue;
            }
            if is_hazardous(mask_grid.get(mr, mc), mask.threshold, inverted) {
                excluded[row * band_grid.width + col] = true;
            }
        }
    }
    Ok(excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::MemoryRaster;
    use geo::polygon;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 20x20 one-degree raster over lon 0..20, lat 0..20.
    fn raster(fill: f32) -> MemoryRaster {
        MemoryRaster::new(20, 20, GeoTransform::new(0.0, 20.0, 1.0, 1.0), fill)
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    fn bands<'a>(hig: &'a MemoryRaster, med: &'a MemoryRaster, low: &'a MemoryRaster) -> Vec<Band<'a>> {
        vec![
            Band { level: HazardLevel::High, reader: hig, threshold: 1.0 },
            Band { level: HazardLevel::Medium, reader: med, threshold: 1.0 },
            Band { level: HazardLevel::Low, reader: low, threshold: 1.0 },
        ]
    }

    const MAX: u64 = 100 * 1024 * 1024;

    // ── Threshold classifier ──

    #[test]
    fn high_band_above_threshold_wins_regardless_of_lower_bands() {
        let (hig, med, low) = (raster(5.0), raster(0.0), raster(0.0));
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::High));

        let (med_hot, low_hot) = (raster(5.0), raster(5.0));
        let level = classify_thresholds(&bands(&hig, &med_hot, &low_hot), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::High));
    }

    #[test]
    fn first_hazardous_band_wins() {
        let (hig, med, low) = (raster(0.5), raster(2.0), raster(9.0));
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::Medium));
    }

    #[test]
    fn valid_but_harmless_pixels_give_very_low() {
        let (hig, med, low) = (raster(0.0), raster(0.0), raster(1.0));
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::VeryLow), "threshold comparison is strict");
    }

    #[test]
    fn hazard_outside_the_division_is_ignored() {
        let mut hig = raster(0.0);
        hig.fill_box(10.0, 10.0, 20.0, 20.0, 5.0);
        let (med, low) = (raster(0.0), raster(0.0));
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::VeryLow));
    }

    #[test]
    fn all_nodata_gives_no_label() {
        let hig = raster(-9999.0).with_nodata(-9999.0);
        let med = raster(-9999.0).with_nodata(-9999.0);
        let low = raster(f32::NAN);
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, None);
    }

    #[test]
    fn division_outside_rasters_gives_no_label() {
        let (hig, med, low) = (raster(5.0), raster(5.0), raster(5.0));
        let division = square(40.5, 40.5, 45.5, 45.5);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, None);
    }

    #[test]
    fn inverted_comparison_flags_values_below_threshold() {
        let (hig, med, low) = (raster(3.0), raster(0.5), raster(0.5));
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), None, true, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::Medium));
    }

    #[test]
    fn mask_layer_removes_flagged_pixels() {
        // HIG is hazardous only in the west half of the division, which the
        // mask flags; MED is hazardous everywhere.
        let mut hig = raster(0.0);
        hig.fill_box(0.0, 0.0, 4.0, 20.0, 5.0);
        let (med, low) = (raster(5.0), raster(0.0));
        let mut mask_raster = raster(0.0);
        mask_raster.fill_box(0.0, 0.0, 4.0, 20.0, 1.0);
        let mask = MaskLayer { reader: &mask_raster, threshold: 0.5 };

        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), Some(&mask), false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::Medium));

        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::High));
    }

    #[test]
    fn mask_nodata_excludes_nothing() {
        let (hig, med, low) = (raster(5.0), raster(0.0), raster(0.0));
        let mask_raster = raster(-1.0).with_nodata(-1.0);
        let mask = MaskLayer { reader: &mask_raster, threshold: 0.5 };
        let division = square(2.2, 2.2, 6.8, 6.8);
        let level = classify_thresholds(&bands(&hig, &med, &low), Some(&mask), false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::High));
    }

    #[test]
    fn required_roles_follow_the_hazard_type() {
        let threshold: HazardTypeSettings =
            serde_json::from_str(r#"{ "thresholds": { "m": 1 }, "mask_return_period": [50, 100] }"#).unwrap();
        assert_eq!(
            required_roles(&threshold),
            vec![
                LayerRole::Band(HazardLevel::High),
                LayerRole::Band(HazardLevel::Medium),
                LayerRole::Band(HazardLevel::Low),
                LayerRole::Mask,
            ]
        );
        let preprocessed: HazardTypeSettings =
            serde_json::from_str(r#"{ "preprocessed": true, "values": { "HIG": [1] } }"#).unwrap();
        assert_eq!(required_roles(&preprocessed), vec![LayerRole::Preprocessed]);
    }

    // ── Preprocessed classifier ──

    fn codes() -> Vec<(HazardLevel, Vec<f64>)> {
        vec![
            (HazardLevel::High, vec![103.0]),
            (HazardLevel::Medium, vec![102.0]),
            (HazardLevel::Low, vec![101.0]),
            (HazardLevel::VeryLow, vec![100.0, 0.0]),
        ]
    }

    #[test]
    fn preprocessed_picks_most_severe_code_present() {
        let mut r = raster(100.0);
        r.fill_box(3.0, 3.0, 4.0, 4.0, 102.0);
        r.fill_box(5.0, 5.0, 6.0, 6.0, 101.0);
        let division = square(2.2, 2.2, 6.8, 6.8);
        assert_eq!(
            classify_preprocessed(&r, &codes(), &division, MAX).unwrap(),
            Some(HazardLevel::Medium)
        );
    }

    #[test]
    fn preprocessed_unrecognised_codes_give_no_label() {
        let r = raster(42.0);
        let division = square(2.2, 2.2, 6.8, 6.8);
        assert_eq!(classify_preprocessed(&r, &codes(), &division, MAX).unwrap(), None);
    }

    #[test]
    fn preprocessed_single_polygon_is_one_unit() {
        let mut r = raster(0.0);
        r.fill_box(10.0, 10.0, 11.0, 11.0, 103.0);
        let division = square(9.5, 9.5, 11.5, 11.5);
        assert_eq!(
            classify_preprocessed(&r, &codes(), &division, MAX).unwrap(),
            Some(HazardLevel::High)
        );
    }

    // ── Capacity decomposition ──

    /// Two small islands on either side of the antimeridian.
    fn straddling_division() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            polygon![(x: 178.2, y: -17.8), (x: 179.8, y: -17.8), (x: 179.8, y: -16.2), (x: 178.2, y: -16.2), (x: 178.2, y: -17.8)],
            polygon![(x: -179.8, y: -17.8), (x: -178.2, y: -17.8), (x: -178.2, y: -16.2), (x: -179.8, y: -16.2), (x: -179.8, y: -17.8)],
        ])
    }

    #[test]
    fn over_capacity_division_is_classified_part_by_part() {
        let mut r = MemoryRaster::global(360, 180, 0.0);
        r.fill_box(178.0, -18.0, 180.0, -16.0, 101.0);
        r.fill_box(-180.0, -18.0, -178.0, -16.0, 103.0);
        let codes = codes();

        // Whole box: 360 x 2 cells = 2880 bytes. Each part alone fits.
        let division = straddling_division();
        assert_eq!(
            classify_preprocessed(&r, &codes, &division, 1000).unwrap(),
            Some(HazardLevel::High)
        );
        let islands_only = {
            let mut r = r.clone();
            r.fill_box(-180.0, -18.0, -178.0, -16.0, 101.0);
            r
        };
        assert_eq!(
            classify_preprocessed(&islands_only, &codes, &division, 1000).unwrap(),
            Some(HazardLevel::Low)
        );
    }

    #[test]
    fn over_capacity_threshold_division_takes_most_severe_part() {
        let mut hig = MemoryRaster::global(360, 180, 0.0);
        hig.fill_box(-180.0, -18.0, -178.0, -16.0, 5.0);
        let (med, low) = (MemoryRaster::global(360, 180, 0.0), MemoryRaster::global(360, 180, 0.0));
        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &straddling_division(), 1000).unwrap();
        assert_eq!(level, Some(HazardLevel::High));
    }

    /// Reader that remembers the largest window it was asked to read.
    struct Recording {
        raster: MemoryRaster,
        largest: AtomicU64,
    }

    impl Recording {
        fn new(raster: MemoryRaster) -> Self {
            Self { raster, largest: AtomicU64::new(0) }
        }

        fn largest(&self) -> u64 {
            self.largest.load(Ordering::SeqCst)
        }
    }

    impl RasterReader for Recording {
        fn source(&self) -> &Path {
            self.raster.source()
        }

        fn width(&self) -> usize {
            self.raster.width()
        }

        fn height(&self) -> usize {
            self.raster.height()
        }

        fn transform(&self) -> &GeoTransform {
            self.raster.transform()
        }

        fn read_window(&self, window: &Window) -> Result<MaskedGrid, RasterError> {
            self.largest.fetch_max(window.byte_size(), Ordering::SeqCst);
            self.raster.read_window(window)
        }
    }

    #[test]
    fn fine_mask_forces_decomposition_when_bands_fit() {
        let mut hig = MemoryRaster::global(360, 180, 0.0);
        hig.fill_box(-180.0, -18.0, -178.0, -16.0, 5.0);
        let (med, low) = (MemoryRaster::global(360, 180, 0.0), MemoryRaster::global(360, 180, 0.0));
        // Whole box: 2880 bytes on the band grid, over 200 KB on this
        // 0.1 degree mask strip.
        let mask_raster = Recording::new(MemoryRaster::new(3600, 60, GeoTransform::new(-180.0, -12.0, 0.1, 0.1), 0.0));
        let mask = MaskLayer { reader: &mask_raster, threshold: 0.5 };

        let level =
            classify_thresholds(&bands(&hig, &med, &low), Some(&mask), false, &straddling_division(), 10_000).unwrap();
        assert_eq!(level, Some(HazardLevel::High));
        assert!(mask_raster.largest() > 0, "mask was read");
        assert!(mask_raster.largest() <= 10_000, "largest mask read {}", mask_raster.largest());
    }

    #[test]
    fn bands_on_different_grids_are_masked_on_their_own_grid() {
        // HIG on a half degree grid, hot in the column just east of the
        // division. MED on the one degree grid, hot in a column the
        // division's east edge reaches into.
        let mut hig = MemoryRaster::new(40, 40, GeoTransform::new(0.0, 20.0, 0.5, 0.5), 0.0);
        hig.fill_box(7.0, 0.0, 7.5, 20.0, 5.0);
        let mut med = raster(0.0);
        med.fill_box(6.0, 0.0, 7.0, 20.0, 5.0);
        let low = raster(0.0);
        let division = square(2.2, 2.2, 6.8, 6.8);

        let level = classify_thresholds(&bands(&hig, &med, &low), None, false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::Medium));

        let mut mask_raster = raster(0.0);
        mask_raster.fill_box(6.0, 0.0, 7.0, 20.0, 1.0);
        let mask = MaskLayer { reader: &mask_raster, threshold: 0.5 };
        let level = classify_thresholds(&bands(&hig, &med, &low), Some(&mask), false, &division, MAX).unwrap();
        assert_eq!(level, Some(HazardLevel::VeryLow));
    }
}
