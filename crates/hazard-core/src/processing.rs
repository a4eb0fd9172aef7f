/// Dataset processing: classify every candidate division of a hazardset and
/// persist the resulting outputs.
///
/// Each hazardset is one transaction. Outputs are deleted and regenerated
/// from scratch, the rasters are opened for exactly the lifetime of that
/// transaction, and the `processed` flag is only set once every division has
/// been handled. Failures are per hazardset: logged, recorded in the batch
/// report, and the batch moves on.
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use geo::{CoordsIter, Intersects, LineString, MultiPolygon, Rect};
use tracing::{error, info, warn};

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::classify::{required_roles, Classifier};
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::levels::{AdminLevel, HazardLevel, LayerRole};
use crate::model::{AdministrativeDivision, Catalog, Output, FULL_COVERAGE};
use crate::projection::to_geographic;
use crate::raster::{RasterOpener, RasterScope};
use crate::report::{BatchFailure, BatchReport, DatasetSummary};
use crate::store::{Store, Transaction};

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Restrict the batch to one hazardset.
    pub hazardset_id: Option<String>,
    /// Reprocess hazardsets already marked processed.
    pub force: bool,
    /// Compute everything, then roll back.
    pub dry_run: bool,
}

pub struct DatasetProcessor<'a> {
    store: &'a dyn Store,
    opener: &'a dyn RasterOpener,
    settings: &'a Settings,
}

impl<'a> DatasetProcessor<'a> {
    pub fn new(store: &'a dyn Store, opener: &'a dyn RasterOpener, settings: &'a Settings) -> Self {
        Self {
            store,
            opener,
            settings,
        }
    }

    /// Process every complete hazardset selected by `options`.
    ///
    /// Only a failure to read the catalog is returned as an error; failures of
    /// individual hazardsets end up in the report.
    pub fn process(&self, options: &ProcessOptions) -> EngineResult<BatchReport<DatasetSummary>> {
        let catalog = self.store.load()?;
        let mut report = BatchReport::default();

        if let Some(id) = &options.hazardset_id {
            if catalog.hazardset(id).is_none() {
                let error = EngineError::missing("hazardset", id);
                error!(hazardset = %id, error = %error, "processing failed");
                report.failures.push(BatchFailure {
                    hazardset_id: id.clone(),
                    error,
                });
                return Ok(report);
            }
        }

        let selected: Vec<String> = catalog
            .hazardsets
            .iter()
            .filter(|hs| hs.complete)
            .filter(|hs| options.hazardset_id.as_deref().map_or(true, |id| hs.id == id))
            .filter(|hs| options.force || !hs.processed)
            .map(|hs| hs.id.clone())
            .collect();
        if selected.is_empty() {
            info!("no hazardsets to process");
            return Ok(report);
        }

        for id in selected {
            match self.process_hazardset(&id, options.force, options.dry_run) {
                Ok(summary) => report.succeeded.push(summary),
                Err(error) => {
                    error!(
                        hazardset = %id,
                        division = ?error.division_code(),
                        error = %error,
                        "processing failed"
                    );
                    report.failures.push(BatchFailure {
                        hazardset_id: id,
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Classify one hazardset inside its own transaction.
    pub fn process_hazardset(&self, id: &str, force: bool, dry_run: bool) -> EngineResult<DatasetSummary> {
        let started = Instant::now();
        info!(hazardset = %id, "processing hazardset");

        let mut tx = Transaction::begin(self.store)?;
        let (divisions, outputs) = self.classify_into(tx.catalog_mut(), id, force)?;

        if dry_run {
            warn!(hazardset = %id, "dry run, rolling back");
            tx.rollback();
        } else {
            tx.commit()?;
        }

        let elapsed = started.elapsed();
        info!(
            hazardset = %id,
            divisions,
            outputs,
            elapsed_ms = elapsed.as_millis() as u64,
            "successfully processed hazardset"
        );
        Ok(DatasetSummary {
            hazardset_id: id.to_string(),
            divisions,
            outputs,
            elapsed,
            dry_run,
        })
    }

    /// Regenerate the outputs of `id` in `catalog`. Returns
    /// (candidate divisions, outputs written).
    fn classify_into(&self, catalog: &mut Catalog, id: &str, force: bool) -> EngineResult<(usize, usize)> {
        let hazardset = catalog
            .hazardset(id)
            .cloned()
            .ok_or_else(|| EngineError::missing("hazardset", id))?;
        if hazardset.processed && !force {
            return Err(EngineError::AlreadyProcessed(id.to_string()));
        }

        let type_settings = self.settings.hazard_type(&hazardset.hazard_type)?;
        type_settings.validate(&hazardset.hazard_type)?;

        catalog.delete_outputs_of(id);

        let layers = required_roles(type_settings)
            .into_iter()
            .map(|role| {
                catalog
                    .layer_by_role(id, role)
                    .map(|layer| (role, self.settings.layer_path(layer)))
                    .ok_or_else(|| EngineError::missing("layer", format!("{id}/{role}")))
            })
            .collect::<EngineResult<Vec<(LayerRole, PathBuf)>>>()?;

        let (divisions, outputs) = {
            let scope = RasterScope::open(self.opener, &layers)?;
            let classifier = Classifier::prepare(&hazardset, catalog, type_settings, &scope)?;
            let coverage = scope.coverage();

            let candidates = candidate_divisions(catalog, hazardset.local, coverage.as_ref());
            let progress = Progress::new(id, candidates.len());
            let max_window_bytes = self.settings.max_window_bytes;

            let classify_one = |(division, geometry): &(&AdministrativeDivision, MultiPolygon<f64>)| {
                let result = classify_division(&classifier, division, geometry, coverage.as_ref(), max_window_bytes);
                progress.tick();
                result.map(|level| {
                    level.map(|hazard_level| Output {
                        hazardset_id: id.to_string(),
                        division_id: division.id,
                        hazard_level,
                        coverage_ratio: FULL_COVERAGE,
                    })
                })
            };

            #[cfg(feature = "threading")]
            let outputs = candidates.par_iter().map(classify_one).collect::<EngineResult<Vec<_>>>()?;
            #[cfg(not(feature = "threading"))]
            let outputs = candidates.iter().map(classify_one).collect::<EngineResult<Vec<_>>>()?;

            (candidates.len(), outputs.into_iter().flatten().collect::<Vec<_>>())
        };

        let written = outputs.len();
        catalog.outputs.extend(outputs);
        if let Some(hs) = catalog.hazardset_mut(id) {
            hs.processed = true;
        }
        Ok((divisions, written))
    }
}

/// Finest-level divisions with usable geometry, reprojected to lon/lat.
/// Local hazardsets only keep divisions that touch the raster coverage.
fn candidate_divisions<'c>(
    catalog: &'c Catalog,
    local: bool,
    coverage: Option<&Rect<f64>>,
) -> Vec<(&'c AdministrativeDivision, MultiPolygon<f64>)> {
    catalog
        .divisions_at(AdminLevel::Region)
        .filter_map(|division| match geographic_geometry(division) {
            Ok(geometry) => Some((division, geometry)),
            Err(error) => {
                warn!(division = division.code, error = %error, "skipping division");
                None
            }
        })
        .filter(|(_, geometry)| !local || coverage.is_some_and(|c| geometry.intersects(c)))
        .collect()
}

fn geographic_geometry(division: &AdministrativeDivision) -> EngineResult<MultiPolygon<f64>> {
    let invalid = |reason: &str| EngineError::Geometry {
        code: division.code,
        reason: reason.to_string(),
    };
    let geometry = division.geometry.as_ref().ok_or_else(|| invalid("null geometry"))?;
    if geometry.0.is_empty() {
        return Err(invalid("empty geometry"));
    }
    if geometry.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(invalid("non-finite coordinates"));
    }
    let mut rings = geometry.0.iter().flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()));
    if rings.any(is_degenerate) {
        return Err(invalid("degenerate ring"));
    }
    Ok(to_geographic(geometry))
}

/// A ring needs three distinct vertices plus the closing one.
fn is_degenerate(ring: &LineString<f64>) -> bool {
    let closing = usize::from(ring.0.first() != ring.0.last());
    ring.0.len() + closing < 4
}

/// Label of one division; `None` when it lies outside the coverage or no
/// valid pixel falls inside it.
fn classify_division(
    classifier: &Classifier<'_>,
    division: &AdministrativeDivision,
    geometry: &MultiPolygon<f64>,
    coverage: Option<&Rect<f64>>,
    max_window_bytes: u64,
) -> EngineResult<Option<HazardLevel>> {
    if !coverage.is_some_and(|c| geometry.intersects(c)) {
        return Ok(None);
    }
    classifier
        .classify(geometry, max_window_bytes)
        .map_err(|e| e.in_division(division.code))
}

/// Logs every crossed multiple of 10% of the candidate divisions.
struct Progress<'a> {
    hazardset_id: &'a str,
    total: usize,
    done: AtomicUsize,
    last_percent: AtomicUsize,
}

impl<'a> Progress<'a> {
    fn new(hazardset_id: &'a str, total: usize) -> Self {
        Self {
            hazardset_id,
            total,
            done: AtomicUsize::new(0),
            last_percent: AtomicUsize::new(0),
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let percent = done * 100 / self.total.max(1);
        let decade = percent - percent % 10;
        if decade > 0 && self.last_percent.fetch_max(decade, Ordering::Relaxed) < decade {
            info!(hazardset = %self.hazardset_id, "... processed {decade}%");
        }
    }
}
