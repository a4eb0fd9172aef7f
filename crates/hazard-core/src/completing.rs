/// Completion: decide which hazardsets are ready for classification and fold
/// their layers' metadata into the hazardset.
use tracing::{error, info, warn};

use crate::classify::required_roles;
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::model::{Catalog, Layer};
use crate::report::{BatchFailure, BatchReport};
use crate::store::{Store, Transaction};

#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    pub hazardset_id: Option<String>,
    /// Reset every hazardset to incomplete and unprocessed first.
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSummary {
    pub hazardset_id: String,
    /// Layers aggregated into the hazardset.
    pub layers: usize,
}

pub fn complete(
    store: &dyn Store,
    settings: &Settings,
    options: &CompleteOptions,
) -> EngineResult<BatchReport<CompletionSummary>> {
    if options.force {
        let mut tx = Transaction::begin(store)?;
        for hs in &mut tx.catalog_mut().hazardsets {
            hs.complete = false;
            hs.processed = false;
        }
        if options.dry_run {
            tx.rollback();
        } else {
            tx.commit()?;
        }
    }

    let catalog = store.load()?;
    let mut report = BatchReport::default();
    if let Some(id) = &options.hazardset_id {
        if catalog.hazardset(id).is_none() {
            report.failures.push(BatchFailure {
                hazardset_id: id.clone(),
                error: EngineError::missing("hazardset", id),
            });
            return Ok(report);
        }
    }

    let selected: Vec<String> = catalog
        .hazardsets
        .iter()
        .filter(|hs| options.force || !hs.complete)
        .filter(|hs| options.hazardset_id.as_deref().map_or(true, |id| hs.id == id))
        .map(|hs| hs.id.clone())
        .collect();

    for id in selected {
        let outcome = Transaction::begin(store).map_err(EngineError::from).and_then(|mut tx| {
            let layers = complete_hazardset(tx.catalog_mut(), settings, &id)?;
            if options.dry_run {
                warn!(hazardset = %id, "dry run, rolling back");
                tx.rollback();
            } else {
                tx.commit()?;
            }
            Ok(layers)
        });
        match outcome {
            Ok(layers) => {
                info!(hazardset = %id, layers, "hazardset complete");
                report.succeeded.push(CompletionSummary { hazardset_id: id, layers });
            }
            Err(error) => {
                error!(hazardset = %id, error = %error, "completion failed");
                report.failures.push(BatchFailure { hazardset_id: id, error });
            }
        }
    }
    Ok(report)
}

/// Check the required layers of `id` and aggregate them into the hazardset.
/// Returns the number of layers aggregated.
pub fn complete_hazardset(catalog: &mut Catalog, settings: &Settings, id: &str) -> EngineResult<usize> {
    let hazardset = catalog.hazardset(id).ok_or_else(|| EngineError::missing("hazardset", id))?;
    let type_settings = settings.hazard_type(&hazardset.hazard_type)?;
    let incomplete = |reason: String| EngineError::Incomplete {
        id: id.to_string(),
        reason,
    };

    let mut layers: Vec<&Layer> = Vec::new();
    for role in required_roles(type_settings) {
        let layer = catalog
            .layer_by_role(id, role)
            .ok_or_else(|| incomplete(format!("no {role} layer")))?;
        if !layer.downloaded {
            return Err(incomplete(format!("{role} layer not downloaded")));
        }
        layers.push(layer);
    }

    let local = layers.first().is_some_and(|l| l.local);
    if layers.iter().any(|l| l.local != local) {
        warn!(hazardset = %id, "layers disagree on local/global scope");
        return Err(incomplete("layers disagree on local/global scope".into()));
    }
    let calculation_method_quality = layers.iter().map(|l| l.calculation_method_quality).min();
    let scientific_quality = layers.iter().map(|l| l.scientific_quality).min();
    let data_lastupdated_date = layers.iter().filter_map(|l| l.data_lastupdated_date).min();
    let metadata_lastupdated_date = layers.iter().filter_map(|l| l.metadata_lastupdated_date).min();
    let count = layers.len();

    let hs = catalog
        .hazardset_mut(id)
        .ok_or_else(|| EngineError::missing("hazardset", id))?;
    hs.local = local;
    hs.calculation_method_quality = calculation_method_quality.unwrap_or_default();
    hs.scientific_quality = scientific_quality.unwrap_or_default();
    hs.data_lastupdated_date = data_lastupdated_date;
    hs.metadata_lastupdated_date = metadata_lastupdated_date;
    hs.complete = true;
    Ok(count)
}
