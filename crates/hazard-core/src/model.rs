/// Catalog records: hazardsets, layers, administrative divisions, per-dataset
/// outputs and the published division → hazard category mapping.
use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::levels::{AdminLevel, HazardLevel, LayerRole};

pub type DivisionId = u32;
pub type DivisionCode = u32;
pub type LayerId = u32;

/// Output rows carry full coverage until partial-coverage accounting exists.
pub const FULL_COVERAGE: u8 = 100;

/// A hazard-type-specific collection of layers ("hazardset").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardSet {
    /// Source identifier, e.g. `EQ-GLOBAL-GAR15`.
    pub id: String,
    /// Hazard type mnemonic, key into the settings' `hazard_types`.
    pub hazard_type: String,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub calculation_method_quality: i32,
    #[serde(default)]
    pub scientific_quality: i32,
    #[serde(default)]
    pub data_lastupdated_date: Option<NaiveDate>,
    #[serde(default)]
    pub metadata_lastupdated_date: Option<NaiveDate>,
    /// All required layers are downloaded and consistent.
    #[serde(default)]
    pub complete: bool,
    /// Classification has run.
    #[serde(default)]
    pub processed: bool,
}

/// One raster of a hazardset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub hazardset_id: String,
    pub role: LayerRole,
    /// Raster file, relative to the settings' `data_path`.
    pub file: PathBuf,
    #[serde(default)]
    pub hazard_unit: Option<String>,
    #[serde(default)]
    pub return_period: Option<u32>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub calculation_method_quality: i32,
    #[serde(default)]
    pub scientific_quality: i32,
    #[serde(default)]
    pub data_lastupdated_date: Option<NaiveDate>,
    #[serde(default)]
    pub metadata_lastupdated_date: Option<NaiveDate>,
    #[serde(default)]
    pub downloaded: bool,
}

/// A node of the administrative hierarchy. Geometry is in Web Mercator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeDivision {
    pub id: DivisionId,
    /// Stable code; parents are referenced by code, never by `id`.
    pub code: DivisionCode,
    pub level: AdminLevel,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_code: Option<DivisionCode>,
    #[serde(default)]
    pub geometry: Option<MultiPolygon<f64>>,
}

/// Raw classification of one division by one hazardset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub hazardset_id: String,
    pub division_id: DivisionId,
    pub hazard_level: HazardLevel,
    pub coverage_ratio: u8,
}

/// A (hazard type, severity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HazardCategory {
    pub hazard_type: String,
    pub hazard_level: HazardLevel,
}

/// One row of the published mapping, present at every hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCategory {
    pub division_id: DivisionId,
    pub category: HazardCategory,
    /// Hazardset the category was derived from.
    pub source: String,
}

/// The whole persisted state. Every table is a plain vector in storage order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub hazardsets: Vec<HazardSet>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub divisions: Vec<AdministrativeDivision>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub published: Vec<PublishedCategory>,
}

impl Catalog {
    pub fn hazardset(&self, id: &str) -> Option<&HazardSet> {
        self.hazardsets.iter().find(|hs| hs.id == id)
    }

    pub fn hazardset_mut(&mut self, id: &str) -> Option<&mut HazardSet> {
        self.hazardsets.iter_mut().find(|hs| hs.id == id)
    }

    /// First layer of the hazardset with the given role.
    pub fn layer_by_role(&self, hazardset_id: &str, role: LayerRole) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|l| l.hazardset_id == hazardset_id && l.role == role)
    }

    pub fn divisions_at(&self, level: AdminLevel) -> impl Iterator<Item = &AdministrativeDivision> {
        self.divisions.iter().filter(move |d| d.level == level)
    }

    pub fn division_index(&self) -> HashMap<DivisionId, &AdministrativeDivision> {
        self.divisions.iter().map(|d| (d.id, d)).collect()
    }

    pub fn delete_outputs_of(&mut self, hazardset_id: &str) -> usize {
        let before = self.outputs.len();
        self.outputs.retain(|o| o.hazardset_id != hazardset_id);
        before - self.outputs.len()
    }
}
