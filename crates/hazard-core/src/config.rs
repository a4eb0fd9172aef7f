/// Settings document: per-hazard-type processing rules plus engine knobs.
///
/// Loaded from JSON. A deployment may layer a local override file on top of
/// the main one; top-level keys of the override replace those of the main file.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::levels::HazardLevel;
use crate::model::Layer;

/// Window reads above this many bytes are split per polygon part (100 MiB).
pub const DEFAULT_MAX_WINDOW_BYTES: u64 = 100 * 1024 * 1024;

/// A node of a threshold tree. Leaves are numbers or numeric literals;
/// inner nodes branch on scope, severity band or unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigNode {
    Number(f64),
    Text(String),
    Branch(BTreeMap<String, ConfigNode>),
}

/// A single return period or an inclusive range of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReturnPeriod {
    Exact(u32),
    Range([u32; 2]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardTypeSettings {
    /// Long name of the hazard type, e.g. `river_flood`.
    #[serde(default)]
    pub hazard_type: String,
    /// Pixel values are already categorical codes.
    #[serde(default)]
    pub preprocessed: bool,
    /// Smaller values are worse (hazard when below the threshold).
    #[serde(default)]
    pub inverted_comparison: bool,
    /// When set, a mask layer is required and applied to every band.
    #[serde(default)]
    pub mask_return_period: Option<ReturnPeriod>,
    #[serde(default)]
    pub thresholds: Option<ConfigNode>,
    /// Recognised codes per severity level, preprocessed types only.
    #[serde(default)]
    pub values: BTreeMap<HazardLevel, Vec<f64>>,
}

impl HazardTypeSettings {
    /// Reject settings that cannot drive a classifier.
    pub fn validate(&self, mnemonic: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            hazard_type: mnemonic.to_string(),
            reason: reason.to_string(),
        };
        if self.preprocessed {
            if self.values.is_empty() {
                return Err(invalid("preprocessed type without 'values'"));
            }
        } else if self.thresholds.is_none() {
            return Err(invalid("threshold type without 'thresholds'"));
        }
        Ok(())
    }

    /// Codes recognised for `level`, empty when the level is not configured.
    pub fn values_for(&self, level: HazardLevel) -> &[f64] {
        self.values.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn uses_mask(&self) -> bool {
        self.mask_return_period.is_some()
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/hazardsets")
}

fn default_max_window_bytes() -> u64 {
    DEFAULT_MAX_WINDOW_BYTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory layer files are resolved against.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_max_window_bytes")]
    pub max_window_bytes: u64,
    #[serde(default)]
    pub hazard_types: BTreeMap<String, HazardTypeSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            max_window_bytes: DEFAULT_MAX_WINDOW_BYTES,
            hazard_types: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load `main`, then apply the top-level keys of `local` if that file exists.
    pub fn load_with_local(main: &Path, local: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = read_json(main)?;
        if let Some(local) = local.filter(|p| p.exists()) {
            let overrides = read_json(local)?;
            if let (Some(base), serde_json::Value::Object(over)) = (merged.as_object_mut(), overrides) {
                base.extend(over);
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn hazard_type(&self, mnemonic: &str) -> Result<&HazardTypeSettings, ConfigError> {
        self.hazard_types
            .get(mnemonic)
            .ok_or_else(|| ConfigError::UnknownHazardType(mnemonic.to_string()))
    }

    pub fn layer_path(&self, layer: &Layer) -> PathBuf {
        self.data_path.join(&layer.file)
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}
