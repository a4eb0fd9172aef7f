/// Discrete scales shared by every stage: hazard severity, administrative
/// hierarchy level and the role a raster layer plays inside a hazardset.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hazard severity, totally ordered from `VeryLow` (least) to `High` (most).
///
/// "No data" is never a variant: it is `Option::<HazardLevel>::None`, which
/// sorts below every `Some` and so stays the bottom of the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HazardLevel {
    #[serde(rename = "VLO")]
    VeryLow,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MED")]
    Medium,
    #[serde(rename = "HIG")]
    High,
}

impl HazardLevel {
    /// Most severe first. Classification walks levels in this order.
    pub const DESCENDING: [HazardLevel; 4] = [
        HazardLevel::High,
        HazardLevel::Medium,
        HazardLevel::Low,
        HazardLevel::VeryLow,
    ];

    /// The three threshold bands, most severe first.
    pub const BANDS: [HazardLevel; 3] = [HazardLevel::High, HazardLevel::Medium, HazardLevel::Low];

    pub fn mnemonic(self) -> &'static str {
        match self {
            HazardLevel::High => "HIG",
            HazardLevel::Medium => "MED",
            HazardLevel::Low => "LOW",
            HazardLevel::VeryLow => "VLO",
        }
    }
}

impl fmt::Display for HazardLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for HazardLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIG" => Ok(HazardLevel::High),
            "MED" => Ok(HazardLevel::Medium),
            "LOW" => Ok(HazardLevel::Low),
            "VLO" => Ok(HazardLevel::VeryLow),
            other => Err(format!("unknown hazard level '{other}'")),
        }
    }
}

/// Administrative hierarchy level, finest (`Region`) to coarsest (`Country`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdminLevel {
    #[serde(rename = "REG")]
    Region,
    #[serde(rename = "PRO")]
    Province,
    #[serde(rename = "COU")]
    Country,
}

impl AdminLevel {
    /// Levels above the base, in the order upscaling must visit them.
    pub const UPSCALING_ORDER: [AdminLevel; 2] = [AdminLevel::Province, AdminLevel::Country];

    pub fn mnemonic(self) -> &'static str {
        match self {
            AdminLevel::Region => "REG",
            AdminLevel::Province => "PRO",
            AdminLevel::Country => "COU",
        }
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// What a layer contributes to its hazardset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    /// One severity band (`HIG`, `MED` or `LOW`) of a threshold-based type.
    Band(HazardLevel),
    /// The single categorical layer of a preprocessed type.
    Preprocessed,
    /// Exclusion mask applied to every band.
    Mask,
}

impl LayerRole {
    /// Key used for this role inside a threshold tree.
    pub fn threshold_key(self) -> &'static str {
        match self {
            LayerRole::Band(level) => level.mnemonic(),
            LayerRole::Preprocessed => "VAL",
            LayerRole::Mask => "MASK",
        }
    }
}

impl fmt::Display for LayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.threshold_key())
    }
}
