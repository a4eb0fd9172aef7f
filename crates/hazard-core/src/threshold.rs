/// Threshold resolution over a hazard type's threshold tree.
///
/// The tree's depth and branching keys differ per hazard type. At every inner
/// node the resolver detects which discriminator the node branches on and
/// descends along the caller's value for it:
///
/// ```text
/// { "local": …, "global": … }          -> Scope
/// { "HIG": …, "MED": …, "LOW": … }     -> Level   (also "MASK")
/// { "m": …, "cm": … }                  -> Unit
/// ```
use std::collections::BTreeMap;

use crate::config::{ConfigNode, HazardTypeSettings};
use crate::error::ConfigError;
use crate::levels::LayerRole;

/// What an inner node of a threshold tree branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminator {
    Scope,
    Level,
    Unit,
}

const SCOPE_KEYS: [&str; 2] = ["local", "global"];
const LEVEL_KEYS: [&str; 5] = ["HIG", "MED", "LOW", "VLO", "MASK"];

impl Discriminator {
    /// Check the keys of `branch`, scope first, then level, then unit.
    pub fn detect(branch: &BTreeMap<String, ConfigNode>, unit: Option<&str>) -> Option<Self> {
        if SCOPE_KEYS.iter().any(|k| branch.contains_key(*k)) {
            Some(Discriminator::Scope)
        } else if LEVEL_KEYS.iter().any(|k| branch.contains_key(*k)) {
            Some(Discriminator::Level)
        } else if unit.is_some_and(|u| branch.contains_key(u)) {
            Some(Discriminator::Unit)
        } else {
            None
        }
    }
}

/// The caller's side of a lookup: one value per possible discriminator.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdQuery<'a> {
    pub local: bool,
    pub role: LayerRole,
    pub unit: Option<&'a str>,
}

impl<'a> ThresholdQuery<'a> {
    fn key(&self, discriminator: Discriminator) -> &'a str {
        match discriminator {
            Discriminator::Scope => {
                if self.local {
                    "local"
                } else {
                    "global"
                }
            }
            Discriminator::Level => self.role.threshold_key(),
            Discriminator::Unit => self.unit.unwrap_or_default(),
        }
    }
}

/// Resolve the numeric threshold for `query` in the tree of `hazard_type`.
pub fn resolve_threshold(
    hazard_type: &str,
    settings: &HazardTypeSettings,
    query: &ThresholdQuery<'_>,
) -> Result<f64, ConfigError> {
    let mut path: Vec<&str> = Vec::new();
    let unresolved = |path: &[&str]| ConfigError::Unresolved {
        hazard_type: hazard_type.to_string(),
        path: if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join("/")
        },
    };

    let mut node = settings.thresholds.as_ref().ok_or_else(|| unresolved(&path))?;
    loop {
        match node {
            ConfigNode::Number(value) => return Ok(*value),
            ConfigNode::Text(literal) => {
                return literal.trim().parse::<f64>().map_err(|_| ConfigError::NotNumeric {
                    hazard_type: hazard_type.to_string(),
                    literal: literal.clone(),
                })
            }
            ConfigNode::Branch(branch) => {
                let discriminator =
                    Discriminator::detect(branch, query.unit).ok_or_else(|| unresolved(&path))?;
                let key = query.key(discriminator);
                path.push(key);
                node = branch.get(key).ok_or_else(|| unresolved(&path))?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::HazardLevel;
    use approx::assert_relative_eq;

    fn settings(thresholds: &str) -> HazardTypeSettings {
        HazardTypeSettings {
            hazard_type: "test".into(),
            preprocessed: false,
            inverted_comparison: false,
            mask_return_period: None,
            thresholds: Some(serde_json::from_str(thresholds).unwrap()),
            values: BTreeMap::new(),
        }
    }

    fn query(local: bool, level: HazardLevel, unit: &str) -> ThresholdQuery<'_> {
        ThresholdQuery {
            local,
            role: LayerRole::Band(level),
            unit: Some(unit),
        }
    }

    #[test]
    fn unit_only_tree() {
        let s = settings(r#"{ "PGA-g": "0.3", "cm/s2": 300 }"#);
        let t = resolve_threshold("EQ", &s, &query(false, HazardLevel::High, "cm/s2")).unwrap();
        assert_relative_eq!(t, 300.0);
        let t = resolve_threshold("EQ", &s, &query(true, HazardLevel::Low, "PGA-g")).unwrap();
        assert_relative_eq!(t, 0.3);
    }

    #[test]
    fn scope_then_level_then_unit() {
        let s = settings(
            r#"{ "global": { "HIG": { "m": 1.0 }, "MED": { "m": 0.5 }, "LOW": { "m": 0.2 } },
                 "local":  { "m": 0.1 } }"#,
        );
        let t = resolve_threshold("FL", &s, &query(false, HazardLevel::Medium, "m")).unwrap();
        assert_relative_eq!(t, 0.5);
        // The local branch has no level split; the level is simply not consulted.
        let t = resolve_threshold("FL", &s, &query(true, HazardLevel::Medium, "m")).unwrap();
        assert_relative_eq!(t, 0.1);
    }

    #[test]
    fn mask_role_uses_mask_key() {
        let s = settings(r#"{ "HIG": 3, "MED": 2, "LOW": 1, "MASK": 0.5 }"#);
        let q = ThresholdQuery {
            local: false,
            role: LayerRole::Mask,
            unit: None,
        };
        assert_relative_eq!(resolve_threshold("FL", &s, &q).unwrap(), 0.5);
    }

    #[test]
    fn missing_branch_reports_the_path() {
        let s = settings(r#"{ "global": { "HIG": { "m": 1.0 } } }"#);
        let err = resolve_threshold("FL", &s, &query(false, HazardLevel::Low, "m")).unwrap_err();
        match err {
            ConfigError::Unresolved { path, .. } => assert_eq!(path, "global/LOW"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_unit_is_unresolved() {
        let s = settings(r#"{ "m": 1.0 }"#);
        let err = resolve_threshold("FL", &s, &query(false, HazardLevel::High, "ft")).unwrap_err();
        assert!(matches!(err, ConfigError::Unresolved { .. }));
    }

    #[test]
    fn non_numeric_literal_is_rejected() {
        let s = settings(r#"{ "m": "deep" }"#);
        let err = resolve_threshold("FL", &s, &query(false, HazardLevel::High, "m")).unwrap_err();
        assert!(matches!(err, ConfigError::NotNumeric { literal, .. } if literal == "deep"));
    }

    #[test]
    fn absent_tree_is_unresolved_at_root() {
        let mut s = settings("1");
        s.thresholds = None;
        let err = resolve_threshold("FL", &s, &query(false, HazardLevel::High, "m")).unwrap_err();
        assert!(matches!(err, ConfigError::Unresolved { path, .. } if path == "<root>"));
    }
}
