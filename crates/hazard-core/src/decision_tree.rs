/// The decision tree: from per-hazardset outputs to one published hazard
/// category per division and hazard type, at every hierarchy level.
///
/// Runs as a single transaction in three phases:
///
/// 1. purge the published mapping;
/// 2. select, for every regional division and hazard type, the output of the
///    best hazardset according to [`SELECTION_RULES`];
/// 3. upscale level by level ([`AdminLevel::UPSCALING_ORDER`]): a parent gets
///    the most severe category among its direct children's published rows.
///
/// Phase k+1 reads only what phase k published.
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::levels::{AdminLevel, HazardLevel};
use crate::model::{Catalog, DivisionCode, DivisionId, HazardCategory, HazardSet, PublishedCategory};
use crate::store::{Store, Transaction};

// ── Selection rules ─────────────────────────────────────────────────────────

/// Hazardset attribute a selection rule compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKey {
    CalculationMethodQuality,
    ScientificQuality,
    /// `true` (local) sorts above `false` (global).
    Local,
    /// A missing date sorts below every date.
    DataLastUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One tie-break step: compare `key`, preferring the first in `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRule {
    pub key: SelectionKey,
    pub direction: Direction,
}

impl SelectionRule {
    pub const fn new(key: SelectionKey, direction: Direction) -> Self {
        Self { key, direction }
    }

    /// `Less` when `a` is preferred over `b`.
    pub fn compare(&self, a: &HazardSet, b: &HazardSet) -> Ordering {
        let ord = match self.key {
            SelectionKey::CalculationMethodQuality => a.calculation_method_quality.cmp(&b.calculation_method_quality),
            SelectionKey::ScientificQuality => a.scientific_quality.cmp(&b.scientific_quality),
            SelectionKey::Local => a.local.cmp(&b.local),
            SelectionKey::DataLastUpdated => a.data_lastupdated_date.cmp(&b.data_lastupdated_date),
        };
        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }
}

/// Priority chain for choosing the governing hazardset of a division.
pub const SELECTION_RULES: [SelectionRule; 4] = [
    SelectionRule::new(SelectionKey::CalculationMethodQuality, Direction::Descending),
    SelectionRule::new(SelectionKey::ScientificQuality, Direction::Descending),
    SelectionRule::new(SelectionKey::Local, Direction::Descending),
    SelectionRule::new(SelectionKey::DataLastUpdated, Direction::Descending),
];

/// Apply `rules` in order; hazardsets equal under all of them are ordered by
/// id so the outcome never depends on storage order.
pub fn rank(rules: &[SelectionRule], a: &HazardSet, b: &HazardSet) -> Ordering {
    rules
        .iter()
        .map(|rule| rule.compare(a, b))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

// ── Run ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionTreeSummary {
    /// Published rows removed by the purge.
    pub purged: usize,
    /// Rows published at the regional level.
    pub selected: usize,
    /// Rows published per upscaled level, in upscaling order.
    pub upscaled: Vec<(AdminLevel, usize)>,
    pub dry_run: bool,
}

/// Recompute the whole published mapping in one transaction.
pub fn apply_decision_tree(store: &dyn Store, dry_run: bool) -> EngineResult<DecisionTreeSummary> {
    let mut tx = Transaction::begin(store)?;
    let catalog = tx.catalog_mut();

    info!("purging published categories");
    let purged = catalog.published.len();
    catalog.published.clear();

    info!(level = %AdminLevel::Region, "selecting");
    let selected = select_regional(catalog, &SELECTION_RULES)?;
    let selected_count = selected.len();
    catalog.published.extend(selected);

    let mut upscaled = Vec::with_capacity(AdminLevel::UPSCALING_ORDER.len());
    for level in AdminLevel::UPSCALING_ORDER {
        info!(level = %level, "upscaling");
        let rows = upscale(catalog, level)?;
        upscaled.push((level, rows.len()));
        catalog.published.extend(rows);
    }

    if dry_run {
        warn!("dry run, rolling back decision tree");
        tx.rollback();
    } else {
        tx.commit()?;
    }

    info!(purged, selected = selected_count, upscaled = ?upscaled, "decision tree applied");
    Ok(DecisionTreeSummary {
        purged,
        selected: selected_count,
        upscaled,
        dry_run,
    })
}

/// One published row per (regional division, hazard type) present in the
/// outputs, taken from the hazardset that ranks first under `rules`.
pub fn select_regional(catalog: &Catalog, rules: &[SelectionRule]) -> EngineResult<Vec<PublishedCategory>> {
    let divisions = catalog.division_index();
    let hazardsets: HashMap<&str, &HazardSet> = catalog.hazardsets.iter().map(|hs| (hs.id.as_str(), hs)).collect();

    let mut candidates: BTreeMap<(DivisionId, &str), Vec<(&HazardSet, HazardLevel)>> = BTreeMap::new();
    for output in &catalog.outputs {
        let division = divisions
            .get(&output.division_id)
            .ok_or_else(|| EngineError::missing("division", output.division_id))?;
        if division.level != AdminLevel::Region {
            continue;
        }
        let hazardset: &HazardSet = hazardsets
            .get(output.hazardset_id.as_str())
            .copied()
            .ok_or_else(|| EngineError::missing("hazardset", &output.hazardset_id))?;
        candidates
            .entry((division.id, hazardset.hazard_type.as_str()))
            .or_default()
            .push((hazardset, output.hazard_level));
    }

    let mut published = Vec::with_capacity(candidates.len());
    for ((division_id, hazard_type), mut rows) in candidates {
        rows.sort_by(|a, b| rank(rules, a.0, b.0));
        if let Some((winner, level)) = rows.first() {
            published.push(PublishedCategory {
                division_id,
                category: HazardCategory {
                    hazard_type: hazard_type.to_string(),
                    hazard_level: *level,
                },
                source: winner.id.clone(),
            });
        }
    }
    Ok(published)
}

/// Rows for every division at `level` from the published rows of its direct
/// children: the most severe category per hazard type. Ties go to the child
/// with the smallest code, then to the smallest source id.
pub fn upscale(catalog: &Catalog, level: AdminLevel) -> EngineResult<Vec<PublishedCategory>> {
    let divisions = catalog.division_index();
    let parents: HashMap<DivisionCode, DivisionId> = catalog.divisions_at(level).map(|d| (d.code, d.id)).collect();

    type Key<'c> = (Reverse<HazardLevel>, DivisionCode, &'c str);
    let mut best: BTreeMap<(DivisionId, &str), Key<'_>> = BTreeMap::new();
    for row in &catalog.published {
        let child = divisions
            .get(&row.division_id)
            .ok_or_else(|| EngineError::missing("division", row.division_id))?;
        let Some(parent_id) = child.parent_code.and_then(|code| parents.get(&code)) else {
            continue;
        };
        let candidate = (Reverse(row.category.hazard_level), child.code, row.source.as_str());
        best.entry((*parent_id, row.category.hazard_type.as_str()))
            .and_modify(|current| {
                if candidate < *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    Ok(best
        .into_iter()
        .map(|((division_id, hazard_type), (Reverse(hazard_level), _, source))| PublishedCategory {
            division_id,
            category: HazardCategory {
                hazard_type: hazard_type.to_string(),
                hazard_level,
            },
            source: source.to_string(),
        })
        .collect())
}
