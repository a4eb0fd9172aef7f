//! Hazard classification and aggregation engine.
//!
//! Turns gridded hazard rasters into one severity label per administrative
//! division and hazardset ([`processing`]), then resolves competing
//! hazardsets and rolls severities up the administrative hierarchy
//! ([`decision_tree`]).

pub mod classify;
pub mod completing;
pub mod config;
pub mod decision_tree;
pub mod error;
pub mod levels;
pub mod mask;
pub mod model;
pub mod processing;
pub mod projection;
pub mod raster;
pub mod report;
pub mod sampler;
pub mod store;
pub mod telemetry;
pub mod threshold;

pub use config::Settings;
pub use decision_tree::{apply_decision_tree, DecisionTreeSummary};
pub use error::{ConfigError, EngineError, EngineResult, RasterError, StoreError};
pub use levels::{AdminLevel, HazardLevel, LayerRole};
pub use model::Catalog;
pub use processing::{DatasetProcessor, ProcessOptions};
pub use report::{BatchReport, DatasetSummary};
pub use store::{JsonStore, MemoryStore, Store, Transaction};
