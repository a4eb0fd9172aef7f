/// Error types for the classification engine.
use std::path::PathBuf;

use thiserror::Error;

use crate::model::DivisionCode;

/// Settings could not be loaded or do not answer a lookup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no settings for hazard type '{0}'")]
    UnknownHazardType(String),

    #[error("hazard type '{hazard_type}': {reason}")]
    Invalid { hazard_type: String, reason: String },

    /// The threshold tree did not end on a scalar along the requested path.
    #[error("hazard type '{hazard_type}': no threshold for {path}")]
    Unresolved { hazard_type: String, path: String },

    #[error("hazard type '{hazard_type}': '{literal}' is not a number")]
    NotNumeric { hazard_type: String, literal: String },
}

/// A raster could not be opened or read.
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("cannot open raster {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode raster {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("raster {0} has no georeferencing tags")]
    NotGeoreferenced(PathBuf),

    #[error("raster {path}: unsupported sample type {kind}")]
    UnsupportedSampleType { path: PathBuf, kind: String },

    #[error("window {window} lies outside a {width}x{height} raster")]
    WindowOutOfBounds {
        window: String,
        width: usize,
        height: usize,
    },
}

/// Catalog persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("catalog I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("catalog {0} already exists")]
    AlreadyExists(PathBuf),
}

/// Engine-level failure of one work item (a hazardset, or a decision tree run).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} {id} does not exist")]
    MissingEntity { kind: &'static str, id: String },

    #[error("hazardset {0} has already been processed")]
    AlreadyProcessed(String),

    #[error("hazardset {id} is incomplete: {reason}")]
    Incomplete { id: String, reason: String },

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("division {code}: {reason}")]
    Geometry { code: DivisionCode, reason: String },

    #[error(transparent)]
    Resource(#[from] RasterError),

    /// A classification failure, annotated with the division being classified.
    #[error("while classifying division {code}: {source}")]
    Division {
        code: DivisionCode,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn missing(kind: &'static str, id: impl ToString) -> Self {
        EngineError::MissingEntity {
            kind,
            id: id.to_string(),
        }
    }

    /// Wrap `self` with the code of the division that raised it.
    pub fn in_division(self, code: DivisionCode) -> Self {
        EngineError::Division {
            code,
            source: Box::new(self),
        }
    }

    /// Code of the division a classification error was raised for.
    pub fn division_code(&self) -> Option<DivisionCode> {
        match self {
            EngineError::Division { code, .. } | EngineError::Geometry { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
