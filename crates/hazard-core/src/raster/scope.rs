use std::path::PathBuf;

use geo::Rect;
use tracing::debug;

use super::{RasterOpener, RasterReader};
use crate::error::RasterError;
use crate::levels::LayerRole;
use crate::projection::rect_intersection;

/// Every raster of one hazardset, opened together and released together.
///
/// If any open fails the readers opened so far are dropped before the error
/// is returned. Dropping the scope closes all of them, on success and error
/// paths alike.
pub struct RasterScope {
    readers: Vec<(LayerRole, Box<dyn RasterReader>)>,
}

impl RasterScope {
    pub fn open(opener: &dyn RasterOpener, layers: &[(LayerRole, PathBuf)]) -> Result<Self, RasterError> {
        let mut readers = Vec::with_capacity(layers.len());
        for (role, path) in layers {
            readers.push((*role, opener.open(path)?));
        }
        Ok(Self { readers })
    }

    pub fn get(&self, role: LayerRole) -> Option<&dyn RasterReader> {
        self.readers
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, reader)| reader.as_ref())
    }

    /// Intersection of all raster extents; `None` when empty or disjoint.
    pub fn coverage(&self) -> Option<Rect<f64>> {
        let mut readers = self.readers.iter().map(|(_, r)| r.bounds());
        let first = readers.next()?;
        readers.try_fold(first, |acc, b| rect_intersection(&acc, &b))
    }
}

impl Drop for RasterScope {
    fn drop(&mut self) {
        debug!(rasters = self.readers.len(), "releasing raster scope");
    }
}
