/// Catalog persistence and transactions.
///
/// A [`Store`] loads and saves the whole [`Catalog`]. Work happens on a
/// [`Transaction`]: a private copy of the catalog that is written back by
/// [`Transaction::commit`] and discarded otherwise.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::StoreError;
use crate::model::Catalog;

pub trait Store {
    fn load(&self) -> Result<Catalog, StoreError>;

    /// Replace the persisted catalog atomically.
    fn save(&self, catalog: &Catalog) -> Result<(), StoreError>;
}

// ── Transaction ─────────────────────────────────────────────────────────────

/// A unit of work over one snapshot of the catalog.
pub struct Transaction<'s> {
    store: &'s dyn Store,
    catalog: Catalog,
}

impl<'s> Transaction<'s> {
    pub fn begin(store: &'s dyn Store) -> Result<Self, StoreError> {
        Ok(Self {
            store,
            catalog: store.load()?,
        })
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.store.save(&self.catalog)
    }

    /// Discard the working copy. Equivalent to dropping the transaction.
    pub fn rollback(self) {
        debug!("transaction rolled back");
    }
}

// ── JsonStore ───────────────────────────────────────────────────────────────

/// Catalog kept as one JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty catalog. An existing file is only replaced with `force`.
    pub fn create_empty(path: impl Into<PathBuf>, force: bool) -> Result<Self, StoreError> {
        let store = Self::new(path);
        if store.path.exists() && !force {
            return Err(StoreError::AlreadyExists(store.path.clone()));
        }
        store.save(&Catalog::default())?;
        Ok(store)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

impl Store for JsonStore {
    fn load(&self) -> Result<Catalog, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(io_error(&self.path))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(catalog)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_error(&self.path))?;
        debug!(path = %self.path.display(), "catalog saved");
        Ok(())
    }
}

// ── MemoryStore ─────────────────────────────────────────────────────────────

/// In-process catalog, used by tests and by callers that hold no file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Mutex<Catalog>,
}

impl MemoryStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Mutex::new(catalog),
        }
    }

    /// Copy of the last committed catalog.
    pub fn snapshot(&self) -> Catalog {
        self.catalog.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Catalog, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, catalog: &Catalog) -> Result<(), StoreError> {
        *self.catalog.lock().unwrap_or_else(|e| e.into_inner()) = catalog.clone();
        Ok(())
    }
}
