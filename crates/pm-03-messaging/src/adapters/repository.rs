//! # Repository Adapters
//!
//! `JsonFileRepository` writes one JSON document per file, replacing it
//! atomically via a sibling temp file. `InMemoryRepository` is for tests and
//! ephemeral sessions.

use crate::domain::errors::StoreError;
use crate::ports::Repository;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON document stored in a single file.
#[derive(Debug)]
pub struct JsonFileRepository<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileRepository<T> {
    /// Repository backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: &std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

impl<T> Repository<T> for JsonFileRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>, StoreError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&e)),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| StoreError::Serde(e.to_string()))
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(&e))?;
        }
        let content =
            serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serde(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| self.io_error(&e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(&e))?;
        debug!(path = %self.path.display(), "Saved document");
        Ok(())
    }
}

/// In-process repository.
#[derive(Debug)]
pub struct InMemoryRepository<T> {
    slot: RwLock<Option<T>>,
}

impl<T> InMemoryRepository<T> {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Repository pre-seeded with `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Clone + Send + Sync,
{
    fn load(&self) -> Result<Option<T>, StoreError> {
        Ok(self.slot.read().clone())
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        *self.slot.write() = Some(value.clone());
        Ok(())
    }
}
