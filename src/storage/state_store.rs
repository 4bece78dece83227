//! Persisted UI state: a small JSON key-value file.
//!
//! Holds selected filter values (and any other view preferences callers
//! choose to keep) between sessions. The default location is
//! `~/.tabagg/state.json`. A missing file is an empty store, not an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Default state file: `~/.tabagg/state.json`.
pub fn default_state_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".tabagg").join("state.json"))
}

/// A JSON-file-backed key-value store.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    entries: BTreeMap<String, serde_json::Value>,
}

impl StateStore {
    /// Open the store at `path`, reading existing entries if the file exists.
    ///
    /// # Errors
    /// Returns [`PipelineError::State`] if the file exists but is not a JSON
    /// object, or an I/O error if it cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                PipelineError::State(format!("failed to parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize the value under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| PipelineError::State(format!("bad value for '{}': {}", key, e))),
        }
    }

    /// Store `value` under `key` (in memory; call [`save`](Self::save) to persist).
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| PipelineError::State(format!("cannot serialize '{}': {}", key, e)))?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Write all entries to disk, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| PipelineError::State(format!("cannot serialize state: {}", e)))?;
        std::fs::write(&self.path, json)?;
        log::debug!("saved {} state entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
