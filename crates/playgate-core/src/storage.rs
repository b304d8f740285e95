//! Persisted elapsed-time floor
//!
//! The preview gate writes its running maximum here, keyed by asset identity
//! (`{contentType}:{contentId}`), so a reload or a mirror switch starts from
//! what was already consumed. Writers always merge by maximum, which keeps
//! concurrent writers (two tabs on one asset) monotonic.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Key-value store of consumed seconds per asset
pub trait FloorStore: Send {
    fn read(&self, key: &str) -> Result<Option<f64>>;

    fn write(&mut self, key: &str, seconds: f64) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;

    /// Read-max-write; returns the value now stored
    fn merge_max(&mut self, key: &str, seconds: f64) -> Result<f64> {
        let stored = self.read(key)?;
        let merged = stored.unwrap_or(0.0).max(sanitize(seconds));
        if stored.map_or(true, |s| merged > s) {
            self.write(key, merged)?;
        }
        Ok(merged)
    }
}

/// Negative or non-finite values never reach a store
fn sanitize(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}

/// In-memory store, the degraded mode when nothing durable is available
#[derive(Debug, Clone, Default)]
pub struct MemoryFloorStore {
    values: HashMap<String, f64>,
}

impl MemoryFloorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FloorStore for MemoryFloorStore {
    fn read(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.values.get(key).copied())
    }

    fn write(&mut self, key: &str, seconds: f64) -> Result<()> {
        self.values.insert(key.to_string(), sanitize(seconds));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk
#[derive(Debug, Clone)]
pub struct JsonFileFloorStore {
    path: PathBuf,
}

impl JsonFileFloorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored floors
    pub fn entries(&self) -> Result<HashMap<String, f64>> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) if json.trim().is_empty() => Ok(HashMap::new()),
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &HashMap<String, f64>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = entries.len(), "Floor store saved");
        Ok(())
    }
}

impl FloorStore for JsonFileFloorStore {
    fn read(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.entries()?.get(key).copied())
    }

    fn write(&mut self, key: &str, seconds: f64) -> Result<()> {
        let mut entries = self.entries()?;
        entries.insert(key.to_string(), sanitize(seconds));
        self.save(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.entries()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn merge_max(&mut self, key: &str, seconds: f64) -> Result<f64> {
        let mut entries = self.entries()?;
        let stored = entries.get(key).copied();
        let merged = stored.unwrap_or(0.0).max(sanitize(seconds));
        if stored.map_or(true, |s| merged > s) {
            entries.insert(key.to_string(), merged);
            self.save(&entries)?;
        }
        Ok(merged)
    }
}

/// Shared handle, e.g. one store behind several player mounts
impl<S: FloorStore> FloorStore for Arc<Mutex<S>> {
    fn read(&self, key: &str) -> Result<Option<f64>> {
        self.lock()
            .map_err(|_| Error::Storage("floor store lock poisoned".into()))?
            .read(key)
    }

    fn write(&mut self, key: &str, seconds: f64) -> Result<()> {
        self.lock()
            .map_err(|_| Error::Storage("floor store lock poisoned".into()))?
            .write(key, seconds)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.lock()
            .map_err(|_| Error::Storage("floor store lock poisoned".into()))?
            .remove(key)
    }

    fn merge_max(&mut self, key: &str, seconds: f64) -> Result<f64> {
        self.lock()
            .map_err(|_| Error::Storage("floor store lock poisoned".into()))?
            .merge_max(key, seconds)
    }
}
