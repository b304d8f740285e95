//! Preview floors in `localStorage`

use playgate_core::{Error, FloorStore, Result};

/// Floor store backed by the page's `localStorage`.
///
/// Entries are keyed `{contentType}:{contentId}`. `with_prefix` namespaces
/// them when the origin hosts other players. Holds no JS handles so it can live inside the player; the storage object
/// is looked up on every access.
#[derive(Debug, Clone)]
pub struct LocalStorageFloorStore {
    prefix: String,
}

impl LocalStorageFloorStore {
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn storage(&self) -> Result<web_sys::Storage> {
        web_sys::window()
            .ok_or_else(|| Error::Storage("no window".into()))?
            .local_storage()
            .map_err(|_| Error::Storage("localStorage is not accessible".into()))?
            .ok_or_else(|| Error::Storage("localStorage is unavailable".into()))
    }
}

impl Default for LocalStorageFloorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FloorStore for LocalStorageFloorStore {
    fn read(&self, key: &str) -> Result<Option<f64>> {
        let raw = self
            .storage()?
            .get_item(&self.key(key))
            .map_err(|_| Error::Storage("localStorage read failed".into()))?;
        // Unparseable values count as absent
        Ok(raw
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0))
    }

    fn write(&mut self, key: &str, seconds: f64) -> Result<()> {
        self.storage()?
            .set_item(&self.key(key), &format!("{}", seconds.max(0.0)))
            .map_err(|_| Error::Storage("localStorage write failed (quota or private mode)".into()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.storage()?
            .remove_item(&self.key(key))
            .map_err(|_| Error::Storage("localStorage remove failed".into()))
    }
}
