//! Switch registry persistence.
//!
//! The registry is stored as an opaque map keyed by switch id.

use crate::domain::models::SwitchDevice;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

pub type RegistryMap = BTreeMap<String, SwitchDevice>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("registry I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load/save contract for the switch registry.
pub trait RegistryStorage: Send {
    /// An empty map means nothing has been saved yet.
    fn load(&self) -> Result<RegistryMap, StorageError>;
    fn save(&mut self, devices: &RegistryMap) -> Result<(), StorageError>;
}

/// JSON file next to the settings file.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RegistryStorage for JsonFileStorage {
    fn load(&self) -> Result<RegistryMap, StorageError> {
        if !self.path.exists() {
            return Ok(RegistryMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(RegistryMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&mut self, devices: &RegistryMap) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(devices)?;
        fs::write(&self.path, json)?;
        debug!("Saved {} switches to {}", devices.len(), self.path.display());
        Ok(())
    }
}

/// In-memory storage; clones share the same map.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryStorage {
    devices: Arc<Mutex<RegistryMap>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: RegistryMap) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
        }
    }

    pub fn snapshot(&self) -> RegistryMap {
        self.devices
            .lock()
            .map(|devices| devices.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl RegistryStorage for MemoryStorage {
    fn load(&self) -> Result<RegistryMap, StorageError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, devices: &RegistryMap) -> Result<(), StorageError> {
        if let Ok(mut stored) = self.devices.lock() {
            *stored = devices.clone();
        }
        Ok(())
    }
}
