// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::accessory::{AccessoryHandle, ButtonEvent, ButtonService};
use crate::error::Result;

/// A completed button gesture, ready for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPress {
    pub accessory: Uuid,
    pub integration_id: u32,
    pub accessory_name: String,
    pub button: ButtonService,
    pub event: ButtonEvent,
}

/// The home-automation host the bridge publishes accessories to.
///
/// Calls are made synchronously from the connection task, so
/// implementations must not block for long.
pub trait Host: Send + Sync {
    /// Accessories the host has not seen before. Called at most once per
    /// reconciliation, never with an empty slice.
    fn register_accessories(&self, accessories: &[AccessoryHandle]);

    /// Previously registered accessories whose name, services or context
    /// were refreshed from configuration.
    fn update_accessories(&self, accessories: &[AccessoryHandle]);

    /// A button on an accessory was pressed.
    fn button_event(&self, press: &ButtonPress);
}

/// JSON file holding the handles the host knows about between runs.
#[derive(Debug, Clone)]
pub struct AccessoryCache {
    path: PathBuf,
}

impl AccessoryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cached handles. A missing file is an empty cache.
    pub fn load(&self) -> Result<Vec<AccessoryHandle>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No accessory cache at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let handles: Vec<AccessoryHandle> = serde_json::from_str(&text)?;
        info!(
            "Loaded {} cached accessories from {}",
            handles.len(),
            self.path.display()
        );
        Ok(handles)
    }

    /// Replace the cache contents. Writes a sibling temp file and renames it
    /// into place so a crash never leaves a truncated cache.
    pub fn save(&self, handles: &[AccessoryHandle]) -> Result<()> {
        let json = serde_json::to_string_pretty(handles)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            "Saved {} accessories to {}",
            handles.len(),
            self.path.display()
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{Accessory, PicoLayout};
    use crate::config::AccessoryConfig;

    #[test]
    fn test_missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AccessoryCache::new(dir.path().join("accessories.json"));
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AccessoryCache::new(dir.path().join("accessories.json"));
        let handles = vec![
            Accessory::create(AccessoryConfig::pico(2, "Kitchen", PicoLayout::TwoButton))
                .handle()
                .clone(),
            Accessory::create(AccessoryConfig::keypad(30, "Entry", vec![1, 2]))
                .handle()
                .clone(),
        ];
        cache.save(&handles).unwrap();
        assert_eq!(cache.load().unwrap(), handles);
        assert!(!dir.path().join("accessories.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accessories.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AccessoryCache::new(path).load().is_err());
    }
}
