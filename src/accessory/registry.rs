// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use crate::accessory::{Accessory, AccessoryHandle};
use crate::config::AccessoryConfig;
use crate::error::Result;
use crate::host::Host;
use crate::protocol::MonitorMessage;

/// What one reconciliation pass did, by registry key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Accessories created (and registered with the host) by this pass
    pub created: Vec<String>,
    /// Accessories that already existed and were refreshed in place
    pub updated: Vec<String>,
}

/// Integration ID → accessory.
///
/// Keys are always the canonical decimal form of the integration ID, so a
/// key holds at most one accessory.
#[derive(Debug, Default)]
pub struct AccessoryRegistry {
    accessories: HashMap<String, Accessory>,
}

impl AccessoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accessory recovered from the host's cache.
    ///
    /// No host call is made; the host already knows this accessory. A second
    /// cached handle for the same integration ID replaces the first.
    pub fn configure_cached(&mut self, handle: AccessoryHandle) -> Result<String> {
        let accessory = Accessory::from_cached(handle)?;
        let key = accessory.key();
        debug!(
            "Restoring cached accessory {} ({})",
            key,
            accessory.handle().display_name
        );
        if let Some(previous) = self.accessories.insert(key.clone(), accessory) {
            warn!(
                "Duplicate cached accessory for integration ID {}; replacing '{}'",
                key,
                previous.handle().display_name
            );
        }
        Ok(key)
    }

    /// Merge configuration into the registry.
    ///
    /// Existing keys are updated in place, unknown keys are created and
    /// registered with the host in one batch. Cached accessories missing
    /// from configuration are left alone. When the same integration ID
    /// appears twice, the later entry wins.
    pub fn reconcile(&mut self, configs: &[AccessoryConfig], host: &dyn Host) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for config in configs {
            let key = config.key();
            match self.accessories.get_mut(&key) {
                Some(existing) => {
                    let changed = existing.reconfigure(config.clone());
                    trace!("Accessory {} reconciled (changed: {})", key, changed);
                    if !summary.created.contains(&key) && !summary.updated.contains(&key) {
                        summary.updated.push(key);
                    }
                }
                None => {
                    info!("Adding accessory {} ({})", key, config.name);
                    self.accessories
                        .insert(key.clone(), Accessory::create(config.clone()));
                    summary.created.push(key);
                }
            }
        }

        if !summary.created.is_empty() {
            host.register_accessories(&self.handles_for(&summary.created));
        }
        if !summary.updated.is_empty() {
            host.update_accessories(&self.handles_for(&summary.updated));
        }

        let unconfigured = self
            .accessories
            .keys()
            .filter(|k| !configs.iter().any(|c| &c.key() == *k))
            .count();
        if unconfigured > 0 {
            debug!(
                "{} cached accessories have no configuration entry; keeping them",
                unconfigured
            );
        }

        summary
    }

    /// Route a monitor message to the accessory with its integration ID.
    ///
    /// Returns whether an accessory matched. Messages for unknown IDs are
    /// dropped; the bridge reports devices this installation may not expose.
    pub fn dispatch(&mut self, message: &MonitorMessage, host: &dyn Host) -> bool {
        let Some(key) = canonical_key(&message.integration_id) else {
            return false;
        };
        match self.accessories.get_mut(&key) {
            Some(accessory) => {
                accessory.handle_action(&message.component, &message.action, host);
                true
            }
            None => {
                trace!("No accessory for integration ID {}", key);
                false
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Accessory> {
        self.accessories.get(key)
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }

    /// All host handles, ordered by integration ID.
    pub fn handles(&self) -> Vec<AccessoryHandle> {
        let mut accessories: Vec<&Accessory> = self.accessories.values().collect();
        accessories.sort_by_key(|a| a.config().integration_id);
        accessories.into_iter().map(|a| a.handle().clone()).collect()
    }

    fn handles_for(&self, keys: &[String]) -> Vec<AccessoryHandle> {
        keys.iter()
            .filter_map(|k| self.accessories.get(k))
            .map(|a| a.handle().clone())
            .collect()
    }
}

/// `"002"` → `"2"`. `None` for anything that is not a decimal u32.
fn canonical_key(integration_id: &str) -> Option<String> {
    integration_id
        .trim()
        .parse::<u32>()
        .ok()
        .map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{ButtonEvent, PicoLayout};
    use crate::host::testing::RecordingHost;

    fn test_remote() -> AccessoryConfig {
        AccessoryConfig::pico(2, "test remote", PicoLayout::ThreeButtonRaiseLower)
    }

    fn cached_handle(id: u32, name: &str) -> AccessoryHandle {
        Accessory::create(AccessoryConfig::pico(id, name, PicoLayout::TwoButton))
            .handle()
            .clone()
    }

    #[test]
    fn test_cached_then_configured_updates_in_place() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        assert_eq!(registry.configure_cached(cached_handle(2, "bogus")).unwrap(), "2");

        let summary = registry.reconcile(&[test_remote()], &host);

        assert_eq!(registry.len(), 1);
        let accessory = registry.get("2").unwrap();
        assert_eq!(accessory.handle().display_name, "test remote");
        assert_eq!(accessory.handle().services.len(), 5);
        assert_eq!(summary.created, Vec::<String>::new());
        assert_eq!(summary.updated, vec!["2".to_string()]);
        assert!(host.registrations().is_empty());
        assert_eq!(host.updates().len(), 1);
        assert_eq!(host.updates()[0][0].display_name, "test remote");
    }

    #[test]
    fn test_new_accessory_registered_once() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();

        let summary = registry.reconcile(&[test_remote()], &host);
        assert_eq!(summary.created, vec!["2".to_string()]);

        let registrations = host.registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].len(), 1);
        assert_eq!(&registrations[0][0], registry.get("2").unwrap().handle());

        // Same configuration again: no duplicate, no second registration
        let summary = registry.reconcile(&[test_remote()], &host);
        assert!(summary.created.is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(host.registrations().len(), 1);
    }

    #[test]
    fn test_registration_is_batched() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.configure_cached(cached_handle(5, "cached")).unwrap();

        registry.reconcile(
            &[
                AccessoryConfig::pico(2, "a", PicoLayout::TwoButton),
                AccessoryConfig::pico(5, "cached", PicoLayout::TwoButton),
                AccessoryConfig::keypad(7, "b", vec![1]),
            ],
            &host,
        );

        let registrations = host.registrations();
        assert_eq!(registrations.len(), 1);
        let names: Vec<&str> = registrations[0]
            .iter()
            .map(|h| h.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_unconfigured_cached_accessory_is_kept() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.configure_cached(cached_handle(40, "old")).unwrap();

        registry.reconcile(&[test_remote()], &host);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("40").unwrap().handle().display_name, "old");
    }

    #[test]
    fn test_duplicate_config_last_wins() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();

        let summary = registry.reconcile(
            &[
                AccessoryConfig::pico(2, "first", PicoLayout::TwoButton),
                AccessoryConfig::pico(2, "second", PicoLayout::ThreeButton),
            ],
            &host,
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(summary.created, vec!["2".to_string()]);
        assert!(summary.updated.is_empty());
        let registrations = host.registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].len(), 1);
        assert_eq!(registrations[0][0].display_name, "second");
        assert_eq!(registrations[0][0].services.len(), 3);
    }

    #[test]
    fn test_duplicate_cached_handle_replaces() {
        let mut registry = AccessoryRegistry::new();
        registry.configure_cached(cached_handle(2, "one")).unwrap();
        registry.configure_cached(cached_handle(2, "two")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("2").unwrap().handle().display_name, "two");
    }

    #[test]
    fn test_dispatch_to_registered_accessory() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.reconcile(&[test_remote()], &host);

        assert!(registry.dispatch(&MonitorMessage::new("2", "4", "3"), &host));
        assert!(registry.dispatch(&MonitorMessage::new("2", "4", "4"), &host));

        let presses = host.presses();
        assert_eq!(presses.len(), 1);
        assert_eq!(presses[0].button.subtype, "4");
        assert_eq!(presses[0].event, ButtonEvent::SinglePress);
    }

    #[test]
    fn test_dispatch_unknown_id_is_dropped() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.reconcile(&[test_remote()], &host);

        assert!(!registry.dispatch(&MonitorMessage::new("99", "4", "3"), &host));
        assert!(!registry.dispatch(&MonitorMessage::new("99", "4", "4"), &host));
        assert!(host.presses().is_empty());
    }

    #[test]
    fn test_dispatch_canonicalizes_id() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.reconcile(&[test_remote()], &host);

        assert!(registry.dispatch(&MonitorMessage::new("002", "2", "3"), &host));
        assert!(!registry.dispatch(&MonitorMessage::new("abc", "2", "3"), &host));
    }

    #[test]
    fn test_dispatch_state_is_per_accessory() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.reconcile(
            &[
                test_remote(),
                AccessoryConfig::pico(3, "other", PicoLayout::ThreeButtonRaiseLower),
            ],
            &host,
        );

        // Press on 2 stays pending while 3 is pressed and released
        registry.dispatch(&MonitorMessage::new("2", "2", "3"), &host);
        registry.dispatch(&MonitorMessage::new("3", "2", "3"), &host);
        registry.dispatch(&MonitorMessage::new("3", "2", "4"), &host);
        assert_eq!(host.presses().len(), 1);
        assert_eq!(host.presses()[0].integration_id, 3);

        let accessory = registry.get("2").unwrap();
        assert!(accessory.is_pressed("2"));
    }

    #[test]
    fn test_handles_sorted_by_integration_id() {
        let host = RecordingHost::default();
        let mut registry = AccessoryRegistry::new();
        registry.reconcile(
            &[
                AccessoryConfig::pico(10, "ten", PicoLayout::TwoButton),
                AccessoryConfig::pico(9, "nine", PicoLayout::TwoButton),
            ],
            &host,
        );
        let names: Vec<String> = registry.handles().into_iter().map(|h| h.display_name).collect();
        assert_eq!(names, vec!["nine", "ten"]);
    }
}
