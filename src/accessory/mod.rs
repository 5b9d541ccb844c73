// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

pub mod button;
pub mod layout;
pub mod registry;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::AccessoryConfig;
use crate::error::{BridgeError, Result};
use crate::host::{ButtonPress, Host};

pub use button::{ButtonAction, ButtonEvent, ButtonState};
pub use layout::PicoLayout;
pub use registry::{AccessoryRegistry, ReconcileSummary};

/// Namespace for accessory UUIDs, so the same integration ID always maps to
/// the same host accessory across restarts.
const ACCESSORY_NAMESPACE: Uuid = Uuid::from_u128(0x6c75_7472_6f6e_4a8e_9b1d_2f0a_c3e5_d7b9);

/// One programmable button exposed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonService {
    /// Component number on the device, as reported by the bridge
    pub subtype: String,
    pub label: String,
    /// 1-based position, used by the host to order buttons
    pub index: u32,
}

/// The host-visible side of an accessory: what the host stores in its
/// cache and hands back on the next start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryHandle {
    pub uuid: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub services: Vec<ButtonService>,
    /// Opaque to the host; holds an [`AccessoryContext`].
    #[serde(default)]
    pub context: serde_json::Value,
}

impl AccessoryHandle {
    /// Resolve the context back into the configuration that produced it.
    pub fn resolve_context(&self) -> Result<AccessoryContext> {
        if self.context.is_null() {
            return Err(BridgeError::InvalidContext {
                details: format!("accessory {} has no context", self.uuid),
            });
        }
        serde_json::from_value(self.context.clone()).map_err(|e| BridgeError::InvalidContext {
            details: format!("accessory {}: {}", self.uuid, e),
        })
    }

    /// Find the button service for a component number.
    pub fn service(&self, component: &str) -> Option<&ButtonService> {
        self.services.iter().find(|s| s.subtype == component)
    }
}

/// Context stored on every handle this crate creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryContext {
    pub config: AccessoryConfig,
}

impl AccessoryContext {
    fn to_value(&self) -> serde_json::Value {
        // AccessoryConfig only holds strings, integers and lists, which
        // always serialize.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Stable host UUID for an integration ID.
pub fn accessory_uuid(integration_id: u32) -> Uuid {
    Uuid::new_v5(
        &ACCESSORY_NAMESPACE,
        format!("lutron:{}", integration_id).as_bytes(),
    )
}

/// Runtime accessory: the host handle plus the config it was last
/// reconciled against, and per-button press state.
#[derive(Debug, Clone)]
pub struct Accessory {
    handle: AccessoryHandle,
    config: AccessoryConfig,
    buttons: HashMap<String, ButtonState>,
}

impl Accessory {
    /// Build a brand-new accessory (and host handle) from configuration.
    pub fn create(config: AccessoryConfig) -> Self {
        let handle = AccessoryHandle {
            uuid: accessory_uuid(config.integration_id),
            display_name: config.name.clone(),
            services: layout::services_for(&config.kind),
            context: AccessoryContext {
                config: config.clone(),
            }
            .to_value(),
        };
        Self {
            handle,
            config,
            buttons: HashMap::new(),
        }
    }

    /// Wrap a handle recovered from the host's cache.
    ///
    /// The handle is kept as-is, including services that may have drifted
    /// from its configuration; [`Accessory::reconfigure`] repairs those.
    pub fn from_cached(handle: AccessoryHandle) -> Result<Self> {
        let AccessoryContext { config } = handle.resolve_context()?;
        Ok(Self {
            handle,
            config,
            buttons: HashMap::new(),
        })
    }

    /// Registry key (canonical integration ID string).
    pub fn key(&self) -> String {
        self.config.key()
    }

    pub fn handle(&self) -> &AccessoryHandle {
        &self.handle
    }

    pub fn config(&self) -> &AccessoryConfig {
        &self.config
    }

    /// Apply authoritative configuration to an existing accessory.
    ///
    /// Overwrites the display name and stored context and rebuilds the
    /// button services when they differ from the configured kind. Returns
    /// whether anything host-visible changed.
    pub fn reconfigure(&mut self, config: AccessoryConfig) -> bool {
        let mut changed = false;

        if self.handle.display_name != config.name {
            info!(
                "Accessory {}: renaming '{}' -> '{}'",
                config.integration_id, self.handle.display_name, config.name
            );
            self.handle.display_name = config.name.clone();
            changed = true;
        }

        let services = layout::services_for(&config.kind);
        if self.handle.services != services {
            debug!(
                "Accessory {}: rebuilding {} button service(s)",
                config.integration_id,
                services.len()
            );
            self.handle.services = services;
            let services = &self.handle.services;
            self.buttons
                .retain(|component, _| services.iter().any(|s| &s.subtype == component));
            changed = true;
        }

        let context = AccessoryContext {
            config: config.clone(),
        }
        .to_value();
        if self.handle.context != context {
            self.handle.context = context;
            changed = true;
        }

        self.config = config;
        changed
    }

    /// Whether a component has an outstanding press.
    pub fn is_pressed(&self, component: &str) -> bool {
        self.buttons.get(component).is_some_and(ButtonState::is_pressed)
    }

    /// Handle one `(component, action)` pair addressed to this accessory.
    pub fn handle_action(
        &mut self,
        component: &str,
        action: &str,
        host: &dyn Host,
    ) -> Option<ButtonEvent> {
        self.handle_action_at(component, action, Instant::now(), host)
    }

    /// [`Accessory::handle_action`] with an explicit clock reading.
    ///
    /// Unknown components and action codes are ignored.
    pub fn handle_action_at(
        &mut self,
        component: &str,
        action: &str,
        now: Instant,
        host: &dyn Host,
    ) -> Option<ButtonEvent> {
        let Some(service) = self.handle.service(component) else {
            trace!(
                "Accessory {}: no button for component {}",
                self.config.integration_id, component
            );
            return None;
        };
        let Some(action) = ButtonAction::from_code(action) else {
            trace!(
                "Accessory {}: ignoring action code {} on component {}",
                self.config.integration_id, action, component
            );
            return None;
        };

        let long_press = Duration::from_millis(self.config.long_press_ms());
        let event = self
            .buttons
            .entry(service.subtype.clone())
            .or_default()
            .apply(action, now, long_press)?;

        debug!(
            "Accessory {} ({}): {} {}",
            self.config.integration_id, self.handle.display_name, service.label, event
        );
        host.button_event(&ButtonPress {
            accessory: self.handle.uuid,
            integration_id: self.config.integration_id,
            accessory_name: self.handle.display_name.clone(),
            button: service.clone(),
            event,
        });
        Some(event)
    }
}
