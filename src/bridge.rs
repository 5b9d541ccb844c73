// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::accessory::{AccessoryHandle, AccessoryRegistry, ReconcileSummary};
use crate::config::{AccessoryConfig, BridgeConfig};
use crate::error::{BridgeError, Result};
use crate::event::EventReceiver;
use crate::host::Host;
use crate::protocol::{Command, MonitorMessage};
use crate::transport::{BridgeConnection, CommandSender, LoginState, MonitorSink};

/// A Lutron bridge and the accessories it exposes to a host.
///
/// Typical start-up: restore cached handles, reconcile configuration, then
/// [`LutronBridge::start`] the connection. Button activity from then on
/// reaches the host through [`Host::button_event`].
///
/// ```no_run
/// use std::sync::Arc;
/// use lutron_bridge::{AccessoryConfig, BridgeConfig, LutronBridge, PicoLayout};
/// # fn host() -> Arc<dyn lutron_bridge::Host> { unimplemented!() }
///
/// # async fn demo() -> lutron_bridge::Result<()> {
/// let mut bridge = LutronBridge::new(BridgeConfig::builder().host("10.0.0.5").build(), host());
/// bridge.reconcile(&[AccessoryConfig::pico(2, "Kitchen", PicoLayout::TwoButton)])?;
/// bridge.start();
/// tokio::signal::ctrl_c().await?;
/// bridge.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct LutronBridge {
    config: BridgeConfig,
    host: Arc<dyn Host>,
    registry: Arc<Mutex<AccessoryRegistry>>,
    connection: Option<BridgeConnection>,
}

impl LutronBridge {
    pub fn new(config: BridgeConfig, host: Arc<dyn Host>) -> Self {
        Self {
            config,
            host,
            registry: Arc::new(Mutex::new(AccessoryRegistry::new())),
            connection: None,
        }
    }

    /// Add one accessory handle from the host's cache.
    pub fn configure_accessory(&self, handle: AccessoryHandle) -> Result<String> {
        self.registry()?.configure_cached(handle)
    }

    /// Add every usable handle from the host's cache. Handles whose context
    /// cannot be read are skipped. Returns how many were restored.
    pub fn restore_cached(&self, handles: Vec<AccessoryHandle>) -> Result<usize> {
        let mut registry = self.registry()?;
        let mut restored = 0;
        for handle in handles {
            let name = handle.display_name.clone();
            match registry.configure_cached(handle) {
                Ok(_) => restored += 1,
                Err(e) => warn!("Skipping cached accessory '{}': {}", name, e),
            }
        }
        Ok(restored)
    }

    /// Reconcile configured accessories against what is already known.
    pub fn reconcile(&self, configs: &[AccessoryConfig]) -> Result<ReconcileSummary> {
        let summary = self.registry()?.reconcile(configs, self.host.as_ref());
        info!(
            "Accessories reconciled: {} new, {} updated",
            summary.created.len(),
            summary.updated.len()
        );
        Ok(summary)
    }

    /// Start the bridge connection. Calling it again while running does
    /// nothing.
    pub fn start(&mut self) {
        if self.connection.is_some() {
            return;
        }
        let router = Arc::new(RegistryRouter {
            registry: self.registry.clone(),
            host: self.host.clone(),
        });
        self.connection = Some(BridgeConnection::connect(
            self.config.clone(),
            Some(router),
        ));
    }

    /// Subscribe to connection events. `None` before [`LutronBridge::start`].
    pub fn subscribe(&self) -> Option<EventReceiver> {
        self.connection.as_ref().map(BridgeConnection::subscribe)
    }

    /// Queue a command for the bridge; written once logged in.
    pub fn send_command(&self, command: impl Into<Command>) -> Result<()> {
        match &self.connection {
            Some(connection) => connection.send(command),
            None => Err(BridgeError::Disconnected),
        }
    }

    pub fn command_sender(&self) -> Option<CommandSender> {
        self.connection.as_ref().map(BridgeConnection::command_sender)
    }

    pub fn state(&self) -> LoginState {
        self.connection
            .as_ref()
            .map_or(LoginState::Disconnected, BridgeConnection::state)
    }

    /// Host handles of every known accessory, ordered by integration ID.
    pub fn accessories(&self) -> Result<Vec<AccessoryHandle>> {
        Ok(self.registry()?.handles())
    }

    /// Stop the connection. No host calls are made once this returns.
    pub async fn shutdown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.destroy().await;
        }
    }

    fn registry(&self) -> Result<MutexGuard<'_, AccessoryRegistry>> {
        self.registry.lock().map_err(|_| BridgeError::LockPoisoned)
    }
}

/// Routes monitor messages from the connection task into the registry.
struct RegistryRouter {
    registry: Arc<Mutex<AccessoryRegistry>>,
    host: Arc<dyn Host>,
}

impl MonitorSink for RegistryRouter {
    fn deliver(&self, message: &MonitorMessage) {
        // A panic in a host callback must not stop dispatch for good
        let mut registry = match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.dispatch(message, self.host.as_ref());
    }
}
