// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use serde::{Deserialize, Serialize};

use crate::accessory::layout::PicoLayout;
use crate::transport::reconnect::ReconnectPolicy;

/// Configuration for connecting to a Lutron bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge IP address or hostname
    pub host: String,
    /// Telnet integration port (default: 23)
    pub port: u16,
    /// Integration login (default: lutron)
    pub username: String,
    /// Integration password (default: integration)
    pub password: String,
    /// Log every line to and from the bridge at info level
    pub debug: bool,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Time allowed from socket connect to logged in, in milliseconds (0 = no limit)
    pub login_timeout_ms: u64,
    /// Retry policy after a lost or failed connection
    pub reconnect: ReconnectPolicy,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 23,
            username: "lutron".to_string(),
            password: "integration".to_string(),
            debug: false,
            connect_timeout_ms: 10000,
            login_timeout_ms: 30000,
            reconnect: ReconnectPolicy::default(),
            event_capacity: 256,
        }
    }
}

impl BridgeConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// `host:port` for the TCP connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for BridgeConfig.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn login_timeout_ms(mut self, ms: u64) -> Self {
        self.config.login_timeout_ms = ms;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

/// One accessory as declared in configuration.
///
/// This is the source of truth for the display name and the button layout
/// of the accessory with the same integration ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryConfig {
    pub integration_id: u32,
    pub name: String,
    /// Press duration after which a release counts as a long press
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_press_ms: Option<u64>,
    #[serde(flatten)]
    pub kind: AccessoryKind,
}

/// Accessory kind and its kind-specific fields, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AccessoryKind {
    /// Pico wireless remote
    PicoRemote {
        #[serde(default)]
        layout: PicoLayout,
    },
    /// Keypad with an explicit list of button component numbers
    Keypad { components: Vec<u32> },
}

/// Long press threshold used when an accessory does not set one.
pub const DEFAULT_LONG_PRESS_MS: u64 = 600;

impl AccessoryConfig {
    pub fn pico(integration_id: u32, name: impl Into<String>, layout: PicoLayout) -> Self {
        Self {
            integration_id,
            name: name.into(),
            long_press_ms: None,
            kind: AccessoryKind::PicoRemote { layout },
        }
    }

    pub fn keypad(integration_id: u32, name: impl Into<String>, components: Vec<u32>) -> Self {
        Self {
            integration_id,
            name: name.into(),
            long_press_ms: None,
            kind: AccessoryKind::Keypad { components },
        }
    }

    /// Registry key: the canonical string form of the integration ID.
    pub fn key(&self) -> String {
        self.integration_id.to_string()
    }

    pub fn long_press_ms(&self) -> u64 {
        self.long_press_ms.unwrap_or(DEFAULT_LONG_PRESS_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::builder()
            .host("10.0.0.5")
            .port(2323)
            .username("admin")
            .password("secret")
            .debug(true)
            .build();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 2323);
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
        assert!(config.debug);
        assert_eq!(config.address(), "10.0.0.5:2323");
    }

    #[test]
    fn test_config_defaults() {
        let config = BridgeConfig::builder().build();
        assert_eq!(config.port, 23);
        assert_eq!(config.username, "lutron");
        assert_eq!(config.password, "integration");
        assert_eq!(config.login_timeout_ms, 30000);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_event_capacity_never_zero() {
        let config = BridgeConfig::builder().event_capacity(0).build();
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_accessory_config_json() {
        let config: AccessoryConfig = serde_json::from_str(
            r#"{"integration_id": 2, "name": "test remote", "type": "pico-remote", "layout": "two-button"}"#,
        )
        .unwrap();
        assert_eq!(config, AccessoryConfig::pico(2, "test remote", PicoLayout::TwoButton));
        assert_eq!(config.key(), "2");
        assert_eq!(config.long_press_ms(), DEFAULT_LONG_PRESS_MS);
    }

    #[test]
    fn test_accessory_config_default_layout() {
        let config: AccessoryConfig = serde_json::from_str(
            r#"{"integration_id": 9, "name": "hall", "type": "pico-remote", "long_press_ms": 900}"#,
        )
        .unwrap();
        assert_eq!(
            config.kind,
            AccessoryKind::PicoRemote {
                layout: PicoLayout::ThreeButtonRaiseLower
            }
        );
        assert_eq!(config.long_press_ms(), 900);
    }

    #[test]
    fn test_keypad_config_json() {
        let config: AccessoryConfig = serde_json::from_str(
            r#"{"integration_id": 30, "name": "entry", "type": "keypad", "components": [1, 2, 3]}"#,
        )
        .unwrap();
        assert_eq!(config, AccessoryConfig::keypad(30, "entry", vec![1, 2, 3]));
    }

    #[test]
    fn test_accessory_config_toml() {
        #[derive(Deserialize)]
        struct File {
            accessories: Vec<AccessoryConfig>,
        }

        let file: File = toml::from_str(
            r#"
            [[accessories]]
            type = "pico-remote"
            integration_id = 2
            name = "Kitchen"
            layout = "four-button-scene"

            [[accessories]]
            type = "keypad"
            integration_id = 30
            name = "Entry"
            components = [1, 2, 5]
            long_press_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(file.accessories.len(), 2);
        assert_eq!(
            file.accessories[0],
            AccessoryConfig::pico(2, "Kitchen", PicoLayout::FourButtonScene)
        );
        assert_eq!(file.accessories[1].key(), "30");
        assert_eq!(file.accessories[1].long_press_ms(), 1000);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = serde_json::from_str::<AccessoryConfig>(
            r#"{"integration_id": 2, "name": "x", "type": "dimmer"}"#,
        );
        assert!(result.is_err());
    }
}
