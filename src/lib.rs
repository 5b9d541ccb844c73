// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge
//
//! # lutron-bridge
//!
//! Client for the Telnet integration port of Lutron bridges (Caseta Smart
//! Bridge Pro, RA2 Select, RadioRA 2), exposing Pico remotes and keypads to
//! a home-automation host as programmable switches.
//!
//! The bridge connection logs in, turns `~DEVICE` reports into
//! [`MonitorMessage`]s and queues outbound commands until the session is
//! ready. The accessory registry merges cached host accessories with
//! configuration and routes each message to the accessory with its
//! integration ID, which reports button presses to the [`Host`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use lutron_bridge::{BridgeConfig, BridgeConnection, BridgeEvent, Command};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::builder()
//!         .host("192.168.1.50")
//!         .username("lutron")
//!         .password("integration")
//!         .build();
//!
//!     let connection = BridgeConnection::connect(config, None);
//!
//!     let mut events = connection.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Sent as soon as the login completes
//!     for command in Command::button_press(2, 2) {
//!         connection.send(command)?;
//!     }
//!
//!     tokio::signal::ctrl_c().await?;
//!     connection.destroy().await;
//!     Ok(())
//! }
//! ```

pub mod accessory;
pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use accessory::{
    Accessory, AccessoryHandle, AccessoryRegistry, ButtonEvent, ButtonService, PicoLayout,
    ReconcileSummary,
};
pub use bridge::LutronBridge;
pub use config::{AccessoryConfig, AccessoryKind, BridgeConfig, BridgeConfigBuilder};
pub use error::{BridgeError, Result};
pub use event::{BridgeEvent, EventReceiver};
pub use host::{AccessoryCache, ButtonPress, Host};
pub use protocol::{Command, Message, MonitorMessage};
pub use transport::{BridgeConnection, CommandSender, LineFramer, LoginState, ReconnectPolicy};
