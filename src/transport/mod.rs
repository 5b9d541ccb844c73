// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

pub mod connection;
pub mod framer;
pub mod reconnect;
pub mod session;

pub use connection::{BridgeConnection, CommandSender, MonitorSink};
pub use framer::LineFramer;
pub use reconnect::ReconnectPolicy;
pub use session::{LoginState, Session, SessionOutput};
