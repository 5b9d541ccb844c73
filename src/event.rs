// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use crate::protocol::MonitorMessage;

/// All events that can be emitted by the bridge connection.
///
/// Users subscribe via `connection.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<BridgeEvent>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// TCP connection to the bridge established, login not yet done
    Connected,
    /// Username and password sent, session is ready for commands
    LoggedIn,
    /// A `~DEVICE` report was received while logged in
    MonitorMessageReceived(MonitorMessage),
    /// Transport or session failure (connect error, login timeout, bad credentials)
    Error(String),
    /// TCP connection lost or closed
    Closed,
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<BridgeEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<BridgeEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
