// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

/// All errors that can occur in the lutron-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Login not completed within {secs}s")]
    LoginTimeout { secs: u64 },

    #[error("Bridge rejected the configured credentials")]
    AuthenticationFailed,

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Connection destroyed")]
    Destroyed,

    #[error("Invalid accessory context: {details}")]
    InvalidContext { details: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Accessory registry lock poisoned")]
    LockPoisoned,

    #[error("Channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::ConnectionTimeout
                | BridgeError::LoginTimeout { .. }
                | BridgeError::Disconnected
                | BridgeError::ChannelClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
