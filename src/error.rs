//! Error types for ed2k-client.

use thiserror::Error;

/// Main error type for all ed2k operations.
#[derive(Debug, Error)]
pub enum Ed2kError {
    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Buffer ended before a field could be read.
    #[error("Truncated buffer: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Leading byte is not one of the known protocol markers.
    #[error("Unknown message protocol: {0:#04x}")]
    UnknownProtocol(u8),

    /// Tag type byte outside the recognized set. The reader position can no
    /// longer be trusted after this.
    #[error("Unknown tag type: {0:#04x}")]
    UnknownTagType(u8),

    /// Tag type and value variant disagree, or the type cannot be written.
    #[error("Tag value does not match tag type {0:#04x}")]
    EncodingMismatch(u8),

    /// Text does not fit its length prefix.
    #[error("String of {0} bytes exceeds its length prefix")]
    StringTooLong(usize),

    /// User hash is not 32 hex characters.
    #[error("Invalid user hash: {0}")]
    InvalidUserHash(String),

    /// Declared body size is above the configured maximum.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u32, max: u32 },

    /// Chunk written to a message that already holds its full body.
    #[error("Cannot write to a complete message")]
    AlreadyComplete,

    /// Body requested before all declared bytes arrived.
    #[error("Message is incomplete")]
    Incomplete,

    /// Packed body could not be inflated.
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Server list file is malformed.
    #[error("Invalid server list: {0}")]
    InvalidServerList(String),

    #[error("Already connecting")]
    AlreadyConnecting,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Still disconnecting")]
    StillDisconnecting,

    #[error("Not connected")]
    NotConnected,

    #[error("Already logging in")]
    AlreadyLoggingIn,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Already searching")]
    AlreadySearching,

    /// TCP connect did not finish in time.
    #[error("Connect timeout")]
    ConnectTimeout,

    /// Connection or client driver is gone.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Ed2kError {
    /// True for failures caused by calling a command in the wrong session state.
    pub fn is_state_guard(&self) -> bool {
        matches!(
            self,
            Ed2kError::AlreadyConnecting
                | Ed2kError::AlreadyConnected
                | Ed2kError::StillDisconnecting
                | Ed2kError::NotConnected
                | Ed2kError::AlreadyLoggingIn
                | Ed2kError::NotLoggedIn
                | Ed2kError::AlreadySearching
        )
    }
}

/// Result type alias using Ed2kError.
pub type Result<T> = std::result::Result<T, Ed2kError>;
