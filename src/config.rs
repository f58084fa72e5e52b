//! Client configuration.
//!
//! Every field has a default, so a JSON document only needs the fields it
//! changes:
//!
//! ```
//! use ed2k_client::ClientConfig;
//!
//! let config = ClientConfig::from_json_str(r#"{ "nick_name": "tester", "search_timeout_ms": 5000 }"#).unwrap();
//! assert_eq!(config.nick_name, "tester");
//! assert_eq!(config.client_port, 15490);
//! assert_eq!(config.search_timeout().as_secs(), 5);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::UserHash;
use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;

pub const DEFAULT_NICK_NAME: &str = "https://www.emule-project.org";
pub const DEFAULT_CLIENT_PORT: u16 = 15490;
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOG_CAPACITY: usize = 100;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Sent as the Name tag at login.
    pub nick_name: String,
    /// TCP port advertised at login.
    pub client_port: u16,
    /// 32 hex characters. A random hash is used when unset.
    pub user_hash: Option<String>,
    pub search_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Lines kept in the session log.
    pub log_capacity: usize,
    /// Largest accepted inbound body.
    pub max_message_size: u32,
    /// Capacity of the command and writer channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nick_name: DEFAULT_NICK_NAME.to_string(),
            client_port: DEFAULT_CLIENT_PORT,
            user_hash: None,
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&text)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse the configured user hash, or draw a random one.
    pub fn resolve_user_hash(&self) -> Result<UserHash> {
        match &self.user_hash {
            Some(text) => text.parse(),
            None => Ok(UserHash::random()),
        }
    }
}
