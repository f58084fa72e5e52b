//! # ed2k-client
//!
//! Client for the eDonkey2000/eMule server protocol.
//!
//! The crate speaks the TCP protocol between a client and an ed2k server:
//! login, server status and messages, and keyword search.
//!
//! ## Layers
//!
//! - **Codec** ([`codec`]): little-endian cursors and the tag (attribute) format
//! - **Protocol** ([`protocol`]): 6-byte frame header, message assembly
//!   across reads, packed (zlib) bodies
//! - **Messages** ([`message`]): typed client requests, server replies and
//!   the `server.met` file format
//! - **Session** ([`session`]): immutable session value and its state machine
//! - **Client** ([`Client`]): driver task owning the connection, with a
//!   command handle and an event channel
//!
//! ## Example
//!
//! ```no_run
//! use ed2k_client::{Client, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> ed2k_client::Result<()> {
//!     let (client, mut events) = Client::builder().spawn()?;
//!     client.connect("176.103.48.36", 4184).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Connected(_) = event {
//!             client.login().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

mod client;

pub use client::{Client, ClientBuilder, ClientEvent, EventReceiver};
pub use config::ClientConfig;
pub use error::{Ed2kError, Result};
pub use message::{SearchResult, ServerList, UserHash};
pub use session::{ClientSession, SessionState};
