//! Message module - typed protocol messages.
//!
//! - [`client_to_server`]: login and search requests
//! - [`server_to_client`]: decoded server messages and search results
//! - [`server_list`]: `server.met` file reader

pub mod client_to_server;
pub mod server_list;
pub mod server_to_client;

pub use client_to_server::{
    LoginRequest, Query, QueryOperator, SearchRequest, UserHash, CLIENT_VERSION, EMULE_VERSION,
    SERVER_FLAGS,
};
pub use server_list::{ServerList, ServerListItem, SERVER_LIST_VERSION};
pub use server_to_client::{InboundMessage, SearchResult, SearchResultEntry};
