//! Session state and transitions.
//!
//! [`ClientSession`] is a value: every transition takes `&self` and returns
//! the next session, so a snapshot handed out earlier never changes. The
//! client driver is the only place that swaps the current value.
//!
//! # States
//!
//! ```text
//! Disconnecting(-1) < Disconnected < Connecting < Connected < LoggingIn < Idle < Searching
//! ```
//!
//! `Idle` means logged in with no search running.
//!
//! # Example
//!
//! ```
//! use ed2k_client::session::{ClientSession, SessionState};
//!
//! let session = ClientSession::default();
//! assert_eq!(session.state, SessionState::Disconnected);
//! assert!(session.state.check_login().is_err());
//!
//! let next = session.connecting("127.0.0.1", 4661);
//! assert_eq!(next.state, SessionState::Connecting);
//! assert_eq!(session.state, SessionState::Disconnected);
//! ```

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::error::{Ed2kError, Result};
use crate::message::{InboundMessage, SearchResult, SearchResultEntry};

/// Results key used when a search result arrives with no query recorded.
pub const DEFAULT_RESULTS_KEY: &str = "Files";

/// Connection lifecycle state, ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(i8)]
pub enum SessionState {
    Disconnecting = -1,
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    LoggingIn = 3,
    Idle = 4,
    Searching = 5,
}

impl SessionState {
    /// Guard for `connect`: only from `Disconnected`.
    pub fn check_connect(self) -> Result<()> {
        match self {
            SessionState::Disconnected => Ok(()),
            SessionState::Disconnecting => Err(Ed2kError::StillDisconnecting),
            SessionState::Connecting => Err(Ed2kError::AlreadyConnecting),
            _ => Err(Ed2kError::AlreadyConnected),
        }
    }

    /// Guard for `login`: connected and not yet logging in.
    pub fn check_login(self) -> Result<()> {
        if self < SessionState::Connected {
            Err(Ed2kError::NotConnected)
        } else if self >= SessionState::LoggingIn {
            Err(Ed2kError::AlreadyLoggingIn)
        } else {
            Ok(())
        }
    }

    /// Guard for `search`: logged in and not already searching.
    pub fn check_search(self) -> Result<()> {
        if self == SessionState::Searching {
            Err(Ed2kError::AlreadySearching)
        } else if self < SessionState::Idle {
            Err(Ed2kError::NotLoggedIn)
        } else {
            Ok(())
        }
    }

    /// Guard for `disconnect`: a connection must be up.
    pub fn check_disconnect(self) -> Result<()> {
        if self < SessionState::Connected {
            Err(Ed2kError::NotConnected)
        } else {
            Ok(())
        }
    }
}

/// Server the session is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

/// Snapshot of the client's connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientSession {
    pub state: SessionState,
    pub server: Option<ServerAddr>,
    pub client_id: Option<u32>,
    pub flags: Option<u32>,
    pub users: Option<u32>,
    pub files: Option<u32>,
    pub last_query: Option<String>,
    /// Results per query, in presentation form.
    pub results: BTreeMap<String, Vec<SearchResult>>,
    /// Server messages in arrival order.
    pub messages: Vec<String>,
    /// Recent diagnostic lines, oldest first.
    pub logs: VecDeque<String>,
}

impl ClientSession {
    /// Fresh session for a new connection attempt. Only logs carry over.
    pub fn connecting(&self, host: impl Into<String>, port: u16) -> Self {
        Self {
            state: SessionState::Connecting,
            server: Some(ServerAddr {
                host: host.into(),
                port,
            }),
            logs: self.logs.clone(),
            ..Self::default()
        }
    }

    /// Session after the transport closed. Only logs carry over.
    pub fn disconnected(&self) -> Self {
        Self {
            logs: self.logs.clone(),
            ..Self::default()
        }
    }

    pub fn with_state(&self, state: SessionState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    pub fn searching(&self, query: &str) -> Self {
        Self {
            state: SessionState::Searching,
            last_query: Some(query.to_string()),
            ..self.clone()
        }
    }

    /// Append a diagnostic line, keeping at most `capacity` lines.
    pub fn with_log(&self, line: impl Into<String>, capacity: usize) -> Self {
        let mut next = self.clone();
        next.logs.push_back(line.into());
        while next.logs.len() > capacity {
            next.logs.pop_front();
        }
        next
    }

    /// Apply a decoded server message.
    ///
    /// An id change completes a pending login; a search result completes a
    /// running search. Either arriving in another state only updates data.
    pub fn apply(&self, message: &InboundMessage) -> Self {
        let mut next = self.clone();
        match message {
            InboundMessage::ServerMessage { message } => {
                next.messages.push(message.clone());
            }
            InboundMessage::IdChange { client_id, flags } => {
                next.client_id = Some(*client_id);
                next.flags = Some(*flags);
                if next.state == SessionState::LoggingIn {
                    next.state = SessionState::Idle;
                }
            }
            InboundMessage::ServerStatus { users, files } => {
                next.users = Some(*users);
                next.files = Some(*files);
            }
            InboundMessage::SearchResult { entries } => {
                let key = next
                    .last_query
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RESULTS_KEY.to_string());
                next.results.insert(key, present(entries));
                if next.state == SessionState::Searching {
                    next.state = SessionState::Idle;
                }
            }
        }
        next
    }

    /// Results for the most recent query.
    pub fn last_results(&self) -> Option<&[SearchResult]> {
        let key = self.last_query.as_deref().unwrap_or(DEFAULT_RESULTS_KEY);
        self.results.get(key).map(Vec::as_slice)
    }
}

fn present(entries: &[SearchResultEntry]) -> Vec<SearchResult> {
    entries.iter().map(SearchResult::from).collect()
}
