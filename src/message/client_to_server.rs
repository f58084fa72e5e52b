//! Client-to-server requests.
//!
//! Login body:
//! ```text
//! ┌───────────┬───────────┬──────────┬───────────┬──────────┐
//! │ User hash │ Client ID │ TCP port │ Tag count │ Tags...  │
//! │ 16 bytes  │ uint32 LE │ uint16 LE│ uint32 LE │          │
//! └───────────┴───────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! Search body is a query tree; the client currently sends the raw text as a
//! single string parameter.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::codec::{tag_name, ByteWriter, Tag};
use crate::error::{Ed2kError, Result};
use crate::protocol::{client_command, OutgoingMessage};

/// Client version advertised at login (60).
pub const CLIENT_VERSION: u32 = 0x3c;

/// eMule version 0.50.1, packed as major<<17 | minor<<10 | update<<7.
pub const EMULE_VERSION: u32 = (50 << 10) | (1 << 7);

/// Capabilities: zlib, new tags, unicode, large files.
pub const SERVER_FLAGS: u32 = 0x0001 | 0x0008 | 0x0010 | 0x0100;

/// Query parameter type bytes.
const PARAM_BOOLEAN: u8 = 0x00;
const PARAM_STRING: u8 = 0x01;

/// 16-byte user identity sent at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserHash([u8; 16]);

impl UserHash {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random hash.
    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl FromStr for UserHash {
    type Err = Ed2kError;

    /// Parse 32 hex characters. Dashes are ignored so a UUID string works too.
    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|e| Ed2kError::InvalidUserHash(e.to_string()))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| Ed2kError::InvalidUserHash(format!("expected 16 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for UserHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Login request (command 0x01).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub user_hash: UserHash,
    pub client_id: u32,
    pub port: u16,
    pub nick_name: String,
}

impl LoginRequest {
    /// Tags sent after the fixed fields, in wire order.
    pub fn tags(&self) -> Vec<Tag> {
        vec![
            Tag::new(tag_name::NAME, self.nick_name.as_str()),
            Tag::new(tag_name::VERSION, CLIENT_VERSION),
            Tag::new(tag_name::SERVER_FLAGS, SERVER_FLAGS),
            Tag::new(tag_name::EMULE_VERSION, EMULE_VERSION),
        ]
    }
}

impl OutgoingMessage for LoginRequest {
    fn command(&self) -> u8 {
        client_command::LOGIN_REQUEST
    }

    fn write_body(&self, writer: &mut ByteWriter) -> Result<()> {
        writer.put_slice(self.user_hash.as_bytes());
        writer.put_u32(self.client_id);
        writer.put_u16(self.port);

        let tags = self.tags();
        writer.put_u32(tags.len() as u32);
        for tag in &tags {
            tag.encode(writer)?;
        }
        Ok(())
    }
}

/// Boolean operator inside a query tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryOperator {
    And = 0x00,
    Or = 0x01,
    Not = 0x02,
}

/// Search query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Literal(String),
    Boolean {
        op: QueryOperator,
        left: Box<Query>,
        right: Box<Query>,
    },
}

impl Query {
    /// Build a query from user input.
    ///
    /// No grammar is applied: the whole input becomes one literal.
    pub fn parse(raw: &str) -> Self {
        Query::Literal(raw.to_string())
    }

    pub fn write(&self, writer: &mut ByteWriter) -> Result<()> {
        match self {
            Query::Literal(text) => {
                writer.put_u8(PARAM_STRING);
                writer.put_u32_string(text)
            }
            Query::Boolean { op, left, right } => {
                writer.put_u8(PARAM_BOOLEAN);
                writer.put_u8(*op as u8);
                left.write(writer)?;
                right.write(writer)
            }
        }
    }
}

/// Search request (command 0x16).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: Query,
}

impl SearchRequest {
    pub fn new(raw: &str) -> Self {
        Self {
            query: Query::parse(raw),
        }
    }
}

impl OutgoingMessage for SearchRequest {
    fn command(&self) -> u8 {
        client_command::SEARCH_REQUEST
    }

    fn write_body(&self, writer: &mut ByteWriter) -> Result<()> {
        self.query.write(writer)
    }
}
