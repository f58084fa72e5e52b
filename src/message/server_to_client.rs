//! Server-to-client message bodies.
//!
//! [`InboundMessage::decode`] picks the decoder from the header's command
//! byte. Commands the client does not act on decode to `None`.

use serde::Serialize;

use crate::codec::{file_tag, find_tag, ByteReader, Tag};
use crate::error::Result;
use crate::protocol::server_command;

/// Cap on up-front allocation driven by a count field from the wire.
const MAX_PREALLOCATED_ENTRIES: usize = 1024;

/// One decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Chat or message-of-the-day line (0x38).
    ServerMessage { message: String },
    /// Client id assigned after login (0x40).
    IdChange { client_id: u32, flags: u32 },
    /// User and file counts (0x34).
    ServerStatus { users: u32, files: u32 },
    /// Search hits (0x33).
    SearchResult { entries: Vec<SearchResultEntry> },
}

impl InboundMessage {
    /// Decode a finalized body for `command`.
    ///
    /// # Errors
    ///
    /// Truncated bodies and unknown tag types fail the whole message.
    pub fn decode(command: u8, body: &[u8]) -> Result<Option<Self>> {
        let mut reader = ByteReader::new(body);
        let message = match command {
            server_command::SERVER_MESSAGE => InboundMessage::ServerMessage {
                message: reader.read_u16_string()?,
            },
            server_command::ID_CHANGE => InboundMessage::IdChange {
                client_id: reader.read_u32()?,
                flags: reader.read_u32()?,
            },
            server_command::SERVER_STATUS => InboundMessage::ServerStatus {
                users: reader.read_u32()?,
                files: reader.read_u32()?,
            },
            server_command::SEARCH_RESULT => InboundMessage::SearchResult {
                entries: decode_search_entries(&mut reader)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

fn decode_search_entries(reader: &mut ByteReader<'_>) -> Result<Vec<SearchResultEntry>> {
    let count = reader.read_u32()?;
    let mut entries = Vec::with_capacity((count as usize).min(MAX_PREALLOCATED_ENTRIES));
    for _ in 0..count {
        let hash = hex::encode(reader.read_array::<16>()?);
        let client_id = reader.read_u32()?;
        let client_port = reader.read_u16()?;
        let tag_count = reader.read_u32()?;
        let tags = Tag::decode_list(reader, tag_count)?;
        entries.push(SearchResultEntry {
            hash,
            client_id,
            client_port,
            tags,
        });
    }
    Ok(entries)
}

/// Raw search hit as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultEntry {
    /// File hash, lowercase hex.
    pub hash: String,
    pub client_id: u32,
    pub client_port: u16,
    pub tags: Vec<Tag>,
}

/// Search hit with the well-known file tags pulled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub hash: String,
    pub name: Option<String>,
    pub size: Option<u32>,
    pub source_count: Option<u32>,
    pub complete_source_count: Option<u32>,
}

impl From<&SearchResultEntry> for SearchResult {
    fn from(entry: &SearchResultEntry) -> Self {
        let number = |id| find_tag(&entry.tags, id).and_then(|t| t.value.as_number());
        Self {
            hash: entry.hash.clone(),
            name: find_tag(&entry.tags, file_tag::FILE_NAME)
                .and_then(|t| t.value.as_text())
                .map(str::to_string),
            size: number(file_tag::FILE_SIZE),
            source_count: number(file_tag::FILE_SOURCES),
            complete_source_count: number(file_tag::FILE_COMPLETE_SOURCES),
        }
    }
}
