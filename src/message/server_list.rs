//! `server.met` server list files.
//!
//! ```text
//! [0xE0][count u32] count × { [ip u32][port u16][tag count u32][tags...] }
//! ```
//!
//! The ip is stored little-endian, so its low byte is the first octet.

use std::net::Ipv4Addr;
use std::path::Path;

use crate::codec::{tag_name, find_tag, ByteReader, Tag};
use crate::error::{Ed2kError, Result};

/// Version byte at the start of a server list file.
pub const SERVER_LIST_VERSION: u8 = 0xE0;

const MAX_PREALLOCATED_SERVERS: usize = 1024;

/// One server entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerListItem {
    /// Dotted quad, empty when the stored address is 0.
    pub ip: String,
    pub port: u16,
    pub tags: Vec<Tag>,
    /// Value of the Name tag, empty when absent.
    pub name: String,
}

impl ServerListItem {
    fn new(ip: String, port: u16, tags: Vec<Tag>) -> Self {
        let name = find_tag(&tags, tag_name::NAME)
            .and_then(|t| t.value.as_text())
            .unwrap_or_default()
            .to_string();
        Self {
            ip,
            port,
            tags,
            name,
        }
    }

    /// Value of the Description tag, if present.
    pub fn description(&self) -> Option<&str> {
        find_tag(&self.tags, tag_name::DESCRIPTION).and_then(|t| t.value.as_text())
    }
}

/// Parsed server list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList {
    pub servers: Vec<ServerListItem>,
}

impl ServerList {
    /// Parse a server list from memory.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let version = reader.read_u8()?;
        if version != SERVER_LIST_VERSION {
            return Err(Ed2kError::InvalidServerList(format!(
                "unsupported version {version:#04x}"
            )));
        }

        let count = reader.read_u32()?;
        let mut servers = Vec::with_capacity((count as usize).min(MAX_PREALLOCATED_SERVERS));
        for _ in 0..count {
            let ip = format_ip(reader.read_u32()?);
            let port = reader.read_u16()?;
            let tag_count = reader.read_u32()?;
            let tags = Tag::decode_list(&mut reader, tag_count)?;
            servers.push(ServerListItem::new(ip, port, tags));
        }

        tracing::debug!("Parsed server list with {} entries", servers.len());
        Ok(Self { servers })
    }

    /// Read and parse a server list file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        Self::parse(&data)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

fn format_ip(ip: u32) -> String {
    if ip == 0 {
        return String::new();
    }
    Ipv4Addr::from(ip.to_le_bytes()).to_string()
}
