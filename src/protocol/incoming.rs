//! Incoming message assembly.
//!
//! An [`IncomingMessage`] is created from a parsed header and then filled
//! with body bytes from one or more stream reads until it holds the declared
//! size. A complete message is turned into its body exactly once with
//! [`IncomingMessage::finalize`], which inflates packed bodies.
//!
//! # Example
//!
//! ```
//! use ed2k_client::protocol::IncomingMessage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut message = IncomingMessage::from_chunk(&[0xE3, 4, 0, 0, 0, 0x38, 1, 0]).unwrap();
//! assert!(!message.is_complete());
//! message.append_chunk(&[b'x']).unwrap();
//! assert!(message.is_complete());
//!
//! let body = message.finalize().await.unwrap();
//! assert_eq!(&body[..], &[1, 0, b'x']);
//! # }
//! ```

use std::io::Read;

use bytes::{Bytes, BytesMut};
use flate2::read::{GzDecoder, ZlibDecoder};

use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{Ed2kError, Result};

/// Upper bound for the initial body allocation; larger bodies grow on demand.
const INITIAL_CAPACITY_LIMIT: usize = 64 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A message whose body is being accumulated.
#[derive(Debug)]
pub struct IncomingMessage {
    header: Header,
    body: BytesMut,
}

impl IncomingMessage {
    /// Start an empty message for the given header.
    pub fn new(header: Header) -> Self {
        let capacity = (header.size as usize).min(INITIAL_CAPACITY_LIMIT);
        Self {
            header,
            body: BytesMut::with_capacity(capacity),
        }
    }

    /// Parse the header from the first 6 bytes of `chunk` and take the rest
    /// as the first body fragment. Bytes beyond the declared size are dropped.
    pub fn from_chunk(chunk: &[u8]) -> Result<Self> {
        let header = Header::decode(chunk)?;
        let mut message = Self::new(header);
        message.fill(&chunk[HEADER_SIZE..]);
        Ok(message)
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn command(&self) -> u8 {
        self.header.command
    }

    /// Body bytes accumulated so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Bytes still missing.
    #[inline]
    pub fn remaining(&self) -> usize {
        (self.header.size as usize).saturating_sub(self.body.len())
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Append a continuation fragment.
    ///
    /// Takes at most the remaining declared size and returns how many bytes
    /// of `chunk` were used.
    ///
    /// # Errors
    ///
    /// Returns [`Ed2kError::AlreadyComplete`] if the body is already full.
    pub fn append_chunk(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.is_complete() {
            return Err(Ed2kError::AlreadyComplete);
        }
        Ok(self.fill(chunk))
    }

    fn fill(&mut self, chunk: &[u8]) -> usize {
        let take = self.remaining().min(chunk.len());
        self.body.extend_from_slice(&chunk[..take]);
        take
    }

    /// Consume the message and yield its body.
    ///
    /// Packed bodies are inflated on the blocking pool; this is the only
    /// await point between reading a frame and dispatching it.
    ///
    /// # Errors
    ///
    /// - [`Ed2kError::Incomplete`] if called before the body is full
    /// - [`Ed2kError::DecompressionFailed`] for a corrupt packed body
    pub async fn finalize(self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(Ed2kError::Incomplete);
        }
        let body = self.body.freeze();
        if !self.header.is_packed() {
            return Ok(body);
        }

        let unpacked = tokio::task::spawn_blocking(move || inflate(&body))
            .await
            .map_err(|e| Ed2kError::DecompressionFailed(e.to_string()))??;
        Ok(Bytes::from(unpacked))
    }
}

/// Inflate a zlib (or gzip) stream.
pub(crate) fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    let read = if data.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(data).read_to_end(&mut out)
    } else {
        ZlibDecoder::new(data).read_to_end(&mut out)
    };
    read.map_err(|e| Ed2kError::DecompressionFailed(e.to_string()))?;
    Ok(out)
}
