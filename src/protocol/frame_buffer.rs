//! Message buffer for routing raw stream reads into messages.
//!
//! The server protocol keeps one message in flight per direction, so at most
//! one [`IncomingMessage`] is open at a time. Routing rules for each read:
//! - `Idle`: the read must start with a protocol marker; anything else is a
//!   framing error for that read
//! - `Header`: fewer than 6 header bytes have arrived; they are stashed
//! - `Open`: the read continues the open message, whatever its first byte
//!
//! A read that completes the open message and carries more bytes is split
//! and the remainder is routed as a fresh read.
//!
//! # Example
//!
//! ```
//! use ed2k_client::protocol::MessageBuffer;
//!
//! let mut buffer = MessageBuffer::new();
//! let frame = [0xE3, 3, 0, 0, 0, 0x38, 0, 0];
//!
//! assert!(buffer.push(&frame[..4]).is_empty());
//! let messages = buffer.push(&frame[4..]);
//! assert_eq!(messages.len(), 1);
//! assert!(messages[0].as_ref().unwrap().is_complete());
//! ```

use bytes::BytesMut;

use super::incoming::IncomingMessage;
use super::wire_format::{is_protocol_marker, Header, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE};
use crate::error::{Ed2kError, Result};

#[derive(Debug)]
enum State {
    /// No message open.
    Idle,
    /// Part of a header has arrived.
    Header(BytesMut),
    /// Header parsed, body still short.
    Open(IncomingMessage),
}

/// Buffer for turning stream reads into complete [`IncomingMessage`]s.
#[derive(Debug)]
pub struct MessageBuffer {
    state: State,
    max_message_size: u32,
}

impl MessageBuffer {
    /// Create a buffer with the default 16 MB body limit.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            state: State::Idle,
            max_message_size,
        }
    }

    /// Route one stream read.
    ///
    /// Returns every message completed by this read, in order. A framing
    /// error (unknown marker with nothing open, oversized header) ends the
    /// read: the error is the last item and the rest of the read is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<IncomingMessage>> {
        let mut out = Vec::new();
        let mut data = chunk;

        while !data.is_empty() {
            match std::mem::replace(&mut self.state, State::Idle) {
                State::Open(mut message) => {
                    let used = match message.append_chunk(data) {
                        Ok(used) => used,
                        Err(e) => {
                            out.push(Err(e));
                            break;
                        }
                    };
                    data = &data[used..];
                    if message.is_complete() {
                        out.push(Ok(message));
                    } else {
                        self.state = State::Open(message);
                    }
                }
                State::Idle if !is_protocol_marker(data[0]) => {
                    tracing::debug!("Dropping {} bytes with no open message", data.len());
                    out.push(Err(Ed2kError::UnknownProtocol(data[0])));
                    break;
                }
                State::Idle => {
                    data = self.stash_header(BytesMut::with_capacity(HEADER_SIZE), data, &mut out);
                }
                State::Header(partial) => {
                    data = self.stash_header(partial, data, &mut out);
                }
            }
        }

        out
    }

    /// Collect header bytes; once six are in, open a message.
    fn stash_header<'a>(
        &mut self,
        mut partial: BytesMut,
        data: &'a [u8],
        out: &mut Vec<Result<IncomingMessage>>,
    ) -> &'a [u8] {
        let take = (HEADER_SIZE - partial.len()).min(data.len());
        partial.extend_from_slice(&data[..take]);
        let rest = &data[take..];

        if partial.len() < HEADER_SIZE {
            self.state = State::Header(partial);
            return rest;
        }

        let header = match Header::decode(&partial).and_then(|h| {
            h.validate(self.max_message_size)?;
            Ok(h)
        }) {
            Ok(header) => header,
            Err(e) => {
                out.push(Err(e));
                return &[];
            }
        };

        let message = IncomingMessage::new(header);
        if message.is_complete() {
            out.push(Ok(message));
        } else {
            self.state = State::Open(message);
        }
        rest
    }

    /// True while a message or header is partially received.
    pub fn has_pending(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    /// Drop any partially received message.
    pub fn clear(&mut self) {
        self.state = State::Idle;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Idle => "Idle",
            State::Header(_) => "Header",
            State::Open(_) => "Open",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;

    fn make_frame(command: u8, body: &[u8]) -> Vec<u8> {
        let mut bytes = Header::new(Protocol::EDonkey, body.len() as u32, command)
            .encode()
            .to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    async fn bodies(results: Vec<Result<IncomingMessage>>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for result in results {
            out.push(result.unwrap().finalize().await.unwrap().to_vec());
        }
        out
    }

    #[tokio::test]
    async fn test_single_complete_frame() {
        let mut buffer = MessageBuffer::new();
        let frame = make_frame(0x38, b"hello");

        let messages = buffer.push(&frame);
        assert_eq!(messages.len(), 1);
        assert_eq!(bodies(messages).await, vec![b"hello".to_vec()]);
        assert!(!buffer.has_pending());
    }

    #[tokio::test]
    async fn test_any_chunking_yields_same_body() {
        let body: Vec<u8> = (0..32u8).collect();
        let frame = make_frame(0x33, &body);

        for first in 1..frame.len() {
            for second in first..frame.len() {
                let mut buffer = MessageBuffer::new();
                let mut results = buffer.push(&frame[..first]);
                results.extend(buffer.push(&frame[first..second]));
                results.extend(buffer.push(&frame[second..]));
                assert_eq!(bodies(results).await, vec![body.clone()], "split {first}/{second}");
            }
        }
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let mut buffer = MessageBuffer::new();
        let frame = make_frame(0x38, b"hi");

        let mut results = Vec::new();
        for byte in &frame {
            results.extend(buffer.push(&[*byte]));
        }
        assert_eq!(bodies(results).await, vec![b"hi".to_vec()]);
    }

    #[tokio::test]
    async fn test_two_frames_in_one_read() {
        let mut buffer = MessageBuffer::new();
        let mut data = make_frame(0x34, &[1, 0, 0, 0, 2, 0, 0, 0]);
        data.extend(make_frame(0x38, b"motd"));

        let results = buffer.push(&data);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().command(), 0x34);
        assert_eq!(results[1].as_ref().unwrap().command(), 0x38);
    }

    #[test]
    fn test_continuation_starting_with_marker_byte() {
        let mut buffer = MessageBuffer::new();
        let frame = make_frame(0x38, &[0x00, 0xE3, 0xC5, 0xD4]);

        assert!(buffer.push(&frame[..7]).is_empty());
        assert_eq!(buffer.state_name(), "Open");
        // Next read begins with 0xE3 but still belongs to the open message.
        let results = buffer.push(&frame[7..]);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_unknown_marker_without_open_message() {
        let mut buffer = MessageBuffer::new();
        let results = buffer.push(&[0x42, 0x01, 0x02]);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Ed2kError::UnknownProtocol(0x42))));
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_oversized_header_rejected() {
        let mut buffer = MessageBuffer::with_max_message_size(16);
        let header = Header::new(Protocol::EDonkey, 17, 0x33).encode();
        let results = buffer.push(&header);
        assert!(matches!(
            results[0],
            Err(Ed2kError::PayloadTooLarge { size: 17, max: 16 })
        ));
        assert_eq!(buffer.state_name(), "Idle");
    }

    #[test]
    fn test_partial_header_stashed() {
        let mut buffer = MessageBuffer::new();
        let frame = make_frame(0x38, b"x");

        assert!(buffer.push(&frame[..3]).is_empty());
        assert_eq!(buffer.state_name(), "Header");
        assert!(buffer.has_pending());
    }

    #[test]
    fn test_clear_drops_open_message() {
        let mut buffer = MessageBuffer::new();
        let frame = make_frame(0x33, &[0u8; 10]);
        buffer.push(&frame[..8]);
        assert_eq!(buffer.state_name(), "Open");

        buffer.clear();
        assert!(!buffer.has_pending());
        // Leftover body bytes no longer have a home.
        let results = buffer.push(&frame[8..]);
        assert!(matches!(results[0], Err(Ed2kError::UnknownProtocol(0))));
    }
}
