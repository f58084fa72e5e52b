//! Outbound frame construction.
//!
//! Client messages implement [`OutgoingMessage`]: they write their body, and
//! [`OutgoingMessage::to_frame`] prepends the header with the right size.
//!
//! # Example
//!
//! ```
//! use ed2k_client::protocol::{build_frame, Header, Protocol, HEADER_SIZE};
//!
//! let header = Header::new(Protocol::EDonkey, 5, 0x16);
//! let bytes = build_frame(&header, b"hello");
//! assert_eq!(bytes.len(), HEADER_SIZE + 5);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{Header, Protocol, HEADER_SIZE};
use crate::codec::ByteWriter;
use crate::error::{Ed2kError, Result};

/// A message the client sends to the server.
pub trait OutgoingMessage {
    /// Command byte for the header.
    fn command(&self) -> u8;

    /// Protocol marker for the header.
    fn protocol(&self) -> Protocol {
        Protocol::EDonkey
    }

    /// Write the message body.
    fn write_body(&self, writer: &mut ByteWriter) -> Result<()>;

    /// Encode the body and the header describing it.
    fn encode_parts(&self) -> Result<(Header, Bytes)> {
        let mut writer = ByteWriter::new();
        self.write_body(&mut writer)?;
        let body = writer.freeze();
        let size = u32::try_from(body.len()).map_err(|_| Ed2kError::PayloadTooLarge {
            size: u32::MAX,
            max: u32::MAX - 1,
        })?;
        Ok((Header::new(self.protocol(), size, self.command()), body))
    }

    /// Encode header and body into one frame.
    fn to_frame(&self) -> Result<Bytes> {
        let (header, body) = self.encode_parts()?;
        Ok(Bytes::from(build_frame(&header, &body)))
    }
}

/// Build a complete frame as a single byte vector.
pub fn build_frame(header: &Header, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_slice(&header.encode());
    buf.put_slice(body);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping(u32);

    impl OutgoingMessage for Ping {
        fn command(&self) -> u8 {
            0x7f
        }

        fn write_body(&self, writer: &mut ByteWriter) -> Result<()> {
            writer.put_u32(self.0);
            Ok(())
        }
    }

    #[test]
    fn test_to_frame_sets_header() {
        let frame = Ping(0xAABBCCDD).to_frame().unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + 4);

        let header = Header::decode(&frame).unwrap();
        assert_eq!(header, Header::new(Protocol::EDonkey, 4, 0x7f));
        assert_eq!(&frame[HEADER_SIZE..], &[0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_build_frame_empty_body() {
        let header = Header::new(Protocol::EMule, 0, 0x14);
        let bytes = build_frame(&header, b"");
        assert_eq!(bytes, vec![0xC5, 1, 0, 0, 0, 0x14]);
    }
}
