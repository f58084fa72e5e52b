//! Wire format encoding and decoding.
//!
//! Implements the 6-byte message header:
//! ```text
//! ┌──────────┬──────────────┬─────────┐
//! │ Protocol │ Size         │ Command │
//! │ 1 byte   │ uint32 LE    │ 1 byte  │
//! └──────────┴──────────────┴─────────┘
//! ```
//!
//! The size field on the wire counts the command byte, so it is always
//! `body_len + 1`. [`Header::size`] holds the body length; encode adds the
//! one back.

use crate::error::{Ed2kError, Result};

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Default maximum body size accepted from a server (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Protocol marker, the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Protocol {
    EDonkey = 0xE3,
    EMule = 0xC5,
    /// Body is zlib-compressed.
    Packed = 0xD4,
}

impl Protocol {
    /// Map a marker byte, `None` for anything else.
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xE3 => Some(Protocol::EDonkey),
            0xC5 => Some(Protocol::EMule),
            0xD4 => Some(Protocol::Packed),
            _ => None,
        }
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Commands the server sends to the client.
pub mod server_command {
    pub const REJECT: u8 = 0x05;
    pub const SERVER_LIST: u8 = 0x32;
    pub const SEARCH_RESULT: u8 = 0x33;
    pub const SERVER_STATUS: u8 = 0x34;
    pub const SERVER_MESSAGE: u8 = 0x38;
    pub const ID_CHANGE: u8 = 0x40;
    pub const SERVER_IDENT: u8 = 0x41;
}

/// Commands the client sends to the server.
pub mod client_command {
    pub const LOGIN_REQUEST: u8 = 0x01;
    pub const GET_SERVER_LIST: u8 = 0x14;
    pub const OFFER_FILES: u8 = 0x15;
    pub const SEARCH_REQUEST: u8 = 0x16;
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub protocol: Protocol,
    /// Body length in bytes (wire value minus one).
    pub size: u32,
    pub command: u8,
}

impl Header {
    pub fn new(protocol: Protocol, size: u32, command: u8) -> Self {
        Self {
            protocol,
            size,
            command,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use ed2k_client::protocol::{Header, Protocol};
    ///
    /// let bytes = Header::new(Protocol::EDonkey, 4, 0x01).encode();
    /// assert_eq!(bytes, [0xE3, 5, 0, 0, 0, 0x01]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (6 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.protocol.as_byte();
        buf[1..5].copy_from_slice(&self.size.wrapping_add(1).to_le_bytes());
        buf[5] = self.command;
    }

    /// Decode header from bytes.
    ///
    /// A wire size of 0 decodes to an empty body.
    ///
    /// # Example
    ///
    /// ```
    /// use ed2k_client::protocol::{Header, Protocol};
    ///
    /// let header = Header::decode(&[0xD4, 11, 0, 0, 0, 0x33]).unwrap();
    /// assert_eq!(header.protocol, Protocol::Packed);
    /// assert_eq!(header.size, 10);
    /// assert_eq!(header.command, 0x33);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Ed2kError::Truncated {
                needed: HEADER_SIZE,
                remaining: buf.len(),
            });
        }
        let protocol = Protocol::from_byte(buf[0]).ok_or(Ed2kError::UnknownProtocol(buf[0]))?;
        let wire_size = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        Ok(Self {
            protocol,
            size: wire_size.saturating_sub(1),
            command: buf[5],
        })
    }

    /// Reject bodies larger than `max_size`.
    pub fn validate(&self, max_size: u32) -> Result<()> {
        if self.size > max_size {
            return Err(Ed2kError::PayloadTooLarge {
                size: self.size,
                max: max_size,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn is_packed(&self) -> bool {
        self.protocol == Protocol::Packed
    }
}

/// True if `byte` starts a new frame.
#[inline]
pub fn is_protocol_marker(byte: u8) -> bool {
    Protocol::from_byte(byte).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        for protocol in [Protocol::EDonkey, Protocol::EMule, Protocol::Packed] {
            for size in [0u32, 1, 255, 256, 65_536, u32::MAX - 1] {
                let original = Header::new(protocol, size, 0x33);
                let decoded = Header::decode(&original.encode()).unwrap();
                assert_eq!(original, decoded);
            }
        }
    }

    #[test]
    fn test_size_field_carries_plus_one() {
        let bytes = Header::new(Protocol::EMule, 0x0102_0304, 0x40).encode();
        assert_eq!(bytes, [0xC5, 0x05, 0x03, 0x02, 0x01, 0x40]);
    }

    #[test]
    fn test_zero_wire_size_clamps() {
        let header = Header::decode(&[0xE3, 0, 0, 0, 0, 0x38]).unwrap();
        assert_eq!(header.size, 0);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let err = Header::decode(&[0xE3, 1, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            Ed2kError::Truncated {
                needed: 6,
                remaining: 5
            }
        ));
    }

    #[test]
    fn test_decode_unknown_protocol() {
        let err = Header::decode(&[0x42, 1, 0, 0, 0, 0x38]).unwrap_err();
        assert!(matches!(err, Ed2kError::UnknownProtocol(0x42)));
    }

    #[test]
    fn test_validate_size() {
        let header = Header::new(Protocol::EDonkey, 1000, 0x33);
        assert!(header.validate(1000).is_ok());
        let err = header.validate(999).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_protocol_markers() {
        assert!(is_protocol_marker(0xE3));
        assert!(is_protocol_marker(0xC5));
        assert!(is_protocol_marker(0xD4));
        assert!(!is_protocol_marker(0x00));
        assert!(Header::new(Protocol::Packed, 0, 0).is_packed());
    }
}
