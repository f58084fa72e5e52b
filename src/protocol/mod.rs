//! Protocol module - wire format, framing, and message assembly.
//!
//! This module implements the binary framing of the server protocol:
//! - 6-byte header encoding/decoding (with the size-plus-one quirk)
//! - Incoming message assembly across stream reads, with zlib inflate
//! - Routing of raw reads into messages
//! - Outbound frame building

mod frame;
mod frame_buffer;
mod incoming;
mod wire_format;

pub use frame::{build_frame, OutgoingMessage};
pub use frame_buffer::MessageBuffer;
pub use incoming::IncomingMessage;
pub use wire_format::{
    client_command, is_protocol_marker, server_command, Header, Protocol,
    DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE,
};
