//! Transport module - TCP connection to an ed2k server.

mod tcp;

pub use tcp::{connect, ServerStream};
