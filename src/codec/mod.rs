//! Codec module - byte cursors and the tag (attribute) format.
//!
//! - [`ByteReader`] / [`ByteWriter`] - little-endian cursor I/O
//! - [`Tag`] - self-describing key/value attribute used in login payloads,
//!   search results and server list entries
//!
//! # Example
//!
//! ```
//! use ed2k_client::codec::{file_tag, ByteReader, ByteWriter, Tag};
//!
//! let mut writer = ByteWriter::new();
//! Tag::new(file_tag::FILE_NAME, "a.txt").encode(&mut writer).unwrap();
//!
//! let bytes = writer.freeze();
//! let mut reader = ByteReader::new(&bytes);
//! let tag = Tag::decode(&mut reader).unwrap().unwrap();
//! assert_eq!(tag.value.as_text(), Some("a.txt"));
//! ```

mod cursor;
mod tag;

pub use cursor::{ByteReader, ByteWriter};
pub use tag::{file_tag, find_tag, tag_name, Tag, TagName, TagType, TagValue};
