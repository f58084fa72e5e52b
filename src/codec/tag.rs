//! Attribute (tag) codec.
//!
//! Wire layout of one tag:
//! ```text
//! ┌────────┬──────────────────────────────┬─────────────────┐
//! │ Type   │ Name                         │ Value           │
//! │ 1 byte │ bit 7 set: 1-byte id         │ depends on type │
//! │        │ else u16 len + len bytes     │                 │
//! │        │ (len == 1 means 1-byte id)   │                 │
//! └────────┴──────────────────────────────┴─────────────────┘
//! ```
//!
//! Reading understands every type eMule servers send. Types with no useful
//! value here (u64, float, hash, bool, bool array, blob) are consumed and
//! reported as `None`. Writing only covers String and UInt32 tags.

use crate::error::{Ed2kError, Result};

use super::cursor::{ByteReader, ByteWriter};

/// High bit of the type byte: name is a single id byte.
const NAME_ID_FLAG: u8 = 0x80;

/// First and last of the fixed-length string types (1..=16 bytes).
const FIXED_STRING_FIRST: u8 = 0x11;
const FIXED_STRING_LAST: u8 = 0x20;

/// Well-known tag name ids for login and server list entries.
pub mod tag_name {
    pub const NAME: u8 = 0x01;
    pub const DESCRIPTION: u8 = 0x0b;
    pub const VERSION: u8 = 0x11;
    pub const SERVER_FLAGS: u8 = 0x20;
    pub const EMULE_VERSION: u8 = 0xfb;
}

/// Well-known tag name ids for search results.
pub mod file_tag {
    pub const FILE_NAME: u8 = 0x01;
    pub const FILE_SIZE: u8 = 0x02;
    pub const FILE_SOURCES: u8 = 0x15;
    pub const FILE_COMPLETE_SOURCES: u8 = 0x30;
}

/// Tag type as found on the wire (after masking the name flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    Hash,
    String,
    UInt32,
    Float32,
    Boolean,
    BooleanArray,
    Blob,
    UInt16,
    UInt8,
    UInt64,
    /// Fixed-length string of 1..=16 bytes.
    FixedString(u8),
}

impl TagType {
    /// Map a masked type byte to a tag type.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let tag_type = match byte {
            0x01 => TagType::Hash,
            0x02 => TagType::String,
            0x03 => TagType::UInt32,
            0x04 => TagType::Float32,
            0x05 => TagType::Boolean,
            0x06 => TagType::BooleanArray,
            0x07 => TagType::Blob,
            0x08 => TagType::UInt16,
            0x09 => TagType::UInt8,
            0x0b => TagType::UInt64,
            FIXED_STRING_FIRST..=FIXED_STRING_LAST => {
                TagType::FixedString(byte - FIXED_STRING_FIRST + 1)
            }
            _ => return None,
        };
        Some(tag_type)
    }

    pub fn as_byte(self) -> u8 {
        match self {
            TagType::Hash => 0x01,
            TagType::String => 0x02,
            TagType::UInt32 => 0x03,
            TagType::Float32 => 0x04,
            TagType::Boolean => 0x05,
            TagType::BooleanArray => 0x06,
            TagType::Blob => 0x07,
            TagType::UInt16 => 0x08,
            TagType::UInt8 => 0x09,
            TagType::UInt64 => 0x0b,
            TagType::FixedString(len) => FIXED_STRING_FIRST + len - 1,
        }
    }
}

/// Tag name: a one-byte id or free text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagName {
    Id(u8),
    Text(String),
}

impl From<u8> for TagName {
    fn from(id: u8) -> Self {
        TagName::Id(id)
    }
}

impl From<&str> for TagName {
    fn from(text: &str) -> Self {
        TagName::Text(text.to_string())
    }
}

impl From<String> for TagName {
    fn from(text: String) -> Self {
        TagName::Text(text)
    }
}

/// Materialized tag value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagValue {
    Text(String),
    Number(u32),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(text) => Some(text),
            TagValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            TagValue::Number(n) => Some(*n),
            TagValue::Text(_) => None,
        }
    }
}

impl From<u32> for TagValue {
    fn from(n: u32) -> Self {
        TagValue::Number(n)
    }
}

impl From<&str> for TagValue {
    fn from(text: &str) -> Self {
        TagValue::Text(text.to_string())
    }
}

impl From<String> for TagValue {
    fn from(text: String) -> Self {
        TagValue::Text(text)
    }
}

/// A single key/value attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub tag_type: TagType,
    pub name: TagName,
    pub value: TagValue,
}

impl Tag {
    /// Create a writable tag; the wire type follows the value variant.
    ///
    /// # Example
    ///
    /// ```
    /// use ed2k_client::codec::{tag_name, Tag, TagType};
    ///
    /// let tag = Tag::new(tag_name::NAME, "tester");
    /// assert_eq!(tag.tag_type, TagType::String);
    ///
    /// let tag = Tag::new(tag_name::VERSION, 0x3cu32);
    /// assert_eq!(tag.tag_type, TagType::UInt32);
    /// ```
    pub fn new(name: impl Into<TagName>, value: impl Into<TagValue>) -> Self {
        let value = value.into();
        let tag_type = match value {
            TagValue::Text(_) => TagType::String,
            TagValue::Number(_) => TagType::UInt32,
        };
        Self {
            tag_type,
            name: name.into(),
            value,
        }
    }

    /// True if this tag carries the given numeric name id.
    #[inline]
    pub fn has_id(&self, id: u8) -> bool {
        self.name == TagName::Id(id)
    }

    /// Write the tag. Numeric names always use the length-1 form.
    pub fn encode(&self, writer: &mut ByteWriter) -> Result<()> {
        let type_byte = self.tag_type.as_byte();
        // Validate before touching the writer so a failure leaves no partial tag.
        match (&self.tag_type, &self.value) {
            (TagType::String, TagValue::Text(_)) | (TagType::UInt32, TagValue::Number(_)) => {}
            _ => return Err(Ed2kError::EncodingMismatch(type_byte)),
        }
        if let TagName::Text(text) = &self.name {
            // A 1-byte text name would read back as a numeric id.
            if text.len() == 1 {
                return Err(Ed2kError::EncodingMismatch(type_byte));
            }
            check_u16_len(text)?;
        }
        if let TagValue::Text(text) = &self.value {
            check_u16_len(text)?;
        }

        writer.put_u8(type_byte);
        match &self.name {
            TagName::Id(id) => {
                writer.put_u16(1);
                writer.put_u8(*id);
            }
            TagName::Text(text) => writer.put_u16_string(text)?,
        }

        match &self.value {
            TagValue::Text(text) => writer.put_u16_string(text)?,
            TagValue::Number(n) => writer.put_u32(*n),
        }
        Ok(())
    }

    /// Read one tag.
    ///
    /// Returns `Ok(None)` when the tag was recognized and skipped. Callers
    /// building tag lists should drop those entries.
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Option<Tag>> {
        let mut type_byte = reader.read_u8()?;
        let name = if type_byte & NAME_ID_FLAG != 0 {
            type_byte &= !NAME_ID_FLAG;
            TagName::Id(reader.read_u8()?)
        } else {
            match reader.read_u16()? {
                1 => TagName::Id(reader.read_u8()?),
                len => TagName::Text(reader.read_string(len as usize)?),
            }
        };

        let tag_type = TagType::from_byte(type_byte).ok_or(Ed2kError::UnknownTagType(type_byte))?;
        let value = match tag_type {
            TagType::String => TagValue::Text(reader.read_u16_string()?),
            TagType::UInt32 => TagValue::Number(reader.read_u32()?),
            TagType::UInt16 => TagValue::Number(u32::from(reader.read_u16()?)),
            TagType::UInt8 => TagValue::Number(u32::from(reader.read_u8()?)),
            TagType::FixedString(len) => TagValue::Text(reader.read_string(len as usize)?),
            TagType::UInt64 => return reader.skip(8).map(|_| None),
            TagType::Float32 => return reader.skip(4).map(|_| None),
            TagType::Hash => return reader.skip(16).map(|_| None),
            TagType::Boolean => return reader.skip(1).map(|_| None),
            TagType::BooleanArray => {
                let bits = reader.read_u16()? as usize;
                return reader.skip(bits.div_ceil(8)).map(|_| None);
            }
            TagType::Blob => {
                let len = reader.read_u32()? as usize;
                return reader.skip(len).map(|_| None);
            }
        };

        Ok(Some(Tag {
            tag_type,
            name,
            value,
        }))
    }

    /// Read a counted tag list, dropping skipped tags.
    pub fn decode_list(reader: &mut ByteReader<'_>, count: u32) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        for _ in 0..count {
            if let Some(tag) = Tag::decode(reader)? {
                tags.push(tag);
            }
        }
        Ok(tags)
    }
}

fn check_u16_len(text: &str) -> Result<()> {
    if text.len() > u16::MAX as usize {
        return Err(Ed2kError::StringTooLong(text.len()));
    }
    Ok(())
}

/// Find the first tag with the given id.
pub fn find_tag(tags: &[Tag], id: u8) -> Option<&Tag> {
    tags.iter().find(|tag| tag.has_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(bytes: &[u8]) -> Result<Option<Tag>> {
        let mut reader = ByteReader::new(bytes);
        Tag::decode(&mut reader)
    }

    #[test]
    fn test_numeric_uint32_round_trip() {
        let tag = Tag::new(tag_name::VERSION, 0x3cu32);
        let mut writer = ByteWriter::new();
        tag.encode(&mut writer).unwrap();

        let bytes = writer.freeze();
        assert_eq!(&bytes[..], &[0x03, 0x01, 0x00, 0x11, 0x3c, 0x00, 0x00, 0x00]);
        assert_eq!(decode_one(&bytes).unwrap(), Some(tag));
    }

    #[test]
    fn test_text_named_string_round_trip() {
        let tag = Tag::new("nick", "tester");
        let mut writer = ByteWriter::new();
        tag.encode(&mut writer).unwrap();

        let decoded = decode_one(&writer.freeze()).unwrap().unwrap();
        assert_eq!(decoded.name, TagName::Text("nick".to_string()));
        assert_eq!(decoded.tag_type, TagType::String);
        assert_eq!(decoded.value, TagValue::Text("tester".to_string()));
    }

    #[test]
    fn test_high_bit_name_is_masked() {
        // 0x83 = UInt32 with inline id, name 0x02, value 1024
        let bytes = [0x83, 0x02, 0x00, 0x04, 0x00, 0x00];
        let tag = decode_one(&bytes).unwrap().unwrap();
        assert_eq!(tag.tag_type, TagType::UInt32);
        assert!(tag.has_id(file_tag::FILE_SIZE));
        assert_eq!(tag.value.as_number(), Some(1024));
    }

    #[test]
    fn test_small_integer_types() {
        let tag = decode_one(&[0x88, 0x15, 0x34, 0x12]).unwrap().unwrap();
        assert_eq!(tag.tag_type, TagType::UInt16);
        assert_eq!(tag.value, TagValue::Number(0x1234));

        let tag = decode_one(&[0x89, 0x30, 0x07]).unwrap().unwrap();
        assert_eq!(tag.tag_type, TagType::UInt8);
        assert_eq!(tag.value, TagValue::Number(7));
    }

    #[test]
    fn test_fixed_length_string() {
        // 0x13 = fixed string of 3 bytes, inline id 0x01
        let tag = decode_one(&[0x93, 0x01, b'a', b'b', b'c']).unwrap().unwrap();
        assert_eq!(tag.tag_type, TagType::FixedString(3));
        assert_eq!(tag.value.as_text(), Some("abc"));

        // 0x20 = 16 bytes
        let mut bytes = vec![0xA0, 0x01];
        bytes.extend_from_slice(&[b'x'; 16]);
        let tag = decode_one(&bytes).unwrap().unwrap();
        assert_eq!(tag.value.as_text().map(str::len), Some(16));
    }

    #[test]
    fn test_blob_skip_then_next_tag() {
        let mut bytes = vec![0x87, 0x55];
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(&[0xEE; 5]);
        bytes.extend_from_slice(&[0x83, 0x02, 0x00, 0x04, 0x00, 0x00]);

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(Tag::decode(&mut reader).unwrap(), None);
        let next = Tag::decode(&mut reader).unwrap().unwrap();
        assert_eq!(next.value, TagValue::Number(1024));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_fixed_width_skips() {
        for (type_byte, width) in [(0x8b_u8, 8usize), (0x84, 4), (0x81, 16), (0x85, 1)] {
            let mut bytes = vec![type_byte, 0x01];
            bytes.extend(std::iter::repeat(0u8).take(width));
            let mut reader = ByteReader::new(&bytes);
            assert_eq!(Tag::decode(&mut reader).unwrap(), None);
            assert!(reader.is_empty(), "type {type_byte:#x} left bytes behind");
        }
    }

    #[test]
    fn test_boolean_array_skips_ceil_bytes() {
        // 9 bits -> 2 bytes
        let bytes = [0x86, 0x01, 0x09, 0x00, 0xFF, 0x01, 0x89, 0x01, 0x05];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(Tag::decode(&mut reader).unwrap(), None);
        let next = Tag::decode(&mut reader).unwrap().unwrap();
        assert_eq!(next.value, TagValue::Number(5));
    }

    #[test]
    fn test_unknown_type_fails() {
        let err = decode_one(&[0x8A, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, Ed2kError::UnknownTagType(0x0A)));
    }

    #[test]
    fn test_truncated_value_fails() {
        let err = decode_one(&[0x83, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, Ed2kError::Truncated { .. }));
    }

    #[test]
    fn test_encode_mismatch_writes_nothing() {
        let tag = Tag {
            tag_type: TagType::String,
            name: TagName::Id(1),
            value: TagValue::Number(1),
        };
        let mut writer = ByteWriter::new();
        assert!(matches!(
            tag.encode(&mut writer),
            Err(Ed2kError::EncodingMismatch(0x02))
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_text_name_lengths() {
        for name in ["", "ab"] {
            let tag = Tag::new(name, "value");
            let mut writer = ByteWriter::new();
            tag.encode(&mut writer).unwrap();
            assert_eq!(decode_one(&writer.freeze()).unwrap(), Some(tag));
        }

        // One byte of text is indistinguishable from a numeric id on the wire.
        let mut writer = ByteWriter::new();
        assert!(matches!(
            Tag::new("a", "value").encode(&mut writer),
            Err(Ed2kError::EncodingMismatch(0x02))
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_oversized_name_writes_nothing() {
        let tag = Tag::new("n".repeat(70_000).as_str(), 1u32);
        let mut writer = ByteWriter::new();
        assert!(matches!(
            tag.encode(&mut writer),
            Err(Ed2kError::StringTooLong(70_000))
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_read_only_types_cannot_be_written() {
        let tag = decode_one(&[0x88, 0x15, 0x01, 0x00]).unwrap().unwrap();
        let mut writer = ByteWriter::new();
        assert!(matches!(
            tag.encode(&mut writer),
            Err(Ed2kError::EncodingMismatch(0x08))
        ));
    }

    #[test]
    fn test_decode_list_filters_skipped() {
        let mut bytes = vec![0x85, 0x01, 0x01];
        bytes.extend_from_slice(&[0x89, 0x15, 0x03]);
        let mut reader = ByteReader::new(&bytes);
        let tags = Tag::decode_list(&mut reader, 2).unwrap();
        assert_eq!(tags.len(), 1);
        assert!(find_tag(&tags, file_tag::FILE_SOURCES).is_some());
        assert!(find_tag(&tags, file_tag::FILE_NAME).is_none());
    }

    #[test]
    fn test_type_byte_mapping() {
        for byte in (0x01..=0x09).chain([0x0b]).chain(0x11..=0x20) {
            let tag_type = TagType::from_byte(byte).unwrap();
            assert_eq!(tag_type.as_byte(), byte);
        }
        assert!(TagType::from_byte(0x0a).is_none());
        assert!(TagType::from_byte(0x21).is_none());
    }
}
