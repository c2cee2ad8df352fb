//! Core data structures for MDict format components.
//!
//! - File metadata and headers
//! - Block and key entry descriptors
//! - Version and block-type enumerations

use std::collections::HashMap;
use std::fmt;

use encoding_rs::Encoding;

use super::error::{MdictError, Result};

/// Text encoding used for keys and record bodies.
pub type MdictEncoding = &'static Encoding;

/// Optional 16-byte master key used to decrypt Salsa20-protected sections.
pub type MasterKey = Option<[u8; 16]>;

/// Encryption bitmask from the `Encrypted` header attribute.
///
/// - Bit 0x01: record blocks (and the key block info) are Salsa20-encrypted
/// - Bit 0x02: the v2 key index is encrypted with the fast XOR cipher
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptionFlags {
    pub encrypt_record_blocks: bool,
    pub encrypt_key_index: bool,
}

/// User-visible metadata taken from the header XML attributes.
#[derive(Debug, Clone)]
pub struct MdictMetadata {
    pub title: String,
    pub engine_version: String,
    pub description: Option<String>,
    /// Raw value of the `StyleSheet` attribute; see [`StyleSheet::parse`].
    pub stylesheet_raw: Option<String>,
    /// Present in v3 files, where it seeds the master key.
    pub uuid: Option<Vec<u8>>,
}

/// Fully parsed MDict header.
#[derive(Debug)]
pub struct MdictHeader {
    pub version: MdictVersion,
    pub encoding: MdictEncoding,
    pub encryption_flags: EncryptionFlags,
    pub master_key: MasterKey,
    pub metadata: MdictMetadata,
}

/// A key from a decoded key block, pointing into the virtual record stream.
#[derive(Debug)]
pub struct KeyEntry {
    /// Offset of the record in the concatenated, decompressed record blocks.
    pub id: u64,
    pub text: String,
}

/// Where one record lives: the block that holds it and its span inside the
/// decompressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub block_index: usize,
    pub offset_in_block: u64,
    pub size: u64,
}

/// Location and sizes of one compressed block in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    /// Stored size, including the 8-byte block header.
    pub compressed_size: u64,
    pub decompressed_size: u64,
    /// Absolute file offset of the block header.
    pub file_offset: u64,
    /// Offset of this block inside the virtual decompressed stream.
    pub decompressed_offset: u64,
}

impl BlockMeta {
    /// One past the last virtual offset covered by this block.
    pub fn decompressed_end(&self) -> u64 {
        self.decompressed_offset + self.decompressed_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdictVersion {
    V1,
    V2,
    V3,
}

impl MdictVersion {
    /// Width of count/size fields: 4 bytes in v1, 8 bytes afterwards.
    pub fn number_width(self) -> usize {
        match self {
            MdictVersion::V1 => 4,
            MdictVersion::V2 | MdictVersion::V3 => 8,
        }
    }

    /// Width of text length prefixes: 1 byte in v1, 2 bytes afterwards.
    pub fn small_number_width(self) -> usize {
        match self {
            MdictVersion::V1 => 1,
            MdictVersion::V2 | MdictVersion::V3 => 2,
        }
    }

    /// Number of terminator units following a length-prefixed text.
    pub fn text_terminator_units(self) -> u64 {
        match self {
            MdictVersion::V1 => 0,
            MdictVersion::V2 | MdictVersion::V3 => 1,
        }
    }
}

impl TryFrom<f32> for MdictVersion {
    type Error = MdictError;

    fn try_from(v: f32) -> Result<Self> {
        match v {
            v if v < 2.0 => Ok(Self::V1),
            v if v < 3.0 => Ok(Self::V2),
            v if v < 4.0 => Ok(Self::V3),
            _ => Err(MdictError::UnsupportedVersion(v)),
        }
    }
}

/// Section markers used by v3 files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V3BlockType {
    RecordData = 0x0100_0000,
    RecordIndex = 0x0200_0000,
    KeyData = 0x0300_0000,
    KeyIndex = 0x0400_0000,
}

impl TryFrom<u32> for V3BlockType {
    type Error = MdictError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0x0100_0000 => Ok(Self::RecordData),
            0x0200_0000 => Ok(Self::RecordIndex),
            0x0300_0000 => Ok(Self::KeyData),
            0x0400_0000 => Ok(Self::KeyIndex),
            _ => Err(MdictError::InvalidFormat(format!(
                "Unknown v3 section marker: {:#010x}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Key,
    Record,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Key => f.write_str("key"),
            BlockType::Record => f.write_str("record"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lzo,
    Zlib,
}

impl TryFrom<u8> for CompressionType {
    type Error = MdictError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Lzo),
            2 => Ok(Self::Zlib),
            _ => Err(MdictError::InvalidFormat(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    None,
    Fast,
    Salsa20,
}

impl TryFrom<u8> for EncryptionType {
    type Error = MdictError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Fast),
            2 => Ok(Self::Salsa20),
            _ => Err(MdictError::InvalidFormat(format!(
                "Unknown encryption type: {}",
                value
            ))),
        }
    }
}

/// Numbered style table declared in the header's `StyleSheet` attribute.
///
/// The raw attribute is a list of lines grouped in threes: a numeric style
/// id, the opening markup and the closing markup. Record bodies refer to a
/// style with a backtick marker such as `` `3` ``.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    styles: HashMap<u32, (String, String)>,
}

impl StyleSheet {
    /// Parses the raw attribute value. Groups with a non-numeric id are
    /// skipped; a trailing incomplete group is ignored.
    pub fn parse(raw: &str) -> Self {
        let lines: Vec<&str> = raw.lines().collect();
        let styles = lines
            .chunks_exact(3)
            .filter_map(|group| {
                let id = group[0].trim().parse::<u32>().ok()?;
                Some((id, (group[1].to_string(), group[2].to_string())))
            })
            .collect();
        Self { styles }
    }

    /// Opening and closing markup for a style id.
    pub fn get(&self, id: u32) -> Option<(&str, &str)> {
        self.styles
            .get(&id)
            .map(|(open, close)| (open.as_str(), close.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_thresholds() {
        assert_eq!(MdictVersion::try_from(1.2).unwrap(), MdictVersion::V1);
        assert_eq!(MdictVersion::try_from(2.0).unwrap(), MdictVersion::V2);
        assert_eq!(MdictVersion::try_from(3.0).unwrap(), MdictVersion::V3);
        assert!(matches!(
            MdictVersion::try_from(4.0),
            Err(MdictError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn stylesheet_groups_lines_in_threes() {
        let sheet = StyleSheet::parse("1\n<b>\n</b>\r\n2\n<i>\n</i>\nx\n<u>\n</u>\n9\n<s>");
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.get(1), Some(("<b>", "</b>")));
        assert_eq!(sheet.get(2), Some(("<i>", "</i>")));
        assert_eq!(sheet.get(9), None);
    }
}
