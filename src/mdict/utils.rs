//! Byte-level helpers shared by the header, index and block parsers.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_16LE};

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::MdictEncoding;

/// Reads a big-endian size/count field of 4 or 8 bytes.
pub fn read_number(reader: &mut impl Read, width: usize) -> Result<u64> {
    match width {
        8 => Ok(reader.read_u64::<BigEndian>()?),
        4 => Ok(u64::from(reader.read_u32::<BigEndian>()?)),
        _ => Err(MdictError::InvalidFormat(format!(
            "Invalid number width: {}",
            width
        ))),
    }
}

/// Reads a big-endian text length prefix of 1 or 2 bytes.
pub fn read_small_number(reader: &mut impl Read, width: usize) -> Result<u64> {
    match width {
        2 => Ok(u64::from(reader.read_u16::<BigEndian>()?)),
        1 => Ok(u64::from(reader.read_u8()?)),
        _ => Err(MdictError::InvalidFormat(format!(
            "Invalid text length width: {}",
            width
        ))),
    }
}

/// Size in bytes of one text unit (and of the NUL terminator).
pub fn unit_width(encoding: MdictEncoding) -> usize {
    if encoding == UTF_16LE { 2 } else { 1 }
}

/// Resolves an encoding label, folding the GBK family into GB18030.
///
/// Unknown labels fall back to UTF-8.
pub fn parse_encoding(label: &str) -> MdictEncoding {
    let label = label.trim();
    let label = if label.eq_ignore_ascii_case("GBK") || label.eq_ignore_ascii_case("GB2312") {
        "GB18030"
    } else {
        label
    };
    Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}
