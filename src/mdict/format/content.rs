//! # Block content decoding
//!
//! Every key and record block starts with an 8-byte header:
//!
//! ```text
//! [4 bytes] little-endian info word
//!           bits 0-3  compression type
//!           bits 4-7  encryption type
//!           bits 8-15 number of leading payload bytes that are encrypted
//! [4 bytes] big-endian Adler-32
//!           v1/v2: of the decompressed data
//!           v3:    of the decrypted, still-compressed payload
//! ```

use std::cmp::min;

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::trace;

use crate::mdict::codec::{compression, crypto};
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{
    CompressionType, EncryptionType, KeyEntry, MdictEncoding, MdictHeader, MdictVersion, RecordSpan,
};
use crate::mdict::utils;

/// Decrypts, decompresses and verifies one raw block (header included).
///
/// The payload is decrypted in place, so `raw_block` is clobbered.
pub fn decode_block(
    raw_block: &mut [u8],
    expected_size: u64,
    master_key: Option<&[u8; 16]>,
    version: MdictVersion,
) -> Result<Vec<u8>> {
    if raw_block.len() < 8 {
        return Err(MdictError::InvalidFormat(format!(
            "Block of {} bytes is shorter than its 8-byte header",
            raw_block.len()
        )));
    }

    let info = LittleEndian::read_u32(&raw_block[0..4]);
    let compression = CompressionType::try_from((info & 0xF) as u8)?;
    let encryption = EncryptionType::try_from(((info >> 4) & 0xF) as u8)?;
    let encrypted_len = ((info >> 8) & 0xFF) as usize;
    let checksum_expected = BigEndian::read_u32(&raw_block[4..8]);
    trace!(
        "Block header: {:?}/{:?}, {} encrypted bytes, expecting {} bytes",
        compression, encryption, encrypted_len, expected_size
    );

    if encryption != EncryptionType::None {
        let key = match master_key {
            Some(key) => *key,
            None => crypto::derive_key_for_block(raw_block),
        };
        let payload = &mut raw_block[8..];
        // A zero length in the info word means the whole payload.
        let len = if encrypted_len == 0 {
            payload.len()
        } else {
            min(encrypted_len, payload.len())
        };
        crypto::decrypt_payload_in_place(&mut payload[..len], encryption, &key);
    }

    let payload = &raw_block[8..];
    if version == MdictVersion::V3 {
        verify_checksum(payload, checksum_expected)?;
    }
    let decompressed = compression::decompress_payload(payload, compression, expected_size)?;
    if version != MdictVersion::V3 {
        verify_checksum(&decompressed, checksum_expected)?;
    }
    Ok(decompressed)
}

fn verify_checksum(data: &[u8], expected: u32) -> Result<()> {
    let actual = adler32_slice(data);
    if actual != expected {
        return Err(MdictError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Splits a decompressed key block into `(record offset, key)` entries.
pub fn parse_key_entries(data: &[u8], header: &MdictHeader) -> Result<Vec<KeyEntry>> {
    let mut entries = Vec::new();
    let mut reader = data;
    while !reader.is_empty() {
        let id = utils::read_number(&mut reader, header.version.number_width())?;
        let text = read_null_terminated_string(&mut reader, header.encoding)?;
        entries.push(KeyEntry { id, text });
    }
    Ok(entries)
}

/// Borrows the bytes of one record out of its decompressed block.
pub fn record_bytes<'a>(block: &'a [u8], span: &RecordSpan) -> Result<&'a [u8]> {
    let start = span.offset_in_block as usize;
    let end = start + span.size as usize;
    block.get(start..end).ok_or_else(|| {
        MdictError::InvalidFormat(format!(
            "Record span {}..{} lies outside its {}-byte block",
            start,
            end,
            block.len()
        ))
    })
}

/// Reads a NUL-terminated key (two NUL bytes for UTF-16) and advances the
/// slice past the terminator.
fn read_null_terminated_string(reader: &mut &[u8], encoding: MdictEncoding) -> Result<String> {
    let width = utils::unit_width(encoding);
    let end = if width == 2 {
        reader
            .chunks_exact(2)
            .position(|unit| unit == [0, 0])
            .map(|i| i * 2)
    } else {
        reader.iter().position(|&b| b == 0)
    }
    .ok_or_else(|| MdictError::InvalidFormat("Key text is missing its terminator".to_string()))?;

    let (text, _) = encoding.decode_without_bom_handling(&reader[..end]);
    *reader = &reader[end + width..];
    Ok(text.into_owned())
}
