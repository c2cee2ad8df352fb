//! Body store encoding.
//!
//! Every entry is rendered to HTML and framed as a self-delimiting block:
//!
//! ```text
//! [4 bytes] big-endian payload length
//! [n bytes] UTF-8 payload: <h1>title</h1><div class="definition">body</div>
//! ```
//!
//! Blocks are concatenated in first-seen entry order and the whole store is
//! zlib-compressed once. The offset table stays uncompressed so a reader can
//! decompress once and slice.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::debug;
use quick_xml::escape::escape;
use thiserror::Error;

use super::entry::Entry;
use super::error::{ConvertError, Result};
use super::keys::EntryId;

/// Size of the length prefix in front of every block.
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Truncated body block at offset {offset}")]
pub struct TruncatedBlock {
    pub offset: usize,
}

/// Renders the block payload of one entry.
pub fn render_payload(entry: &Entry) -> String {
    format!(
        "<h1>{}</h1><div class=\"definition\">{}</div>",
        escape(entry.display_title.as_str()),
        entry.body
    )
}

/// Prefixes `payload` with its big-endian length.
pub fn frame(payload: &[u8]) -> Option<Vec<u8>> {
    let len = u32::try_from(payload.len()).ok()?;
    let mut block = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    block.extend_from_slice(&len.to_be_bytes());
    block.extend_from_slice(payload);
    Some(block)
}

/// Payload of a single framed block.
pub fn block_payload(block: &[u8]) -> std::result::Result<&[u8], TruncatedBlock> {
    let (header, rest) = block
        .split_at_checked(FRAME_HEADER_LEN)
        .ok_or(TruncatedBlock { offset: 0 })?;
    let len = BigEndian::read_u32(header) as usize;
    rest.get(..len).ok_or(TruncatedBlock { offset: 0 })
}

/// Splits a decompressed store back into its framed blocks.
pub fn split_blocks(data: &[u8]) -> std::result::Result<Vec<&[u8]>, TruncatedBlock> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let rest = &data[offset..];
        let payload = block_payload(rest).map_err(|_| TruncatedBlock { offset })?;
        let end = FRAME_HEADER_LEN + payload.len();
        blocks.push(&rest[..end]);
        offset += end;
    }
    Ok(blocks)
}

/// Location of one entry's block inside the decompressed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRecord {
    pub entry_id: EntryId,
    pub offset: u64,
    /// Block length, frame header included.
    pub length: u32,
}

impl BodyRecord {
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

/// Accumulates framed blocks in arrival order.
#[derive(Debug, Default)]
pub struct BodyEncoder {
    records: Vec<BodyRecord>,
    positions: HashMap<EntryId, usize>,
    data: Vec<u8>,
}

impl BodyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the block of `entry`. A repeated id is ignored and returns
    /// `false`.
    pub fn push(&mut self, entry: &Entry) -> Result<bool> {
        let slot = match self.positions.entry(entry.id.clone()) {
            MapEntry::Occupied(_) => return Ok(false),
            MapEntry::Vacant(slot) => slot,
        };

        let payload = render_payload(entry);
        let block = frame(payload.as_bytes())
            .and_then(|block| u32::try_from(block.len()).ok().map(|len| (block, len)));
        let Some((block, length)) = block else {
            return Err(ConvertError::EntryTooLarge {
                entry_id: entry.id.to_string(),
                len: payload.len(),
            });
        };

        slot.insert(self.records.len());
        self.records.push(BodyRecord {
            entry_id: entry.id.clone(),
            offset: self.data.len() as u64,
            length,
        });
        self.data.extend_from_slice(&block);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compresses the concatenated blocks.
    pub fn finish(self) -> Result<BodyStore> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder
            .write_all(&self.data)
            .map_err(ConvertError::Compression)?;
        let compressed = encoder.finish().map_err(ConvertError::Compression)?;
        debug!(
            "Body store: {} entries, {} bytes, {} compressed",
            self.records.len(),
            self.data.len(),
            compressed.len()
        );
        Ok(BodyStore {
            records: self.records,
            positions: self.positions,
            decompressed_len: self.data.len() as u64,
            compressed,
        })
    }
}

/// The finished body: offset table plus the compressed block stream.
#[derive(Debug, Clone)]
pub struct BodyStore {
    records: Vec<BodyRecord>,
    positions: HashMap<EntryId, usize>,
    decompressed_len: u64,
    compressed: Vec<u8>,
}

impl BodyStore {
    pub fn records(&self) -> &[BodyRecord] {
        &self.records
    }

    /// Row of `entry_id` in the offset table.
    pub fn position(&self, entry_id: &EntryId) -> Option<usize> {
        self.positions.get(entry_id).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn decompressed_len(&self) -> u64 {
        self.decompressed_len
    }

    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    pub fn decompress(&self) -> std::io::Result<Vec<u8>> {
        decompress(&self.compressed, self.decompressed_len)
    }
}

/// Inflates a zlib body stream, refusing output of a different size.
pub fn decompress(compressed: &[u8], expected_len: u64) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len as usize);
    ZlibDecoder::new(compressed)
        .take(expected_len + 1)
        .read_to_end(&mut out)?;
    if out.len() as u64 != expected_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Body decompressed to {} bytes, expected {}",
                out.len(),
                expected_len
            ),
        ));
    }
    Ok(out)
}
