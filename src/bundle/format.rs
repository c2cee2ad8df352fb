//! Binary layout of `body.store` and `index.table`.
//!
//! All integers are big-endian.
//!
//! ```text
//! body.store
//!   header (32)  "LXBD" | version u16 | compression u16 | entries u32
//!                | id heap len u32 | decompressed len u64 | compressed len u64
//!   rows (20 each)  block offset u64 | block len u32 | id offset u32
//!                   | id len u16 | reserved u16
//!   id heap         UTF-8 entry ids
//!   payload         zlib stream of the framed blocks
//!
//! index.table
//!   header (16)  "LXIX" | version u16 | reserved u16 | records u32 | heap len u32
//!   rows (12 each)  heap offset u32 | key len u16 | display len u16 | entry row u32
//!   heap            per row: normalized key bytes, then display key bytes
//! ```

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use super::error::{BundleError, Result};
use super::{BODY_FILE, INDEX_FILE};
use crate::convert::body::{self, BodyStore};
use crate::convert::keys::{EntryId, KeyIndex};

pub const BODY_MAGIC: [u8; 4] = *b"LXBD";
pub const INDEX_MAGIC: [u8; 4] = *b"LXIX";
pub const FORMAT_VERSION: u16 = 1;
pub const COMPRESSION_ZLIB: u16 = 2;

pub const BODY_HEADER_LEN: usize = 32;
pub const BODY_ROW_LEN: usize = 20;
pub const INDEX_HEADER_LEN: usize = 16;
pub const INDEX_ROW_LEN: usize = 12;

/// One row of the body entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRow {
    pub entry_id: EntryId,
    pub offset: u64,
    pub length: u32,
}

/// One row of the key index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub normalized_key: String,
    pub display_key: String,
    pub entry_row: u32,
}

fn fit_u16(field: &'static str, value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| BundleError::FieldOverflow {
        field,
        value: value as u64,
    })
}

fn fit_u32(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| BundleError::FieldOverflow {
        field,
        value: value as u64,
    })
}

/// Serializes the body store.
pub fn encode_body(store: &BodyStore) -> Result<Vec<u8>> {
    let records = store.records();
    let mut heap = Vec::new();
    let mut rows = Vec::with_capacity(records.len() * BODY_ROW_LEN);
    for record in records {
        let id = record.entry_id.as_str().as_bytes();
        rows.extend_from_slice(&record.offset.to_be_bytes());
        rows.extend_from_slice(&record.length.to_be_bytes());
        rows.extend_from_slice(&fit_u32("entry id offset", heap.len())?.to_be_bytes());
        rows.extend_from_slice(&fit_u16("entry id length", id.len())?.to_be_bytes());
        rows.extend_from_slice(&0u16.to_be_bytes());
        heap.extend_from_slice(id);
    }

    let compressed = store.compressed();
    let mut out = Vec::with_capacity(BODY_HEADER_LEN + rows.len() + heap.len() + compressed.len());
    out.extend_from_slice(&BODY_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&COMPRESSION_ZLIB.to_be_bytes());
    out.extend_from_slice(&fit_u32("entry count", records.len())?.to_be_bytes());
    out.extend_from_slice(&fit_u32("entry id heap length", heap.len())?.to_be_bytes());
    out.extend_from_slice(&store.decompressed_len().to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u64).to_be_bytes());
    out.extend_from_slice(&rows);
    out.extend_from_slice(&heap);
    out.extend_from_slice(compressed);
    Ok(out)
}

/// Serializes the key index, pointing each key at its row in `store`.
///
/// Fails when a key targets an entry missing from the store or when a store
/// entry is not reachable from any key.
pub fn encode_index(index: &KeyIndex, store: &BodyStore) -> Result<Vec<u8>> {
    let mut referenced = vec![false; store.len()];
    let mut heap = Vec::new();
    let mut rows = Vec::with_capacity(index.len() * INDEX_ROW_LEN);

    for key in index {
        let row = store.position(&key.entry_id).ok_or_else(|| {
            BundleError::Inconsistent(format!(
                "key '{}' points at unknown entry {}",
                key.normalized_key, key.entry_id
            ))
        })?;
        referenced[row] = true;

        rows.extend_from_slice(&fit_u32("key heap offset", heap.len())?.to_be_bytes());
        rows.extend_from_slice(&fit_u16("normalized key length", key.normalized_key.len())?.to_be_bytes());
        rows.extend_from_slice(&fit_u16("display key length", key.display_key.len())?.to_be_bytes());
        rows.extend_from_slice(&fit_u32("entry row", row)?.to_be_bytes());
        heap.extend_from_slice(key.normalized_key.as_bytes());
        heap.extend_from_slice(key.display_key.as_bytes());
    }

    if let Some(row) = referenced.iter().position(|r| !r) {
        return Err(BundleError::Inconsistent(format!(
            "entry {} has no key",
            store.records()[row].entry_id
        )));
    }

    let mut out = Vec::with_capacity(INDEX_HEADER_LEN + rows.len() + heap.len());
    out.extend_from_slice(&INDEX_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&fit_u32("key count", index.len())?.to_be_bytes());
    out.extend_from_slice(&fit_u32("key heap length", heap.len())?.to_be_bytes());
    out.extend_from_slice(&rows);
    out.extend_from_slice(&heap);
    Ok(out)
}

/// Reads a fixed header, checking magic and version. Returns the reader
/// positioned after magic, version and the following `u16`.
fn read_preamble<'a>(bytes: &'a [u8], magic: [u8; 4], file: &'static str) -> Result<(u16, &'a [u8])> {
    let mut reader = bytes;
    let mut found = [0u8; 4];
    reader
        .read_exact(&mut found)
        .map_err(|_| BundleError::corrupt(file, "file too short for its header"))?;
    if found != magic {
        return Err(BundleError::corrupt(
            file,
            format!("bad magic {}", hex::encode(found)),
        ));
    }
    let version = read_u16(&mut reader, file)?;
    if version != FORMAT_VERSION {
        return Err(BundleError::corrupt(file, format!("unsupported version {}", version)));
    }
    let extra = read_u16(&mut reader, file)?;
    Ok((extra, reader))
}

fn read_u16(reader: &mut &[u8], file: &'static str) -> Result<u16> {
    reader
        .read_u16::<BigEndian>()
        .map_err(|_| BundleError::corrupt(file, "truncated header or table"))
}

fn read_u32(reader: &mut &[u8], file: &'static str) -> Result<u32> {
    reader
        .read_u32::<BigEndian>()
        .map_err(|_| BundleError::corrupt(file, "truncated header or table"))
}

fn read_u64(reader: &mut &[u8], file: &'static str) -> Result<u64> {
    reader
        .read_u64::<BigEndian>()
        .map_err(|_| BundleError::corrupt(file, "truncated header or table"))
}

/// Takes `len` bytes off the front of `reader`.
fn take<'a>(reader: &mut &'a [u8], len: usize, file: &'static str, what: &str) -> Result<&'a [u8]> {
    let bytes: &'a [u8] = *reader;
    let (head, rest) = bytes
        .split_at_checked(len)
        .ok_or_else(|| BundleError::corrupt(file, format!("{} is truncated", what)))?;
    *reader = rest;
    Ok(head)
}

fn heap_str<'a>(heap: &'a [u8], offset: usize, len: usize, file: &'static str) -> Result<&'a str> {
    let bytes = heap
        .get(offset..offset + len)
        .ok_or_else(|| BundleError::corrupt(file, format!("string at {}+{} outside heap", offset, len)))?;
    std::str::from_utf8(bytes)
        .map_err(|_| BundleError::corrupt(file, format!("string at {} is not UTF-8", offset)))
}

/// Parses `body.store`, returning its rows and the decompressed block stream.
///
/// Every row is checked to cover exactly one well-framed block.
pub fn decode_body(bytes: &[u8]) -> Result<(Vec<BodyRow>, Vec<u8>)> {
    let (compression, mut reader) = read_preamble(bytes, BODY_MAGIC, BODY_FILE)?;
    if compression != COMPRESSION_ZLIB {
        return Err(BundleError::corrupt(
            BODY_FILE,
            format!("unknown compression {}", compression),
        ));
    }
    let count = read_u32(&mut reader, BODY_FILE)? as usize;
    let heap_len = read_u32(&mut reader, BODY_FILE)? as usize;
    let decompressed_len = read_u64(&mut reader, BODY_FILE)?;
    let compressed_len = read_u64(&mut reader, BODY_FILE)? as usize;

    let table_len = count
        .checked_mul(BODY_ROW_LEN)
        .ok_or_else(|| BundleError::corrupt(BODY_FILE, "entry count overflows"))?;
    let mut table = take(&mut reader, table_len, BODY_FILE, "entry table")?;
    let heap = take(&mut reader, heap_len, BODY_FILE, "entry id heap")?;
    let compressed = take(&mut reader, compressed_len, BODY_FILE, "compressed payload")?;
    if !reader.is_empty() {
        return Err(BundleError::corrupt(
            BODY_FILE,
            format!("{} trailing bytes", reader.len()),
        ));
    }

    let data = body::decompress(compressed, decompressed_len)
        .map_err(|e| BundleError::corrupt(BODY_FILE, e.to_string()))?;

    let mut rows = Vec::with_capacity(count);
    for i in 0..count {
        let offset = read_u64(&mut table, BODY_FILE)?;
        let length = read_u32(&mut table, BODY_FILE)?;
        let id_offset = read_u32(&mut table, BODY_FILE)? as usize;
        let id_len = read_u16(&mut table, BODY_FILE)? as usize;
        let _reserved = read_u16(&mut table, BODY_FILE)?;

        let block = usize::try_from(offset)
            .ok()
            .and_then(|start| data.get(start..start.checked_add(length as usize)?))
            .ok_or_else(|| {
                BundleError::corrupt(BODY_FILE, format!("entry {} lies outside the payload", i))
            })?;
        let payload = body::block_payload(block)
            .map_err(|_| BundleError::corrupt(BODY_FILE, format!("entry {} is badly framed", i)))?;
        if payload.len() + body::FRAME_HEADER_LEN != block.len() {
            return Err(BundleError::corrupt(
                BODY_FILE,
                format!("entry {} length disagrees with its frame", i),
            ));
        }
        std::str::from_utf8(payload).map_err(|_| {
            BundleError::corrupt(BODY_FILE, format!("entry {} is not UTF-8", i))
        })?;

        let entry_id = EntryId::new(heap_str(heap, id_offset, id_len, BODY_FILE)?);
        rows.push(BodyRow {
            entry_id,
            offset,
            length,
        });
    }
    Ok((rows, data))
}

/// Parses `index.table`.
pub fn decode_index(bytes: &[u8]) -> Result<Vec<IndexRow>> {
    let (_reserved, mut reader) = read_preamble(bytes, INDEX_MAGIC, INDEX_FILE)?;
    let count = read_u32(&mut reader, INDEX_FILE)? as usize;
    let heap_len = read_u32(&mut reader, INDEX_FILE)? as usize;

    let table_len = count
        .checked_mul(INDEX_ROW_LEN)
        .ok_or_else(|| BundleError::corrupt(INDEX_FILE, "record count overflows"))?;
    let mut table = take(&mut reader, table_len, INDEX_FILE, "record table")?;
    let heap = take(&mut reader, heap_len, INDEX_FILE, "string heap")?;
    if !reader.is_empty() {
        return Err(BundleError::corrupt(
            INDEX_FILE,
            format!("{} trailing bytes", reader.len()),
        ));
    }

    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = read_u32(&mut table, INDEX_FILE)? as usize;
        let key_len = read_u16(&mut table, INDEX_FILE)? as usize;
        let display_len = read_u16(&mut table, INDEX_FILE)? as usize;
        let entry_row = read_u32(&mut table, INDEX_FILE)?;
        rows.push(IndexRow {
            normalized_key: heap_str(heap, offset, key_len, INDEX_FILE)?.to_string(),
            display_key: heap_str(heap, offset + key_len, display_len, INDEX_FILE)?.to_string(),
            entry_row,
        });
    }
    Ok(rows)
}
