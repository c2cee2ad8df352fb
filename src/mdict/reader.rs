use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use log::info;

use super::format::index::BlockLayout;
use super::format::{content, header, index};
use super::iter::{KeysIterator, RecordIterator};
use super::types::error::{MdictError, Result};
use super::types::models::{
    BlockMeta, BlockType, KeyEntry, MdictHeader, MdictVersion, RecordSpan, StyleSheet,
};
use super::utils;

/// Reader for MDict dictionary files (`.mdx`), engine versions 1.x to 3.x.
///
/// Opening a file parses the header and block tables only; key and record
/// blocks are decoded lazily while iterating.
#[derive(Debug)]
pub struct MdictReader {
    file: Mutex<File>,
    pub header: MdictHeader,
    layout: BlockLayout,
}

impl MdictReader {
    /// Opens an MDict file.
    ///
    /// * `passcode` - optional `(regcode_hex, user_email)` for encrypted files
    /// * `user_encoding` - overrides the header's text encoding (v1/v2 only;
    ///   v3 is always UTF-8)
    ///
    /// # Errors
    /// Fails when the file cannot be opened, its version is unsupported, a
    /// checksum does not match or the index is malformed.
    pub fn new(
        path: impl AsRef<Path>,
        passcode: Option<(&str, &str)>,
        user_encoding: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening MDict file: {}", path.display());
        let mut file = File::open(path)?;

        let mut header = header::parse(&mut file, passcode)?;
        if header.version == MdictVersion::V3 {
            header.encoding = encoding_rs::UTF_8;
        } else if let Some(label) = user_encoding {
            let forced = utils::parse_encoding(label);
            info!(
                "Text encoding overridden: header='{}', forced='{}'",
                header.encoding.name(),
                forced.name()
            );
            header.encoding = forced;
        }

        let layout = index::parse(&mut file, &header)?;

        Ok(Self {
            file: Mutex::new(file),
            header,
            layout,
        })
    }

    pub fn title(&self) -> &str {
        &self.header.metadata.title
    }

    pub fn description(&self) -> Option<&str> {
        self.header.metadata.description.as_deref()
    }

    /// Numbered styles declared by the header; empty when there are none.
    pub fn stylesheet(&self) -> StyleSheet {
        self.header
            .metadata
            .stylesheet_raw
            .as_deref()
            .map(StyleSheet::parse)
            .unwrap_or_default()
    }

    pub fn num_entries(&self) -> u64 {
        self.layout.num_entries
    }

    pub fn num_key_blocks(&self) -> usize {
        self.layout.key_blocks.len()
    }

    pub fn num_record_blocks(&self) -> usize {
        self.layout.record_blocks.len()
    }

    /// Size of all record blocks once decompressed and concatenated.
    pub fn total_record_size(&self) -> u64 {
        self.layout.total_record_size()
    }

    /// Iterates `(key, record offset)` pairs; touches key blocks only.
    pub fn iter_keys(&self) -> KeysIterator<'_> {
        KeysIterator::new(self)
    }

    /// Iterates `(key, record bytes)` pairs in file order.
    pub fn iter_records(&self) -> RecordIterator<'_> {
        RecordIterator::new(self)
    }

    /// Locates the record starting at virtual offset `id` and ending at
    /// `next_id` (the following key's offset, or
    /// [`total_record_size`](Self::total_record_size) for the last one).
    pub fn record_span(&self, id: u64, next_id: u64) -> Result<RecordSpan> {
        let blocks = &self.layout.record_blocks;
        let block_index = blocks
            .partition_point(|block| block.decompressed_offset <= id)
            .checked_sub(1)
            .ok_or_else(|| MdictError::InvalidFormat(format!("Record {} precedes every block", id)))?;
        let block = &blocks[block_index];
        if id >= block.decompressed_end() || next_id < id {
            return Err(MdictError::InvalidFormat(format!(
                "Record {}..{} does not fit record block {}",
                id, next_id, block_index
            )));
        }
        Ok(RecordSpan {
            block_index,
            offset_in_block: id - block.decompressed_offset,
            size: next_id.min(block.decompressed_end()) - id,
        })
    }

    /// Reads the raw bytes of one record. Decodes its whole block, so use
    /// [`iter_records`](Self::iter_records) for sequential access.
    pub fn read_record(&self, span: &RecordSpan) -> Result<Vec<u8>> {
        let block = self.read_record_block(span.block_index)?;
        content::record_bytes(&block, span).map(<[u8]>::to_vec)
    }

    pub fn read_record_block(&self, block_index: usize) -> Result<Vec<u8>> {
        self.read_block(BlockType::Record, block_index)
    }

    pub(crate) fn read_key_block_entries(&self, block_index: usize) -> Result<Vec<KeyEntry>> {
        let data = self.read_block(BlockType::Key, block_index)?;
        content::parse_key_entries(&data, &self.header)
    }

    pub(crate) fn key_blocks(&self) -> &[BlockMeta] {
        &self.layout.key_blocks
    }

    pub(crate) fn record_blocks(&self) -> &[BlockMeta] {
        &self.layout.record_blocks
    }

    fn read_block(&self, block_type: BlockType, block_index: usize) -> Result<Vec<u8>> {
        let blocks = match block_type {
            BlockType::Key => &self.layout.key_blocks,
            BlockType::Record => &self.layout.record_blocks,
        };
        let meta = blocks.get(block_index).ok_or_else(|| {
            MdictError::InvalidFormat(format!("No {} block at index {}", block_type, block_index))
        })?;

        let mut raw = vec![0u8; meta.compressed_size as usize];
        {
            let mut file = self.file.lock().map_err(|_| MdictError::LockPoisoned)?;
            file.seek(SeekFrom::Start(meta.file_offset))?;
            file.read_exact(&mut raw)?;
        }

        content::decode_block(
            &mut raw,
            meta.decompressed_size,
            self.header.master_key.as_ref(),
            self.header.version,
        )
    }
}
