//! Sequential access to dictionary entries.
//!
//! [`KeysIterator`] decodes key blocks only and yields `(key, record offset)`.
//! [`RecordIterator`] builds on it, decoding each record block once and
//! slicing out the raw record bytes.
//!
//! ```no_run
//! # use mdict_bundle::MdictReader;
//! let reader = MdictReader::new("dict.mdx", None, None)?;
//! for entry in reader.iter_records() {
//!     let (key, bytes) = entry?;
//!     println!("{}: {} bytes", key, bytes.len());
//! }
//! # Ok::<(), mdict_bundle::MdictError>(())
//! ```

use std::collections::VecDeque;
use std::vec::IntoIter;

use super::format::content;
use super::reader::MdictReader;
use super::types::error::{MdictError, Result};
use super::types::models::{KeyEntry, RecordSpan};

/// Iterator over `(key, record offset)` pairs in file order.
pub struct KeysIterator<'a> {
    reader: &'a MdictReader,
    next_block: usize,
    pending: IntoIter<KeyEntry>,
}

impl<'a> KeysIterator<'a> {
    pub(super) fn new(reader: &'a MdictReader) -> Self {
        Self {
            reader,
            next_block: 0,
            pending: Vec::new().into_iter(),
        }
    }
}

impl Iterator for KeysIterator<'_> {
    type Item = Result<(String, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.next() {
                return Some(Ok((entry.text, entry.id)));
            }
            if self.next_block >= self.reader.key_blocks().len() {
                return None;
            }
            match self.reader.read_key_block_entries(self.next_block) {
                Ok(entries) => {
                    self.pending = entries.into_iter();
                    self.next_block += 1;
                }
                Err(e) => {
                    // Stop after reporting; the rest of the stream is unusable.
                    self.next_block = usize::MAX;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Iterator over `(key, raw record bytes)` pairs in file order.
///
/// Keeps the most recently decoded record block, so consecutive records in
/// the same block cost one decode. Keys sharing a record offset all get that
/// one record.
pub struct RecordIterator<'a> {
    reader: &'a MdictReader,
    keys: KeysIterator<'a>,
    /// Keys read ahead while searching for the end of a record.
    lookahead: VecDeque<(String, u64)>,
    /// Error met while reading ahead, reported once the lookahead drains.
    deferred: Option<MdictError>,
    block_index: usize,
    cached: Option<(usize, Vec<u8>)>,
}

impl<'a> RecordIterator<'a> {
    pub(super) fn new(reader: &'a MdictReader) -> Self {
        Self {
            reader,
            keys: KeysIterator::new(reader),
            lookahead: VecDeque::new(),
            deferred: None,
            block_index: 0,
            cached: None,
        }
    }

    /// Offset of the first upcoming key that lies past `id`, reading keys
    /// ahead as needed.
    fn next_offset_after(&mut self, id: u64) -> Option<u64> {
        if let Some(&(_, next)) = self.lookahead.iter().find(|(_, next)| *next > id) {
            return Some(next);
        }
        if self.deferred.is_some() {
            return None;
        }
        for item in self.keys.by_ref() {
            match item {
                Ok((key, next)) => {
                    self.lookahead.push_back((key, next));
                    if next > id {
                        return Some(next);
                    }
                }
                Err(e) => {
                    self.deferred = Some(e);
                    return None;
                }
            }
        }
        None
    }

    /// Walks forward through the record blocks until the one holding `id`.
    fn span_for(&mut self, id: u64) -> Result<RecordSpan> {
        let reader = self.reader;
        let blocks = reader.record_blocks();
        while self.block_index < blocks.len() && id >= blocks[self.block_index].decompressed_end() {
            self.block_index += 1;
        }
        let block = blocks.get(self.block_index).ok_or_else(|| {
            MdictError::InvalidFormat(format!("Record offset {} lies past the last block", id))
        })?;
        if id < block.decompressed_offset {
            return Err(MdictError::InvalidFormat(format!(
                "Record offset {} goes backwards",
                id
            )));
        }

        let block_end = block.decompressed_end();
        let next_id = self
            .next_offset_after(id)
            .map_or(block_end, |next| next.min(block_end));
        Ok(RecordSpan {
            block_index: self.block_index,
            offset_in_block: id - block.decompressed_offset,
            size: next_id - id,
        })
    }

    fn record(&mut self, id: u64) -> Result<Vec<u8>> {
        let span = self.span_for(id)?;
        let cached_here = matches!(&self.cached, Some((index, _)) if *index == span.block_index);
        if !cached_here {
            let block = self.reader.read_record_block(span.block_index)?;
            self.cached = Some((span.block_index, block));
        }
        let block = self.cached.as_ref().map(|(_, bytes)| bytes.as_slice()).unwrap_or_default();
        content::record_bytes(block, &span).map(<[u8]>::to_vec)
    }
}

impl Iterator for RecordIterator<'_> {
    type Item = Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, id) = match self.lookahead.pop_front() {
            Some(pair) => pair,
            None => match self.deferred.take() {
                Some(e) => return Some(Err(e)),
                None => match self.keys.next()? {
                    Ok(pair) => pair,
                    Err(e) => return Some(Err(e)),
                },
            },
        };
        Some(self.record(id).map(|bytes| (key, bytes)))
    }
}
