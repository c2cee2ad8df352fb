//! # Index parsing
//!
//! Locates every key block and record block of the file. v1/v2 files keep a
//! single linear layout; v3 files are a sequence of typed sections that has
//! to be scanned first. Both produce the same [`BlockLayout`].

use std::fs::File;

use crate::mdict::types::error::Result;
use crate::mdict::types::models::{BlockMeta, MdictHeader, MdictVersion};

pub mod common;
pub mod v1v2;
pub mod v3;

/// Block tables of a dictionary, in file order.
#[derive(Debug, Default)]
pub struct BlockLayout {
    pub key_blocks: Vec<BlockMeta>,
    pub record_blocks: Vec<BlockMeta>,
    /// Number of keys declared by the key index.
    pub num_entries: u64,
}

impl BlockLayout {
    /// Size of the virtual stream formed by all decompressed record blocks.
    pub fn total_record_size(&self) -> u64 {
        self.record_blocks
            .last()
            .map(BlockMeta::decompressed_end)
            .unwrap_or(0)
    }
}

/// Reads the index section that follows the header.
pub fn parse(file: &mut File, header: &MdictHeader) -> Result<BlockLayout> {
    match header.version {
        MdictVersion::V3 => v3::parse(file, header),
        MdictVersion::V1 | MdictVersion::V2 => v1v2::parse(file, header),
    }
}
