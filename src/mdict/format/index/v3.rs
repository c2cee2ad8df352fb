//! Index parser for MDict engine version 3.x.
//!
//! A v3 body is a sequence of sections, each introduced by a 4-byte type
//! marker and an 8-byte length. The four sections (key data, key index,
//! record data, record index) may appear in any order. Data sections repeat
//! each block's sizes inline; when these disagree with the index, the index
//! wins.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, info, trace, warn};

use super::{BlockLayout, common};
use crate::mdict::format::content;
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{BlockMeta, BlockType, MdictHeader, V3BlockType};
use crate::mdict::utils;

/// File offsets of the payload of each v3 section.
#[derive(Debug, Clone, Copy)]
struct Sections {
    key_data: u64,
    key_index: u64,
    record_data: u64,
    record_index: u64,
}

pub fn parse(file: &mut File, header: &MdictHeader) -> Result<BlockLayout> {
    let start = file.stream_position()?;
    let sections = scan_sections(file, start)?;

    let (num_entries, key_index) = read_index(file, header, sections.key_index, BlockType::Key)?;
    let (_, record_index) = read_index(file, header, sections.record_index, BlockType::Record)?;

    let key_blocks = read_data_blocks(file, sections.key_data, &key_index, BlockType::Key)?;
    let record_blocks =
        read_data_blocks(file, sections.record_data, &record_index, BlockType::Record)?;

    info!(
        "v3 index parsed: {} entries, {} key blocks, {} record blocks",
        num_entries,
        key_blocks.len(),
        record_blocks.len()
    );

    Ok(BlockLayout {
        key_blocks,
        record_blocks,
        num_entries,
    })
}

/// Walks the section headers until end of file.
fn scan_sections<R: Read + Seek>(file: &mut R, start: u64) -> Result<Sections> {
    file.seek(SeekFrom::Start(start))?;

    let mut key_data = None;
    let mut key_index = None;
    let mut record_data = None;
    let mut record_index = None;

    while let Ok(marker) = file.read_u32::<BigEndian>() {
        let section = V3BlockType::try_from(marker)?;
        let len = file.read_u64::<BigEndian>()?;
        let offset = file.stream_position()?;
        trace!("Section {:?}: {} bytes at {}", section, len, offset);

        let slot = match section {
            V3BlockType::KeyData => &mut key_data,
            V3BlockType::KeyIndex => &mut key_index,
            V3BlockType::RecordData => &mut record_data,
            V3BlockType::RecordIndex => &mut record_index,
        };
        if slot.replace(offset).is_some() {
            warn!("Duplicate {:?} section, using the last one", section);
        }
        file.seek(SeekFrom::Current(len as i64))?;
    }

    let require = |offset: Option<u64>, section: V3BlockType| {
        offset.ok_or_else(|| {
            MdictError::InvalidFormat(format!("Missing {:?} section in v3 file", section))
        })
    };
    Ok(Sections {
        key_data: require(key_data, V3BlockType::KeyData)?,
        key_index: require(key_index, V3BlockType::KeyIndex)?,
        record_data: require(record_data, V3BlockType::RecordData)?,
        record_index: require(record_index, V3BlockType::RecordIndex)?,
    })
}

/// Decodes an index section into `(block size, decompressed size)` pairs.
/// For the key index also returns the summed entry count.
fn read_index<R: Read + Seek>(
    file: &mut R,
    header: &MdictHeader,
    offset: u64,
    block_type: BlockType,
) -> Result<(u64, Vec<(u64, u64)>)> {
    file.seek(SeekFrom::Start(offset))?;
    let num_chunks = file.read_u32::<BigEndian>()?;
    let _total = file.read_u64::<BigEndian>()?;
    debug!("{} index: {} compressed chunks", block_type, num_chunks);

    let mut entries = 0u64;
    let mut pairs = Vec::new();
    for _ in 0..num_chunks {
        let decompressed_size = u64::from(file.read_u32::<BigEndian>()?);
        let compressed_size = file.read_u32::<BigEndian>()? as usize;
        let mut raw = vec![0u8; compressed_size];
        file.read_exact(&mut raw)?;
        let chunk = content::decode_block(
            &mut raw,
            decompressed_size,
            header.master_key.as_ref(),
            header.version,
        )?;

        let mut reader = chunk.as_slice();
        match block_type {
            BlockType::Key => {
                while !reader.is_empty() {
                    entries += u64::from(reader.read_u32::<BigEndian>()?);
                    common::skip_text(&mut reader, header.version, header.encoding)?;
                    common::skip_text(&mut reader, header.version, header.encoding)?;
                    let block_size = utils::read_number(&mut reader, 4)?;
                    let block_decompressed = utils::read_number(&mut reader, 4)?;
                    pairs.push((block_size, block_decompressed));
                }
            }
            BlockType::Record => {
                if chunk.len() % 16 != 0 {
                    return Err(MdictError::InvalidFormat(format!(
                        "Record index chunk of {} bytes is not a multiple of 16",
                        chunk.len()
                    )));
                }
                while !reader.is_empty() {
                    let block_size = utils::read_number(&mut reader, 8)?;
                    let block_decompressed = utils::read_number(&mut reader, 8)?;
                    pairs.push((block_size, block_decompressed));
                }
            }
        }
    }
    Ok((entries, pairs))
}

/// Reads the inline sizes of every block in a data section and reconciles
/// them with the index.
fn read_data_blocks<R: Read + Seek>(
    file: &mut R,
    offset: u64,
    index: &[(u64, u64)],
    block_type: BlockType,
) -> Result<Vec<BlockMeta>> {
    file.seek(SeekFrom::Start(offset))?;
    let num_blocks = file.read_u32::<BigEndian>()? as usize;
    let _total = file.read_u64::<BigEndian>()?;

    if num_blocks != index.len() {
        return Err(MdictError::CountMismatch {
            item_type: format!("{} blocks in v3 data section", block_type),
            expected: index.len() as u64,
            found: num_blocks as u64,
        });
    }

    let mut blocks = Vec::with_capacity(num_blocks);
    let mut decompressed_offset = 0u64;
    for (i, &(index_block_size, index_decompressed)) in index.iter().enumerate() {
        let inline_decompressed = u64::from(file.read_u32::<BigEndian>()?);
        let inline_compressed = u64::from(file.read_u32::<BigEndian>()?);

        // The index counts the 8 inline size bytes as part of the block.
        let index_compressed = index_block_size.saturating_sub(8);
        let (compressed_size, decompressed_size) =
            if (inline_compressed, inline_decompressed) == (index_compressed, index_decompressed) {
                (inline_compressed, inline_decompressed)
            } else {
                warn!(
                    "{} block {}: inline sizes ({}, {}) disagree with index ({}, {}), using index",
                    block_type,
                    i,
                    inline_compressed,
                    inline_decompressed,
                    index_compressed,
                    index_decompressed
                );
                (index_compressed, index_decompressed)
            };

        let file_offset = file.stream_position()?;
        blocks.push(BlockMeta {
            compressed_size,
            decompressed_size,
            file_offset,
            decompressed_offset,
        });
        file.seek(SeekFrom::Current(compressed_size as i64))?;
        decompressed_offset += decompressed_size;
    }
    Ok(blocks)
}
