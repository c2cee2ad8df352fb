//! Index parser for MDict engine versions 1.x and 2.x.
//!
//! ```text
//! key block info      4 (v1) or 5 (v2) numbers, v2 adds an Adler-32
//! key index           per key block: entry count, first/last key, sizes
//! key blocks          compressed key lists
//! record block info   4 numbers
//! record index        per record block: compressed and decompressed size
//! record blocks       compressed record bodies
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, info};

use super::{BlockLayout, common};
use crate::mdict::codec::{compression, crypto};
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{CompressionType, MdictHeader, MdictVersion};
use crate::mdict::utils;

pub fn parse(file: &mut File, header: &MdictHeader) -> Result<BlockLayout> {
    let (key_sizes, num_entries) = read_key_section(file, header)?;
    let key_blocks = common::contiguous_blocks(&key_sizes, file.stream_position()?);

    let key_data_len: u64 = key_blocks.iter().map(|b| b.compressed_size).sum();
    file.seek(SeekFrom::Current(key_data_len as i64))?;

    let record_sizes = read_record_section(file, header)?;
    let record_blocks = common::contiguous_blocks(&record_sizes, file.stream_position()?);

    info!(
        "Index parsed: {} entries, {} key blocks, {} record blocks",
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

/// Reads the key block info and key index. Returns per-block sizes and the
/// declared entry count.
fn read_key_section<R: Read>(file: &mut R, header: &MdictHeader) -> Result<(Vec<(u64, u64)>, u64)> {
    let version = header.version;
    let width = version.number_width();
    let mut info_bytes = vec![0u8; if version == MdictVersion::V1 { 16 } else { 40 }];
    file.read_exact(&mut info_bytes)?;

    if header.encryption_flags.encrypt_record_blocks {
        let key = header.master_key.as_ref().ok_or(MdictError::PasscodeRequired)?;
        debug!("Decrypting key block info (Salsa20)");
        crypto::salsa_decrypt(&mut info_bytes, key);
    }

    if version == MdictVersion::V2 {
        let expected = file.read_u32::<BigEndian>()?;
        let actual = adler32_slice(&info_bytes);
        if expected != actual {
            return Err(MdictError::ChecksumMismatch { expected, actual });
        }
    }

    let mut reader = info_bytes.as_slice();
    let num_blocks = utils::read_number(&mut reader, width)?;
    let num_entries = utils::read_number(&mut reader, width)?;
    let index_decomp_len = match version {
        MdictVersion::V1 => None,
        _ => Some(utils::read_number(&mut reader, width)?),
    };
    let index_comp_len = utils::read_number(&mut reader, width)?;
    let _key_blocks_len = utils::read_number(&mut reader, width)?;
    debug!(
        "Key block info: blocks={}, entries={}, index={} bytes",
        num_blocks, num_entries, index_comp_len
    );

    let mut raw_index = vec![0u8; index_comp_len as usize];
    file.read_exact(&mut raw_index)?;
    let index = match index_decomp_len {
        Some(len) => decode_key_index(&raw_index, len, header)?,
        None => raw_index,
    };

    let mut reader = index.as_slice();
    let mut sizes = Vec::with_capacity(num_blocks as usize);
    let mut counted_entries = 0u64;
    while !reader.is_empty() {
        counted_entries += utils::read_number(&mut reader, width)?;
        common::skip_text(&mut reader, version, header.encoding)?;
        common::skip_text(&mut reader, version, header.encoding)?;
        let compressed = utils::read_number(&mut reader, width)?;
        let decompressed = utils::read_number(&mut reader, width)?;
        sizes.push((compressed, decompressed));
    }

    if sizes.len() as u64 != num_blocks {
        return Err(MdictError::CountMismatch {
            item_type: "key blocks in index".to_string(),
            expected: num_blocks,
            found: sizes.len() as u64,
        });
    }
    if counted_entries != num_entries {
        return Err(MdictError::CountMismatch {
            item_type: "key entries in index".to_string(),
            expected: num_entries,
            found: counted_entries,
        });
    }
    Ok((sizes, num_entries))
}

/// Reads the record block info and record index.
fn read_record_section<R: Read>(file: &mut R, header: &MdictHeader) -> Result<Vec<(u64, u64)>> {
    let width = header.version.number_width();
    let num_blocks = utils::read_number(file, width)?;
    let num_entries = utils::read_number(file, width)?;
    let index_len = utils::read_number(file, width)?;
    let _record_blocks_len = utils::read_number(file, width)?;
    debug!(
        "Record block info: blocks={}, entries={}, index={} bytes",
        num_blocks, num_entries, index_len
    );

    let mut index = vec![0u8; index_len as usize];
    file.read_exact(&mut index)?;

    let mut reader = index.as_slice();
    let mut sizes = Vec::with_capacity(num_blocks as usize);
    while !reader.is_empty() {
        let compressed = utils::read_number(&mut reader, width)?;
        let decompressed = utils::read_number(&mut reader, width)?;
        sizes.push((compressed, decompressed));
    }

    if sizes.len() as u64 != num_blocks {
        return Err(MdictError::CountMismatch {
            item_type: "record blocks in index".to_string(),
            expected: num_blocks,
            found: sizes.len() as u64,
        });
    }
    Ok(sizes)
}

/// Decrypts (when flagged) and decompresses a v2 key index, then verifies
/// its Adler-32.
fn decode_key_index(raw: &[u8], decomp_len: u64, header: &MdictHeader) -> Result<Vec<u8>> {
    if raw.len() < 8 {
        return Err(MdictError::InvalidFormat(
            "Key index shorter than its 8-byte header".to_string(),
        ));
    }

    let mut payload = raw[8..].to_vec();
    if header.encryption_flags.encrypt_key_index {
        debug!("Decrypting key index (fast cipher)");
        crypto::fast_decrypt(&mut payload, &crypto::derive_key_for_v2_index(raw));
    }

    let compression = CompressionType::try_from(LittleEndian::read_u32(&raw[0..4]) as u8)?;
    let index = compression::decompress_payload(&payload, compression, decomp_len)?;

    let expected = BigEndian::read_u32(&raw[4..8]);
    let actual = adler32_slice(&index);
    if expected != actual {
        return Err(MdictError::ChecksumMismatch { expected, actual });
    }
    Ok(index)
}
