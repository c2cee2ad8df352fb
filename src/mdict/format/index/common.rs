//! Helpers shared by the v1/v2 and v3 index parsers.

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{BlockMeta, MdictEncoding, MdictVersion};
use crate::mdict::utils;

/// Advances `reader` past a length-prefixed key text (the first/last key of
/// a block) without decoding it. The prefix counts text units, not bytes.
pub fn skip_text(reader: &mut &[u8], version: MdictVersion, encoding: MdictEncoding) -> Result<()> {
    let units = utils::read_small_number(reader, version.small_number_width())?
        + version.text_terminator_units();
    let len = units as usize * utils::unit_width(encoding);
    if reader.len() < len {
        return Err(MdictError::InvalidFormat(
            "Key index ends inside a key text".to_string(),
        ));
    }
    *reader = &reader[len..];
    Ok(())
}

/// Lays out blocks back to back from `(compressed, decompressed)` sizes.
pub fn contiguous_blocks(sizes: &[(u64, u64)], first_file_offset: u64) -> Vec<BlockMeta> {
    let mut file_offset = first_file_offset;
    let mut decompressed_offset = 0;
    sizes
        .iter()
        .map(|&(compressed_size, decompressed_size)| {
            let block = BlockMeta {
                compressed_size,
                decompressed_size,
                file_offset,
                decompressed_offset,
            };
            file_offset += compressed_size;
            decompressed_offset += decompressed_size;
            block
        })
        .collect()
}
