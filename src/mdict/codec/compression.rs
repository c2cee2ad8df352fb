//! Block decompression.
//!
//! - type 0: stored
//! - type 1: LZO1X (lzokay)
//! - type 2: zlib (flate2)

use std::io::Read;

use flate2::read::ZlibDecoder;
use log::trace;
use lzokay::decompress::decompress as lzo_decompress;

use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::CompressionType;

/// Decompresses a block payload and checks it against the size recorded in
/// the index.
pub fn decompress_payload(
    payload: &[u8],
    compression: CompressionType,
    expected_size: u64,
) -> Result<Vec<u8>> {
    trace!(
        "Decompressing {} bytes with {:?}, expecting {} bytes",
        payload.len(),
        compression,
        expected_size
    );

    let output = match compression {
        CompressionType::None => payload.to_vec(),
        CompressionType::Lzo => {
            let mut output = vec![0u8; expected_size as usize];
            let written = lzo_decompress(payload, &mut output)
                .map_err(|e| MdictError::DecompressionError(format!("LZO: {:?}", e)))?;
            output.truncate(written);
            output
        }
        CompressionType::Zlib => {
            let mut output = Vec::with_capacity(expected_size as usize);
            ZlibDecoder::new(payload)
                .read_to_end(&mut output)
                .map_err(|e| MdictError::DecompressionError(format!("zlib: {}", e)))?;
            output
        }
    };

    if output.len() as u64 != expected_size {
        return Err(MdictError::SizeMismatch {
            context: format!("{:?} block payload", compression),
            expected: expected_size,
            found: output.len() as u64,
        });
    }
    Ok(output)
}
