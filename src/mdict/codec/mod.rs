//! Pure data transforms applied to MDict blocks: decryption and
//! decompression. Nothing in here touches the file.

pub mod compression;
pub mod crypto;
