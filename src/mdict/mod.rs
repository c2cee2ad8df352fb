//! MDict (`.mdx`) container reader.
//!
//! Supplies the raw `(key, record bytes)` stream that the conversion
//! pipeline consumes. Handles engine versions 1.x, 2.x and 3.x, stored/LZO/
//! zlib blocks, and both block ciphers.

pub mod codec;
pub mod format;
pub mod iter;
pub mod reader;
pub mod types;
mod utils;

pub use iter::{KeysIterator, RecordIterator};
pub use reader::MdictReader;
pub use types::error::{MdictError, Result};
pub use types::models::{MdictHeader, MdictMetadata, MdictVersion, StyleSheet};
pub use utils::parse_encoding;
