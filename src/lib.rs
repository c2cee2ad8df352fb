//! # mdict-bundle
//!
//! Converts MDict dictionaries (`.mdx`) into a self-contained lookup bundle:
//! a binary-searchable key index, a zlib-compressed body store, a
//! stylesheet and a metadata descriptor.
//!
//! The pipeline runs in three stages:
//!
//! 1. [`convert::entry`] normalizes each raw record: strict text decoding,
//!    cross-reference rewriting, tag stripping and stable id assignment.
//! 2. [`convert::keys`] folds lookup keys, drops duplicate `(key, entry)`
//!    pairs and sorts them stably by code point.
//! 3. [`convert::body`] frames every entry, records its offset and
//!    compresses the store once.
//!
//! [`bundle`] writes the result atomically and reads it back.
pub mod bundle;
pub mod convert;
pub mod mdict;

pub use bundle::{Bundle, BundleAssets, BundleError};
pub use convert::{
    ConversionReport, ConvertError, ConvertOptions, EntrySource, MemorySource, RawEntry,
};
pub use mdict::{MdictError, MdictReader};
