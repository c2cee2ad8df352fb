//! Source entries to index and body.
//!
//! [`convert`] pulls [`RawEntry`] values from an [`EntrySource`], normalizes
//! them, builds the sorted [`KeyIndex`] and the compressed [`BodyStore`], and
//! reports per-entry problems in a [`ConversionReport`].

pub mod body;
pub mod entry;
pub mod error;
pub mod keys;
pub mod markup;
pub mod pipeline;
pub mod report;
pub mod source;

pub use body::{BodyRecord, BodyStore};
pub use entry::Entry;
pub use error::ConvertError;
pub use keys::{EntryId, KeyEntry, KeyIndex, normalize_key};
pub use pipeline::{Conversion, ConvertOptions, convert};
pub use report::{ConversionReport, Issue};
pub use source::{EntrySource, MemorySource, RawEntry};
