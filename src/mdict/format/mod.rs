//! File format layer: turns file bytes into headers, block tables and
//! decoded block contents for [`MdictReader`](crate::mdict::MdictReader).
//!
//! ```text
//! ┌─────────────────┐
//! │  XML header     │ ← header::parse()
//! ├─────────────────┤
//! │  Index section  │ ← index::parse()
//! ├─────────────────┤
//! │  Content blocks │ ← content::decode_block()
//! └─────────────────┘
//! ```

pub mod content;
pub mod header;
pub mod index;
