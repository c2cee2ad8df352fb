//! Bundle assembly and reading.
//!
//! A bundle is a directory holding four files:
//!
//! | file             | content                                   |
//! |------------------|-------------------------------------------|
//! | `metadata.plist` | descriptor, passed through                |
//! | `stylesheet.css` | stylesheet, passed through                |
//! | `body.store`     | entry table plus zlib-compressed blocks   |
//! | `index.table`    | sorted fixed-width key records            |
//!
//! See [`format`] for the binary layouts.

pub mod assets;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use assets::BundleAssets;
pub use error::BundleError;
pub use reader::{Bundle, Definition};
pub use writer::assemble;

pub const METADATA_FILE: &str = "metadata.plist";
pub const STYLESHEET_FILE: &str = "stylesheet.css";
pub const BODY_FILE: &str = "body.store";
pub const INDEX_FILE: &str = "index.table";
