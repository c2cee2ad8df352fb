//! Read access to an assembled bundle.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::debug;

use super::error::{BundleError, Result};
use super::format;
use super::{BODY_FILE, INDEX_FILE, METADATA_FILE, STYLESHEET_FILE};
use crate::convert::body::FRAME_HEADER_LEN;
use crate::convert::keys::{EntryId, KeyEntry, KeyIndex, normalize_key};
use crate::convert::markup::LINK_SCHEME;

/// One lookup hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition<'a> {
    pub key: &'a KeyEntry,
    /// Rendered entry HTML, frame removed.
    pub html: &'a str,
}

/// An opened bundle. The body is decompressed once, on open.
#[derive(Debug)]
pub struct Bundle {
    dir: PathBuf,
    index: KeyIndex,
    entry_ids: Vec<EntryId>,
    rows: HashMap<EntryId, usize>,
    payloads: Vec<Range<usize>>,
    data: Vec<u8>,
    metadata: Vec<u8>,
    stylesheet: Vec<u8>,
}

fn read(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path = dir.join(name);
    fs::read(&path).map_err(BundleError::io(&path))
}

impl Bundle {
    /// Opens and validates the bundle directory at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let (body_rows, data) = format::decode_body(&read(dir, BODY_FILE)?)?;
        let index_rows = format::decode_index(&read(dir, INDEX_FILE)?)?;

        let mut entry_ids = Vec::with_capacity(body_rows.len());
        let mut rows = HashMap::with_capacity(body_rows.len());
        let mut payloads = Vec::with_capacity(body_rows.len());
        for (i, row) in body_rows.into_iter().enumerate() {
            if rows.insert(row.entry_id.clone(), i).is_some() {
                return Err(BundleError::corrupt(
                    BODY_FILE,
                    format!("entry id {} appears twice", row.entry_id),
                ));
            }
            // decode_body checked the range and the frame.
            let start = row.offset as usize + FRAME_HEADER_LEN;
            payloads.push(start..row.offset as usize + row.length as usize);
            entry_ids.push(row.entry_id);
        }

        let mut keys = Vec::with_capacity(index_rows.len());
        for row in index_rows {
            let entry_id = entry_ids.get(row.entry_row as usize).ok_or_else(|| {
                BundleError::corrupt(
                    INDEX_FILE,
                    format!("key '{}' points at missing entry row {}", row.normalized_key, row.entry_row),
                )
            })?;
            keys.push(KeyEntry {
                normalized_key: row.normalized_key,
                entry_id: entry_id.clone(),
                display_key: row.display_key,
            });
        }
        let index = KeyIndex::from_sorted(keys)
            .ok_or_else(|| BundleError::corrupt(INDEX_FILE, "keys are not sorted"))?;

        debug!(
            "Opened bundle {}: {} keys, {} entries",
            dir.display(),
            index.len(),
            entry_ids.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            index,
            entry_ids,
            rows,
            payloads,
            data,
            metadata: read(dir, METADATA_FILE)?,
            stylesheet: read(dir, STYLESHEET_FILE)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn keys(&self) -> &KeyIndex {
        &self.index
    }

    pub fn entry_count(&self) -> usize {
        self.entry_ids.len()
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn stylesheet(&self) -> &[u8] {
        &self.stylesheet
    }

    /// HTML of one entry.
    pub fn definition(&self, entry_id: &EntryId) -> Option<&str> {
        let row = *self.rows.get(entry_id)?;
        let payload = self.data.get(self.payloads.get(row)?.clone())?;
        std::str::from_utf8(payload).ok()
    }

    /// Every entry reachable through `query`, homonyms in index order.
    pub fn lookup(&self, query: &str) -> Vec<Definition<'_>> {
        self.definitions(self.index.lookup(&normalize_key(query)))
    }

    /// Keys starting with `prefix`, in index order.
    pub fn prefix(&self, prefix: &str) -> &[KeyEntry] {
        self.index.with_prefix(&normalize_key(prefix))
    }

    /// Follows an in-bundle link. Returns `None` for hrefs of other schemes.
    pub fn resolve_link(&self, href: &str) -> Option<Vec<Definition<'_>>> {
        let target = href.strip_prefix(LINK_SCHEME)?;
        let target = quick_xml::escape::unescape(target).ok()?;
        Some(self.lookup(&target))
    }

    fn definitions<'a>(&'a self, keys: &'a [KeyEntry]) -> Vec<Definition<'a>> {
        keys.iter()
            .filter_map(|key| {
                self.definition(&key.entry_id)
                    .map(|html| Definition { key, html })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleAssets, assemble};
    use crate::convert::{ConvertOptions, MemorySource, convert};

    fn build(pairs: &[(&str, &str)]) -> (tempfile::TempDir, Bundle) {
        let source = MemorySource::from_pairs(pairs.iter().copied());
        let conversion = convert(&source, &ConvertOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("t.bundle");
        assemble(&out, &conversion, &BundleAssets::generated("T", None), false).unwrap();
        let bundle = Bundle::open(&out).unwrap();
        (dir, bundle)
    }

    #[test]
    fn lookup_is_case_insensitive_and_keeps_homonyms() {
        let (_dir, bundle) = build(&[("Cat", "a feline"), ("cat", "slang for cool"), ("Dog", "a canine")]);
        let hits = bundle.lookup("CAT");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].html, "<h1>Cat</h1><div class=\"definition\">a feline</div>");
        assert_eq!(hits[1].key.display_key, "cat");
        assert!(bundle.lookup("cow").is_empty());
    }

    #[test]
    fn prefix_lists_keys_in_order() {
        let (_dir, bundle) = build(&[("cart", "x"), ("Car", "y"), ("cat", "z"), ("dog", "w")]);
        let keys: Vec<&str> = bundle.prefix("ca").iter().map(|k| k.display_key.as_str()).collect();
        assert_eq!(keys, ["Car", "cart", "cat"]);
    }

    #[test]
    fn links_resolve_through_the_index() {
        let (_dir, bundle) = build(&[("Kitty", "@@@LINK=Cat"), ("Cat", "a feline")]);
        let kitty = bundle.lookup("kitty");
        assert!(kitty[0].html.contains("href=\"x-dictionary:r:cat\""));

        let target = bundle.resolve_link("x-dictionary:r:cat").unwrap();
        assert!(target[0].html.contains("a feline"));
        assert!(bundle.resolve_link("https://example.org").is_none());
    }

    #[test]
    fn passthrough_files_are_exposed() {
        let (_dir, bundle) = build(&[("a", "b")]);
        assert!(bundle.stylesheet().starts_with(b"h1"));
        assert!(std::str::from_utf8(bundle.metadata()).unwrap().contains("<string>T</string>"));
        assert_eq!(bundle.entry_count(), 1);
    }

    #[test]
    fn corrupt_body_is_reported() {
        let (dir, _) = build(&[("a", "b")]);
        let out = dir.path().join("t.bundle");
        let body = out.join(BODY_FILE);
        let mut bytes = fs::read(&body).unwrap();
        // Inflate the entry count past the end of the table.
        bytes[11] ^= 0xff;
        fs::write(&body, bytes).unwrap();
        assert!(matches!(Bundle::open(&out), Err(BundleError::Corrupt { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Bundle::open(dir.path()), Err(BundleError::Io { .. })));
    }
}
