//! Entry normalization: one [`RawEntry`] in, at most one [`Entry`] out.

use encoding_rs::Encoding;

use super::keys::{EntryId, MAX_KEY_LEN, normalize_key, stored_key_len};
use super::markup;
use super::report::Issue;
use super::source::RawEntry;
use crate::mdict::StyleSheet;

const ID_KEY_CHARS: usize = 50;

/// A decoded, rewritten dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub display_title: String,
    pub body: String,
    /// Normalized targets of the cross-references in `body`.
    pub links: Vec<String>,
}

/// Result of normalizing one raw entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// The entry, its usable lookup key candidates and the issues raised by
    /// candidates that had to be dropped.
    Accepted {
        entry: Entry,
        keys: Vec<String>,
        dropped: Vec<Issue>,
    },
    Rejected(Issue),
}

/// Builds the id of the `seq`-th source entry: `entry_{seq}_{sanitized key}`.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`, and only the first 50
/// characters of the key are kept. The sequence number alone keeps ids
/// unique.
pub fn entry_id(seq: usize, key: &str) -> EntryId {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(ID_KEY_CHARS)
        .collect();
    EntryId::new(format!("entry_{}_{}", seq, sanitized))
}

/// Turns raw source entries into [`Entry`] values.
#[derive(Debug, Clone)]
pub struct EntryNormalizer {
    encoding: &'static Encoding,
    styles: StyleSheet,
}

impl EntryNormalizer {
    /// An empty `styles` table disables style substitution.
    pub fn new(encoding: &'static Encoding, styles: StyleSheet) -> Self {
        Self { encoding, styles }
    }

    pub fn normalize(&self, seq: usize, raw: RawEntry) -> Normalized {
        let Some(text) = self
            .encoding
            .decode_without_bom_handling_and_without_replacement(&raw.value)
        else {
            return Normalized::Rejected(Issue::Undecodable { seq, key: raw.key });
        };

        let id = entry_id(seq, &raw.key);
        let mut keys = Vec::new();
        let mut dropped = Vec::new();
        for candidate in std::iter::once(raw.key.as_str()).chain(raw.aliases.iter().map(String::as_str)) {
            if normalize_key(candidate).is_empty() {
                continue;
            }
            let len = stored_key_len(candidate);
            if len > MAX_KEY_LEN {
                dropped.push(Issue::KeyTooLong {
                    entry_id: id.clone(),
                    len,
                });
                continue;
            }
            keys.push(candidate.to_string());
        }
        if keys.is_empty() {
            return Normalized::Rejected(Issue::Keyless { seq, entry_id: id });
        }

        let text = text.trim_end_matches('\0');
        let styled = markup::apply_styles(text, &self.styles);
        let stripped = markup::strip_source_tags(&styled);
        let (body, links) = markup::rewrite_links(&stripped);

        Normalized::Accepted {
            entry: Entry {
                id,
                display_title: raw.key.trim().to_string(),
                body,
                links,
            },
            keys,
            dropped,
        }
    }
}
