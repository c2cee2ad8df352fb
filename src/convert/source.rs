//! Raw entry sources feeding the pipeline.

use encoding_rs::Encoding;

use crate::mdict::{MdictError, MdictReader, StyleSheet};

/// One `(key, value)` pair exactly as the source yields it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    /// Record bytes in the source encoding.
    pub value: Vec<u8>,
    /// Extra lookup keys for the same entry.
    pub aliases: Vec<String>,
}

impl RawEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// Anything that can replay a dictionary as a sequence of [`RawEntry`].
///
/// The pipeline pulls entries from a producer thread, so implementors must be
/// `Sync`.
pub trait EntrySource: Sync {
    /// Encoding of every `RawEntry::value`.
    fn encoding(&self) -> &'static Encoding;

    fn title(&self) -> &str {
        ""
    }

    fn description(&self) -> Option<&str> {
        None
    }

    /// Numbered styles referenced from record bodies.
    fn stylesheet(&self) -> StyleSheet {
        StyleSheet::default()
    }

    /// Entries in source order. An `Err` item ends the run.
    fn entries(&self) -> Box<dyn Iterator<Item = Result<RawEntry, MdictError>> + '_>;

    /// Number of entries the source declares, when known up front.
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

impl EntrySource for MdictReader {
    fn encoding(&self) -> &'static Encoding {
        self.header.encoding
    }

    fn title(&self) -> &str {
        MdictReader::title(self)
    }

    fn description(&self) -> Option<&str> {
        MdictReader::description(self)
    }

    fn stylesheet(&self) -> StyleSheet {
        MdictReader::stylesheet(self)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = Result<RawEntry, MdictError>> + '_> {
        Box::new(
            self.iter_records()
                .map(|record| record.map(|(key, value)| RawEntry::new(key, value))),
        )
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.num_entries())
    }
}

/// An in-memory source, for tests and for callers that already hold their
/// entries.
#[derive(Debug, Clone)]
pub struct MemorySource {
    pub title: String,
    pub description: Option<String>,
    pub encoding: &'static Encoding,
    pub stylesheet: StyleSheet,
    pub entries: Vec<RawEntry>,
}

impl MemorySource {
    /// UTF-8 source with no title and no styles.
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            title: String::new(),
            description: None,
            encoding: encoding_rs::UTF_8,
            stylesheet: StyleSheet::default(),
            entries,
        }
    }

    /// Builds a UTF-8 source from `(key, text)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(key, text)| RawEntry::new(key, text.as_bytes()))
                .collect(),
        )
    }
}

impl EntrySource for MemorySource {
    fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn stylesheet(&self) -> StyleSheet {
        self.stylesheet.clone()
    }

    fn entries(&self) -> Box<dyn Iterator<Item = Result<RawEntry, MdictError>> + '_> {
        Box::new(self.entries.iter().cloned().map(Ok))
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.entries.len() as u64)
    }
}
