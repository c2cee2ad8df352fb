//! Key index construction.
//!
//! Every lookup string is normalized with [`normalize_key`], paired with the
//! entry it reaches, deduplicated on the `(normalized key, entry id)` pair and
//! stably sorted by code point. The resulting [`KeyIndex`] order is what the
//! bundle reader binary searches, so it must never depend on hash order.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use unicode_normalization::UnicodeNormalization;

/// Folds a lookup string into its index form: surrounding whitespace
/// trimmed, NFC composed, then lowercased. Diacritics and punctuation are
/// kept, so `café` and `cafe` stay distinct.
///
/// The bundle reader applies the same function to queries.
pub fn normalize_key(key: &str) -> String {
    key.trim().nfc().collect::<String>().to_lowercase()
}

/// Longest key, in UTF-8 bytes, that fits the index table's length fields.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Byte length of the longer stored form of `candidate`: the normalized key
/// or the trimmed display spelling. Lowercasing can grow a string.
pub fn stored_key_len(candidate: &str) -> usize {
    normalize_key(candidate).len().max(candidate.trim().len())
}

/// Synthetic identifier of one entry, unique within a conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One lookup route: a normalized key leading to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub normalized_key: String,
    pub entry_id: EntryId,
    /// Original-case spelling, shown to users.
    pub display_key: String,
}

/// Accumulates key candidates in arrival order.
#[derive(Debug, Default)]
pub struct KeyIndexBuilder {
    entries: Vec<KeyEntry>,
    seen: HashSet<(String, EntryId)>,
}

impl KeyIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `candidate` as a key of `entry_id`.
    ///
    /// Returns `false` when the candidate is blank, longer than
    /// [`MAX_KEY_LEN`] or the pair is already present; the first display
    /// spelling of a pair wins.
    pub fn insert(&mut self, candidate: &str, entry_id: &EntryId) -> bool {
        let normalized_key = normalize_key(candidate);
        let display_key = candidate.trim();
        if normalized_key.is_empty()
            || normalized_key.len() > MAX_KEY_LEN
            || display_key.len() > MAX_KEY_LEN
        {
            return false;
        }
        if !self.seen.insert((normalized_key.clone(), entry_id.clone())) {
            return false;
        }
        self.entries.push(KeyEntry {
            normalized_key,
            entry_id: entry_id.clone(),
            display_key: display_key.to_string(),
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorts the collected keys. Must only run once every candidate has been
    /// inserted.
    pub fn finish(self) -> KeyIndex {
        let mut entries = self.entries;
        // `sort_by` is stable: equal keys keep their insertion order.
        entries.sort_by(|a, b| a.normalized_key.cmp(&b.normalized_key));
        KeyIndex { entries }
    }
}

/// Keys in final lookup order: non-decreasing normalized key, ties in
/// first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyIndex {
    entries: Vec<KeyEntry>,
}

impl KeyIndex {
    /// Wraps entries that are already in index order, e.g. read back from a
    /// bundle. Returns `None` when they are not sorted by normalized key.
    pub fn from_sorted(entries: Vec<KeyEntry>) -> Option<Self> {
        entries
            .windows(2)
            .all(|pair| pair[0].normalized_key <= pair[1].normalized_key)
            .then_some(Self { entries })
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether some entry is reachable through an already normalized key.
    pub fn contains_key(&self, normalized_key: &str) -> bool {
        !self.exact_range(normalized_key).is_empty()
    }

    /// All records with exactly this normalized key (homonyms included).
    pub fn lookup(&self, normalized_key: &str) -> &[KeyEntry] {
        &self.entries[self.exact_range(normalized_key)]
    }

    /// All records whose normalized key starts with `normalized_prefix`.
    pub fn with_prefix(&self, normalized_prefix: &str) -> &[KeyEntry] {
        let start = self
            .entries
            .partition_point(|e| e.normalized_key.as_str() < normalized_prefix);
        let len = self.entries[start..]
            .partition_point(|e| e.normalized_key.starts_with(normalized_prefix));
        &self.entries[start..start + len]
    }

    fn exact_range(&self, key: &str) -> Range<usize> {
        let start = self
            .entries
            .partition_point(|e| e.normalized_key.as_str() < key);
        let end = self
            .entries
            .partition_point(|e| e.normalized_key.as_str() <= key);
        start..end
    }
}

impl<'a> IntoIterator for &'a KeyIndex {
    type Item = &'a KeyEntry;
    type IntoIter = std::slice::Iter<'a, KeyEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn id(s: &str) -> EntryId {
        EntryId::new(s)
    }

    #[test]
    fn homonyms_stay_adjacent_in_arrival_order() {
        let mut builder = KeyIndexBuilder::new();
        builder.insert("Dog", &id("entry_2_Dog"));
        builder.insert("Cat", &id("entry_0_Cat"));
        builder.insert("cat", &id("entry_1_cat"));
        let index = builder.finish();

        let keys: Vec<(&str, &str)> = index
            .iter()
            .map(|e| (e.normalized_key.as_str(), e.entry_id.as_str()))
            .collect();
        assert_eq!(
            keys,
            [
                ("cat", "entry_0_Cat"),
                ("cat", "entry_1_cat"),
                ("dog", "entry_2_Dog")
            ]
        );
        assert_eq!(index.lookup("cat").len(), 2);
        assert_eq!(index.entries()[0].display_key, "Cat");
    }

    #[test]
    fn duplicate_pairs_collapse_to_first_display_key() {
        let mut builder = KeyIndexBuilder::new();
        assert!(builder.insert("Apple", &id("a")));
        assert!(!builder.insert("APPLE", &id("a")));
        assert!(!builder.insert("apple", &id("a")));
        assert!(builder.insert("apple", &id("b")));
        let index = builder.finish();

        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[0].display_key, "Apple");
    }

    #[test]
    fn blank_candidates_are_filtered() {
        let mut builder = KeyIndexBuilder::new();
        assert!(!builder.insert("", &id("a")));
        assert!(!builder.insert(" \t", &id("a")));
        assert!(builder.is_empty());
    }

    #[test]
    fn keys_longer_than_the_index_field_are_refused() {
        let mut builder = KeyIndexBuilder::new();
        let longest = "k".repeat(MAX_KEY_LEN);
        assert!(builder.insert(&longest, &id("a")));
        assert!(!builder.insert(&format!("{longest}k"), &id("b")));
        // "İ" lowercases to three bytes from two.
        let grows = "İ".repeat(MAX_KEY_LEN / 2);
        assert!(grows.len() <= MAX_KEY_LEN);
        assert!(stored_key_len(&grows) > MAX_KEY_LEN);
        assert!(!builder.insert(&grows, &id("c")));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn normalization_composes_and_folds_case_only() {
        assert_eq!(normalize_key("A\u{301}rbol"), "árbol");
        assert_eq!(normalize_key("Árbol"), "árbol");
        assert_eq!(normalize_key("  Ümlaut "), "ümlaut");
        assert_ne!(normalize_key("café"), normalize_key("cafe"));
        assert_eq!(normalize_key("co-op"), "co-op");
    }

    #[test]
    fn prefix_lookup_is_a_contiguous_range() {
        let mut builder = KeyIndexBuilder::new();
        for (i, word) in ["car", "cart", "cat", "dog", "ca"].iter().enumerate() {
            builder.insert(word, &id(&i.to_string()));
        }
        let index = builder.finish();
        let hits: Vec<&str> = index
            .with_prefix("car")
            .iter()
            .map(|e| e.normalized_key.as_str())
            .collect();
        assert_eq!(hits, ["car", "cart"]);
        assert_eq!(index.with_prefix("ca").len(), 4);
        assert!(index.with_prefix("z").is_empty());
        assert!(index.contains_key("dog"));
        assert!(!index.contains_key("do"));
    }

    proptest! {
        #[test]
        fn index_is_sorted_stable_and_deduplicated(
            pairs in proptest::collection::vec(("[a-cA-C]{0,3}", 0u8..4), 0..60)
        ) {
            let mut builder = KeyIndexBuilder::new();
            for (key, entry) in &pairs {
                builder.insert(key, &id(&entry.to_string()));
            }
            let index = builder.finish();

            for window in index.entries().windows(2) {
                prop_assert!(window[0].normalized_key <= window[1].normalized_key);
            }

            let mut seen = HashSet::new();
            for e in index.iter() {
                prop_assert!(seen.insert((e.normalized_key.clone(), e.entry_id.clone())));
            }

            // Equal keys appear in order of their first arrival.
            let mut first_seen: Vec<(String, EntryId)> = Vec::new();
            for (key, entry) in &pairs {
                let pair = (normalize_key(key), id(&entry.to_string()));
                if !pair.0.is_empty() && !first_seen.contains(&pair) {
                    first_seen.push(pair);
                }
            }
            prop_assert_eq!(first_seen.len(), index.len());
            for e in index.iter() {
                let ties: Vec<&EntryId> = first_seen
                    .iter()
                    .filter(|(k, _)| *k == e.normalized_key)
                    .map(|(_, i)| i)
                    .collect();
                let in_index: Vec<&EntryId> = index
                    .lookup(&e.normalized_key)
                    .iter()
                    .map(|k| &k.entry_id)
                    .collect();
                prop_assert_eq!(ties, in_index);
            }
        }
    }
}
