//! Per-entry issues gathered during a run.

use std::fmt;

use super::keys::EntryId;

/// A recoverable problem with one entry. The entry (or link) is skipped and
/// the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    /// Record bytes are not valid in the source encoding.
    Undecodable { seq: usize, key: String },
    /// No usable lookup key (all blank or over-long); the entry is left out
    /// of the body store.
    Keyless { seq: usize, entry_id: EntryId },
    /// A key too long for the index table; the key is dropped, the entry
    /// stays if another key reaches it.
    KeyTooLong { entry_id: EntryId, len: usize },
    /// A cross-reference whose target key never appears in the index.
    DanglingLink { entry_id: EntryId, target: String },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::Undecodable { seq, key } => {
                write!(f, "entry #{} ('{}') could not be decoded, skipped", seq, key)
            }
            Issue::Keyless { seq, entry_id } => {
                write!(f, "entry #{} ({}) has no lookup key, skipped", seq, entry_id)
            }
            Issue::KeyTooLong { entry_id, len } => {
                write!(f, "{} has a {}-byte key, longer than an index record allows; key dropped", entry_id, len)
            }
            Issue::DanglingLink { entry_id, target } => {
                write!(f, "{} links to '{}', which is not in the index", entry_id, target)
            }
        }
    }
}

/// Counters and issues of one conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Raw entries pulled from the source.
    pub processed: usize,
    /// Entries written to the body store.
    pub entries: usize,
    /// Records in the key index.
    pub keys: usize,
    pub issues: Vec<Issue>,
}

impl ConversionReport {
    pub fn undecodable(&self) -> usize {
        self.count(|i| matches!(i, Issue::Undecodable { .. }))
    }

    pub fn keyless(&self) -> usize {
        self.count(|i| matches!(i, Issue::Keyless { .. }))
    }

    pub fn overlong_keys(&self) -> usize {
        self.count(|i| matches!(i, Issue::KeyTooLong { .. }))
    }

    pub fn dangling_links(&self) -> usize {
        self.count(|i| matches!(i, Issue::DanglingLink { .. }))
    }

    /// Entries pulled from the source but absent from the body store.
    pub fn skipped(&self) -> usize {
        self.undecodable() + self.keyless()
    }

    fn count(&self, pred: impl Fn(&Issue) -> bool) -> usize {
        self.issues.iter().filter(|i| pred(i)).count()
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} entries, {} keys, {} skipped ({} undecodable, {} keyless), {} over-long keys dropped, {} dangling links",
            self.processed,
            self.entries,
            self.keys,
            self.skipped(),
            self.undecodable(),
            self.keyless(),
            self.overlong_keys(),
            self.dangling_links()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_split_issues_by_kind() {
        let report = ConversionReport {
            processed: 4,
            entries: 2,
            keys: 3,
            issues: vec![
                Issue::Undecodable { seq: 0, key: "a".into() },
                Issue::Keyless { seq: 1, entry_id: EntryId::new("entry_1_") },
                Issue::DanglingLink { entry_id: EntryId::new("entry_2_b"), target: "foo".into() },
                Issue::KeyTooLong { entry_id: EntryId::new("entry_3_c"), len: 70000 },
            ],
        };
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.overlong_keys(), 1);
        assert!(report.to_string().contains("1 over-long keys dropped"));
        assert_eq!(report.dangling_links(), 1);
        assert!(report.to_string().contains("1 dangling links"));
    }
}
