//! The conversion run.
//!
//! ```text
//! entry-reader ──raw──▶ caller thread ──entries──▶ body-encoder
//!  (source)              normalize, collect keys     frame, compress
//! ```
//!
//! Both channels are bounded. Keys are sorted only after the raw channel is
//! drained and the encoder has been joined.

use std::collections::HashSet;
use std::sync::mpsc;
use std::thread;

use log::{debug, info, warn};

use super::body::{BodyEncoder, BodyStore};
use super::entry::{Entry, EntryNormalizer, Normalized};
use super::error::{ConvertError, Result};
use super::keys::{EntryId, KeyIndex, KeyIndexBuilder};
use super::report::{ConversionReport, Issue};
use super::source::{EntrySource, RawEntry};
use crate::mdict::{MdictError, StyleSheet};

/// Tuning knobs of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Expand the source's numbered style markers.
    pub apply_styles: bool,
    /// Log progress every this many entries; `0` disables it.
    pub progress_every: usize,
    /// Capacity of each bounded channel.
    pub channel_capacity: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            apply_styles: true,
            progress_every: 5000,
            channel_capacity: 1024,
        }
    }
}

/// Everything a bundle is assembled from.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub index: KeyIndex,
    pub body: BodyStore,
    pub report: ConversionReport,
}

impl Conversion {
    /// Checks that index and body reference each other completely.
    pub fn verify(&self) -> Result<()> {
        let mut referenced = vec![false; self.body.len()];
        for key in &self.index {
            let row = self.body.position(&key.entry_id).ok_or_else(|| {
                ConvertError::Inconsistent(format!(
                    "key '{}' points at missing entry {}",
                    key.normalized_key, key.entry_id
                ))
            })?;
            referenced[row] = true;
        }
        if let Some(row) = referenced.iter().position(|r| !r) {
            return Err(ConvertError::Inconsistent(format!(
                "entry {} is not reachable from any key",
                self.body.records()[row].entry_id
            )));
        }
        Ok(())
    }
}

/// Runs the whole pipeline over `source`.
///
/// Per-entry failures end up in the returned report. Only source errors,
/// worker failures and internal inconsistencies abort.
pub fn convert<S>(source: &S, options: &ConvertOptions) -> Result<Conversion>
where
    S: EntrySource + ?Sized,
{
    let styles = if options.apply_styles {
        source.stylesheet()
    } else {
        StyleSheet::default()
    };
    if !styles.is_empty() {
        debug!("Applying {} numbered styles", styles.len());
    }
    let normalizer = EntryNormalizer::new(source.encoding(), styles);
    let capacity = options.channel_capacity.max(1);
    let total = source.len_hint();
    info!(
        "Converting '{}' ({} entries declared, encoding {})",
        source.title(),
        total.map_or_else(|| "?".to_string(), |n| n.to_string()),
        source.encoding().name()
    );

    thread::scope(|scope| -> Result<Conversion> {
        let (raw_tx, raw_rx) =
            mpsc::sync_channel::<std::result::Result<RawEntry, MdictError>>(capacity);
        let (entry_tx, entry_rx) = mpsc::sync_channel::<Entry>(capacity);

        let reader = thread::Builder::new()
            .name("entry-reader".to_string())
            .spawn_scoped(scope, move || {
                for item in source.entries() {
                    let failed = item.is_err();
                    // A closed channel means the consumer gave up.
                    if raw_tx.send(item).is_err() || failed {
                        break;
                    }
                }
            })
            .map_err(ConvertError::Spawn)?;

        let encoder = thread::Builder::new()
            .name("body-encoder".to_string())
            .spawn_scoped(scope, move || -> Result<BodyStore> {
                let mut encoder = BodyEncoder::new();
                for entry in entry_rx {
                    encoder.push(&entry)?;
                }
                encoder.finish()
            })
            .map_err(ConvertError::Spawn)?;

        let mut keys = KeyIndexBuilder::new();
        let mut report = ConversionReport::default();
        let mut links: Vec<(EntryId, String)> = Vec::new();
        let mut source_error = None;

        for (seq, item) in raw_rx.iter().enumerate() {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    source_error = Some(e);
                    break;
                }
            };
            report.processed += 1;

            match normalizer.normalize(seq, raw) {
                Normalized::Accepted {
                    entry,
                    keys: candidates,
                    dropped,
                } => {
                    for issue in dropped {
                        warn!("{}", issue);
                        report.issues.push(issue);
                    }
                    for candidate in &candidates {
                        keys.insert(candidate, &entry.id);
                    }
                    links.extend(entry.links.iter().map(|t| (entry.id.clone(), t.clone())));
                    report.entries += 1;
                    if entry_tx.send(entry).is_err() {
                        // The encoder failed; its error surfaces on join.
                        break;
                    }
                }
                Normalized::Rejected(issue) => {
                    warn!("{}", issue);
                    report.issues.push(issue);
                }
            }

            if options.progress_every > 0 && report.processed % options.progress_every == 0 {
                match total {
                    Some(total) => info!("Processed {}/{} entries", report.processed, total),
                    None => info!("Processed {} entries", report.processed),
                }
            }
        }
        drop(raw_rx);
        drop(entry_tx);

        reader
            .join()
            .map_err(|_| ConvertError::WorkerPanicked("entry-reader"))?;
        let body = encoder
            .join()
            .map_err(|_| ConvertError::WorkerPanicked("body-encoder"))?;
        if let Some(e) = source_error {
            return Err(e.into());
        }
        let body = body?;

        let index = keys.finish();
        report.keys = index.len();
        debug!("Key index sorted: {} keys", index.len());

        let mut seen = HashSet::new();
        for (entry_id, target) in links {
            if !index.contains_key(&target) && seen.insert((entry_id.clone(), target.clone())) {
                let issue = Issue::DanglingLink { entry_id, target };
                warn!("{}", issue);
                report.issues.push(issue);
            }
        }

        let conversion = Conversion {
            index,
            body,
            report,
        };
        conversion.verify()?;
        info!("Conversion finished: {}", conversion.report);
        Ok(conversion)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::body::{block_payload, split_blocks};
    use crate::convert::source::MemorySource;

    fn run(source: &MemorySource) -> Conversion {
        convert(source, &ConvertOptions::default()).unwrap()
    }

    #[test]
    fn homonyms_resolve_to_their_own_entries() {
        let source = MemorySource::from_pairs([
            ("Cat", "a feline"),
            ("cat", "slang for cool"),
            ("Dog", "a canine"),
        ]);
        let conversion = run(&source);

        let order: Vec<(&str, &str)> = conversion
            .index
            .iter()
            .map(|k| (k.normalized_key.as_str(), k.display_key.as_str()))
            .collect();
        assert_eq!(order, [("cat", "Cat"), ("cat", "cat"), ("dog", "Dog")]);

        let data = conversion.body.decompress().unwrap();
        let blocks = split_blocks(&data).unwrap();
        let bodies: Vec<String> = conversion
            .index
            .lookup("cat")
            .iter()
            .map(|k| {
                let row = conversion.body.position(&k.entry_id).unwrap();
                String::from_utf8(block_payload(blocks[row]).unwrap().to_vec()).unwrap()
            })
            .collect();
        assert!(bodies[0].contains("a feline"));
        assert!(bodies[1].contains("slang for cool"));
        assert!(conversion.report.issues.is_empty());
    }

    #[test]
    fn dangling_redirect_is_reported_not_fatal() {
        let source = MemorySource::from_pairs([("Bar", "@@@LINK=Foo"), ("Baz", "see @@@LINK=Bar")]);
        let conversion = run(&source);

        assert_eq!(conversion.report.entries, 2);
        assert_eq!(
            conversion.report.issues,
            [Issue::DanglingLink {
                entry_id: EntryId::new("entry_0_Bar"),
                target: "foo".to_string(),
            }]
        );
    }

    #[test]
    fn skipped_entries_leave_a_consistent_body() {
        let mut source = MemorySource::from_pairs([("ok", "fine"), ("  ", "orphan")]);
        source.entries.push(RawEntry::new("bad", vec![0xff, 0xfe, 0x00]));
        let conversion = run(&source);

        assert_eq!(conversion.report.processed, 3);
        assert_eq!(conversion.report.entries, 1);
        assert_eq!(conversion.report.skipped(), 2);
        assert_eq!(conversion.body.len(), 1);
        conversion.verify().unwrap();
    }

    #[test]
    fn overlong_keys_are_dropped_per_entry() {
        use crate::convert::keys::MAX_KEY_LEN;

        let long = "q".repeat(MAX_KEY_LEN + 10);
        let mut source = MemorySource::from_pairs([("quay", "a wharf")]);
        source.entries[0].aliases.push(long.clone());
        source.entries.push(RawEntry::new(long.as_str(), b"too long to index".to_vec()));
        let conversion = run(&source);

        assert_eq!(conversion.report.entries, 1);
        assert_eq!(conversion.report.overlong_keys(), 1);
        assert_eq!(conversion.report.keyless(), 1);
        assert_eq!(conversion.index.len(), 1);
        // The index table can hold every key that survived.
        crate::bundle::format::encode_index(&conversion.index, &conversion.body).unwrap();
    }

    #[test]
    fn small_channels_still_drain_everything() {
        let entries: Vec<RawEntry> = (0..500)
            .map(|i| RawEntry::new(format!("word{}", i), format!("body {}", i).into_bytes()))
            .collect();
        let source = MemorySource::new(entries);
        let options = ConvertOptions {
            channel_capacity: 1,
            progress_every: 100,
            ..ConvertOptions::default()
        };
        let conversion = convert(&source, &options).unwrap();
        assert_eq!(conversion.index.len(), 500);
        assert_eq!(conversion.body.len(), 500);
    }

    #[test]
    fn styles_can_be_disabled() {
        let mut source = MemorySource::from_pairs([("x", "`1`bold")]);
        source.stylesheet = StyleSheet::parse("1\n<b>\n</b>");
        let options = ConvertOptions {
            apply_styles: false,
            ..ConvertOptions::default()
        };
        let conversion = convert(&source, &options).unwrap();
        let data = conversion.body.decompress().unwrap();
        assert!(String::from_utf8(data).unwrap().contains("`1`bold"));
    }

    #[test]
    fn source_error_aborts_the_run() {
        struct Failing;
        impl EntrySource for Failing {
            fn encoding(&self) -> &'static encoding_rs::Encoding {
                encoding_rs::UTF_8
            }
            fn entries(
                &self,
            ) -> Box<dyn Iterator<Item = std::result::Result<RawEntry, MdictError>> + '_> {
                Box::new(
                    vec![
                        Ok(RawEntry::new("a", b"b".to_vec())),
                        Err(MdictError::InvalidFormat("broken block".into())),
                    ]
                    .into_iter(),
                )
            }
        }

        let err = convert(&Failing, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Source(MdictError::InvalidFormat(_))));
    }
}
