use std::{path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::{
    artifact::{ArtifactWriter, artifact_name},
    chunker::chunk_segments,
    error::{HarvestError, Result, SourceError},
    format::round_centis,
    language::attribution,
    ledger::now_timestamp,
    source::TranscriptSource,
    types::{BatchGroup, Item, LedgerEntry, OutputRecord, Segment},
};

/// What to do with an item whose fetch failed for an unexpected reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceErrorPolicy {
    /// Leave it out of the ledger so the next run tries again.
    #[default]
    RetryEligible,
    /// Record it as processed so it is never fetched again.
    MarkProcessed,
}

impl FromStr for SourceErrorPolicy {
    type Err = HarvestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "retry" | "retry-eligible" => Ok(SourceErrorPolicy::RetryEligible),
            "mark-processed" | "mark" => Ok(SourceErrorPolicy::MarkProcessed),
            other => Err(HarvestError::Config {
                reason: format!("unknown source error policy {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub item_id: String,
    pub reason: String,
    /// False when the item was recorded in the ledger despite the failure.
    pub retry_eligible: bool,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<OutputRecord>,
    pub entries: Vec<LedgerEntry>,
    pub skipped: Vec<SkippedItem>,
    /// Where the artifact landed, if any record was produced.
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PersisterSettings {
    pub source_name: String,
    pub min_chunk_time: f64,
    pub on_source_error: SourceErrorPolicy,
}

/// Fetches, chunks and writes one batch group.
pub struct BatchPersister<'a, S, W> {
    source: &'a S,
    writer: &'a W,
    settings: PersisterSettings,
}

impl<'a, S: TranscriptSource, W: ArtifactWriter> BatchPersister<'a, S, W> {
    pub fn new(source: &'a S, writer: &'a W, settings: PersisterSettings) -> Self {
        Self {
            source,
            writer,
            settings,
        }
    }

    pub fn artifact_name(&self, group: &BatchGroup) -> String {
        artifact_name(&self.settings.source_name, &group.language, group.part_index)
    }

    fn records_for(&self, item: &Item, language: &str, segments: &[Segment]) -> Vec<OutputRecord> {
        let speaker = attribution(language);
        chunk_segments(segments, self.settings.min_chunk_time)
            .into_iter()
            .map(|chunk| OutputRecord {
                text: chunk.text,
                source_reference: item.reference.clone(),
                start_time_seconds: round_centis(chunk.start_time),
                attribution: speaker.to_string(),
            })
            .collect()
    }

    fn entry_for(item: &Item, language: &str, artifact: &str) -> LedgerEntry {
        LedgerEntry {
            item_id: item.id.clone(),
            language: language.to_string(),
            output_artifact_name: artifact.to_string(),
            processed_timestamp: now_timestamp(),
        }
    }

    /// Process every item of `group` in order.
    ///
    /// Per-item source failures are logged and skipped. A failed artifact write is returned
    /// as an error and no ledger entries are produced for the group.
    pub async fn run(&self, group: &BatchGroup) -> Result<BatchOutcome> {
        let artifact = self.artifact_name(group);
        let language = group.language.as_str();
        let mut outcome = BatchOutcome::default();

        for item in &group.items {
            let fetched = self
                .source
                .fetch(&item.id, language)
                .await
                .and_then(|segments| {
                    if segments.is_empty() {
                        Err(SourceError::NotAvailable {
                            item_id: item.id.clone(),
                            language: language.to_string(),
                        })
                    } else {
                        Ok(segments)
                    }
                });

            match fetched {
                Ok(segments) => {
                    outcome
                        .records
                        .extend(self.records_for(item, language, &segments));
                    outcome.entries.push(Self::entry_for(item, language, &artifact));
                }
                Err(e) if e.is_not_available() => {
                    info!(item_id = %item.id, language, "skipped: {e}");
                    outcome.skipped.push(SkippedItem {
                        item_id: item.id.clone(),
                        reason: e.to_string(),
                        retry_eligible: true,
                    });
                }
                Err(e) => {
                    let mark = self.settings.on_source_error == SourceErrorPolicy::MarkProcessed;
                    warn!(item_id = %item.id, language, marked_processed = mark, "fetch failed: {e}");
                    if mark {
                        outcome.entries.push(Self::entry_for(item, language, &artifact));
                    }
                    outcome.skipped.push(SkippedItem {
                        item_id: item.id.clone(),
                        reason: e.to_string(),
                        retry_eligible: !mark,
                    });
                }
            }
        }

        if !outcome.records.is_empty() {
            let path = self.writer.write(&artifact, &outcome.records).await?;
            info!(
                artifact = %path.display(),
                records = outcome.records.len(),
                "artifact written"
            );
            outcome.artifact = Some(path);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeSet, HashMap},
        sync::Mutex,
    };

    use super::*;

    #[derive(Default)]
    struct FakeSource {
        tracks: HashMap<(String, String), Vec<Segment>>,
        broken: Vec<String>,
    }

    impl FakeSource {
        fn with_track(mut self, id: &str, lang: &str, segments: Vec<Segment>) -> Self {
            self.tracks.insert((id.to_string(), lang.to_string()), segments);
            self
        }
    }

    impl TranscriptSource for FakeSource {
        async fn fetch(
            &self,
            item_id: &str,
            language: &str,
        ) -> std::result::Result<Vec<Segment>, SourceError> {
            if self.broken.iter().any(|id| id == item_id) {
                return Err(SourceError::Failed {
                    item_id: item_id.to_string(),
                    language: language.to_string(),
                    reason: "HTTP 429".to_string(),
                });
            }
            self.tracks
                .get(&(item_id.to_string(), language.to_string()))
                .cloned()
                .ok_or_else(|| SourceError::NotAvailable {
                    item_id: item_id.to_string(),
                    language: language.to_string(),
                })
        }

        async fn available_languages(
            &self,
            _item_id: &str,
        ) -> std::result::Result<BTreeSet<String>, SourceError> {
            Ok(BTreeSet::new())
        }
    }

    #[derive(Default)]
    struct MemoryWriter {
        written: Mutex<Vec<(String, Vec<OutputRecord>)>>,
        fail: bool,
    }

    impl ArtifactWriter for MemoryWriter {
        async fn write(&self, name: &str, records: &[OutputRecord]) -> Result<PathBuf> {
            if self.fail {
                return Err(HarvestError::Persistence {
                    path: PathBuf::from(name),
                    reason: "disk full".to_string(),
                });
            }
            self.written
                .lock()
                .unwrap()
                .push((name.to_string(), records.to_vec()));
            Ok(PathBuf::from(name))
        }
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            title: String::new(),
            reference: format!("https://www.youtube.com/watch?v={id}"),
            available_languages: BTreeSet::from(["zh".to_string()]),
        }
    }

    fn group(ids: &[&str]) -> BatchGroup {
        BatchGroup {
            language: "zh".to_string(),
            part_index: 2,
            items: ids.iter().map(|id| item(id)).collect(),
        }
    }

    fn settings(policy: SourceErrorPolicy) -> PersisterSettings {
        PersisterSettings {
            source_name: "ds".to_string(),
            min_chunk_time: 0.0,
            on_source_error: policy,
        }
    }

    #[tokio::test]
    async fn writes_records_and_entries_for_fetched_items() {
        let source = FakeSource::default()
            .with_track("a", "zh", vec![Segment::new("一", 0.004, 1.0), Segment::new("二", 1.0, 1.0)])
            .with_track("c", "zh", vec![Segment::new("三", 7.126, 2.0)]);
        let writer = MemoryWriter::default();
        let persister = BatchPersister::new(&source, &writer, settings(SourceErrorPolicy::default()));

        let outcome = persister.run(&group(&["a", "b", "c"])).await.unwrap();

        let texts: Vec<_> = outcome.records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["一", "二", "三"]);
        assert_eq!(outcome.records[0].start_time_seconds, 0.0);
        assert_eq!(outcome.records[2].start_time_seconds, 7.13);
        assert_eq!(outcome.records[2].attribution, "老师");
        assert_eq!(outcome.records[2].source_reference, "https://www.youtube.com/watch?v=c");

        let entries: Vec<_> = outcome.entries.iter().map(|e| e.item_id.as_str()).collect();
        assert_eq!(entries, vec!["a", "c"]);
        assert!(outcome.entries.iter().all(|e| e.output_artifact_name == "ds_zh_part2.data"));
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].retry_eligible);

        let written = writer.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "ds_zh_part2.data");
        assert_eq!(written[0].1.len(), 3);
    }

    #[tokio::test]
    async fn chunks_segments_when_threshold_set() {
        let source = FakeSource::default().with_track(
            "a",
            "zh",
            vec![
                Segment::new("x", 0.0, 10.0),
                Segment::new("y", 10.0, 10.0),
                Segment::new("z", 20.0, 30.0),
            ],
        );
        let writer = MemoryWriter::default();
        let mut config = settings(SourceErrorPolicy::default());
        config.min_chunk_time = 20.0;
        let persister = BatchPersister::new(&source, &writer, config);

        let outcome = persister.run(&group(&["a"])).await.unwrap();

        let texts: Vec<_> = outcome.records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["x y", "z"]);
    }

    #[tokio::test]
    async fn nothing_fetched_means_no_artifact() {
        let source = FakeSource::default().with_track("a", "zh", Vec::new());
        let writer = MemoryWriter::default();
        let persister = BatchPersister::new(&source, &writer, settings(SourceErrorPolicy::default()));

        let outcome = persister.run(&group(&["a", "b"])).await.unwrap();

        assert!(outcome.records.is_empty());
        assert!(outcome.entries.is_empty());
        assert!(outcome.artifact.is_none());
        assert!(writer.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn source_failures_follow_policy() {
        let source = FakeSource {
            broken: vec!["a".to_string()],
            ..Default::default()
        };
        let writer = MemoryWriter::default();

        let retry = BatchPersister::new(&source, &writer, settings(SourceErrorPolicy::RetryEligible));
        let outcome = retry.run(&group(&["a"])).await.unwrap();
        assert!(outcome.entries.is_empty());
        assert!(outcome.skipped[0].retry_eligible);

        let mark = BatchPersister::new(&source, &writer, settings(SourceErrorPolicy::MarkProcessed));
        let outcome = mark.run(&group(&["a"])).await.unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert!(!outcome.skipped[0].retry_eligible);
    }

    #[tokio::test]
    async fn write_failure_returns_no_entries() {
        let source = FakeSource::default().with_track("a", "zh", vec![Segment::new("一", 0.0, 1.0)]);
        let writer = MemoryWriter {
            fail: true,
            ..Default::default()
        };
        let persister = BatchPersister::new(&source, &writer, settings(SourceErrorPolicy::default()));

        let err = persister.run(&group(&["a"])).await.unwrap_err();

        assert!(matches!(err, HarvestError::Persistence { .. }));
    }

    #[test]
    fn parses_policy() {
        assert_eq!(
            "mark-processed".parse::<SourceErrorPolicy>().unwrap(),
            SourceErrorPolicy::MarkProcessed
        );
        assert_eq!(
            "retry".parse::<SourceErrorPolicy>().unwrap(),
            SourceErrorPolicy::RetryEligible
        );
        assert!("sometimes".parse::<SourceErrorPolicy>().is_err());
    }
}
