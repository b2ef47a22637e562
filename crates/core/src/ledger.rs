use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, warn};

use crate::{
    artifact::{parse_part_index, strip_bom, write_atomic},
    error::{HarvestError, Result},
    types::LedgerEntry,
};

pub const TRACKING_FILE_NAME: &str = "subtitle_merge_tracking.csv";

const LEDGER_COLUMNS: [&str; 4] = [
    "item_id",
    "language",
    "output_artifact_name",
    "processed_timestamp",
];

/// `(item_id, language)` pairs that are already committed.
pub type ProcessedSet = HashSet<(String, String)>;

pub fn get_tracking_path(data_dir: &Path) -> PathBuf {
    data_dir.join(TRACKING_FILE_NAME)
}

/// Local time to the second, the format stored in `processed_timestamp`.
pub fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// Durable record of processed `(item, language)` pairs.
///
/// Entries are kept in insertion order and the whole table is rewritten on every save.
#[derive(Debug, Clone)]
pub struct TrackingLedger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
    processed: ProcessedSet,
}

impl TrackingLedger {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            processed: HashSet::new(),
        }
    }

    /// Read the ledger at `path`. A missing file is a first run and yields an empty ledger.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut ledger = Self::empty(path);
        let bytes = match fs::read(&ledger.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %ledger.path.display(), "no ledger yet, starting empty");
                return Ok(ledger);
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::Reader::from_reader(strip_bom(&bytes));
        for row in reader.deserialize::<LedgerEntry>() {
            let entry = row?;
            if !ledger.push(entry.clone()) {
                warn!(
                    item_id = %entry.item_id,
                    language = %entry.language,
                    "duplicate ledger row ignored"
                );
            }
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn is_processed(&self, item_id: &str, language: &str) -> bool {
        self.processed
            .contains(&(item_id.to_string(), language.to_string()))
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: LedgerEntry) -> bool {
        if !self.processed.insert(entry.key()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Buffer entries in memory. Keys already present are left untouched.
    /// Returns how many entries were new.
    pub fn append(&mut self, entries: impl IntoIterator<Item = LedgerEntry>) -> usize {
        entries
            .into_iter()
            .map(|entry| self.push(entry))
            .filter(|added| *added)
            .count()
    }

    /// First part index not yet used by an artifact of `source_name` in `language`.
    pub fn next_part_index(&self, source_name: &str, language: &str) -> u32 {
        self.entries
            .iter()
            .filter(|entry| entry.language == language)
            .filter_map(|entry| parse_part_index(&entry.output_artifact_name, source_name, language))
            .max()
            .map_or(1, |last| last + 1)
    }

    /// Rewrite the whole table atomically.
    pub async fn save(&self) -> Result<()> {
        let bytes = self.encode()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::persistence(parent, e))?;
        }
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|e| HarvestError::persistence(&self.path, e))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "ledger saved");
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.entries.is_empty() {
            writer.write_record(LEDGER_COLUMNS)?;
        }
        for entry in &self.entries {
            writer.serialize(entry)?;
        }
        writer
            .into_inner()
            .map_err(|e| HarvestError::IoError(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(item_id: &str, language: &str, artifact: &str) -> LedgerEntry {
        LedgerEntry {
            item_id: item_id.to_string(),
            language: language.to_string(),
            output_artifact_name: artifact.to_string(),
            processed_timestamp: "2024-05-01T12:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TrackingLedger::load(get_tracking_path(dir.path()))
            .await
            .unwrap();

        assert!(ledger.is_empty());
        assert!(ledger.processed().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = get_tracking_path(dir.path());
        let mut ledger = TrackingLedger::load(&path).await.unwrap();
        ledger.append([
            entry("v2", "zh", "src_zh_part1.data"),
            entry("v1", "zh", "src_zh_part1.data"),
            entry("v1", "en", "src_en_part1.data"),
        ]);
        ledger.save().await.unwrap();

        let reloaded = TrackingLedger::load(&path).await.unwrap();
        let ids: Vec<_> = reloaded
            .entries()
            .iter()
            .map(|e| (e.item_id.as_str(), e.language.as_str()))
            .collect();
        assert_eq!(ids, vec![("v2", "zh"), ("v1", "zh"), ("v1", "en")]);
        assert!(reloaded.is_processed("v1", "en"));
        assert!(!reloaded.is_processed("v2", "en"));
    }

    #[test]
    fn appending_existing_key_is_a_no_op() {
        let mut ledger = TrackingLedger::empty("unused.csv");
        assert_eq!(ledger.append([entry("v1", "zh", "a_zh_part1.data")]), 1);
        assert_eq!(ledger.append([entry("v1", "zh", "a_zh_part9.data")]), 0);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].output_artifact_name, "a_zh_part1.data");
    }

    #[tokio::test]
    async fn empty_ledger_saves_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = get_tracking_path(dir.path());
        TrackingLedger::empty(&path).save().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.trim_end(),
            "item_id,language,output_artifact_name,processed_timestamp"
        );
    }

    #[tokio::test]
    async fn reads_legacy_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = get_tracking_path(dir.path());
        std::fs::write(
            &path,
            "video_id,lang,merged_file,processed_time\nabc,th,ds_th_part2.data,2024-01-01T00:00:00\n",
        )
        .unwrap();

        let ledger = TrackingLedger::load(&path).await.unwrap();
        assert!(ledger.is_processed("abc", "th"));
        assert_eq!(ledger.next_part_index("ds", "th"), 3);
    }

    #[test]
    fn next_part_follows_highest_recorded_part() {
        let mut ledger = TrackingLedger::empty("unused.csv");
        ledger.append([
            entry("a", "zh", "src_zh_part1.data"),
            entry("b", "zh", "src_zh_part4.data"),
            entry("c", "en", "src_en_part2.data"),
            entry("d", "zh", "other_zh_part7.data"),
        ]);

        assert_eq!(ledger.next_part_index("src", "zh"), 5);
        assert_eq!(ledger.next_part_index("src", "en"), 3);
        assert_eq!(ledger.next_part_index("src", "th"), 1);
    }

    #[tokio::test]
    async fn save_replaces_whole_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = get_tracking_path(dir.path());
        std::fs::write(&path, "garbage that is not a ledger\n").unwrap();

        let mut ledger = TrackingLedger::empty(&path);
        ledger.append([entry("v1", "zh", "a_zh_part1.data")]);
        ledger.save().await.unwrap();

        let reloaded = TrackingLedger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!dir.path().join(format!("{TRACKING_FILE_NAME}.tmp")).exists());
    }
}
