use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tokio::fs;

use crate::{
    artifact::strip_bom,
    chunker::backfill_durations,
    error::SourceError,
    language::normalize_language,
    source::TranscriptSource,
    types::{Segment, TimedLine, Transcript},
};

/// Speech-recognition output stored on disk, one item per file.
///
/// Lookup order for an item `id` and language `lang`:
/// 1. `id.lang.json`: whisper JSON for that language
/// 2. `id.json`: whisper JSON whose detected language folds into `lang`
/// 3. `id.csv`: per-line recognizer output (`text, start_time_seconds, language`);
///    lines in `lang` are kept and their durations back-filled
pub struct TranscriptDirSource {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct RecognizedLine {
    text: String,
    start_time_seconds: f64,
    #[serde(default)]
    language: String,
}

impl TranscriptDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn failed(item_id: &str, language: &str, path: &Path, reason: impl std::fmt::Display) -> SourceError {
        SourceError::Failed {
            item_id: item_id.to_string(),
            language: language.to_string(),
            reason: format!("{}: {reason}", path.display()),
        }
    }

    async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn load_transcript(
        &self,
        path: &Path,
        item_id: &str,
        language: &str,
    ) -> Result<Option<Transcript>, SourceError> {
        let Some(bytes) = Self::read_optional(path)
            .await
            .map_err(|e| Self::failed(item_id, language, path, e))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Self::failed(item_id, language, path, e))
    }

    async fn load_lines(
        &self,
        path: &Path,
        item_id: &str,
        language: &str,
    ) -> Result<Option<Vec<RecognizedLine>>, SourceError> {
        let Some(bytes) = Self::read_optional(path)
            .await
            .map_err(|e| Self::failed(item_id, language, path, e))?
        else {
            return Ok(None);
        };
        let mut reader = csv::Reader::from_reader(strip_bom(&bytes));
        reader
            .deserialize()
            .collect::<Result<Vec<RecognizedLine>, _>>()
            .map(Some)
            .map_err(|e| Self::failed(item_id, language, path, e))
    }

    fn json_path(&self, item_id: &str, language: Option<&str>) -> PathBuf {
        match language {
            Some(lang) => self.dir.join(format!("{item_id}.{lang}.json")),
            None => self.dir.join(format!("{item_id}.json")),
        }
    }

    fn csv_path(&self, item_id: &str) -> PathBuf {
        self.dir.join(format!("{item_id}.csv"))
    }
}

fn folds_into(code: &str, language: &str) -> bool {
    normalize_language(code).unwrap_or(code) == language
}

impl TranscriptSource for TranscriptDirSource {
    async fn fetch(&self, item_id: &str, language: &str) -> Result<Vec<Segment>, SourceError> {
        let tagged = self.json_path(item_id, Some(language));
        if let Some(transcript) = self.load_transcript(&tagged, item_id, language).await? {
            return Ok(transcript.segments.iter().map(Segment::from).collect());
        }

        let untagged = self.json_path(item_id, None);
        if let Some(transcript) = self.load_transcript(&untagged, item_id, language).await? {
            if folds_into(&transcript.language, language) {
                return Ok(transcript.segments.iter().map(Segment::from).collect());
            }
        }

        if let Some(lines) = self.load_lines(&self.csv_path(item_id), item_id, language).await? {
            let mut lines: Vec<TimedLine> = lines
                .into_iter()
                .filter(|line| folds_into(&line.language, language))
                .map(|line| TimedLine {
                    text: line.text,
                    start: line.start_time_seconds,
                })
                .collect();
            if !lines.is_empty() {
                lines.sort_by(|a, b| a.start.total_cmp(&b.start));
                return Ok(backfill_durations(&lines));
            }
        }

        Err(SourceError::NotAvailable {
            item_id: item_id.to_string(),
            language: language.to_string(),
        })
    }

    async fn available_languages(&self, item_id: &str) -> Result<BTreeSet<String>, SourceError> {
        let mut languages = BTreeSet::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| Self::failed(item_id, "*", &self.dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::failed(item_id, "*", &self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(rest) = name.strip_prefix(item_id).and_then(|r| r.strip_prefix('.')) else {
                continue;
            };
            match rest {
                "json" => {
                    if let Some(transcript) = self.load_transcript(&entry.path(), item_id, "*").await? {
                        languages.extend(normalize_language(&transcript.language).map(str::to_string));
                    }
                }
                "csv" => {
                    if let Some(lines) = self.load_lines(&entry.path(), item_id, "*").await? {
                        languages.extend(
                            lines
                                .iter()
                                .filter_map(|line| normalize_language(&line.language))
                                .map(str::to_string),
                        );
                    }
                }
                tagged => {
                    // `<id>.<lang>.json` only; deeper names belong to other items
                    if let Some(code) = tagged.strip_suffix(".json").filter(|c| !c.contains('.')) {
                        languages.insert(normalize_language(code).unwrap_or(code).to_string());
                    }
                }
            }
        }
        Ok(languages)
    }
}
