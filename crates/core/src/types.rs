use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Smallest timed unit of text coming out of a transcript source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl Segment {
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }
}

/// A start-only line, as found in merged artifacts or raw recognizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedLine {
    pub text: String,
    pub start: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_time: f64,
}

/// One persisted row. Column names follow the artifact layout
/// (`text, video_url, start_time_seconds, speaker`) and accept the long names on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub text: String,
    #[serde(rename = "video_url", alias = "source_reference")]
    pub source_reference: String,
    pub start_time_seconds: f64,
    #[serde(rename = "speaker", alias = "attribution")]
    pub attribution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub reference: String,
    pub available_languages: BTreeSet<String>,
}

impl Item {
    pub fn advertises(&self, language: &str) -> bool {
        self.available_languages.contains(language)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(alias = "video_id")]
    pub item_id: String,
    #[serde(alias = "lang")]
    pub language: String,
    #[serde(alias = "merged_file")]
    pub output_artifact_name: String,
    #[serde(alias = "processed_time")]
    pub processed_timestamp: String,
}

impl LedgerEntry {
    pub fn key(&self) -> (String, String) {
        (self.item_id.clone(), self.language.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGroup {
    pub language: String,
    /// 1-based ordinal of this group within its language.
    pub part_index: u32,
    pub items: Vec<Item>,
}

impl BatchGroup {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Speech-recognition output (whisper JSON layout).
#[derive(Debug, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl From<&TranscriptSegment> for Segment {
    fn from(seg: &TranscriptSegment) -> Self {
        Segment {
            text: seg.text.trim().to_string(),
            start: seg.start,
            duration: (seg.end - seg.start).max(0.0),
        }
    }
}
