use std::{path::PathBuf, sync::LazyLock};

use regex::Regex;
use tracing::info;

use crate::{
    artifact::{ArtifactWriter, CsvArtifactStore},
    chunker::chunk_segments,
    error::{HarvestError, Result, SourceError},
    format::round_centis,
    language::attribution,
    source::TranscriptSource,
    types::OutputRecord,
};

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[?&]v=|youtu\.be/|/shorts/|/embed/)([A-Za-z0-9_-]+)")
        .expect("video id pattern is valid")
});

/// Pull the video id out of a watch, short or embed URL.
pub fn extract_video_id(url: &str) -> Result<String> {
    VIDEO_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| HarvestError::InvalidUrl {
            url: url.to_string(),
        })
}

/// Default output file for a single video: `<id>_<language>.csv`.
pub fn default_output_name(video_id: &str, language: &str) -> String {
    format!("{video_id}_{language}.csv")
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub language: String,
    pub min_chunk_time: f64,
    /// Overrides the language's default attribution.
    pub speaker: Option<String>,
}

#[derive(Debug)]
pub struct FetchedVideo {
    pub video_id: String,
    pub records: Vec<OutputRecord>,
}

/// Fetch one video's track and chunk it. The records reference the URL as given.
pub async fn fetch_video<S: TranscriptSource>(
    source: &S,
    request: &FetchRequest,
) -> Result<FetchedVideo> {
    let video_id = extract_video_id(&request.url)?;
    let segments = source.fetch(&video_id, &request.language).await?;
    if segments.is_empty() {
        return Err(SourceError::NotAvailable {
            item_id: video_id,
            language: request.language.clone(),
        }
        .into());
    }

    let speaker = request
        .speaker
        .clone()
        .unwrap_or_else(|| attribution(&request.language).to_string());
    let records: Vec<OutputRecord> = chunk_segments(&segments, request.min_chunk_time)
        .into_iter()
        .map(|chunk| OutputRecord {
            text: chunk.text,
            source_reference: request.url.clone(),
            start_time_seconds: round_centis(chunk.start_time),
            attribution: speaker.clone(),
        })
        .collect();
    info!(video_id = %video_id, segments = segments.len(), chunks = records.len(), "video fetched");

    Ok(FetchedVideo { video_id, records })
}

/// Write a fetched video as a BOM-prefixed CSV at `output`.
pub async fn write_video(output: PathBuf, video: &FetchedVideo) -> Result<PathBuf> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| HarvestError::Config {
            reason: format!("{} is not a file path", output.display()),
        })?;
    CsvArtifactStore::new(dir)
        .with_bom(true)
        .write(&name, &video.records)
        .await
}
