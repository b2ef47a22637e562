use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tokio::{fs, process::Command};
use tracing::debug;

use crate::{
    cache::{CAPTION_FORMAT, find_track_in_cache, get_caption_dir, get_root_cache_dir},
    error::SourceError,
    language::{normalize_language, track_codes},
    source::TranscriptSource,
    types::Segment,
};

pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Caption tracks fetched with yt-dlp and cached per item.
pub struct CaptionSource {
    program: String,
    cache_root: PathBuf,
    force: bool,
}

impl Default for CaptionSource {
    fn default() -> Self {
        Self::new(get_root_cache_dir())
    }
}

impl CaptionSource {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            program: "yt-dlp".to_string(),
            cache_root: cache_root.into(),
            force: false,
        }
    }

    /// Re-download tracks even when a cached copy exists.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run yt-dlp once for `codes`. `write_flag` picks uploaded (`--write-subs`) or
    /// automatic (`--write-auto-subs`) tracks. Returns the combined output log.
    async fn download_tracks(
        &self,
        item_id: &str,
        language: &str,
        write_flag: &str,
        codes: &[String],
        caption_dir: &Path,
    ) -> Result<String, SourceError> {
        let failed = |reason: String| SourceError::Failed {
            item_id: item_id.to_string(),
            language: language.to_string(),
            reason,
        };

        fs::create_dir_all(caption_dir)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let output_template = caption_dir.join("%(id)s.%(ext)s");
        debug!(item_id, language, write_flag, "downloading caption tracks");
        let output = Command::new(&self.program)
            .arg("--skip-download")
            .arg(write_flag)
            .arg("--sub-format")
            .arg(CAPTION_FORMAT)
            .arg("--sub-langs")
            .arg(codes.join(","))
            .arg("-o")
            .arg(&output_template)
            .arg(video_url(item_id))
            .output()
            .await
            .map_err(|e| failed(format!("could not run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let mut log = String::from_utf8_lossy(&output.stdout).to_string();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(log)
    }

    async fn dump_metadata(&self, item_id: &str) -> Result<serde_json::Value, SourceError> {
        let failed = |reason: String| SourceError::Failed {
            item_id: item_id.to_string(),
            language: "*".to_string(),
            reason,
        };

        let output = Command::new(&self.program)
            .arg("-J")
            .arg("--skip-download")
            .arg(video_url(item_id))
            .output()
            .await
            .map_err(|e| failed(format!("could not run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| failed(e.to_string()))
    }

    /// Uploaded tracks first. Automatic captions only as the `-orig` track, never a
    /// machine translation.
    async fn download_preferred(
        &self,
        item_id: &str,
        language: &str,
        uploaded: &[String],
        automatic: &[String],
        caption_dir: &Path,
    ) -> Result<PathBuf, SourceError> {
        let mut log = self
            .download_tracks(item_id, language, "--write-subs", uploaded, caption_dir)
            .await?;
        if let Some(track) = find_track_in_cache(caption_dir, item_id, uploaded) {
            return Ok(track);
        }

        log.push_str(
            &self
                .download_tracks(item_id, language, "--write-auto-subs", automatic, caption_dir)
                .await?,
        );
        if let Some(track) = find_track_in_cache(caption_dir, item_id, automatic) {
            return Ok(track);
        }

        if log.contains("has no subtitles") {
            Err(SourceError::Disabled {
                item_id: item_id.to_string(),
            })
        } else {
            Err(SourceError::NotAvailable {
                item_id: item_id.to_string(),
                language: language.to_string(),
            })
        }
    }
}

impl TranscriptSource for CaptionSource {
    async fn fetch(&self, item_id: &str, language: &str) -> Result<Vec<Segment>, SourceError> {
        let uploaded = track_codes(language);
        let automatic = original_auto_codes(&uploaded);
        let caption_dir = get_caption_dir(&self.cache_root, item_id);

        let cached = if self.force {
            None
        } else {
            let preferred: Vec<String> = uploaded.iter().chain(&automatic).cloned().collect();
            find_track_in_cache(&caption_dir, item_id, &preferred)
        };

        let track = match cached {
            Some(track) => track,
            None => {
                self.download_preferred(item_id, language, &uploaded, &automatic, &caption_dir)
                    .await?
            }
        };

        let bytes = fs::read(&track).await.map_err(|e| SourceError::Failed {
            item_id: item_id.to_string(),
            language: language.to_string(),
            reason: format!("{}: {e}", track.display()),
        })?;
        parse_json3(&bytes).map_err(|e| SourceError::Failed {
            item_id: item_id.to_string(),
            language: language.to_string(),
            reason: format!("{}: {e}", track.display()),
        })
    }

    async fn available_languages(&self, item_id: &str) -> Result<BTreeSet<String>, SourceError> {
        let metadata = self.dump_metadata(item_id).await?;
        Ok(languages_from_metadata(&metadata))
    }
}

/// Track codes of the original-language automatic captions for `uploaded` codes.
pub fn original_auto_codes(uploaded: &[String]) -> Vec<String> {
    uploaded.iter().map(|code| format!("{code}-orig")).collect()
}

#[derive(Deserialize)]
struct Json3Track {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: f64,
    #[serde(default)]
    d_duration_ms: f64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a YouTube `json3` caption track. Events without visible text are dropped.
pub fn parse_json3(bytes: &[u8]) -> Result<Vec<Segment>, serde_json::Error> {
    let track: Json3Track = serde_json::from_slice(bytes)?;
    let segments = track
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|seg| seg.utf8.as_str()).collect();
            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(Segment::new(
                text,
                event.t_start_ms / 1000.0,
                (event.d_duration_ms / 1000.0).max(0.0),
            ))
        })
        .collect();
    Ok(segments)
}

/// Language groups advertised in yt-dlp metadata: uploaded subtitles plus the
/// original-language automatic track (`<code>-orig`). Machine translations are ignored.
pub fn languages_from_metadata(metadata: &serde_json::Value) -> BTreeSet<String> {
    let uploaded = metadata["subtitles"]
        .as_object()
        .into_iter()
        .flat_map(|tracks| tracks.keys().map(String::as_str));
    let automatic = metadata["automatic_captions"]
        .as_object()
        .into_iter()
        .flat_map(|tracks| tracks.keys().filter_map(|code| code.strip_suffix("-orig")));

    uploaded
        .chain(automatic)
        .filter_map(normalize_language)
        .map(str::to_string)
        .collect()
}
