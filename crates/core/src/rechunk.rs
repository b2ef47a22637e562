use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{
    artifact::{ArtifactWriter, CsvArtifactStore, chunked_output_name, read_records},
    chunker::{backfill_durations, chunk_segments},
    error::Result,
    format::round_centis,
    types::{OutputRecord, TimedLine},
};

#[derive(Debug)]
pub struct RechunkOutcome {
    /// `None` when the input held no rows and nothing was written.
    pub path: Option<PathBuf>,
    pub references: usize,
    pub chunks: usize,
}

/// Group rows by source reference, first appearance first.
fn group_by_reference(records: Vec<OutputRecord>) -> Vec<Vec<OutputRecord>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<OutputRecord>> = Vec::new();
    for record in records {
        let slot = *index
            .entry(record.source_reference.clone())
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[slot].push(record);
    }
    groups
}

/// Re-chunk per-segment rows into coarser rows.
///
/// Each reference is sorted by start time, its durations derived from the gaps between
/// starts, and chunked with `min_chunk_time`. The attribution of the reference's earliest
/// row is used for all its chunks.
pub fn rechunk_records(records: Vec<OutputRecord>, min_chunk_time: f64) -> Vec<OutputRecord> {
    let mut out = Vec::new();
    for mut rows in group_by_reference(records) {
        rows.sort_by(|a, b| a.start_time_seconds.total_cmp(&b.start_time_seconds));
        let lines: Vec<TimedLine> = rows
            .iter()
            .map(|row| TimedLine {
                text: row.text.clone(),
                start: row.start_time_seconds,
            })
            .collect();
        let Some(first) = rows.first() else {
            continue;
        };
        out.extend(
            chunk_segments(&backfill_durations(&lines), min_chunk_time)
                .into_iter()
                .map(|chunk| OutputRecord {
                    text: chunk.text,
                    source_reference: first.source_reference.clone(),
                    start_time_seconds: round_centis(chunk.start_time),
                    attribution: first.attribution.clone(),
                }),
        );
    }
    out
}

/// Re-chunk a merged artifact into `<output_dir>/<stem>_chunk<N>s.csv`.
pub async fn rechunk_file(
    input: &Path,
    output_dir: &Path,
    min_chunk_time: f64,
) -> Result<RechunkOutcome> {
    let records = read_records(input).await?;
    if records.is_empty() {
        return Ok(RechunkOutcome {
            path: None,
            references: 0,
            chunks: 0,
        });
    }

    let references = group_by_reference(records.clone()).len();
    let chunks = rechunk_records(records, min_chunk_time);

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let store = CsvArtifactStore::new(output_dir).with_bom(true);
    let path = store
        .write(&chunked_output_name(&stem, min_chunk_time), &chunks)
        .await?;
    info!(path = %path.display(), chunks = chunks.len(), references, "re-chunked");

    Ok(RechunkOutcome {
        path: Some(path),
        references,
        chunks: chunks.len(),
    })
}
