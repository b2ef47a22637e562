use std::{collections::BTreeSet, path::Path};

use csv::StringRecord;
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    artifact::write_atomic,
    catalog::{ColumnMap, reader},
    error::{HarvestError, Result},
    format::format_language_list,
    source::TranscriptSource,
};

/// Column the probe writes its findings to.
pub const LANGUAGE_COLUMN: &str = "subtitle";

#[derive(Debug, Default)]
pub struct ProbeSummary {
    pub rows: usize,
    pub with_languages: usize,
    pub dropped_rows: usize,
}

/// Annotate every catalog row with the language groups the source offers for it.
///
/// All input columns are kept and `subtitle` is added, or overwritten when present.
/// Rows without an id are dropped. A failed probe leaves the cell empty.
/// `on_row` sees each probed row as `(done, total, item_id, languages)`.
pub async fn annotate_catalog<S: TranscriptSource>(
    source: &S,
    bytes: &[u8],
    mut on_row: impl FnMut(usize, usize, &str, &BTreeSet<String>),
) -> Result<(Vec<u8>, ProbeSummary)> {
    let mut input = reader(bytes);
    let mut headers = input.headers()?.clone();
    let columns = ColumnMap::resolve(&headers)?;
    let width = headers.len();
    let language_idx = match headers.iter().position(|h| h.trim() == LANGUAGE_COLUMN) {
        Some(idx) => idx,
        None => {
            headers.push_field(LANGUAGE_COLUMN);
            width
        }
    };

    let mut summary = ProbeSummary::default();
    let mut rows: Vec<(String, StringRecord)> = Vec::new();
    for row in input.records() {
        match row {
            Ok(record) => match columns.id(&record) {
                Some(id) => rows.push((id.to_string(), record)),
                None => summary.dropped_rows += 1,
            },
            Err(e) => {
                warn!(error = %e, "dropping unreadable catalog row");
                summary.dropped_rows += 1;
            }
        }
    }

    let mut output = csv::Writer::from_writer(Vec::new());
    output.write_record(&headers)?;
    let total = rows.len();
    for (done, (id, record)) in rows.into_iter().enumerate() {
        let languages = match source.available_languages(&id).await {
            Ok(languages) => languages,
            Err(e) => {
                warn!(item_id = %id, "language probe failed: {e}");
                BTreeSet::new()
            }
        };
        debug!(item_id = %id, languages = %format_language_list(&languages), "probed");
        on_row(done + 1, total, &id, &languages);

        let mut cells: Vec<String> = (0..headers.len())
            .map(|idx| record.get(idx).unwrap_or_default().to_string())
            .collect();
        cells[language_idx] = format_language_list(&languages);
        output.write_record(&cells)?;

        summary.rows += 1;
        if !languages.is_empty() {
            summary.with_languages += 1;
        }
    }

    let bytes = output
        .into_inner()
        .map_err(|e| HarvestError::IoError(e.into_error()))?;
    Ok((bytes, summary))
}

/// Read `input`, annotate it and write the result to `output`.
pub async fn probe_catalog<S: TranscriptSource>(
    source: &S,
    input: &Path,
    output: &Path,
    on_row: impl FnMut(usize, usize, &str, &BTreeSet<String>),
) -> Result<ProbeSummary> {
    let bytes = fs::read(input).await?;
    let (annotated, summary) = annotate_catalog(source, &bytes, on_row).await?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| HarvestError::persistence(parent, e))?;
    }
    write_atomic(output, &annotated)
        .await
        .map_err(|e| HarvestError::persistence(output, e))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::SourceError, types::Segment};

    struct Languages;

    impl TranscriptSource for Languages {
        async fn fetch(
            &self,
            item_id: &str,
            language: &str,
        ) -> std::result::Result<Vec<Segment>, SourceError> {
            Err(SourceError::NotAvailable {
                item_id: item_id.to_string(),
                language: language.to_string(),
            })
        }

        async fn available_languages(
            &self,
            item_id: &str,
        ) -> std::result::Result<BTreeSet<String>, SourceError> {
            match item_id {
                "a" => Ok(BTreeSet::from(["zh".to_string(), "en".to_string()])),
                "b" => Ok(BTreeSet::new()),
                _ => Err(SourceError::Failed {
                    item_id: item_id.to_string(),
                    language: String::new(),
                    reason: "timeout".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn appends_language_column_and_keeps_others() {
        let input = "video_id,title,views\na,First,10\n,orphan,1\nb,Second,20\nc,Third,30\n";
        let mut seen = Vec::new();

        let (bytes, summary) = annotate_catalog(&Languages, input.as_bytes(), |done, total, id, _| {
            seen.push((done, total, id.to_string()))
        })
        .await
        .unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "video_id,title,views,subtitle\n\
             a,First,10,\"en,zh\"\n\
             b,Second,20,\n\
             c,Third,30,\n"
        );
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.with_languages, 1);
        assert_eq!(summary.dropped_rows, 1);
        assert_eq!(seen.last(), Some(&(3, 3, "c".to_string())));
    }

    #[tokio::test]
    async fn overwrites_existing_language_column() {
        let input = "id,subtitle\na,th\n";

        let (bytes, _) = annotate_catalog(&Languages, input.as_bytes(), |_, _, _, _| {})
            .await
            .unwrap();

        assert_eq!(String::from_utf8(bytes).unwrap(), "id,subtitle\na,\"en,zh\"\n");
    }

    #[tokio::test]
    async fn writes_annotated_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("videos.csv");
        let output = dir.path().join("nested/videos_subtitle.csv");
        std::fs::write(&input, "video_id\na\n").unwrap();

        let summary = probe_catalog(&Languages, &input, &output, |_, _, _, _| {})
            .await
            .unwrap();

        assert_eq!(summary.rows, 1);
        assert!(std::fs::read_to_string(&output).unwrap().contains("a,\"en,zh\""));
    }
}
