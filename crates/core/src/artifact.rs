use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};

use crate::{
    error::{HarvestError, Result},
    types::OutputRecord,
};

pub const ARTIFACT_EXTENSION: &str = "data";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Deterministic artifact name for one batch group.
pub fn artifact_name(source_name: &str, language: &str, part_index: u32) -> String {
    format!("{source_name}_{language}_part{part_index}.{ARTIFACT_EXTENSION}")
}

/// Inverse of [`artifact_name`] for a fixed source and language.
pub fn parse_part_index(name: &str, source_name: &str, language: &str) -> Option<u32> {
    name.strip_prefix(source_name)?
        .strip_prefix('_')?
        .strip_prefix(language)?
        .strip_prefix("_part")?
        .strip_suffix(ARTIFACT_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Name of the file produced by re-chunking a merged artifact.
pub fn chunked_output_name(input_stem: &str, min_chunk_time: f64) -> String {
    format!("{input_stem}_chunk{}s.csv", min_chunk_time.floor() as i64)
}

pub trait ArtifactWriter {
    /// Persist `records` under `name`, replacing any earlier artifact with that name.
    async fn write(&self, name: &str, records: &[OutputRecord]) -> Result<PathBuf>;
}

/// Writes artifacts as CSV files inside one directory.
pub struct CsvArtifactStore {
    dir: PathBuf,
    with_bom: bool,
}

impl CsvArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            with_bom: false,
        }
    }

    /// Prefix files with a UTF-8 BOM so spreadsheet tools detect the encoding.
    pub fn with_bom(mut self, with_bom: bool) -> Self {
        self.with_bom = with_bom;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactWriter for CsvArtifactStore {
    async fn write(&self, name: &str, records: &[OutputRecord]) -> Result<PathBuf> {
        let path = self.dir.join(name);
        let bytes = encode_records(records, self.with_bom)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HarvestError::persistence(&self.dir, e))?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| HarvestError::persistence(&path, e))?;
        Ok(path)
    }
}

pub fn encode_records(records: &[OutputRecord], with_bom: bool) -> Result<Vec<u8>> {
    let buf = if with_bom {
        UTF8_BOM.to_vec()
    } else {
        Vec::new()
    };
    let mut writer = csv::Writer::from_writer(buf);
    if records.is_empty() {
        writer.write_record(["text", "video_url", "start_time_seconds", "speaker"])?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.into_inner().map_err(|e| HarvestError::IoError(e.into_error()))
}

/// Load the rows of a previously written artifact.
pub async fn read_records(path: &Path) -> Result<Vec<OutputRecord>> {
    let bytes = fs::read(path).await?;
    let mut reader = csv::Reader::from_reader(strip_bom(&bytes));
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<OutputRecord>, _>>()?;
    Ok(records)
}

pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Replace `path` with `contents` via a synced temp file and a rename, so readers see either
/// the old file or the new one.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await
}
