use std::path::Path;

use csv::StringRecord;
use tokio::fs;
use tracing::warn;

use crate::{
    artifact::strip_bom,
    error::{HarvestError, Result},
    format::parse_language_list,
    source::captions::video_url,
    types::Item,
};

const ID_COLUMNS: [&str; 2] = ["video_id", "id"];
const TITLE_COLUMNS: [&str; 2] = ["title", "video_title"];
const REFERENCE_COLUMNS: [&str; 2] = ["video_url", "url"];
const LANGUAGE_COLUMNS: [&str; 2] = ["subtitle", "available_languages"];

#[derive(Debug, Default)]
pub struct Catalog {
    pub items: Vec<Item>,
    /// Whether the table carried precomputed languages. Without them the harvester
    /// asks the source for each item.
    pub has_language_column: bool,
    pub skipped_rows: usize,
}

/// Header positions for each logical column, in preference order.
pub(crate) struct ColumnMap {
    id: Vec<usize>,
    title: Vec<usize>,
    reference: Vec<usize>,
    languages: Vec<usize>,
}

fn positions(headers: &StringRecord, names: &[&str]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|name| headers.iter().position(|h| h.trim() == *name))
        .collect()
}

fn first_value<'r>(record: &'r StringRecord, positions: &[usize]) -> Option<&'r str> {
    positions
        .iter()
        .filter_map(|idx| record.get(*idx))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

impl ColumnMap {
    pub(crate) fn resolve(headers: &StringRecord) -> Result<Self> {
        let map = Self {
            id: positions(headers, &ID_COLUMNS),
            title: positions(headers, &TITLE_COLUMNS),
            reference: positions(headers, &REFERENCE_COLUMNS),
            languages: positions(headers, &LANGUAGE_COLUMNS),
        };
        if map.id.is_empty() {
            return Err(HarvestError::Config {
                reason: format!(
                    "catalog has no id column (expected one of {})",
                    ID_COLUMNS.join(", ")
                ),
            });
        }
        Ok(map)
    }

    pub(crate) fn id<'r>(&self, record: &'r StringRecord) -> Option<&'r str> {
        first_value(record, &self.id)
    }

    fn item(&self, record: &StringRecord) -> Option<Item> {
        let id = self.id(record)?;
        Some(Item {
            id: id.to_string(),
            title: first_value(record, &self.title).unwrap_or_default().to_string(),
            reference: first_value(record, &self.reference)
                .map(str::to_string)
                .unwrap_or_else(|| video_url(id)),
            available_languages: first_value(record, &self.languages)
                .map(parse_language_list)
                .unwrap_or_default(),
        })
    }
}

pub(crate) fn reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(bytes))
}

/// Parse a catalog table. Rows that cannot be read or lack an id are skipped with a warning.
pub fn parse_catalog(bytes: &[u8]) -> Result<Catalog> {
    let mut reader = reader(bytes);
    let columns = ColumnMap::resolve(reader.headers()?)?;
    let mut catalog = Catalog {
        has_language_column: !columns.languages.is_empty(),
        ..Default::default()
    };

    for (idx, row) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "skipping unreadable catalog row");
                catalog.skipped_rows += 1;
                continue;
            }
        };
        match columns.item(&record) {
            Some(item) => catalog.items.push(item),
            None => {
                warn!(line, "skipping catalog row without an id");
                catalog.skipped_rows += 1;
            }
        }
    }
    Ok(catalog)
}

pub async fn read_catalog(path: &Path) -> Result<Catalog> {
    let bytes = fs::read(path).await?;
    parse_catalog(&bytes)
}
