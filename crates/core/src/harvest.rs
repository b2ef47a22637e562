use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    artifact::ArtifactWriter,
    catalog::Catalog,
    error::Result,
    language::default_languages,
    ledger::TrackingLedger,
    persister::{BatchOutcome, BatchPersister, PersisterSettings, SourceErrorPolicy},
    scheduler::{Quota, QuotaScheduler, Schedule},
    source::TranscriptSource,
    types::{BatchGroup, Item},
};

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Prefix of every artifact name.
    pub source_name: String,
    /// Language groups in priority order.
    pub languages: Vec<String>,
    pub group_size: usize,
    pub max_per_language: Quota,
    /// Chunk threshold in seconds; 0 keeps one record per source segment.
    pub min_chunk_time: f64,
    pub on_source_error: SourceErrorPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            source_name: "catalog".to_string(),
            languages: default_languages(),
            group_size: 20,
            max_per_language: Quota::default(),
            min_chunk_time: 0.0,
            on_source_error: SourceErrorPolicy::default(),
        }
    }
}

/// Artifact prefix derived from a catalog path (`../data/ds_jietuoyuan.csv` → `ds_jietuoyuan`).
pub fn source_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog".to_string())
}

#[derive(Debug, Default, Clone)]
pub struct HarvestSummary {
    pub groups: usize,
    pub items_committed: usize,
    pub items_skipped: usize,
    pub records_written: usize,
    pub artifacts: Vec<PathBuf>,
}

impl HarvestSummary {
    pub fn absorb(&mut self, outcome: &BatchOutcome) {
        self.groups += 1;
        self.items_committed += outcome.entries.len();
        self.items_skipped += outcome.skipped.iter().filter(|s| s.retry_eligible).count();
        self.records_written += outcome.records.len();
        self.artifacts.extend(outcome.artifact.clone());
    }
}

/// One harvesting run over a catalog.
pub struct Harvester<'a, S, W> {
    source: &'a S,
    scheduler: QuotaScheduler,
    persister: BatchPersister<'a, S, W>,
    config: HarvestConfig,
}

impl<'a, S: TranscriptSource, W: ArtifactWriter> Harvester<'a, S, W> {
    pub fn new(source: &'a S, writer: &'a W, config: HarvestConfig) -> Result<Self> {
        let scheduler = QuotaScheduler::new(
            config.languages.clone(),
            config.max_per_language,
            config.group_size,
        )?;
        let persister = BatchPersister::new(
            source,
            writer,
            PersisterSettings {
                source_name: config.source_name.clone(),
                min_chunk_time: config.min_chunk_time,
                on_source_error: config.on_source_error,
            },
        );
        Ok(Self {
            source,
            scheduler,
            persister,
            config,
        })
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Fill in languages for catalogs that do not list them by asking the source.
    /// Items whose probe fails are left with no languages.
    pub async fn resolve_languages(&self, catalog: &mut Catalog) {
        if catalog.has_language_column {
            return;
        }
        for item in catalog.items.iter_mut() {
            match self.source.available_languages(&item.id).await {
                Ok(languages) => item.available_languages = languages,
                Err(e) => warn!(item_id = %item.id, "language probe failed: {e}"),
            }
        }
        catalog.has_language_column = true;
    }

    /// Build the run's schedule, excluding committed pairs and continuing part numbers.
    pub fn plan(&self, items: &[Item], ledger: &TrackingLedger) -> Schedule {
        self.scheduler
            .schedule_resuming(items, ledger, &self.config.source_name)
    }

    /// Run one group and persist its ledger entries. The ledger on disk only changes once the
    /// group's artifact is written, and `ledger` only changes once the disk copy is saved.
    pub async fn commit_group(
        &self,
        group: &BatchGroup,
        ledger: &mut TrackingLedger,
    ) -> Result<BatchOutcome> {
        let outcome = self.persister.run(group).await?;
        let mut updated = ledger.clone();
        let added = updated.append(outcome.entries.iter().cloned());
        updated.save().await?;
        *ledger = updated;
        info!(
            language = %group.language,
            part = group.part_index,
            committed = added,
            skipped = outcome.skipped.len(),
            "group committed"
        );
        Ok(outcome)
    }

    /// Resolve, plan and commit every group in priority order.
    pub async fn run(
        &self,
        mut catalog: Catalog,
        ledger: &mut TrackingLedger,
    ) -> Result<HarvestSummary> {
        self.resolve_languages(&mut catalog).await;
        let schedule = self.plan(&catalog.items, ledger);
        info!(
            groups = schedule.group_count(),
            items = schedule.item_count(),
            "harvest planned"
        );

        let mut summary = HarvestSummary::default();
        for group in schedule.groups() {
            let outcome = self.commit_group(group, ledger).await?;
            summary.absorb(&outcome);
        }
        Ok(summary)
    }
}
