use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
};

use crate::{
    error::HarvestError,
    ledger::{ProcessedSet, TrackingLedger},
    types::{BatchGroup, Item},
};

/// Per-language cap on accepted items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(usize),
    Unbounded,
}

impl Quota {
    fn admits(&self, accepted: usize) -> bool {
        match self {
            Quota::Limited(max) => accepted < *max,
            Quota::Unbounded => true,
        }
    }
}

impl Default for Quota {
    fn default() -> Self {
        Quota::Limited(40)
    }
}

impl FromStr for Quota {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("unbounded") {
            return Ok(Quota::Unbounded);
        }
        s.parse::<usize>()
            .map(Quota::Limited)
            .map_err(|_| HarvestError::Config {
                reason: format!("max per language must be a number or \"all\", got {s:?}"),
            })
    }
}

/// Accepted-item counters, one per language, owned by a single scheduling pass.
#[derive(Debug, Default, Clone)]
pub struct QuotaState {
    accepted: HashMap<String, usize>,
}

impl QuotaState {
    pub fn accepted(&self, language: &str) -> usize {
        self.accepted.get(language).copied().unwrap_or(0)
    }

    fn record(&mut self, language: &str) {
        *self.accepted.entry(language.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSchedule {
    pub language: String,
    pub groups: Vec<BatchGroup>,
}

impl LanguageSchedule {
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(BatchGroup::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub languages: Vec<LanguageSchedule>,
    pub quota: QuotaState,
}

impl Schedule {
    /// All groups, languages in priority order and parts ascending within each language.
    pub fn groups(&self) -> impl Iterator<Item = &BatchGroup> {
        self.languages.iter().flat_map(|lang| lang.groups.iter())
    }

    pub fn group_count(&self) -> usize {
        self.languages.iter().map(|lang| lang.groups.len()).sum()
    }

    pub fn item_count(&self) -> usize {
        self.languages.iter().map(LanguageSchedule::item_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}

struct GroupBuilder {
    language: String,
    group_size: usize,
    next_part: u32,
    pending: Vec<Item>,
    sealed: Vec<BatchGroup>,
}

impl GroupBuilder {
    fn new(language: &str, group_size: usize, first_part: u32) -> Self {
        Self {
            language: language.to_string(),
            group_size,
            next_part: first_part,
            pending: Vec::with_capacity(group_size),
            sealed: Vec::new(),
        }
    }

    fn push(&mut self, item: Item) {
        self.pending.push(item);
        if self.pending.len() == self.group_size {
            self.seal();
        }
    }

    fn seal(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let items = std::mem::replace(&mut self.pending, Vec::with_capacity(self.group_size));
        self.sealed.push(BatchGroup {
            language: self.language.clone(),
            part_index: self.next_part,
            items,
        });
        self.next_part += 1;
    }

    fn finish(mut self) -> LanguageSchedule {
        self.seal();
        LanguageSchedule {
            language: self.language,
            groups: self.sealed,
        }
    }
}

/// Splits a catalog into per-language batch groups under a quota.
#[derive(Debug, Clone)]
pub struct QuotaScheduler {
    languages: Vec<String>,
    max_per_language: Quota,
    group_size: usize,
}

impl QuotaScheduler {
    pub fn new(
        languages: Vec<String>,
        max_per_language: Quota,
        group_size: usize,
    ) -> crate::Result<Self> {
        if group_size == 0 {
            return Err(HarvestError::Config {
                reason: "group size must be greater than zero".to_string(),
            });
        }
        // a repeated group would be scanned twice and reuse the same part numbers
        let mut seen = HashSet::new();
        let languages = languages
            .into_iter()
            .filter(|language| seen.insert(language.clone()))
            .collect();
        Ok(Self {
            languages,
            max_per_language,
            group_size,
        })
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Schedule a fresh run: every language starts at part 1.
    pub fn schedule(&self, catalog: &[Item], processed: &ProcessedSet) -> Schedule {
        self.schedule_with_parts(catalog, processed, |_| 1)
    }

    /// Schedule against a ledger, continuing part numbering after the parts it already records.
    pub fn schedule_resuming(
        &self,
        catalog: &[Item],
        ledger: &TrackingLedger,
        source_name: &str,
    ) -> Schedule {
        self.schedule_with_parts(catalog, ledger.processed(), |language| {
            ledger.next_part_index(source_name, language)
        })
    }

    pub fn schedule_with_parts(
        &self,
        catalog: &[Item],
        processed: &ProcessedSet,
        first_part: impl Fn(&str) -> u32,
    ) -> Schedule {
        let mut quota = QuotaState::default();
        let languages = self
            .languages
            .iter()
            .map(|language| {
                self.scan_language(catalog, language, processed, first_part(language), &mut quota)
            })
            .collect();
        Schedule { languages, quota }
    }

    fn scan_language(
        &self,
        catalog: &[Item],
        language: &str,
        processed: &ProcessedSet,
        first_part: u32,
        quota: &mut QuotaState,
    ) -> LanguageSchedule {
        let mut builder = GroupBuilder::new(language, self.group_size, first_part);
        for item in catalog {
            if !self.max_per_language.admits(quota.accepted(language)) {
                break;
            }
            if !item.advertises(language) {
                continue;
            }
            if processed.contains(&(item.id.clone(), language.to_string())) {
                continue;
            }
            quota.record(language);
            builder.push(item.clone());
        }
        builder.finish()
    }
}
