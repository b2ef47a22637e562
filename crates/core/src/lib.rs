//! Subharvest Core Library
//!
//! Resumable, quota-bounded harvesting of subtitle tracks into chunked CSV artifacts,
//! with a tracking ledger so interrupted runs pick up where they stopped.

pub mod artifact;
pub mod cache;
pub mod catalog;
pub mod chunker;
pub mod error;
pub mod format;
pub mod harvest;
pub mod language;
pub mod ledger;
pub mod persister;
pub mod probe;
pub mod rechunk;
pub mod scheduler;
pub mod source;
pub mod types;
pub mod video;

// Re-export commonly used items at crate root
pub use artifact::{ArtifactWriter, CsvArtifactStore, artifact_name, read_records};
pub use catalog::{Catalog, read_catalog};
pub use chunker::{backfill_durations, chunk_segments};
pub use error::{HarvestError, Result, SourceError};
pub use harvest::{HarvestConfig, HarvestSummary, Harvester, source_name_from_path};
pub use ledger::{TrackingLedger, get_tracking_path};
pub use persister::{BatchOutcome, BatchPersister, SourceErrorPolicy};
pub use probe::probe_catalog;
pub use rechunk::rechunk_file;
pub use scheduler::{Quota, QuotaScheduler, Schedule};
pub use source::{CaptionSource, TranscriptDirSource, TranscriptSource};
pub use types::{BatchGroup, Chunk, Item, LedgerEntry, OutputRecord, Segment};
pub use video::{FetchRequest, extract_video_id, fetch_video};
