use std::collections::BTreeSet;

use crate::{error::SourceError, types::Segment};

pub mod captions;
pub mod transcript_dir;

pub use captions::CaptionSource;
pub use transcript_dir::TranscriptDirSource;

/// Yields timed text for one item in one language group.
///
/// Calls are awaited one at a time by the harvester; implementations own their timeouts.
pub trait TranscriptSource {
    /// Ordered segments for `item_id` in `language`.
    ///
    /// Fails with [`SourceError::NotAvailable`] or [`SourceError::Disabled`] when there is
    /// no usable track, and [`SourceError::Failed`] for anything unexpected.
    async fn fetch(&self, item_id: &str, language: &str) -> Result<Vec<Segment>, SourceError>;

    /// Language groups the item offers, used when the catalog does not say.
    async fn available_languages(&self, item_id: &str) -> Result<BTreeSet<String>, SourceError>;
}
