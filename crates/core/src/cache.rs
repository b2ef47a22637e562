use std::path::{Path, PathBuf};

pub const CAPTION_FORMAT: &str = "json3";

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("subharvest")
}

/// Get the directory holding downloaded caption tracks for one item
pub fn get_caption_dir(cache_root: &Path, item_id: &str) -> PathBuf {
    cache_root.join("captions").join(item_id)
}

/// Get the path yt-dlp writes a caption track to
pub fn get_track_path(caption_dir: &Path, item_id: &str, track_code: &str) -> PathBuf {
    caption_dir.join(format!("{item_id}.{track_code}.{CAPTION_FORMAT}"))
}

/// Find the most preferred caption track already present in the cache directory
pub fn find_track_in_cache(
    caption_dir: &Path,
    item_id: &str,
    track_codes: &[String],
) -> Option<PathBuf> {
    track_codes
        .iter()
        .map(|code| get_track_path(caption_dir, item_id, code))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_preferred_track() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(get_track_path(dir.path(), "abc", "zh-TW"), "{}").unwrap();
        std::fs::write(get_track_path(dir.path(), "abc", "zh-Hans"), "{}").unwrap();

        let codes = vec!["zh".to_string(), "zh-Hans".to_string(), "zh-TW".to_string()];
        let found = find_track_in_cache(dir.path(), "abc", &codes).unwrap();

        assert!(found.ends_with("abc.zh-Hans.json3"));
    }

    #[test]
    fn empty_cache_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let codes = vec!["en".to_string()];
        assert!(find_track_in_cache(dir.path(), "abc", &codes).is_none());
    }
}
