//! Cache reconciliation.
//!
//! After an update, everything under the cache directory is transient and
//! gets removed, except a fixed allow-list of entries that are expensive to
//! regenerate: previously fetched launch data and the generated track map
//! imagery. The list matches exact top-level names on purpose; a loose
//! pattern would silently preserve stale ephemeral data. The one exception
//! is per-circuit track imagery, whose file names vary with the season and
//! are matched by their fixed `_track.png` suffix.

use std::path::Path;

use crate::error::UpdateError;

/// Top-level cache entries preserved across updates.
pub const DURABLE_ENTRIES: &[&str] = &[
    "previous_launches_cache.json",
    "upcoming_launches_cache.json",
    "trajectory_cache.json",
    "tracks",
];

/// Generated track imagery is written as top-level `<circuit>_track.png`
/// files. The circuit set changes from season to season, so these are
/// matched by their fixed suffix instead of an exact-name table.
pub const TRACK_IMAGE_SUFFIX: &str = "_track.png";

/// Whether an entry survives reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionClass {
    /// Removed on every update.
    Ephemeral,
    /// Preserved; on the fixed allow-list.
    Durable,
}

/// A classified top-level cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Name relative to the cache directory.
    pub relative_path: String,
    /// Its retention class.
    pub retention: RetentionClass,
}

/// Classify a top-level cache entry name.
pub fn classify(name: &str) -> RetentionClass {
    if DURABLE_ENTRIES.contains(&name) || name.ends_with(TRACK_IMAGE_SUFFIX) {
        RetentionClass::Durable
    } else {
        RetentionClass::Ephemeral
    }
}

/// Remove every ephemeral top-level entry, preserve every durable one.
///
/// A missing cache directory is already reconciled, not an error. Returns
/// the entries acted on, classified, for the progress log.
///
/// # Errors
///
/// Returns [`UpdateError::Io`] when listing or removal fails.
pub fn reconcile(cache_dir: &Path) -> Result<Vec<CacheEntry>, UpdateError> {
    if !cache_dir.exists() {
        tracing::debug!(dir = %cache_dir.display(), "no cache directory, nothing to reconcile");
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let listing =
        std::fs::read_dir(cache_dir).map_err(|e| UpdateError::io(cache_dir, e))?;

    for dirent in listing {
        let dirent = dirent.map_err(|e| UpdateError::io(cache_dir, e))?;
        let name = dirent.file_name().to_string_lossy().into_owned();
        let retention = classify(&name);

        if retention == RetentionClass::Ephemeral {
            let path = dirent.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(|e| UpdateError::io(&path, e))?;
            tracing::debug!(entry = %name, "removed ephemeral cache entry");
        }

        entries.push(CacheEntry {
            relative_path: name,
            retention,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_already_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        let entries = reconcile(&dir.path().join("no-such-cache")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn durable_entries_survive_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let durable = dir.path().join("trajectory_cache.json");
        std::fs::write(&durable, b"{\"orbits\": 3}").unwrap();

        reconcile(dir.path()).unwrap();

        assert_eq!(std::fs::read(&durable).unwrap(), b"{\"orbits\": 3}");
    }

    #[test]
    fn ephemeral_entries_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("durable.json"), b"x").unwrap();
        std::fs::write(dir.path().join("tmp_state.json"), b"y").unwrap();
        std::fs::write(dir.path().join("trajectory_cache.json"), b"z").unwrap();

        reconcile(dir.path()).unwrap();

        // "durable.json" is not on the allow-list; only exact names count.
        assert!(!dir.path().join("durable.json").exists());
        assert!(!dir.path().join("tmp_state.json").exists());
        assert!(dir.path().join("trajectory_cache.json").exists());
    }

    #[test]
    fn ephemeral_directories_are_removed_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("session_scratch");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("a.bin"), b"a").unwrap();

        let tracks = dir.path().join("tracks");
        std::fs::create_dir(&tracks).unwrap();
        std::fs::write(tracks.join("monza_track.png"), b"png").unwrap();

        reconcile(dir.path()).unwrap();

        assert!(!sub.exists());
        assert!(tracks.join("monza_track.png").exists());
    }

    #[test]
    fn generated_track_imagery_survives() {
        let dir = tempfile::tempdir().unwrap();
        // The app writes per-circuit imagery both as top-level files and
        // under tracks/; both layouts must survive reconciliation.
        std::fs::write(dir.path().join("monza_track.png"), b"png").unwrap();
        let tracks = dir.path().join("tracks");
        std::fs::create_dir(&tracks).unwrap();
        std::fs::write(tracks.join("spa_track.png"), b"png").unwrap();
        std::fs::write(dir.path().join("monza_weather.json"), b"x").unwrap();

        reconcile(dir.path()).unwrap();

        assert!(dir.path().join("monza_track.png").exists());
        assert!(tracks.join("spa_track.png").exists());
        assert!(!dir.path().join("monza_weather.json").exists());
    }

    #[test]
    fn nested_names_do_not_shadow_the_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("old");
        std::fs::create_dir(&sub).unwrap();
        // Same name as a durable entry, but one level down: still removed
        // with its parent.
        std::fs::write(sub.join("trajectory_cache.json"), b"stale").unwrap();

        reconcile(dir.path()).unwrap();
        assert!(!sub.exists());
    }

    #[test]
    fn classify_matches_exact_names_or_imagery_suffix() {
        assert_eq!(classify("tracks"), RetentionClass::Durable);
        assert_eq!(classify("tracks_old"), RetentionClass::Ephemeral);
        assert_eq!(classify("las_vegas_track.png"), RetentionClass::Durable);
        assert_eq!(classify("track.png"), RetentionClass::Ephemeral);
        assert_eq!(classify("weather_cache.json"), RetentionClass::Ephemeral);
    }
}
