//! File-change driven cache invalidation.
//!
//! The watcher records when a directory was last touched; cache lookups ask
//! whether their entry predates that touch.
//!
//! ```text
//! notify event ──► record_touched(dir) ──► touched[dir] = now
//!                                               │
//! cached(key) ──► is_stale(dir, entry) ◄────────┘
//!                 touched[dir] > entry.created_time ?
//! ```

use super::CacheMetadata;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use tokio::time::Instant;

/// Directory → last observed modification.
///
/// Entries are only ever inserted or moved forward; the map lives as long as
/// the process.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    touched: RwLock<FxHashMap<PathBuf, Instant>>,
    /// Directory trees whose watcher events are currently ignored.
    suspended: RwLock<FxHashSet<PathBuf>>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `dir` as modified now.
    pub fn record_touched(&self, dir: &Path) {
        self.touched.write().insert(dir.to_path_buf(), Instant::now());
    }

    /// Forward a watcher event for `path`.
    ///
    /// Every known directory containing `path` is touched, as is the
    /// immediate parent of `path` so that added or removed app directories
    /// invalidate the aggregate catalog. Events inside suspended trees are
    /// dropped.
    pub fn record_event(&self, path: &Path, known_dirs: &[PathBuf]) {
        if self.is_suspended(path) {
            return;
        }

        let now = Instant::now();
        let mut touched = self.touched.write();
        for dir in known_dirs.iter().filter(|dir| path.starts_with(dir)) {
            touched.insert(dir.clone(), now);
        }
        if let Some(parent) = path.parent() {
            touched.insert(parent.to_path_buf(), now);
        }
    }

    /// Whether `entry` was created before the last touch of `dir`.
    ///
    /// `None` means "no opinion": the directory was never touched, so the
    /// entry's TTL decides. A missing entry with a touched directory is
    /// always stale.
    pub fn is_stale(&self, dir: &Path, entry: Option<&CacheMetadata>) -> Option<bool> {
        let modified_at = *self.touched.read().get(dir)?;
        match entry {
            None => Some(true),
            Some(metadata) => Some(modified_at > metadata.created_time),
        }
    }

    /// Like [`is_stale`](Self::is_stale), against the newest touch of any
    /// directory.
    pub fn is_any_stale(&self, entry: Option<&CacheMetadata>) -> Option<bool> {
        let latest = self.touched.read().values().max().copied()?;
        match entry {
            None => Some(true),
            Some(metadata) => Some(latest > metadata.created_time),
        }
    }

    /// Stop honoring watcher events under `dir` until [`resume`](Self::resume).
    pub fn suspend(&self, dir: &Path) {
        self.suspended.write().insert(dir.to_path_buf());
    }

    pub fn resume(&self, dir: &Path) {
        self.suspended.write().remove(dir);
    }

    fn is_suspended(&self, path: &Path) -> bool {
        self.suspended
            .read()
            .iter()
            .any(|dir| path.starts_with(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn metadata_at(created_time: Instant) -> CacheMetadata {
        CacheMetadata {
            created_time,
            ttl: Duration::from_secs(60),
            swr: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_untouched_dir_has_no_opinion() {
        let tracker = StalenessTracker::new();
        let entry = metadata_at(Instant::now());
        assert_eq!(tracker.is_stale(Path::new("/w/a"), Some(&entry)), None);
        assert_eq!(tracker.is_stale(Path::new("/w/a"), None), None);
        assert_eq!(tracker.is_any_stale(Some(&entry)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_after_creation_is_stale() {
        let tracker = StalenessTracker::new();
        let entry = metadata_at(Instant::now());

        tokio::time::advance(Duration::from_millis(5)).await;
        tracker.record_touched(Path::new("/w/a"));

        assert_eq!(tracker.is_stale(Path::new("/w/a"), Some(&entry)), Some(true));
        assert_eq!(tracker.is_stale(Path::new("/w/b"), Some(&entry)), None);
        assert_eq!(tracker.is_any_stale(Some(&entry)), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_before_creation_is_fresh() {
        let tracker = StalenessTracker::new();
        tracker.record_touched(Path::new("/w/a"));

        tokio::time::advance(Duration::from_millis(5)).await;
        let entry = metadata_at(Instant::now());

        assert_eq!(tracker.is_stale(Path::new("/w/a"), Some(&entry)), Some(false));
        assert_eq!(tracker.is_stale(Path::new("/w/a"), None), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_event_touches_known_prefixes_and_parent() {
        let tracker = StalenessTracker::new();
        let entry = metadata_at(Instant::now());
        tokio::time::advance(Duration::from_millis(1)).await;

        let known = vec![PathBuf::from("/w/exercises/01.a"), PathBuf::from("/w/examples/b")];
        tracker.record_event(
            Path::new("/w/exercises/01.a/01.problem/src/index.js"),
            &known,
        );

        assert_eq!(tracker.is_stale(Path::new("/w/exercises/01.a"), Some(&entry)), Some(true));
        assert_eq!(
            tracker.is_stale(Path::new("/w/exercises/01.a/01.problem/src"), Some(&entry)),
            Some(true)
        );
        assert_eq!(tracker.is_stale(Path::new("/w/examples/b"), Some(&entry)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_tree_ignores_events() {
        let tracker = StalenessTracker::new();
        let known = vec![PathBuf::from("/w/playground")];

        tracker.suspend(Path::new("/w/playground"));
        tracker.record_event(Path::new("/w/playground/index.js"), &known);
        assert_eq!(tracker.is_stale(Path::new("/w/playground"), None), None);

        tracker.resume(Path::new("/w/playground"));
        tracker.record_event(Path::new("/w/playground/index.js"), &known);
        assert_eq!(tracker.is_stale(Path::new("/w/playground"), None), Some(true));
    }
}
