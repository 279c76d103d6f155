//! StalenessTracker - generation を捨てるべきかの判定
//!
//! # フロー
//! 1. 解決に使ったパスと、そのとき観測した mtime を append-only で記録
//! 2. `check_modified()` で全パスを re-stat（不一致・消失で即 stale）
//! 3. archive-root ディレクトリを再列挙して、記録済みのメンバー一覧と比較
//!
//! # 設計原則
//! - false negative を出さない: 走査中の I/O エラーは stale 扱い
//! - 実際の走査は `interval` に 1 回まで。それより頻繁な呼び出しには前回の結果を返す
//! - 一度 stale と判定したら、その generation の間は stale のまま
//! - 判定は助言のみ。generation を捨てるのは呼び出し側（owner）

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::LoaderConfig;
use crate::domain::{ArchiveRoot, TrackedPath};
use crate::ports::{Clock, MetadataProvider};

#[derive(Debug, Default)]
struct TrackedList {
    paths: Vec<TrackedPath>,
    seen: HashSet<PathBuf>,
}

#[derive(Debug, Default)]
struct CheckState {
    last_check: Option<DateTime<Utc>>,
    stale: bool,
}

pub struct StalenessTracker {
    tracked: Mutex<TrackedList>,
    roots: Mutex<Vec<ArchiveRoot>>,
    check: Mutex<CheckState>,
    interval: Duration,
    config: Arc<LoaderConfig>,
    metadata: Arc<dyn MetadataProvider>,
    clock: Arc<dyn Clock>,
}

impl StalenessTracker {
    pub fn new(
        config: Arc<LoaderConfig>,
        metadata: Arc<dyn MetadataProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracked: Mutex::new(TrackedList::default()),
            roots: Mutex::new(Vec::new()),
            check: Mutex::new(CheckState::default()),
            interval: config.staleness_interval(),
            config,
            metadata,
            clock,
        }
    }

    /// Record a backing path. The first observation of a path wins.
    pub fn track(&self, path: &Path, last_modified: DateTime<Utc>) {
        let mut tracked = self.tracked.lock();
        if tracked.seen.insert(path.to_path_buf()) {
            tracked.paths.push(TrackedPath {
                path: path.to_path_buf(),
                last_modified,
            });
        }
    }

    pub fn watch_archive_root(&self, root: ArchiveRoot) {
        let mut roots = self.roots.lock();
        if !roots.iter().any(|r| r.path == root.path) {
            roots.push(root);
        }
    }

    /// `true` when the generation should be discarded.
    pub fn check_modified(&self) -> bool {
        let mut check = self.check.lock();
        if check.stale {
            return true;
        }
        let now = self.clock.now();
        if let Some(last) = check.last_check {
            let interval = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::MAX);
            if now.signed_duration_since(last) < interval {
                return false;
            }
        }

        check.last_check = Some(now);
        check.stale = self.tracked_paths_changed() || self.archive_roots_changed();
        if check.stale {
            tracing::info!("loader generation is stale");
        }
        check.stale
    }

    /// Last computed result without touching the filesystem.
    pub fn last_result(&self) -> bool {
        self.check.lock().stale
    }

    pub fn tracked_paths(&self) -> Vec<TrackedPath> {
        self.tracked.lock().paths.clone()
    }

    pub fn archive_roots(&self) -> Vec<ArchiveRoot> {
        self.roots.lock().clone()
    }

    /// Discard everything; used when a generation stops.
    pub fn reset(&self) {
        *self.tracked.lock() = TrackedList::default();
        self.roots.lock().clear();
        *self.check.lock() = CheckState::default();
    }

    fn tracked_paths_changed(&self) -> bool {
        let paths = self.tracked.lock().paths.clone();
        for tracked in &paths {
            match self.metadata.stat(&tracked.path) {
                Ok(stat) if stat.last_modified == tracked.last_modified => {}
                Ok(stat) => {
                    tracing::debug!(
                        path = %tracked.path.display(),
                        was = %tracked.last_modified,
                        now = %stat.last_modified,
                        "tracked path modified"
                    );
                    return true;
                }
                Err(err) => {
                    tracing::debug!(path = %tracked.path.display(), error = %err, "tracked path unreadable");
                    return true;
                }
            }
        }
        false
    }

    fn archive_roots_changed(&self) -> bool {
        let roots = self.roots.lock().clone();
        for root in &roots {
            match list_archives(self.metadata.as_ref(), &self.config, &root.path) {
                Ok(members) if members == root.members => {}
                Ok(members) => {
                    tracing::debug!(
                        root = %root.path.display(),
                        was = root.members.len(),
                        now = members.len(),
                        "archive root membership changed"
                    );
                    return true;
                }
                Err(err) => {
                    tracing::debug!(root = %root.path.display(), error = %err, "archive root unreadable");
                    return true;
                }
            }
        }
        false
    }
}

/// Sorted archive file names directly inside `dir`.
pub(crate) fn list_archives(
    metadata: &dyn MetadataProvider,
    config: &LoaderConfig,
    dir: &Path,
) -> io::Result<Vec<String>> {
    let mut names: Vec<String> = metadata
        .list_entries(dir)?
        .into_iter()
        .filter(|name| config.is_archive_file(Path::new(name)))
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::NativeMetadata;
    use crate::ports::FixedClock;
    use crate::test_support::set_mtime;
    use std::fs;

    fn tracker(clock: Arc<FixedClock>) -> StalenessTracker {
        StalenessTracker::new(Arc::new(LoaderConfig::default()), Arc::new(NativeMetadata), clock)
    }

    fn tracked_file(dir: &Path, t: &StalenessTracker) -> PathBuf {
        let path = dir.join("a.txt");
        fs::write(&path, b"a").unwrap();
        set_mtime(&path, 1_700_000_000);
        let stat = NativeMetadata.stat(&path).unwrap();
        t.track(&path, stat.last_modified);
        path
    }

    #[test]
    fn unchanged_paths_are_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(Arc::new(FixedClock::new(Utc::now())));
        tracked_file(dir.path(), &t);
        assert!(!t.check_modified());
    }

    #[test]
    fn mtime_change_is_detected_after_the_interval() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let t = tracker(Arc::clone(&clock));
        let path = tracked_file(dir.path(), &t);
        assert!(!t.check_modified());

        set_mtime(&path, 1_700_000_100);
        // still inside the rate-limit window: cached answer
        assert!(!t.check_modified());

        clock.advance(Duration::from_millis(1001));
        assert!(t.check_modified());
    }

    #[test]
    fn stale_result_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(Arc::new(FixedClock::new(Utc::now())));
        let path = tracked_file(dir.path(), &t);
        set_mtime(&path, 1_700_000_100);
        assert!(t.check_modified());

        set_mtime(&path, 1_700_000_000);
        assert!(t.check_modified());
        assert!(t.last_result());
    }

    #[test]
    fn missing_path_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(Arc::new(FixedClock::new(Utc::now())));
        let path = tracked_file(dir.path(), &t);
        fs::remove_file(&path).unwrap();
        assert!(t.check_modified());
    }

    #[test]
    fn first_observation_of_a_path_wins() {
        let t = tracker(Arc::new(FixedClock::new(Utc::now())));
        let early = Utc::now();
        t.track(Path::new("/x"), early);
        t.track(Path::new("/x"), early + chrono::Duration::seconds(5));
        assert_eq!(t.tracked_paths().len(), 1);
        assert_eq!(t.tracked_paths()[0].last_modified, early);
    }

    #[test]
    fn archive_root_membership_drift_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.zip"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let t = tracker(Arc::clone(&clock));

        let members = list_archives(&NativeMetadata, &LoaderConfig::default(), dir.path()).unwrap();
        assert_eq!(members, vec!["a.zip"]);
        t.watch_archive_root(ArchiveRoot {
            path: dir.path().to_path_buf(),
            members,
        });
        assert!(!t.check_modified());

        // non-archive files do not count
        fs::write(dir.path().join("more.txt"), b"").unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(!t.check_modified());

        fs::write(dir.path().join("b.zip"), b"").unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(t.check_modified());
    }

    fn watched_root(t: &StalenessTracker, dir: &Path) {
        let members = list_archives(&NativeMetadata, &LoaderConfig::default(), dir).unwrap();
        t.watch_archive_root(ArchiveRoot {
            path: dir.to_path_buf(),
            members,
        });
    }

    #[test]
    fn removed_archive_in_root_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.zip"), b"").unwrap();
        fs::write(dir.path().join("b.zip"), b"").unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let t = tracker(Arc::clone(&clock));
        watched_root(&t, dir.path());
        assert!(!t.check_modified());

        fs::remove_file(dir.path().join("b.zip")).unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(t.check_modified());
    }

    #[test]
    fn vanished_archive_root_is_stale() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("lib");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.zip"), b"").unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let t = tracker(Arc::clone(&clock));
        watched_root(&t, &root);
        assert!(!t.check_modified());

        fs::remove_dir_all(&root).unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(t.check_modified());
    }

    #[test]
    fn reset_forgets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(Arc::new(FixedClock::new(Utc::now())));
        let path = tracked_file(dir.path(), &t);
        fs::remove_file(&path).unwrap();
        assert!(t.check_modified());

        t.reset();
        assert!(t.tracked_paths().is_empty());
        assert!(!t.check_modified());
    }
}
