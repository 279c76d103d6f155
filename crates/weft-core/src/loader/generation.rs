//! Loader - 1 つの generation
//!
//! RepositorySet / ArchiveHandlePool / ArtifactCache / Resolver / StalenessTracker を所有し、
//! ライフサイクル（Created → Started → Stopped）と外部向けの操作を提供します。
//!
//! # teardown
//! lookup はライフサイクルの read guard を保持したまま走ります。
//! `stop()` は write guard を取るので、進行中の lookup がすべて終わるのを待ってから
//! キャッシュを捨て、handle を閉じます。以降の lookup は `LoaderStopped` になります。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::LoaderConfig;
use crate::domain::{
    ArchiveRoot, ArtifactEntry, ArtifactKind, GenerationId, LoaderError, RepositoryKind,
    RepositoryRef,
};
use crate::impls::{NativeMetadata, NoFallback};
use crate::ports::{
    ActivationSink, Clock, FallbackResolver, IdGenerator, MetadataProvider, SystemClock,
    UlidGenerator,
};

use super::archive_pool::ArchiveHandlePool;
use super::cache::ArtifactCache;
use super::repository_set::{Registration, RepositorySet};
use super::resolver::Resolver;
use super::staleness::{StalenessTracker, list_archives};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Created,
    Started,
    Stopped,
}

/// Everything a generation consumes from outside.
pub struct Collaborators {
    pub sink: Arc<dyn ActivationSink>,
    pub fallback: Arc<dyn FallbackResolver>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl Collaborators {
    /// Defaults: no fallback, std::fs metadata, system clock.
    ///
    /// `ids` reads the system clock too; replacing `clock` afterwards does not
    /// change it (`LoaderBuilder` keeps the two in step).
    pub fn new(sink: Arc<dyn ActivationSink>) -> Self {
        Self {
            sink,
            fallback: Arc::new(NoFallback),
            metadata: Arc::new(NativeMetadata),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }
}

pub struct Loader {
    id: GenerationId,
    config: Arc<LoaderConfig>,
    lifecycle: RwLock<Lifecycle>,
    resolver: Resolver,
    sink: Arc<dyn ActivationSink>,
    scratch_dir: Option<PathBuf>,
}

impl Loader {
    pub fn new(config: LoaderConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            sink,
            fallback,
            metadata,
            clock,
            ids,
        } = collaborators;
        let id = ids.generate_generation_id();
        let scratch_dir = config.scratch_dir.as_ref().map(|dir| dir.join(id.to_string()));
        let config = Arc::new(config);

        let resolver = Resolver {
            repositories: Arc::new(RepositorySet::new()),
            archives: Arc::new(ArchiveHandlePool::new(Arc::clone(&clock), scratch_dir.clone())),
            cache: Arc::new(ArtifactCache::new()),
            tracker: Arc::new(StalenessTracker::new(
                Arc::clone(&config),
                Arc::clone(&metadata),
                Arc::clone(&clock),
            )),
            fallback,
            metadata,
            clock,
            config: Arc::clone(&config),
        };

        Self {
            id,
            config,
            lifecycle: RwLock::new(Lifecycle::Created),
            resolver,
            sink,
            scratch_dir,
        }
    }

    pub fn generation_id(&self) -> GenerationId {
        self.id
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    /// Register a repository at the lowest priority.
    ///
    /// Appending never changes which repository wins for a name that already
    /// resolved, so only negative cache entries are dropped.
    pub fn add_repository(
        &self,
        name: &str,
        kind: RepositoryKind,
        path: impl Into<PathBuf>,
    ) -> Result<RepositoryRef, LoaderError> {
        let _guard = self.usable_for_registration()?;
        let path = path.into();
        let repo = self
            .resolver
            .repositories
            .add(name, kind, &path, Registration::External, &self.config)?
            .ok_or_else(|| LoaderError::invalid_repository(name, &path, "already registered"))?;
        self.resolver.cache.clear_negative();
        tracing::info!(
            generation = %self.id,
            repository = %repo.name,
            kind = %repo.kind,
            order = repo.order,
            "repository added"
        );
        Ok(repo)
    }

    /// Register every archive directly inside `dir` (sorted by file name) and
    /// watch the directory's membership for staleness.
    pub fn add_archive_root(&self, dir: impl AsRef<Path>) -> Result<Vec<RepositoryRef>, LoaderError> {
        let _guard = self.usable_for_registration()?;
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LoaderError::invalid_repository(
                dir.display().to_string(),
                dir,
                "archive root is not a directory",
            ));
        }
        let members = list_archives(self.resolver.metadata.as_ref(), &self.config, dir).map_err(|e| {
            LoaderError::invalid_repository(dir.display().to_string(), dir, e.to_string())
        })?;
        let prefix = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archives")
            .to_string();

        let mut added = Vec::new();
        for member in &members {
            let name = format!("{prefix}/{member}");
            if let Some(repo) = self.resolver.repositories.add(
                &name,
                RepositoryKind::Archive,
                dir.join(member),
                Registration::Internal,
                &self.config,
            )? {
                added.push(repo);
            }
        }
        self.resolver.tracker.watch_archive_root(ArchiveRoot {
            path: dir.to_path_buf(),
            members,
        });
        self.resolver.cache.clear_negative();
        tracing::info!(
            generation = %self.id,
            root = %dir.display(),
            archives = added.len(),
            "archive root added"
        );
        Ok(added)
    }

    /// Resolve `name`; code artifacts are activated before they are returned.
    pub fn lookup(&self, name: &str) -> Result<Arc<ArtifactEntry>, LoaderError> {
        let guard = self.lifecycle.read();
        match *guard {
            Lifecycle::Created => return Err(LoaderError::NotStarted),
            Lifecycle::Stopped => return Err(LoaderError::LoaderStopped),
            Lifecycle::Started => {}
        }

        let entry = self.resolver.lookup(name)?;
        if entry.kind() == ArtifactKind::Code {
            self.resolver.cache.activate(&entry, self.sink.as_ref())?;
        }
        drop(guard);
        Ok(entry)
    }

    pub fn list_repositories(&self) -> Vec<RepositoryRef> {
        self.resolver.repositories.list()
    }

    pub fn repository_urls(&self) -> Arc<[String]> {
        self.resolver.repositories.repository_urls()
    }

    /// Advisory: `true` means the owner should discard this generation.
    pub fn check_modified(&self) -> bool {
        self.resolver.tracker.check_modified()
    }

    /// Close idle archive handles (all of them if `force`).
    pub fn close_idle_archives(&self, force: bool) -> usize {
        self.resolver
            .archives
            .close_idle(force, self.config.idle_timeout())
    }

    pub fn start(&self) -> Result<(), LoaderError> {
        let mut lifecycle = self.lifecycle.write();
        match *lifecycle {
            Lifecycle::Created => {
                *lifecycle = Lifecycle::Started;
                tracing::info!(
                    generation = %self.id,
                    repositories = self.resolver.repositories.len(),
                    "loader started"
                );
                Ok(())
            }
            Lifecycle::Started => Err(LoaderError::AlreadyStarted),
            Lifecycle::Stopped => Err(LoaderError::LoaderStopped),
        }
    }

    /// Quiesce, then release every entry and handle. A second call fails.
    pub fn stop(&self) -> Result<(), LoaderError> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == Lifecycle::Stopped {
            return Err(LoaderError::LoaderStopped);
        }
        *lifecycle = Lifecycle::Stopped;

        self.resolver.cache.clear();
        let closed = self.resolver.archives.close_all();
        self.resolver.tracker.reset();
        if let Some(dir) = &self.scratch_dir
            && dir.exists()
            && let Err(err) = std::fs::remove_dir_all(dir)
        {
            tracing::warn!(path = %dir.display(), error = %err, "scratch directory not removed");
        }
        tracing::info!(generation = %self.id, closed_handles = closed, "loader stopped");
        Ok(())
    }

    pub(crate) fn cache(&self) -> &ArtifactCache {
        &self.resolver.cache
    }

    pub(crate) fn tracker(&self) -> &StalenessTracker {
        &self.resolver.tracker
    }

    pub(crate) fn archives(&self) -> &ArchiveHandlePool {
        &self.resolver.archives
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.resolver.clock.as_ref()
    }

    fn usable_for_registration(&self) -> Result<parking_lot::RwLockReadGuard<'_, Lifecycle>, LoaderError> {
        let guard = self.lifecycle.read();
        if *guard == Lifecycle::Stopped {
            return Err(LoaderError::LoaderStopped);
        }
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{RecordingActivationSink, StaticFallback};
    use crate::ports::FixedClock;
    use crate::test_support::{set_mtime, write_file, write_zip};
    use chrono::Utc;
    use std::fs;
    use std::sync::Barrier;
    use std::time::Duration;

    struct Fixture {
        loader: Loader,
        sink: Arc<RecordingActivationSink>,
        clock: Arc<FixedClock>,
    }

    fn fixture_with(config: LoaderConfig, sink: RecordingActivationSink) -> Fixture {
        let sink = Arc::new(sink);
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let mut collaborators = Collaborators::new(sink.clone());
        collaborators.clock = clock.clone();
        Fixture {
            loader: Loader::new(config, collaborators),
            sink,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(LoaderConfig::default(), RecordingActivationSink::new())
    }

    #[test]
    fn lookup_requires_start_and_fails_after_stop() {
        let f = fixture();
        assert!(matches!(f.loader.lookup("a.txt"), Err(LoaderError::NotStarted)));

        f.loader.start().unwrap();
        assert!(matches!(f.loader.start(), Err(LoaderError::AlreadyStarted)));

        f.loader.stop().unwrap();
        assert!(matches!(f.loader.lookup("a.txt"), Err(LoaderError::LoaderStopped)));
        assert!(matches!(f.loader.stop(), Err(LoaderError::LoaderStopped)));
        assert!(matches!(f.loader.start(), Err(LoaderError::LoaderStopped)));
    }

    #[test]
    fn concurrent_first_access_activates_exactly_once() {
        const CALLERS: usize = 50;
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "com/acme/Hot.unit", b"code");
        let f = fixture_with(
            LoaderConfig::default(),
            RecordingActivationSink::new().with_delay(Duration::from_millis(5)),
        );
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        f.loader.start().unwrap();
        let barrier = Barrier::new(CALLERS);

        let units: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let entry = f.loader.lookup("com/acme/Hot.unit").unwrap();
                        entry.activated_unit().unwrap().id()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(units.iter().all(|id| *id == units[0]));
        assert_eq!(f.sink.activation_count(), 1);
        assert_eq!(f.sink.unit_for("com/acme/Hot.unit"), Some(units[0]));
    }

    #[test]
    fn earlier_repository_wins_regardless_of_call_order() {
        let root = tempfile::tempdir().unwrap();
        let r1 = root.path().join("r1");
        let r2 = root.path().join("r2");
        write_file(&r1, "X", b"a");
        write_file(&r2, "X", b"b");
        write_file(&r2, "Y", b"only-in-r2");
        let f = fixture();
        f.loader.add_repository("r1", RepositoryKind::Directory, &r1).unwrap();
        f.loader.add_repository("r2", RepositoryKind::Directory, &r2).unwrap();
        f.loader.start().unwrap();

        assert_eq!(f.loader.lookup("Y").unwrap().payload().as_deref(), Some(&b"only-in-r2"[..]));
        assert_eq!(f.loader.lookup("X").unwrap().payload().as_deref(), Some(&b"a"[..]));
    }

    #[test]
    fn touched_file_makes_the_generation_stale() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "X", b"a");
        set_mtime(&file, 1_700_000_000);
        let f = fixture();
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        f.loader.start().unwrap();

        f.loader.lookup("X").unwrap();
        assert!(!f.loader.check_modified());

        set_mtime(&file, 1_700_000_042);
        f.clock.advance(Duration::from_millis(1100));
        assert!(f.loader.check_modified());
    }

    #[test]
    fn untouched_generation_stays_fresh() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "X", b"a");
        let f = fixture();
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        f.loader.start().unwrap();
        f.loader.lookup("X").unwrap();

        for _ in 0..3 {
            f.clock.advance(Duration::from_secs(2));
            assert!(!f.loader.check_modified());
        }
    }

    #[test]
    fn new_archive_in_archive_root_makes_the_generation_stale() {
        let root = tempfile::tempdir().unwrap();
        let libs = root.path().join("lib");
        fs::create_dir(&libs).unwrap();
        write_zip(&libs.join("a.zip"), &[("a.txt", b"a")]);
        let f = fixture();
        let added = f.loader.add_archive_root(&libs).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].name, "lib/a.zip");
        f.loader.start().unwrap();
        f.loader.lookup("a.txt").unwrap();
        assert!(!f.loader.check_modified());

        write_zip(&libs.join("b.zip"), &[("b.txt", b"b")]);
        f.clock.advance(Duration::from_secs(2));
        assert!(f.loader.check_modified());
    }

    #[test]
    fn idle_closed_archive_reopens_transparently() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("lib.zip");
        write_zip(&zip, &[("a.txt", b"alpha"), ("b.txt", b"beta")]);
        let config = LoaderConfig {
            idle_timeout_secs: 5,
            ..LoaderConfig::default()
        };
        let f = fixture_with(config, RecordingActivationSink::new());
        f.loader.add_repository("lib", RepositoryKind::Archive, &zip).unwrap();
        f.loader.start().unwrap();

        f.loader.lookup("a.txt").unwrap();
        assert_eq!(f.loader.archives().open_handles(), 1);

        f.clock.advance(Duration::from_secs(6));
        assert_eq!(f.loader.close_idle_archives(false), 1);
        assert_eq!(f.loader.archives().open_handles(), 0);

        assert_eq!(f.loader.lookup("b.txt").unwrap().payload().as_deref(), Some(&b"beta"[..]));
        assert_eq!(f.loader.archives().open_handles(), 1);
    }

    #[test]
    fn adding_a_repository_clears_negative_entries() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("first");
        let later = root.path().join("later");
        fs::create_dir(&first).unwrap();
        write_file(&later, "missing", b"found it");
        let f = fixture();
        f.loader.add_repository("first", RepositoryKind::Directory, &first).unwrap();
        f.loader.start().unwrap();

        assert!(matches!(f.loader.lookup("missing"), Err(LoaderError::NotFound(_))));
        assert_eq!(f.loader.cache().negative_len(), 1);

        f.loader.add_repository("later", RepositoryKind::Directory, &later).unwrap();
        let entry = f.loader.lookup("missing").unwrap();
        assert_eq!(entry.payload().as_deref(), Some(&b"found it"[..]));
    }

    #[test]
    fn code_payload_is_dropped_but_resources_stay_servable() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "com/acme/Widget.unit", b"code");
        write_file(dir.path(), "static/logo.txt", b"logo");
        let f = fixture();
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        f.loader.start().unwrap();

        let code = f.loader.lookup("com/acme/Widget.unit").unwrap();
        assert!(code.payload().is_none());
        assert!(code.activated_unit().is_some());

        for _ in 0..2 {
            let resource = f.loader.lookup("static/logo.txt").unwrap();
            assert_eq!(resource.payload().as_deref(), Some(&b"logo"[..]));
            assert!(resource.activated_unit().is_none());
        }
        assert_eq!(f.sink.activation_count(), 1);
    }

    #[test]
    fn rejected_activation_surfaces_to_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "Evil.unit", b"code");
        let f = fixture_with(
            LoaderConfig::default(),
            RecordingActivationSink::new().with_trusted_digests(["0000"]),
        );
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        f.loader.start().unwrap();

        let err = f.loader.lookup("Evil.unit").unwrap_err();
        assert!(matches!(err, LoaderError::ActivationRejected { .. }));
    }

    #[test]
    fn external_duplicate_repository_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture();
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        let err = f
            .loader
            .add_repository("app", RepositoryKind::Directory, dir.path())
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidRepository { .. }));
        assert_eq!(f.loader.list_repositories().len(), 1);
    }

    #[test]
    fn archive_root_registration_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        write_zip(&root.path().join("a.zip"), &[("a.txt", b"a")]);
        let f = fixture();
        assert_eq!(f.loader.add_archive_root(root.path()).unwrap().len(), 1);
        assert!(f.loader.add_archive_root(root.path()).unwrap().is_empty());
        assert_eq!(f.loader.list_repositories().len(), 1);
    }

    #[test]
    fn fallback_serves_names_no_repository_has() {
        let sink = Arc::new(RecordingActivationSink::new());
        let mut collaborators = Collaborators::new(sink);
        collaborators.fallback = Arc::new(StaticFallback::new().with_entry("shared.txt", "parent"));
        let loader = Loader::new(LoaderConfig::default(), collaborators);
        loader.start().unwrap();

        let entry = loader.lookup("shared.txt").unwrap();
        assert_eq!(entry.origin_repository(), "fallback");
    }

    #[test]
    fn stop_releases_everything_and_removes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let zip = dir.path().join("lib.zip");
        write_zip(&zip, &[("a.txt", b"alpha")]);
        let config = LoaderConfig {
            scratch_dir: Some(scratch.clone()),
            ..LoaderConfig::default()
        };
        let f = fixture_with(config, RecordingActivationSink::new());
        f.loader.add_repository("lib", RepositoryKind::Archive, &zip).unwrap();
        f.loader.start().unwrap();
        f.loader.lookup("a.txt").unwrap();
        let generation_dir = scratch.join(f.loader.generation_id().to_string());
        assert!(generation_dir.is_dir());

        f.loader.stop().unwrap();
        assert!(f.loader.cache().is_empty());
        assert_eq!(f.loader.archives().open_handles(), 0);
        assert!(f.loader.tracker().tracked_paths().is_empty());
        assert!(!generation_dir.exists());
    }

    #[test]
    fn stop_waits_for_in_flight_lookups() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "Slow.unit", b"code");
        let f = fixture_with(
            LoaderConfig::default(),
            RecordingActivationSink::new().with_delay(Duration::from_millis(100)),
        );
        f.loader.add_repository("app", RepositoryKind::Directory, dir.path()).unwrap();
        f.loader.start().unwrap();

        std::thread::scope(|s| {
            let lookup = s.spawn(|| f.loader.lookup("Slow.unit"));
            std::thread::sleep(Duration::from_millis(20));
            f.loader.stop().unwrap();
            // the in-flight lookup finished before the cache was released
            assert!(lookup.join().unwrap().is_ok());
        });
        assert!(matches!(f.loader.lookup("Slow.unit"), Err(LoaderError::LoaderStopped)));
    }
}
