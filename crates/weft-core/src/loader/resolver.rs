//! Resolver - name から ArtifactEntry を見つける
//!
//! # フロー
//! 1. 検証ゲート（予約 namespace → Forbidden、不正な name → InvalidName）
//! 2. ArtifactCache を参照
//! 3. miss なら（delegate-first なら先に fallback）リポジトリを登録順に walk
//!    - directory: ファイルを直接参照。URI はファイルそのもの
//!    - archive: ArchiveHandlePool 経由で読む。URI は archive + entry の仮想 URI
//! 4. 最初にヒットしたリポジトリが勝つ。そのパスを StalenessTracker に記録
//! 5. どこにもなければ fallback resolver、それでもなければ NotFound
//!
//! 1 つのリポジトリの I/O・形式エラーはログを出して次へ進みます。
//! 壊れた archive が後ろの健全なリポジトリからの解決を妨げてはいけません。

use std::fs;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::LoaderConfig;
use crate::domain::repository::{archive_entry_uri, file_uri};
use crate::domain::{ArtifactEntry, ArtifactKind, LoaderError, Provenance, RepositoryKind, RepositoryRef};
use crate::ports::{Clock, FallbackResolver, MetadataProvider};

use super::archive_pool::ArchiveHandlePool;
use super::cache::ArtifactCache;
use super::repository_set::RepositorySet;
use super::staleness::StalenessTracker;

pub const FALLBACK_ORIGIN: &str = "fallback";

pub struct Resolver {
    pub(crate) repositories: Arc<RepositorySet>,
    pub(crate) archives: Arc<ArchiveHandlePool>,
    pub(crate) cache: Arc<ArtifactCache>,
    pub(crate) tracker: Arc<StalenessTracker>,
    pub(crate) fallback: Arc<dyn FallbackResolver>,
    pub(crate) metadata: Arc<dyn MetadataProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: Arc<LoaderConfig>,
}

impl Resolver {
    pub fn lookup(&self, name: &str) -> Result<Arc<ArtifactEntry>, LoaderError> {
        self.validate(name)?;
        self.cache.resolve(name, |name| self.locate(name))
    }

    pub fn validate(&self, name: &str) -> Result<(), LoaderError> {
        let malformed = name.is_empty()
            || name.starts_with('/')
            || name.contains('\\')
            || name
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if malformed {
            return Err(LoaderError::InvalidName(name.to_string()));
        }
        if self
            .config
            .protected_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            return Err(LoaderError::Forbidden(name.to_string()));
        }
        Ok(())
    }

    /// Walk without consulting the cache.
    fn locate(&self, name: &str) -> Result<ArtifactEntry, LoaderError> {
        let kind = ArtifactKind::classify(name, &self.config.code_extensions);

        if self.config.delegate_first
            && let Some(entry) = self.from_fallback(name, kind)
        {
            return Ok(entry);
        }

        for repo in self.repositories.snapshot().iter() {
            let found = match repo.kind {
                RepositoryKind::Directory => self.find_in_directory(repo, name, kind),
                RepositoryKind::Archive => self.find_in_archive(repo, name, kind),
            };
            match found {
                Ok(Some(entry)) => {
                    tracing::debug!(name, repository = %repo.name, "resolved");
                    return Ok(entry);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        name,
                        repository = %repo.name,
                        kind = ?err.kind(),
                        error = %err,
                        "repository skipped"
                    );
                }
            }
        }

        if !self.config.delegate_first
            && let Some(entry) = self.from_fallback(name, kind)
        {
            return Ok(entry);
        }
        Err(LoaderError::NotFound(name.to_string()))
    }

    fn find_in_directory(
        &self,
        repo: &RepositoryRef,
        name: &str,
        kind: ArtifactKind,
    ) -> Result<Option<ArtifactEntry>, LoaderError> {
        let path = repo.backing_path.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        let io_err = |source| LoaderError::Io {
            path: path.clone(),
            source,
        };
        // stat before read: a change in between shows up as stale later
        let stat = self.metadata.stat(&path).map_err(io_err)?;
        let bytes = fs::read(&path).map_err(io_err)?;
        self.tracker.track(&path, stat.last_modified);

        let uri = file_uri(&path);
        let provenance = provenance(&repo.name, &uri, &bytes, None);
        Ok(Some(
            ArtifactEntry::new(name, kind, stat.last_modified, bytes, uri, repo.url())
                .with_provenance(provenance),
        ))
    }

    fn find_in_archive(
        &self,
        repo: &RepositoryRef,
        name: &str,
        kind: ArtifactKind,
    ) -> Result<Option<ArtifactEntry>, LoaderError> {
        let stat = self
            .metadata
            .stat(&repo.backing_path)
            .map_err(|source| LoaderError::Io {
                path: repo.backing_path.clone(),
                source,
            })?;
        let read = match self.archives.read(repo, name) {
            Ok(read) => read,
            Err(LoaderError::EntryNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        self.tracker.track(&repo.backing_path, stat.last_modified);

        let uri = archive_entry_uri(&repo.backing_path, name);
        let provenance = provenance(&repo.name, &uri, &read.bytes, Some(read.crc32));
        Ok(Some(
            ArtifactEntry::new(name, kind, stat.last_modified, read.bytes, uri, repo.url())
                .with_provenance(provenance)
                .with_certificates(read.certificates),
        ))
    }

    fn from_fallback(&self, name: &str, kind: ArtifactKind) -> Option<ArtifactEntry> {
        match self.fallback.lookup(name) {
            Ok(Some(bytes)) => {
                tracing::debug!(name, "resolved by fallback");
                let uri = format!("{FALLBACK_ORIGIN}:{name}");
                let provenance = provenance(FALLBACK_ORIGIN, &uri, &bytes, None);
                Some(
                    ArtifactEntry::new(name, kind, self.clock.now(), bytes, uri, FALLBACK_ORIGIN)
                        .with_provenance(provenance),
                )
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(name, error = %err, "fallback resolver failed");
                None
            }
        }
    }
}

pub(crate) fn provenance(repository: &str, uri: &str, bytes: &[u8], crc32: Option<u32>) -> Provenance {
    let sha256 = hex::encode(Sha256::digest(bytes));
    Provenance {
        repository: repository.to_string(),
        uri: uri.to_string(),
        size: bytes.len() as u64,
        sha256,
        crc32,
    }
}
