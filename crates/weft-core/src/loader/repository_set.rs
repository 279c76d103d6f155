//! RepositorySet - 順序付きのリポジトリ一覧
//!
//! # 不変条件
//! - 解決順は挿入順。並べ替えも優先度の上書きもしない（先に登録された方が勝つ）
//! - 追加は append-only。既存の RepositoryRef は変更されない
//! - 一覧は copy-on-write の `Arc<Vec<_>>` で、walk 中の追加と競合しない

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::LoaderConfig;
use crate::domain::{LoaderError, RepositoryKind, RepositoryRef};

/// Who is registering a repository.
///
/// The orchestrating loader re-registers idempotently (e.g. archive-root
/// expansion); an external caller registering a duplicate name is a mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    External,
    Internal,
}

#[derive(Debug, Default)]
struct RepositoryList {
    repos: Arc<Vec<RepositoryRef>>,
    /// Derived `file://` URLs; rebuilt lazily after an add.
    urls: Option<Arc<[String]>>,
}

#[derive(Debug, Default)]
pub struct RepositorySet {
    inner: RwLock<RepositoryList>,
}

impl RepositorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a repository.
    ///
    /// Returns `Ok(None)` when an internal registration repeats a known name.
    pub fn add(
        &self,
        name: &str,
        kind: RepositoryKind,
        backing_path: impl Into<PathBuf>,
        registration: Registration,
        config: &LoaderConfig,
    ) -> Result<Option<RepositoryRef>, LoaderError> {
        let backing_path = backing_path.into();
        validate(name, kind, &backing_path, config)?;

        let mut list = self.inner.write();
        if list.repos.iter().any(|r| r.name == name) {
            return match registration {
                Registration::Internal => Ok(None),
                Registration::External => Err(LoaderError::invalid_repository(
                    name,
                    backing_path,
                    "a repository with this name is already registered",
                )),
            };
        }

        let repo = RepositoryRef {
            name: name.to_string(),
            kind,
            backing_path,
            order: list.repos.len(),
        };
        Arc::make_mut(&mut list.repos).push(repo.clone());
        list.urls = None;
        Ok(Some(repo))
    }

    /// Cheap immutable snapshot for walking in resolution order.
    pub fn snapshot(&self) -> Arc<Vec<RepositoryRef>> {
        Arc::clone(&self.inner.read().repos)
    }

    /// Owned copy for callers outside the engine.
    pub fn list(&self) -> Vec<RepositoryRef> {
        self.inner.read().repos.as_ref().clone()
    }

    pub fn repository_urls(&self) -> Arc<[String]> {
        if let Some(urls) = &self.inner.read().urls {
            return Arc::clone(urls);
        }
        let mut list = self.inner.write();
        let urls: Arc<[String]> = list.repos.iter().map(RepositoryRef::url).collect();
        list.urls = Some(Arc::clone(&urls));
        urls
    }

    pub fn len(&self) -> usize {
        self.inner.read().repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(
    name: &str,
    kind: RepositoryKind,
    path: &Path,
    config: &LoaderConfig,
) -> Result<(), LoaderError> {
    if name.trim().is_empty() {
        return Err(LoaderError::invalid_repository(name, path, "name is empty"));
    }
    match kind {
        RepositoryKind::Directory if !path.is_dir() => Err(LoaderError::invalid_repository(
            name,
            path,
            "not an existing directory",
        )),
        RepositoryKind::Archive if !config.is_archive_file(path) => {
            Err(LoaderError::invalid_repository(
                name,
                path,
                format!("archive extension must be one of {:?}", config.archive_extensions),
            ))
        }
        RepositoryKind::Archive if !path.is_file() => Err(LoaderError::invalid_repository(
            name,
            path,
            "not an existing archive file",
        )),
        _ => Ok(()),
    }
}
