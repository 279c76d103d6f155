//! Errors - エラー型と分類
//!
//! `LoaderError` は loader の全操作が返すドメインエラーです。
//! `ErrorKind` は運用向けの分類で、リトライや再構築の判断に使います。

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// ErrorKind は loader エラーの分類
///
/// - Transient: 状況が変われば成功しうる（リポジトリ追加後の NotFound など）
/// - Permanent: 同じ入力では必ず失敗する（Forbidden, InvalidName）
/// - Infrastructure: I/O・アーカイブ形式の障害
/// - Bug: キャッシュ規律違反。generation を捨てるべき
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
    Bug,
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid repository '{name}' at {path}: {reason}")]
    InvalidRepository {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("lookup of '{0}' is forbidden: reserved namespace")]
    Forbidden(String),

    #[error("invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("artifact '{0}' not found")]
    NotFound(String),

    #[error("archive {path} is corrupt: {reason}")]
    ArchiveCorrupt { path: PathBuf, reason: String },

    #[error("entry '{entry}' not found in archive {path}")]
    EntryNotFound { path: PathBuf, entry: String },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("activation of '{name}' rejected: {reason}")]
    ActivationRejected { name: String, reason: String },

    #[error("'{0}' was already activated by a different cache entry")]
    ActivationConflict(String),

    #[error("loader has been stopped")]
    LoaderStopped,

    #[error("loader has not been started")]
    NotStarted,

    #[error("loader is already started")]
    AlreadyStarted,

    #[error("configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::NotFound(_) | LoaderError::NotStarted => ErrorKind::Transient,
            LoaderError::InvalidRepository { .. }
            | LoaderError::Forbidden(_)
            | LoaderError::InvalidName(_)
            | LoaderError::ActivationRejected { .. }
            | LoaderError::LoaderStopped
            | LoaderError::AlreadyStarted
            | LoaderError::Config(_) => ErrorKind::Permanent,
            LoaderError::ArchiveCorrupt { .. }
            | LoaderError::EntryNotFound { .. }
            | LoaderError::Io { .. } => ErrorKind::Infrastructure,
            LoaderError::ActivationConflict(_) => ErrorKind::Bug,
        }
    }

    pub(crate) fn invalid_repository(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        LoaderError::InvalidRepository {
            name: name.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}
