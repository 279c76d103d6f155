//! Repository model: where artifacts come from.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a repository stores its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    /// A plain directory; entry `a/b.unit` is the file `<dir>/a/b.unit`.
    Directory,

    /// An archive file (zip format); entries are read through the handle pool.
    Archive,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Directory => f.write_str("directory"),
            RepositoryKind::Archive => f.write_str("archive"),
        }
    }
}

/// A registered repository.
///
/// Immutable once registered. `order` is the insertion index and is the
/// resolution priority: lower order wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub kind: RepositoryKind,
    pub backing_path: PathBuf,
    pub order: usize,
}

impl RepositoryRef {
    /// `file://` URI of the backing path.
    pub fn url(&self) -> String {
        file_uri(&self.backing_path)
    }
}

pub(crate) fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Virtual URI for an entry inside an archive.
///
/// Same shape whether or not the caller knows the artifact came from an
/// archive: `jar:file://<archive>!/<entry>`.
pub(crate) fn archive_entry_uri(archive: &Path, entry: &str) -> String {
    format!("jar:{}!/{}", file_uri(archive), entry)
}
