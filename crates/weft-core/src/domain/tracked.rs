//! Staleness bookkeeping records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File metadata as reported by a `MetadataProvider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// A backing path observed during resolution and the mtime seen then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPath {
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
}

/// A directory expected to hold a flat set of archives, and the sorted
/// archive file names it held when it was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRoot {
    pub path: PathBuf,
    pub members: Vec<String>,
}
