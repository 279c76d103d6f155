//! ArchiveHandlePool - archive リポジトリの open handle 管理
//!
//! # 設計原則
//! - handle はこの pool だけが持つ。Resolver / ArtifactCache は bytes を要求するだけ
//! - 1 archive につき 1 つの Mutex。open / read / close はすべてその中で完結する
//!   （zip reader は位置指定の並行読み出しに安全ではない）
//! - 別の archive への操作は並行に進む
//! - idle close は background から呼ばれる（リクエストごとには閉じない）
//!
//! # anti-locking
//! `scratch_dir` が設定されていると、open 時に archive を scratch にコピーして
//! コピーの方を開きます。元のファイルは一切 open されないので、外部から置き換え・削除できます。

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::domain::{Certificate, LoaderError, RepositoryRef};
use crate::ports::Clock;

/// Archive entry listing trusted certificates, one `subject fingerprint` per line.
pub const TRUST_ENTRY: &str = "META-INF/TRUST";

/// Bytes read from an archive plus what the archive says about them.
#[derive(Debug, Clone)]
pub struct ArchiveRead {
    pub bytes: Vec<u8>,
    pub crc32: u32,
    pub certificates: Vec<Certificate>,
}

struct OpenArchive {
    archive: ZipArchive<File>,
    last_accessed: DateTime<Utc>,
    certificates: Vec<Certificate>,
    scratch_copy: Option<PathBuf>,
}

struct HandleSlot {
    repository: RepositoryRef,
    open: Option<OpenArchive>,
}

impl HandleSlot {
    fn close(&mut self) -> bool {
        let Some(open) = self.open.take() else {
            return false;
        };
        let scratch_copy = open.scratch_copy.clone();
        drop(open);
        if let Some(copy) = scratch_copy
            && let Err(err) = fs::remove_file(&copy)
        {
            tracing::debug!(path = %copy.display(), error = %err, "scratch copy not removed");
        }
        tracing::debug!(repository = %self.repository.name, "archive handle closed");
        true
    }
}

pub struct ArchiveHandlePool {
    slots: RwLock<HashMap<String, Arc<Mutex<HandleSlot>>>>,
    clock: Arc<dyn Clock>,
    scratch_dir: Option<PathBuf>,
}

impl ArchiveHandlePool {
    pub fn new(clock: Arc<dyn Clock>, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            clock,
            scratch_dir,
        }
    }

    fn slot(&self, repo: &RepositoryRef) -> Arc<Mutex<HandleSlot>> {
        if let Some(slot) = self.slots.read().get(&repo.name) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        let slot = slots.entry(repo.name.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(HandleSlot {
                repository: repo.clone(),
                open: None,
            }))
        });
        Arc::clone(slot)
    }

    /// Open the archive if it is not open yet.
    pub fn open(&self, repo: &RepositoryRef) -> Result<(), LoaderError> {
        let slot = self.slot(repo);
        let mut slot = slot.lock();
        self.ensure_open(&mut slot)?;
        Ok(())
    }

    /// Read one entry. The whole read happens under the archive's lock.
    pub fn read(&self, repo: &RepositoryRef, entry_name: &str) -> Result<ArchiveRead, LoaderError> {
        let slot = self.slot(repo);
        let mut slot = slot.lock();
        let path = slot.repository.backing_path.clone();
        let now = self.clock.now();
        let open = self.ensure_open(&mut slot)?;
        open.last_accessed = now;

        let mut file = open
            .archive
            .by_name(entry_name)
            .map_err(|err| map_zip_error(&path, entry_name, err))?;
        if file.is_dir() {
            return Err(LoaderError::EntryNotFound {
                path,
                entry: entry_name.to_string(),
            });
        }
        let crc32 = file.crc32();
        let mut bytes = Vec::with_capacity(initial_capacity(file.size()));
        file.read_to_end(&mut bytes)
            .map_err(|err| LoaderError::ArchiveCorrupt {
                path: path.clone(),
                reason: format!("{entry_name}: {err}"),
            })?;

        Ok(ArchiveRead {
            bytes,
            crc32,
            certificates: open.certificates.clone(),
        })
    }

    /// Close every handle if `force`, otherwise those idle longer than `idle_threshold`.
    ///
    /// Returns how many handles were closed.
    pub fn close_idle(&self, force: bool, idle_threshold: Duration) -> usize {
        let threshold = chrono::Duration::from_std(idle_threshold).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        let slots: Vec<_> = self.slots.read().values().cloned().collect();

        let mut closed = 0;
        for slot in slots {
            let mut slot = slot.lock();
            let idle = slot
                .open
                .as_ref()
                .is_some_and(|open| now.signed_duration_since(open.last_accessed) > threshold);
            if (force || idle) && slot.close() {
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::debug!(closed, force, "closed archive handles");
        }
        closed
    }

    pub fn close_all(&self) -> usize {
        self.close_idle(true, Duration::ZERO)
    }

    pub fn open_handles(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().open.is_some())
            .count()
    }

    fn ensure_open<'a>(&self, slot: &'a mut HandleSlot) -> Result<&'a mut OpenArchive, LoaderError> {
        let open = match slot.open.take() {
            Some(open) => open,
            None => {
                let open = self.open_archive(&slot.repository)?;
                tracing::debug!(repository = %slot.repository.name, "archive handle opened");
                open
            }
        };
        Ok(slot.open.insert(open))
    }

    fn open_archive(&self, repo: &RepositoryRef) -> Result<OpenArchive, LoaderError> {
        let original = &repo.backing_path;
        let scratch_copy = match &self.scratch_dir {
            Some(dir) => Some(copy_to_scratch(dir, repo).map_err(|source| LoaderError::Io {
                path: original.clone(),
                source,
            })?),
            None => None,
        };
        let open_path = scratch_copy.as_deref().unwrap_or(original);

        let file = File::open(open_path).map_err(|source| LoaderError::Io {
            path: original.clone(),
            source,
        })?;
        let mut archive = ZipArchive::new(file).map_err(|err| LoaderError::ArchiveCorrupt {
            path: original.clone(),
            reason: err.to_string(),
        })?;
        let certificates = read_certificates(&mut archive);

        Ok(OpenArchive {
            archive,
            last_accessed: self.clock.now(),
            certificates,
            scratch_copy,
        })
    }
}

impl Drop for ArchiveHandlePool {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Declared entry sizes come from the archive itself; pre-size at most this much.
const MAX_PRESIZE: u64 = 1 << 20;

fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PRESIZE)).unwrap_or(0)
}

fn copy_to_scratch(dir: &Path, repo: &RepositoryRef) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_name: String = repo
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let ext = repo
        .backing_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("zip");
    let target = dir.join(format!("{}-{}.{}", repo.order, file_name, ext));
    fs::copy(&repo.backing_path, &target)?;
    Ok(target)
}

fn read_certificates(archive: &mut ZipArchive<File>) -> Vec<Certificate> {
    let Ok(mut file) = archive.by_name(TRUST_ENTRY) else {
        return Vec::new();
    };
    let mut text = String::new();
    if file.read_to_string(&mut text).is_err() {
        return Vec::new();
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some(Certificate {
                subject: parts.next()?.to_string(),
                fingerprint: parts.next()?.to_string(),
            })
        })
        .collect()
}

fn map_zip_error(path: &Path, entry: &str, err: ZipError) -> LoaderError {
    match err {
        ZipError::FileNotFound => LoaderError::EntryNotFound {
            path: path.to_path_buf(),
            entry: entry.to_string(),
        },
        ZipError::Io(source) => LoaderError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => LoaderError::ArchiveCorrupt {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}
