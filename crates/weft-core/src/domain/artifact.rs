//! Artifact model: resolved entries, provenance, activated units.
//!
//! # メモリ規律
//! code artifact は activation 前は `payload` を保持し、activation 後は
//! `payload` を解放して `ActivatedUnit` だけを残します。
//! resource artifact は activation されず、`payload` を何度でも返します。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use super::ids::UnitId;

/// Code artifacts are activated; resources are served as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Code,
    Resource,
}

impl ArtifactKind {
    /// Classify a logical name by its extension.
    pub fn classify(name: &str, code_extensions: &[String]) -> Self {
        let file = name.rsplit('/').next().unwrap_or(name);
        match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && code_extensions.iter().any(|c| c == ext) => {
                ArtifactKind::Code
            }
            _ => ArtifactKind::Resource,
        }
    }
}

/// A trust certificate attached to an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: String,
    pub fingerprint: String,
}

/// Where the bytes of an artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the repository (or `"fallback"`).
    pub repository: String,
    pub uri: String,
    pub size: u64,
    /// Hex SHA-256 of the payload.
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<u32>,
}

/// Opaque handle to an activated unit.
///
/// Equality is by `UnitId`; the inner value belongs to the activation sink.
#[derive(Clone)]
pub struct ActivatedUnit {
    id: UnitId,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ActivatedUnit {
    pub fn new(id: UnitId, inner: impl Any + Send + Sync) -> Self {
        Self {
            id,
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for ActivatedUnit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActivatedUnit {}

impl fmt::Debug for ActivatedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivatedUnit").field("id", &self.id).finish()
    }
}

/// Mutable half of an entry; guarded by the entry's activation lock.
#[derive(Debug, Default)]
pub(crate) struct EntryState {
    pub(crate) payload: Option<Arc<[u8]>>,
    pub(crate) activated: Option<ActivatedUnit>,
}

/// A resolved artifact.
///
/// Immutable metadata plus the payload/unit pair. `last_modified` is what was
/// observed at resolution time and is never refreshed in place.
#[derive(Debug)]
pub struct ArtifactEntry {
    logical_name: String,
    kind: ArtifactKind,
    last_modified: DateTime<Utc>,
    source_uri: String,
    origin_repository: String,
    provenance: Option<Provenance>,
    trust_certificates: Option<Vec<Certificate>>,
    state: Mutex<EntryState>,
}

impl ArtifactEntry {
    pub fn new(
        logical_name: impl Into<String>,
        kind: ArtifactKind,
        last_modified: DateTime<Utc>,
        payload: Vec<u8>,
        source_uri: impl Into<String>,
        origin_repository: impl Into<String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            kind,
            last_modified,
            source_uri: source_uri.into(),
            origin_repository: origin_repository.into(),
            provenance: None,
            trust_certificates: None,
            state: Mutex::new(EntryState {
                payload: Some(payload.into()),
                activated: None,
            }),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn with_certificates(mut self, certificates: Vec<Certificate>) -> Self {
        if !certificates.is_empty() {
            self.trust_certificates = Some(certificates);
        }
        self
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn origin_repository(&self) -> &str {
        &self.origin_repository
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    pub fn trust_certificates(&self) -> Option<&[Certificate]> {
        self.trust_certificates.as_deref()
    }

    /// Bytes of the artifact. `None` for a code artifact once activated.
    pub fn payload(&self) -> Option<Arc<[u8]>> {
        self.state.lock().payload.clone()
    }

    pub fn activated_unit(&self) -> Option<ActivatedUnit> {
        self.state.lock().activated.clone()
    }

    pub fn is_activated(&self) -> bool {
        self.state.lock().activated.is_some()
    }

    /// Per-name activation lock.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock()
    }
}
