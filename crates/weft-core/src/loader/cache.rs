//! ArtifactCache - logical name → ArtifactEntry
//!
//! # 不変条件
//! - 1 つの name に対して公開される entry は常に 1 つ（insert-if-absent、負けた方は捨てる）
//! - activation は name ごとに高々 1 回。entry 自身のロックで double-checked locking する
//! - 単一 entry の eviction はしない。`invalidate` / `clear` は generation の teardown 専用
//!
//! # negative cache
//! 解決できなかった name を覚えておき、毎回リポジトリを走査しないようにします。
//! リポジトリ構成が変わったら `clear_negative` で捨てます。
//! 構成変更と並行して走っていた resolve が古い結果を書き戻さないよう、epoch で守ります。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::{ActivatedUnit, ArtifactEntry, LoaderError, UnitId};
use crate::ports::{ActivationRequest, ActivationSink};

#[derive(Debug, Clone)]
enum CacheSlot {
    Found(Arc<ArtifactEntry>),
    Missing,
}

#[derive(Debug, Default)]
pub struct ArtifactCache {
    slots: DashMap<String, CacheSlot>,
    /// Every name that has been activated in this generation, and its unit.
    activations: DashMap<String, UnitId>,
    membership_epoch: AtomicU64,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entry for `name`, or run `compute` and publish its result.
    ///
    /// `compute` runs without any cache lock held, so two callers may compute
    /// the same name at once; only the first inserted entry is ever returned.
    pub fn resolve<F>(&self, name: &str, compute: F) -> Result<Arc<ArtifactEntry>, LoaderError>
    where
        F: FnOnce(&str) -> Result<ArtifactEntry, LoaderError>,
    {
        if let Some(slot) = self.lookup(name) {
            return match slot {
                CacheSlot::Found(entry) => Ok(entry),
                CacheSlot::Missing => Err(LoaderError::NotFound(name.to_string())),
            };
        }

        let epoch = self.membership_epoch.load(Ordering::Acquire);
        match compute(name) {
            Ok(entry) => Ok(self.publish(name, Arc::new(entry))),
            Err(LoaderError::NotFound(_)) => self.publish_missing(name, epoch),
            Err(err) => Err(err),
        }
    }

    fn lookup(&self, name: &str) -> Option<CacheSlot> {
        self.slots.get(name).map(|slot| slot.value().clone())
    }

    fn publish(&self, name: &str, entry: Arc<ArtifactEntry>) -> Arc<ArtifactEntry> {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if let CacheSlot::Found(winner) = occupied.get() {
                    tracing::debug!(name, "lost resolution race; discarding computed entry");
                    return Arc::clone(winner);
                }
                // a negative entry from before a repository was added
                occupied.insert(CacheSlot::Found(Arc::clone(&entry)));
                entry
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheSlot::Found(Arc::clone(&entry)));
                entry
            }
        }
    }

    fn publish_missing(&self, name: &str, epoch: u64) -> Result<Arc<ArtifactEntry>, LoaderError> {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(occupied) => {
                if let CacheSlot::Found(winner) = occupied.get() {
                    return Ok(Arc::clone(winner));
                }
            }
            Entry::Vacant(vacant) => {
                if self.membership_epoch.load(Ordering::Acquire) == epoch {
                    vacant.insert(CacheSlot::Missing);
                }
            }
        }
        Err(LoaderError::NotFound(name.to_string()))
    }

    /// Activate a code entry at most once.
    ///
    /// Holds the entry's lock for the whole activation; a second caller waits
    /// and then sees the unit the first one created.
    pub fn activate(
        &self,
        entry: &ArtifactEntry,
        sink: &dyn ActivationSink,
    ) -> Result<ActivatedUnit, LoaderError> {
        let name = entry.logical_name();
        let mut state = entry.lock_state();
        if let Some(unit) = &state.activated {
            return Ok(unit.clone());
        }
        if let Some(existing) = self.activations.get(name) {
            let existing = *existing.value();
            return Err(conflict(name, existing));
        }
        let Some(payload) = state.payload.clone() else {
            tracing::error!(name, "entry has neither payload nor activated unit");
            return Err(LoaderError::ActivationConflict(name.to_string()));
        };

        let unit = sink
            .activate(ActivationRequest {
                name,
                bytes: &payload,
                provenance: entry.provenance(),
                certificates: entry.trust_certificates(),
            })
            .map_err(|rejected| LoaderError::ActivationRejected {
                name: name.to_string(),
                reason: rejected.reason,
            })?;

        match self.activations.entry(name.to_string()) {
            Entry::Occupied(occupied) => {
                let existing = *occupied.get();
                return Err(conflict(name, existing));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(unit.id());
            }
        }

        state.payload = None;
        state.activated = Some(unit.clone());
        tracing::debug!(name, unit = %unit.id(), "activated");
        Ok(unit)
    }

    /// Drop negative entries after the repository membership changed.
    pub fn clear_negative(&self) {
        self.membership_epoch.fetch_add(1, Ordering::AcqRel);
        self.slots.retain(|_, slot| matches!(slot, CacheSlot::Found(_)));
    }

    /// Teardown only. Activation records are kept, so re-activating the name
    /// through a fresh entry fails with `ActivationConflict`.
    pub fn invalidate(&self, name: &str) {
        self.slots.remove(name);
    }

    /// Teardown only.
    pub fn clear(&self) {
        self.slots.clear();
        self.activations.clear();
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), CacheSlot::Found(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn negative_len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), CacheSlot::Missing))
            .count()
    }

    pub fn activation_count(&self) -> usize {
        self.activations.len()
    }
}

fn conflict(name: &str, existing: UnitId) -> LoaderError {
    tracing::error!(
        name,
        existing = %existing,
        "cache discipline violated: name already activated by another entry"
    );
    LoaderError::ActivationConflict(name.to_string())
}
