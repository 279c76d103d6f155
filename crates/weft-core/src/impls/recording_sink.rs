//! RecordingActivationSink - 開発用の ActivationSink
//!
//! プラットフォームの代わりに「定義済み name の集合」を持ち、
//! 同じ name の二重定義を ActivationRejected で拒否します。
//! activation 回数を数えるので、at-most-once のテストの観測点にもなります。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::domain::{ActivatedUnit, UnitId};
use crate::ports::{
    ActivationRejected, ActivationRequest, ActivationSink, IdGenerator, SystemClock, UlidGenerator,
};

/// What the recording sink stores inside each `ActivatedUnit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUnit {
    pub name: String,
    pub size: usize,
}

pub struct RecordingActivationSink {
    ids: Box<dyn IdGenerator>,
    defined: Mutex<HashMap<String, UnitId>>,
    count: AtomicUsize,
    /// When set, only payloads with one of these SHA-256 digests are trusted.
    trusted_digests: Option<HashSet<String>>,
    /// Widens race windows in concurrency tests.
    delay: Option<Duration>,
}

impl RecordingActivationSink {
    pub fn new() -> Self {
        Self {
            ids: Box::new(UlidGenerator::new(SystemClock)),
            defined: Mutex::new(HashMap::new()),
            count: AtomicUsize::new(0),
            trusted_digests: None,
            delay: None,
        }
    }

    pub fn with_trusted_digests<I, S>(mut self, digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_digests = Some(digests.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn activation_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn unit_for(&self, name: &str) -> Option<UnitId> {
        self.defined.lock().get(name).copied()
    }
}

impl Default for RecordingActivationSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationSink for RecordingActivationSink {
    fn activate(&self, request: ActivationRequest<'_>) -> Result<ActivatedUnit, ActivationRejected> {
        if let Some(trusted) = &self.trusted_digests {
            let digest = request.provenance.map(|p| p.sha256.as_str());
            if !digest.is_some_and(|d| trusted.contains(d)) {
                return Err(ActivationRejected::new("payload digest is not trusted"));
            }
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut defined = self.defined.lock();
        if defined.contains_key(request.name) {
            return Err(ActivationRejected::new(format!(
                "duplicate definition of '{}'",
                request.name
            )));
        }
        let id = self.ids.generate_unit_id();
        defined.insert(request.name.to_string(), id);
        self.count.fetch_add(1, Ordering::SeqCst);

        Ok(ActivatedUnit::new(
            id,
            RecordedUnit {
                name: request.name.to_string(),
                size: request.bytes.len(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provenance;

    fn request<'a>(name: &'a str, provenance: Option<&'a Provenance>) -> ActivationRequest<'a> {
        ActivationRequest {
            name,
            bytes: b"code",
            provenance,
            certificates: None,
        }
    }

    #[test]
    fn activates_once_and_rejects_duplicates() {
        let sink = RecordingActivationSink::new();
        let unit = sink.activate(request("a.unit", None)).unwrap();
        assert_eq!(unit.downcast_ref::<RecordedUnit>().unwrap().size, 4);
        assert_eq!(sink.unit_for("a.unit"), Some(unit.id()));

        let err = sink.activate(request("a.unit", None)).unwrap_err();
        assert!(err.reason.contains("duplicate"));
        assert_eq!(sink.activation_count(), 1);
    }

    #[test]
    fn untrusted_digest_is_rejected() {
        let sink = RecordingActivationSink::new().with_trusted_digests(["abc"]);
        let provenance = Provenance {
            repository: "r".into(),
            uri: "file:///r/a.unit".into(),
            size: 4,
            sha256: "def".into(),
            crc32: None,
        };
        assert!(sink.activate(request("a.unit", Some(&provenance))).is_err());
        assert!(sink.activate(request("a.unit", None)).is_err());
        assert_eq!(sink.activation_count(), 0);
    }
}
