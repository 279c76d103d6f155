//! LoaderConfig - loader のポリシー値
//!
//! idle timeout (90s) と staleness の間隔 (1s) はデフォルト値であって定数ではありません。
//! JSON から読み込めます（欠けたフィールドはデフォルト）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::LoaderError;

const MIN_RELOAD_PERIOD_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Archive handles idle longer than this are closed by `close_idle_archives(false)`.
    pub idle_timeout_secs: u64,

    /// How often the background idle-close loop runs.
    pub idle_close_period_secs: u64,

    /// Minimum spacing between two real staleness checks. 0 re-checks on every call.
    pub staleness_interval_ms: u64,

    /// Consult the fallback resolver before local repositories.
    pub delegate_first: bool,

    /// Name prefixes that can never be resolved locally.
    pub protected_prefixes: Vec<String>,

    /// Extensions (without dot) of artifacts that get activated.
    pub code_extensions: Vec<String>,

    /// Extensions (without dot) accepted for archive repositories.
    pub archive_extensions: Vec<String>,

    /// When set, archives are copied here before opening so the originals are
    /// never held open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 90,
            idle_close_period_secs: 30,
            staleness_interval_ms: 1000,
            delegate_first: false,
            protected_prefixes: vec!["platform/".to_string()],
            code_extensions: vec!["unit".to_string()],
            archive_extensions: vec!["zip".to_string(), "jar".to_string(), "war".to_string()],
            scratch_dir: None,
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LoaderError> {
        let config: LoaderConfig =
            serde_json::from_str(json).map_err(|e| LoaderError::Config(e.to_string()))?;
        config.normalized()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LoaderError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_close_period(&self) -> Duration {
        Duration::from_secs(self.idle_close_period_secs)
    }

    pub fn staleness_interval(&self) -> Duration {
        Duration::from_millis(self.staleness_interval_ms)
    }

    /// How often a background reload loop polls `check_modified`; never zero.
    pub fn reload_period(&self) -> Duration {
        Duration::from_millis(self.staleness_interval_ms.max(MIN_RELOAD_PERIOD_MS))
    }

    pub fn is_archive_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.archive_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }

    /// Strip leading dots from extensions and reject an unusable config.
    pub fn normalized(mut self) -> Result<Self, LoaderError> {
        for list in [&mut self.code_extensions, &mut self.archive_extensions] {
            for ext in list.iter_mut() {
                *ext = ext.trim_start_matches('.').to_string();
            }
            list.retain(|ext| !ext.is_empty());
        }
        if self.archive_extensions.is_empty() {
            return Err(LoaderError::Config(
                "archive_extensions must not be empty".to_string(),
            ));
        }
        if self.idle_close_period_secs == 0 {
            return Err(LoaderError::Config(
                "idle_close_period_secs must be positive".to_string(),
            ));
        }
        Ok(self)
    }
}
