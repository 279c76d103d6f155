//! Status - generation のスナップショット
//!
//! 件数だけを返す読み取り専用ビュー。CLI の `status` や運用ログ向け。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RepositoryRef;
use crate::loader::{Lifecycle, Loader};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderStatus {
    /// `generation-<ulid>`
    pub generation_id: String,
    pub lifecycle: Lifecycle,
    pub repositories: Vec<RepositoryRef>,
    pub cached_entries: usize,
    pub negative_entries: usize,
    pub activated_units: usize,
    pub open_archive_handles: usize,
    pub tracked_paths: usize,
    pub archive_roots: usize,
    /// 最後の check_modified() の結果（再走査はしない）
    pub stale: bool,
    pub captured_at: DateTime<Utc>,
}

impl Loader {
    pub fn status(&self) -> LoaderStatus {
        LoaderStatus {
            generation_id: self.generation_id().to_string(),
            lifecycle: self.lifecycle(),
            repositories: self.list_repositories(),
            cached_entries: self.cache().len(),
            negative_entries: self.cache().negative_len(),
            activated_units: self.cache().activation_count(),
            open_archive_handles: self.archives().open_handles(),
            tracked_paths: self.tracker().tracked_paths().len(),
            archive_roots: self.tracker().archive_roots().len(),
            stale: self.tracker().last_result(),
            captured_at: self.clock().now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::app::builder::LoaderBuilder;
    use crate::domain::RepositoryKind;
    use crate::impls::RecordingActivationSink;
    use crate::loader::Lifecycle;
    use crate::test_support::{write_file, write_zip};
    use std::sync::Arc;

    #[test]
    fn test_status_counts_cache_and_handles() {
        let root = tempfile::tempdir().unwrap();
        let classes = root.path().join("classes");
        let zip = root.path().join("lib.zip");
        write_file(&classes, "com/acme/Widget.unit", b"code");
        write_zip(&zip, &[("logo.txt", b"logo")]);
        let loader = LoaderBuilder::default()
            .activation_sink(Arc::new(RecordingActivationSink::new()))
            .repository("classes", RepositoryKind::Directory, &classes)
            .repository("lib", RepositoryKind::Archive, &zip)
            .build_started()
            .unwrap();

        loader.lookup("com/acme/Widget.unit").unwrap();
        loader.lookup("logo.txt").unwrap();
        assert!(loader.lookup("nothing.txt").is_err());

        let status = loader.status();
        assert_eq!(status.lifecycle, Lifecycle::Started);
        assert_eq!(status.repositories.len(), 2);
        assert_eq!(status.cached_entries, 2);
        assert_eq!(status.negative_entries, 1);
        assert_eq!(status.activated_units, 1);
        assert_eq!(status.open_archive_handles, 1);
        assert_eq!(status.tracked_paths, 2);
        assert!(!status.stale);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["lifecycle"], "started");
        assert!(json["generation_id"].as_str().unwrap().starts_with("generation-"));
    }
}
