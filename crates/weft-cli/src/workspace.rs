//! Workspace file: loader config plus the repositories to register.
//!
//! ```json
//! {
//!   "loader": { "idle_timeout_secs": 90 },
//!   "repositories": [{ "name": "classes", "kind": "directory", "path": "classes" }],
//!   "archive_roots": ["lib"]
//! }
//! ```
//!
//! Relative paths are resolved against the workspace file's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use weft_core::app::{BuildError, LoaderBuilder};
use weft_core::impls::RecordingActivationSink;
use weft_core::ports::GenerationFactory;
use weft_core::{Loader, LoaderConfig, RepositoryKind};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("cannot read workspace {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workspace {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySpec {
    pub name: String,
    pub kind: RepositoryKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub loader: LoaderConfig,
    pub repositories: Vec<RepositorySpec>,
    pub archive_roots: Vec<PathBuf>,
}

impl Workspace {
    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let workspace: Workspace =
            serde_json::from_str(&text).map_err(|source| WorkspaceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or(Path::new("."));
        Ok(workspace.rebased(base))
    }

    fn rebased(mut self, base: &Path) -> Self {
        for repo in &mut self.repositories {
            repo.path = base.join(&repo.path);
        }
        for root in &mut self.archive_roots {
            *root = base.join(&*root);
        }
        if let Some(scratch) = &mut self.loader.scratch_dir {
            *scratch = base.join(&*scratch);
        }
        self
    }
}

/// Builds every generation from the same workspace description.
pub struct WorkspaceFactory {
    workspace: Workspace,
}

impl WorkspaceFactory {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    fn builder(&self) -> LoaderBuilder {
        // a generation's units are never shared with the next one
        let mut builder = LoaderBuilder::new(self.workspace.loader.clone())
            .activation_sink(Arc::new(RecordingActivationSink::new()));
        for repo in &self.workspace.repositories {
            builder = builder.repository(&repo.name, repo.kind, &repo.path);
        }
        for root in &self.workspace.archive_roots {
            builder = builder.archive_root(root);
        }
        builder
    }
}

#[async_trait]
impl GenerationFactory for WorkspaceFactory {
    async fn build(&self) -> Result<Loader, BuildError> {
        self.builder().build()
    }
}
