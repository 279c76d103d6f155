//! LoaderBuilder - generation の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 登録順 = 解決順 をそのまま builder の呼び出し順に対応させる

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::domain::{LoaderError, RepositoryKind};
use crate::loader::{Collaborators, Loader};
use crate::ports::{
    ActivationSink, Clock, FallbackResolver, IdGenerator, MetadataProvider, UlidGenerator,
};

/// LoaderBuilder は Loader を構築
///
/// # 使用例
/// ```ignore
/// let loader = LoaderBuilder::new(config)
///     .activation_sink(Arc::new(RecordingActivationSink::new()))
///     .repository("app", RepositoryKind::Directory, "./classes")
///     .archive_root("./lib")
///     .build_started()?;
/// ```
///
/// # Fail-fast 設計
/// - ActivationSink が無ければ build() は失敗する
/// - config は normalized() で検証する
/// - リポジトリ登録エラーはその場で BuildError として返す
pub struct LoaderBuilder {
    config: LoaderConfig,
    sink: Option<Arc<dyn ActivationSink>>,
    fallback: Option<Arc<dyn FallbackResolver>>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sources: Vec<Source>,
}

enum Source {
    Repository {
        name: String,
        kind: RepositoryKind,
        path: PathBuf,
    },
    ArchiveRoot(PathBuf),
}

/// BuildError は generation 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no activation sink configured; code artifacts could not be activated")]
    MissingActivationSink,

    #[error("invalid loader configuration")]
    Config(#[source] LoaderError),

    #[error("failed to register repositories")]
    Loader(#[from] LoaderError),
}

impl LoaderBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            sink: None,
            fallback: None,
            metadata: None,
            clock: None,
            ids: None,
            sources: Vec::new(),
        }
    }

    pub fn activation_sink(mut self, sink: Arc<dyn ActivationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn FallbackResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// リポジトリを末尾（最低優先度）に追加
    pub fn repository(
        mut self,
        name: impl Into<String>,
        kind: RepositoryKind,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.sources.push(Source::Repository {
            name: name.into(),
            kind,
            path: path.into(),
        });
        self
    }

    pub fn archive_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::ArchiveRoot(dir.into()));
        self
    }

    /// Loader を構築（Created 状態のまま返す）
    pub fn build(self) -> Result<Loader, BuildError> {
        let sink = self.sink.ok_or(BuildError::MissingActivationSink)?;
        let config = self.config.normalized().map_err(BuildError::Config)?;

        let mut collaborators = Collaborators::new(sink);
        if let Some(fallback) = self.fallback {
            collaborators.fallback = fallback;
        }
        if let Some(metadata) = self.metadata {
            collaborators.metadata = metadata;
        }
        if let Some(clock) = self.clock {
            collaborators.ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
            collaborators.clock = clock;
        }
        if let Some(ids) = self.ids {
            collaborators.ids = ids;
        }

        let loader = Loader::new(config, collaborators);
        for source in self.sources {
            match source {
                Source::Repository { name, kind, path } => {
                    loader.add_repository(&name, kind, path)?;
                }
                Source::ArchiveRoot(dir) => {
                    loader.add_archive_root(&dir)?;
                }
            }
        }
        Ok(loader)
    }

    /// build() してそのまま start() する
    pub fn build_started(self) -> Result<Loader, BuildError> {
        let loader = self.build()?;
        loader.start()?;
        Ok(loader)
    }
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}
