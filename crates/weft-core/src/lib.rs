//! weft-core
//!
//! Layered artifact loader with hot-reload detection.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, repository, artifact, tracked, errors）
//! - **ports**: 抽象化レイヤー（ActivationSink, FallbackResolver, MetadataProvider, Clock, IdGenerator, GenerationFactory）
//! - **loader**: 解決エンジン（RepositorySet, ArchiveHandlePool, ArtifactCache, Resolver, StalenessTracker, Loader）
//! - **app**: アプリケーション層（LoaderBuilder, GenerationHost, ReloadLoop, IdleCloseLoop, LoaderStatus）
//! - **impls**: ports の実装（NativeMetadata, StaticFallback, RecordingActivationSink）
//! - **config**: LoaderConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod loader;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_support;

pub use self::config::LoaderConfig;
pub use self::domain::{ArtifactEntry, ErrorKind, LoaderError, RepositoryKind};
pub use self::loader::Loader;
