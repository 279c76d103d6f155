//! ReloadLoop - staleness 検出時の generation 入れ替え
//!
//! Loader 自身は `check_modified()` で「捨てるべき」と助言するだけです。
//! 実際の discard-and-rebuild は GenerationHost が担当します。
//!
//! # フロー
//! 1. current の check_modified()（spawn_blocking）
//! 2. true なら GenerationFactory::build() で新しい generation を組み立てて start
//! 3. current を差し替え
//! 4. 古い generation を stop（進行中の lookup が終わるのを待つ）

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::app::background::BackgroundLoop;
use crate::app::builder::BuildError;
use crate::domain::{ArtifactEntry, ErrorKind, GenerationId, LoaderError};
use crate::loader::Loader;
use crate::ports::GenerationFactory;

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to build a new generation")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("blocking loader task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl ReloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReloadError::Build(BuildError::MissingActivationSink) => ErrorKind::Permanent,
            ReloadError::Build(BuildError::Config(err) | BuildError::Loader(err))
            | ReloadError::Loader(err) => err.kind(),
            ReloadError::Join(_) => ErrorKind::Bug,
        }
    }
}

/// GenerationHost は現在の generation を保持する
pub struct GenerationHost {
    current: RwLock<Arc<Loader>>,
    factory: Arc<dyn GenerationFactory>,
    // 再構築は同時に 1 つだけ
    reload_gate: tokio::sync::Mutex<()>,
    reloads: AtomicU64,
}

impl GenerationHost {
    /// 最初の generation を組み立てて start する
    pub async fn start(factory: Arc<dyn GenerationFactory>) -> Result<Self, ReloadError> {
        let first = launch(factory.as_ref()).await?;
        tracing::info!(generation = %first.generation_id(), "initial generation started");
        Ok(Self {
            current: RwLock::new(first),
            factory,
            reload_gate: tokio::sync::Mutex::new(()),
            reloads: AtomicU64::new(0),
        })
    }

    pub fn current(&self) -> Arc<Loader> {
        Arc::clone(&self.current.read())
    }

    pub fn generation_id(&self) -> GenerationId {
        self.current.read().generation_id()
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// lookup against the current generation.
    ///
    /// A lookup that raced with a swap sees `LoaderStopped` from the old
    /// generation and is retried once against the new one.
    pub fn lookup(&self, name: &str) -> Result<Arc<ArtifactEntry>, LoaderError> {
        let loader = self.current();
        match loader.lookup(name) {
            Err(LoaderError::LoaderStopped) => {
                let latest = self.current();
                if Arc::ptr_eq(&loader, &latest) {
                    return Err(LoaderError::LoaderStopped);
                }
                latest.lookup(name)
            }
            other => other,
        }
    }

    /// staleness を確認し、必要なら入れ替える。入れ替えたら true
    pub async fn reload_if_stale(&self) -> Result<bool, ReloadError> {
        let _gate = self.reload_gate.lock().await;
        let current = self.current();
        let stale = tokio::task::spawn_blocking(move || current.check_modified()).await?;
        if !stale {
            return Ok(false);
        }
        self.swap().await?;
        Ok(true)
    }

    /// 無条件に入れ替える
    pub async fn reload(&self) -> Result<GenerationId, ReloadError> {
        let _gate = self.reload_gate.lock().await;
        self.swap().await
    }

    /// 現在の generation を stop する。以降の lookup は LoaderStopped
    pub async fn shutdown(&self) -> Result<(), ReloadError> {
        let _gate = self.reload_gate.lock().await;
        let current = self.current();
        tokio::task::spawn_blocking(move || current.stop()).await??;
        Ok(())
    }

    async fn swap(&self) -> Result<GenerationId, ReloadError> {
        let next = launch(self.factory.as_ref()).await?;
        let next_id = next.generation_id();
        let previous = std::mem::replace(&mut *self.current.write(), next);
        self.reloads.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            previous = %previous.generation_id(),
            generation = %next_id,
            "generation replaced"
        );

        let previous_id = previous.generation_id();
        match tokio::task::spawn_blocking(move || previous.stop()).await? {
            Ok(()) => {}
            Err(err) => {
                tracing::warn!(generation = %previous_id, error = %err, "previous generation not stopped cleanly");
            }
        }
        Ok(next_id)
    }
}

async fn launch(factory: &dyn GenerationFactory) -> Result<Arc<Loader>, ReloadError> {
    let loader = factory.build().await?;
    loader.start()?;
    Ok(Arc::new(loader))
}

/// ReloadLoop は周期的に GenerationHost::reload_if_stale() を呼ぶ
pub struct ReloadLoop {
    host: Arc<GenerationHost>,
    period: Duration,
}

impl ReloadLoop {
    /// 周期の既定値は `LoaderConfig::reload_period`
    pub fn new(host: Arc<GenerationHost>) -> Self {
        let period = host.current().config().reload_period();
        Self { host, period }
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn spawn(self) -> BackgroundLoop {
        let host = self.host;
        BackgroundLoop::spawn("reload", self.period, move || {
            let host = Arc::clone(&host);
            async move {
                if let Err(err) = host.reload_if_stale().await {
                    // 古い generation のまま次の周期で再試行
                    tracing::warn!(kind = ?err.kind(), error = %err, "reload failed");
                }
            }
        })
    }
}
