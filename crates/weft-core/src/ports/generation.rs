//! GenerationFactory port - 新しい generation を一から組み立てる
//!
//! ReloadLoop が staleness を検出したときに呼びます。
//! 部分的な再構築はせず、毎回まっさらな Loader を返すこと。

use async_trait::async_trait;

use crate::app::builder::BuildError;
use crate::loader::Loader;

#[async_trait]
pub trait GenerationFactory: Send + Sync {
    async fn build(&self) -> Result<Loader, BuildError>;
}
