//! FallbackResolver port - 親スコープへの委譲
//!
//! ローカルのリポジトリがすべて miss したとき（delegate-first モードでは最初に）参照されます。
//! プロセス全体で共有される「システム」resolver はグローバルではなく、
//! Loader の構築時に注入します。

use crate::domain::LoaderError;

/// FallbackResolver は name に対応するバイト列を返す
///
/// - `Ok(None)`: このスコープにも存在しない
/// - `Err(_)`: resolver 自体の障害（Resolver はログを出して NotFound 扱いにする）
pub trait FallbackResolver: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Option<Vec<u8>>, LoaderError>;
}
