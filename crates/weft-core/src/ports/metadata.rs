//! MetadataProvider port - ファイルシステムのメタデータ
//!
//! Resolver（directory 参照）と StalenessTracker（re-stat / membership 再列挙）が使います。

use std::io;
use std::path::Path;

use crate::domain::FileStat;

/// MetadataProvider は stat と一覧を提供
///
/// # 設計原則
/// - エラーは `io::Error` のまま返す（分類は呼び出し側の責務）
/// - `list_entries` はディレクトリ直下のファイル名のみ（再帰しない）
pub trait MetadataProvider: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    fn list_entries(&self, dir: &Path) -> io::Result<Vec<String>>;
}
