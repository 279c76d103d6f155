//! Loader - レイヤード解決エンジン
//!
//! # 構成
//! - **RepositorySet**: 検索順の決まったリポジトリ一覧
//! - **ArchiveHandlePool**: アーカイブ handle の遅延 open / idle close
//! - **ArtifactCache**: 正・負のキャッシュと at-most-once activation
//! - **Resolver**: 名前検証と順序付き探索
//! - **StalenessTracker**: 変更検出（レート制限付き）
//! - **Loader**: 上記を束ねた 1 generation
//!
//! # フロー
//! ```text
//! lookup(name) → validate → cache hit? → repositories 順に探索 → fallback
//!                                    ↓
//!                           code なら ActivationSink へ（1 回だけ）
//! ```

pub mod archive_pool;
pub mod cache;
pub mod generation;
pub mod repository_set;
pub mod resolver;
pub mod staleness;

pub use self::archive_pool::{ArchiveHandlePool, ArchiveRead};
pub use self::cache::ArtifactCache;
pub use self::generation::{Collaborators, Lifecycle, Loader};
pub use self::repository_set::{Registration, RepositorySet};
pub use self::resolver::{FALLBACK_ORIGIN, Resolver};
pub use self::staleness::StalenessTracker;
