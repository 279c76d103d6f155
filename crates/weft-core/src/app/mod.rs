//! App - アプリケーション層
//!
//! loader を組み立て、所有し、周期タスクで面倒を見る層です。
//!
//! # 主要コンポーネント
//! - **LoaderBuilder**: generation の構築とワイヤリング
//! - **GenerationHost**: 現在の generation の保持と入れ替え
//! - **ReloadLoop**: staleness を検出して入れ替える周期タスク
//! - **IdleCloseLoop**: archive handle の idle close
//! - **LoaderStatus**: generation のスナップショット

pub mod background;
pub mod builder;
pub mod idle_close_loop;
pub mod reload_loop;
pub mod status;

pub use self::background::BackgroundLoop;
pub use self::builder::{BuildError, LoaderBuilder};
pub use self::idle_close_loop::IdleCloseLoop;
pub use self::reload_loop::{GenerationHost, ReloadError, ReloadLoop};
pub use self::status::LoaderStatus;
