//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は loader の外側の協調者（親 resolver、ファイルシステム、
//! プラットフォームの activation、時刻）へのインターフェースです。
//!
//! # 設計原則
//! - プロセス全体の共有状態（trust policy、システム resolver）は注入する
//! - テストでは fake に差し替えられる
//! - 同一プロセスに複数の generation が共存できる

pub mod activation;
pub mod clock;
pub mod fallback;
pub mod generation;
pub mod id_generator;
pub mod metadata;

pub use self::activation::{ActivationRejected, ActivationRequest, ActivationSink};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::fallback::FallbackResolver;
pub use self::generation::GenerationFactory;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::metadata::MetadataProvider;
