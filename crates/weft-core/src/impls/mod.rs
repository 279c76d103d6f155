//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **NativeMetadata**: std::fs による MetadataProvider
//! - **NoFallback / StaticFallback**: FallbackResolver
//! - **RecordingActivationSink**: 開発・テスト用の ActivationSink
//!
//! 本番のプラットフォーム binding（実際のリンク・ロード）は別クレートで
//! ActivationSink を実装します。

pub mod fallback;
pub mod native_metadata;
pub mod recording_sink;

pub use self::fallback::{NoFallback, StaticFallback};
pub use self::native_metadata::NativeMetadata;
pub use self::recording_sink::{RecordedUnit, RecordingActivationSink};
