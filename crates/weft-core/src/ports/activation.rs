//! ActivationSink port - バイト列から実行可能な unit を作る
//!
//! プラットフォーム固有の「リンク・ロード」はすべてこの trait の裏側に隠します。
//! ArtifactCache は per-name ロックを保持した状態で `activate` を呼ぶので、
//! 同一 name に対して並行に呼ばれることはありません。

use crate::domain::{ActivatedUnit, Certificate, Provenance};

/// Activation への入力
#[derive(Debug, Clone, Copy)]
pub struct ActivationRequest<'a> {
    pub name: &'a str,
    pub bytes: &'a [u8],
    pub provenance: Option<&'a Provenance>,
    pub certificates: Option<&'a [Certificate]>,
}

/// Sink が activation を拒否した理由
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ActivationRejected {
    pub reason: String,
}

impl ActivationRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// ActivationSink は 1 メソッドだけの capability
pub trait ActivationSink: Send + Sync {
    fn activate(&self, request: ActivationRequest<'_>) -> Result<ActivatedUnit, ActivationRejected>;
}
