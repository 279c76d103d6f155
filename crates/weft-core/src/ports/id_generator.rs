//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock の時刻を timestamp 部に使う）

use crate::domain::ids::{GenerationId, UnitId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は generation と activated unit の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（activation sink が複数スレッドから呼ぶ）
pub trait IdGenerator: Send + Sync {
    fn generate_generation_id(&self) -> GenerationId;

    fn generate_unit_id(&self) -> UnitId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になります（ランダム部は異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_generation_id(&self) -> GenerationId {
        GenerationId::from(self.next_ulid())
    }

    fn generate_unit_id(&self) -> UnitId {
        UnitId::from(self.next_ulid())
    }
}
