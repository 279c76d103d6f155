//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + ジェネリック実装
//! ID は ULID (Universally Unique Lexicographically Sortable Identifier) を使用します。
//! Phantom type パターンで `GenerationId` と `UnitId` の混同をコンパイル時に防ぎます。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 後から作られた generation ほど大きい
//! - **分散生成可能**: 複数の loader が同一プロセスに共存しても調整不要

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"generation-", "unit-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Loader generation のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Generation {}

impl IdMarker for Generation {
    fn prefix() -> &'static str {
        "generation-"
    }
}

/// Activated unit のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {}

impl IdMarker for Unit {
    fn prefix() -> &'static str {
        "unit-"
    }
}

/// Identifier of one loader generation (start → stop/discard).
pub type GenerationId = Id<Generation>;

/// Identifier of one activated unit.
pub type UnitId = Id<Unit>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let generation = GenerationId::from_ulid(ulid1);
        let unit = UnitId::from_ulid(ulid2);

        assert_eq!(generation.as_ulid(), ulid1);
        assert_eq!(unit.as_ulid(), ulid2);

        assert!(generation.to_string().starts_with("generation-"));
        assert!(unit.to_string().starts_with("unit-"));

        // let _: GenerationId = unit; // <- does not compile
    }

    #[test]
    fn later_generations_sort_after_earlier_ones() {
        let g1 = GenerationId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2)); // 時刻が進むのを待つ
        let g2 = GenerationId::from_ulid(Ulid::new());

        assert!(g1 < g2);
    }

    #[test]
    fn ids_can_be_serialized() {
        let unit_id = UnitId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&unit_id).unwrap();
        let deserialized: UnitId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(unit_id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<GenerationId>(), size_of::<Ulid>());
        assert_eq!(size_of::<UnitId>(), 16);
    }
}
