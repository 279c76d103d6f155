//! FallbackResolver の実装
//!
//! - **NoFallback**: 何も返さない（親スコープなし）
//! - **StaticFallback**: メモリ上の name → bytes（テスト・デモ用）

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::LoaderError;
use crate::ports::FallbackResolver;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackResolver for NoFallback {
    fn lookup(&self, _name: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct StaticFallback {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl StaticFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.write().insert(name.into(), bytes.into());
    }
}

impl FallbackResolver for StaticFallback {
    fn lookup(&self, name: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        Ok(self.entries.read().get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fallback_returns_registered_bytes() {
        let fallback = StaticFallback::new().with_entry("a.txt", "parent");
        assert_eq!(fallback.lookup("a.txt").unwrap(), Some(b"parent".to_vec()));
        assert_eq!(fallback.lookup("b.txt").unwrap(), None);
    }

    #[test]
    fn no_fallback_never_resolves() {
        assert_eq!(NoFallback.lookup("anything").unwrap(), None);
    }
}
