//! 용량 제한 LRU 모델 캐시.
//!
//! 전역 상태 대신 명시적으로 생성해 `ModelManager`와 `Forecaster`에
//! 주입합니다. 용량 0이면 아무것도 보관하지 않습니다.

use crate::identity::ModelHash;
use pension_core::AssetClass;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// 캐시 키: (자산 클래스, 모델 해시).
pub type CacheKey = (AssetClass, ModelHash);

/// 캐시 적중 통계.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

/// LRU 캐시. 앞쪽이 가장 최근에 사용한 항목입니다.
#[derive(Debug)]
pub struct ModelCache<V> {
    capacity: usize,
    entries: VecDeque<(CacheKey, Arc<V>)>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> ModelCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.hits += 1;
                let entry = self.entries.remove(pos)?;
                let value = Arc::clone(&entry.1);
                self.entries.push_front(entry);
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: CacheKey, value: Arc<V>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|(k, _)| k != &key);
        self.entries.push_front((key, value));
        while self.entries.len() > self.capacity {
            if let Some(((class, hash), _)) = self.entries.pop_back() {
                self.evictions += 1;
                debug!(asset_class = %class, model_hash = %hash, "모델 캐시 축출");
            }
        }
    }

    /// 해시에 해당하는 항목을 모든 자산 클래스에서 제거합니다.
    pub fn invalidate(&mut self, hash: &ModelHash) -> usize {
        let before = self.entries.len();
        self.entries.retain(|((_, h), _)| h != hash);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(class: AssetClass, hash: &str) -> CacheKey {
        (class, hash.parse().unwrap())
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = ModelCache::new(2);
        cache.insert(key(AssetClass::Etf, "00000001"), Arc::new(1));
        cache.insert(key(AssetClass::Etf, "00000002"), Arc::new(2));

        // 1을 최근 사용으로 갱신 → 2가 축출 대상
        assert_eq!(cache.get(&key(AssetClass::Etf, "00000001")).as_deref(), Some(&1));
        cache.insert(key(AssetClass::Etf, "00000003"), Arc::new(3));

        assert!(cache.get(&key(AssetClass::Etf, "00000002")).is_none());
        assert!(cache.get(&key(AssetClass::Etf, "00000001")).is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = ModelCache::new(0);
        cache.insert(key(AssetClass::Fund, "0000000a"), Arc::new("x"));
        assert!(cache.is_empty());
        assert!(cache.get(&key(AssetClass::Fund, "0000000a")).is_none());
    }

    #[test]
    fn test_invalidate_across_classes() {
        let mut cache = ModelCache::new(4);
        cache.insert(key(AssetClass::Etf, "0000000b"), Arc::new(1));
        cache.insert(key(AssetClass::Fund, "0000000b"), Arc::new(2));
        cache.insert(key(AssetClass::Fund, "0000000c"), Arc::new(3));

        assert_eq!(cache.invalidate(&"0000000b".parse().unwrap()), 2);
        assert_eq!(cache.len(), 1);
    }
}
