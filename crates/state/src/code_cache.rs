use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use thor_common::Hash;

/// Process-wide contract-code cache, keyed by code hash and shared across every
/// `State` instance. A pure optimization: correctness never depends on a hit here,
/// only on the fallback to the `codeStore` bucket on a miss.
#[derive(Clone)]
pub struct CodeCache {
    inner: Arc<Mutex<LruCache<Hash, Bytes>>>,
}

impl CodeCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<Bytes> {
        self.inner.lock().get(hash).cloned()
    }

    pub fn insert(&self, hash: Hash, code: Bytes) {
        self.inner.lock().put(hash, code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_insert_then_hit() {
        let cache = CodeCache::new(4);
        let hash = Hash::repeat_byte(1);
        assert!(cache.get(&hash).is_none());
        cache.insert(hash, Bytes::from_static(b"bytecode"));
        assert_eq!(cache.get(&hash), Some(Bytes::from_static(b"bytecode")));
    }

    #[test]
    fn evicts_least_recently_used_once_full() {
        let cache = CodeCache::new(1);
        let a = Hash::repeat_byte(1);
        let b = Hash::repeat_byte(2);
        cache.insert(a, Bytes::from_static(b"a"));
        cache.insert(b, Bytes::from_static(b"b"));
        assert!(cache.get(&a).is_none());
        assert_eq!(cache.get(&b), Some(Bytes::from_static(b"b")));
    }
}
