use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::KvError;
use crate::range::KeyRange;

pub type KvResult<T> = Result<T, KvError>;
pub type KvIterator<'a> = Box<dyn DoubleEndedIterator<Item = KvResult<(Vec<u8>, Vec<u8>)>> + 'a>;

/// A consistent read-only view captured at the moment `snapshot()` was called; writes
/// to the store afterward are not visible through it.
pub trait SnapshotGetter: Send + Sync {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>>;
    fn has(&self, key: &[u8]) -> KvResult<bool>;
}

/// Buffers writes and applies them atomically on `write()`. `auto_flush_threshold`
/// lets non-atomic bulk loads (e.g. replaying a snapshot) flush incrementally instead
/// of holding the whole buffer in memory.
pub trait Bulk {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);
    fn delete(&mut self, key: Vec<u8>);
    fn write(&mut self) -> KvResult<()>;
    fn set_auto_flush_threshold(&mut self, entries: usize);
}

/// The key-value interface every backend (and `Bucket`) implements.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>>;
    fn has(&self, key: &[u8]) -> KvResult<bool>;
    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()>;
    fn delete(&self, key: &[u8]) -> KvResult<()>;
    fn snapshot(&self) -> Box<dyn SnapshotGetter>;
    fn bulk(&self) -> Box<dyn Bulk + '_>;
    fn iterate(&self, range: KeyRange) -> KvIterator<'_>;
    fn delete_range(&self, range: KeyRange) -> KvResult<()>;
}

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// The only backend this crate ships. Production persistence (RocksDB, MDBX, etc.) is
/// the concern of a separate backend crate implementing the same `Store` trait; this
/// one exists for tests and for embedding the state engine without an external store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Table>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.inner.read().get(key).cloned().ok_or(KvError::NotFound)
    }

    fn has(&self, key: &[u8]) -> KvResult<bool> {
        Ok(self.inner.read().contains_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> KvResult<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn SnapshotGetter> {
        Box::new(InMemorySnapshot {
            data: self.inner.read().clone(),
        })
    }

    fn bulk(&self) -> Box<dyn Bulk + '_> {
        Box::new(InMemoryBulk {
            store: self,
            writes: Vec::new(),
            auto_flush_threshold: None,
        })
    }

    fn iterate(&self, range: KeyRange) -> KvIterator<'_> {
        let (start, end) = range.as_bounds();
        let items: Vec<_> = self
            .inner
            .read()
            .range((start, end))
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Box::new(items.into_iter())
    }

    fn delete_range(&self, range: KeyRange) -> KvResult<()> {
        let (start, end) = range.as_bounds();
        let mut db = self.inner.write();
        let keys: Vec<_> = db.range((start, end)).map(|(k, _)| k.clone()).collect();
        for key in keys {
            db.remove(&key);
        }
        Ok(())
    }
}

struct InMemorySnapshot {
    data: Table,
}

impl SnapshotGetter for InMemorySnapshot {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.data.get(key).cloned().ok_or(KvError::NotFound)
    }

    fn has(&self, key: &[u8]) -> KvResult<bool> {
        Ok(self.data.contains_key(key))
    }
}

enum PendingWrite {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

struct InMemoryBulk<'a> {
    store: &'a InMemoryStore,
    writes: Vec<PendingWrite>,
    auto_flush_threshold: Option<usize>,
}

impl InMemoryBulk<'_> {
    fn maybe_auto_flush(&mut self) {
        if let Some(threshold) = self.auto_flush_threshold {
            if self.writes.len() >= threshold {
                let _ = self.flush();
            }
        }
    }

    fn flush(&mut self) -> KvResult<()> {
        let mut db = self.store.inner.write();
        for write in self.writes.drain(..) {
            match write {
                PendingWrite::Put(k, v) => {
                    db.insert(k, v);
                }
                PendingWrite::Delete(k) => {
                    db.remove(&k);
                }
            }
        }
        Ok(())
    }
}

impl Bulk for InMemoryBulk<'_> {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.push(PendingWrite::Put(key, value));
        self.maybe_auto_flush();
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.writes.push(PendingWrite::Delete(key));
        self.maybe_auto_flush();
    }

    fn write(&mut self) -> KvResult<()> {
        self.flush()
    }

    fn set_auto_flush_threshold(&mut self, entries: usize) {
        self.auto_flush_threshold = Some(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = InMemoryStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert!(store.has(b"a").unwrap());
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get(b"missing").unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_writes() {
        let store = InMemoryStore::new();
        store.put(b"a", b"1").unwrap();
        let snap = store.snapshot();
        store.put(b"a", b"2").unwrap();
        store.delete(b"a").unwrap();
        assert_eq!(snap.get(b"a").unwrap(), b"1");
    }

    #[test]
    fn bulk_writes_apply_atomically_on_write() {
        let store = InMemoryStore::new();
        {
            let mut bulk = store.bulk();
            bulk.put(b"a".to_vec(), b"1".to_vec());
            bulk.put(b"b".to_vec(), b"2".to_vec());
            assert!(store.get(b"a").is_err());
            bulk.write().unwrap();
        }
        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert_eq!(store.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn iterate_respects_key_range() {
        let store = InMemoryStore::new();
        for k in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()] {
            store.put(&k, b"v").unwrap();
        }
        let collected: Vec<_> = store
            .iterate(KeyRange::between(b"b".to_vec(), b"d".to_vec()))
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(collected, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn delete_range_removes_only_the_matched_keys() {
        let store = InMemoryStore::new();
        for k in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()] {
            store.put(&k, b"v").unwrap();
        }
        store.delete_range(KeyRange::from(b"b".to_vec())).unwrap();
        assert!(store.has(b"a").unwrap());
        assert!(!store.has(b"b").unwrap());
        assert!(!store.has(b"c").unwrap());
    }
}
