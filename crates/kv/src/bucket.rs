use std::sync::Arc;

use crate::error::KvError;
use crate::range::{successor, KeyRange};
use crate::store::{Bulk, KvIterator, KvResult, SnapshotGetter, Store};

/// A logical namespace over a shared `Store`, formed by prepending a byte prefix to
/// every key. Buckets compose: `bucket.bucket(sub)` concatenates prefixes, so a
/// bucket-of-a-bucket behaves exactly like one bucket with the combined prefix.
#[derive(Clone)]
pub struct Bucket {
    store: Arc<dyn Store>,
    prefix: Vec<u8>,
}

impl Bucket {
    pub fn new(store: Arc<dyn Store>, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn bucket(&self, sub_prefix: impl AsRef<[u8]>) -> Bucket {
        let mut prefix = self.prefix.clone();
        prefix.extend_from_slice(sub_prefix.as_ref());
        Bucket {
            store: self.store.clone(),
            prefix,
        }
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        full
    }

    /// Translates a caller-supplied (unprefixed) range into the backing store's key
    /// space: an unbounded upper end becomes the prefix's natural successor, so
    /// iteration never crosses into a sibling bucket.
    fn absolute_range(&self, range: &KeyRange) -> KeyRange {
        let start = match &range.start {
            Some(s) => self.full_key(s),
            None => self.prefix.clone(),
        };
        let end = match &range.end {
            Some(e) => Some(self.full_key(e)),
            None => successor(&self.prefix),
        };
        KeyRange { start: Some(start), end }
    }
}

impl Store for Bucket {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.store.get(&self.full_key(key))
    }

    fn has(&self, key: &[u8]) -> KvResult<bool> {
        self.store.has(&self.full_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.store.put(&self.full_key(key), value)
    }

    fn delete(&self, key: &[u8]) -> KvResult<()> {
        self.store.delete(&self.full_key(key))
    }

    fn snapshot(&self) -> Box<dyn SnapshotGetter> {
        Box::new(BucketSnapshot {
            inner: self.store.snapshot(),
            prefix: self.prefix.clone(),
        })
    }

    fn bulk(&self) -> Box<dyn Bulk + '_> {
        Box::new(BucketBulk {
            inner: self.store.bulk(),
            prefix: self.prefix.clone(),
        })
    }

    fn iterate(&self, range: KeyRange) -> KvIterator<'_> {
        let absolute = self.absolute_range(&range);
        let prefix_len = self.prefix.len();
        Box::new(
            self.store
                .iterate(absolute)
                .map(move |item| item.map(|(k, v)| (k[prefix_len..].to_vec(), v))),
        )
    }

    fn delete_range(&self, range: KeyRange) -> KvResult<()> {
        self.store.delete_range(self.absolute_range(&range))
    }
}

struct BucketSnapshot {
    inner: Box<dyn SnapshotGetter>,
    prefix: Vec<u8>,
}

impl SnapshotGetter for BucketSnapshot {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        self.inner.get(&full)
    }

    fn has(&self, key: &[u8]) -> KvResult<bool> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        self.inner.has(&full)
    }
}

struct BucketBulk<'a> {
    inner: Box<dyn Bulk + 'a>,
    prefix: Vec<u8>,
}

impl BucketBulk<'_> {
    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        full
    }
}

impl Bulk for BucketBulk<'_> {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let full = self.full_key(&key);
        self.inner.put(full, value);
    }

    fn delete(&mut self, key: Vec<u8>) {
        let full = self.full_key(&key);
        self.inner.delete(full);
    }

    fn write(&mut self) -> KvResult<()> {
        self.inner.write()
    }

    fn set_auto_flush_threshold(&mut self, entries: usize) {
        self.inner.set_auto_flush_threshold(entries);
    }
}

/// Helper mirroring `crate::error::is_not_found` for call sites that only hold a
/// `KvError` produced through a bucket.
pub fn is_not_found(err: &KvError) -> bool {
    crate::error::is_not_found(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn bucket_isolates_keys_by_prefix() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let a = Bucket::new(store.clone(), b"a:".to_vec());
        let b = Bucket::new(store.clone(), b"b:".to_vec());
        a.put(b"x", b"1").unwrap();
        b.put(b"x", b"2").unwrap();
        assert_eq!(a.get(b"x").unwrap(), b"1");
        assert_eq!(b.get(b"x").unwrap(), b"2");
    }

    #[test]
    fn nested_bucket_concatenates_prefixes() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let outer = Bucket::new(store.clone(), b"s".to_vec());
        let inner = outer.bucket(b"123".to_vec());
        inner.put(b"key", b"value").unwrap();
        assert_eq!(store.get(b"s123key").unwrap(), b"value");
    }

    #[test]
    fn iterate_strips_prefix_and_stays_within_bucket() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let bucket = Bucket::new(store.clone(), b"a:".to_vec());
        bucket.put(b"1", b"one").unwrap();
        bucket.put(b"2", b"two").unwrap();
        store.put(b"b:1", b"other").unwrap();

        let keys: Vec<_> = bucket
            .iterate(KeyRange::all())
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"1".to_vec(), b"2".to_vec()]);
    }
}
