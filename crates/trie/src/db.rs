use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thor_kv::{is_not_found, Bucket, Store};

use crate::error::TrieError;

/// Content-addressed storage for hashed trie nodes, keyed by the raw bytes of their
/// `keccak256` hash. Inline (sub-32-byte) nodes never reach this trait: they live
/// entirely inside their parent's encoding.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError>;
    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError>;
}

/// In-memory `TrieDB`, the only backend this crate ships: production key-value
/// persistence is the concern of the pluggable store the state facade layers on top,
/// not of the trie itself.
#[derive(Clone, Default)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self.inner.lock().get(&key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner.lock().insert(key, value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock();
        for (key, value) in key_values {
            db.insert(key, value);
        }
        Ok(())
    }
}

/// Persists trie nodes into a `thor_kv` bucket (e.g. `"a"` for the account trie, or
/// `"s" ++ storage_id` for a per-account storage trie). Node hashes become the bucket's
/// unprefixed keys; the bucket's own prefix keeps tries sharing one backend from
/// colliding.
pub struct KvTrieDB {
    bucket: Bucket,
}

impl KvTrieDB {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }
}

impl TrieDB for KvTrieDB {
    fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, TrieError> {
        match self.bucket.get(&key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(TrieError::Store(err.to_string())),
        }
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), TrieError> {
        self.bucket
            .put(&key, &value)
            .map_err(|err| TrieError::Store(err.to_string()))
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let mut bulk = self.bucket.bulk();
        for (key, value) in key_values {
            bulk.put(key, value);
        }
        bulk.write().map_err(|err| TrieError::Store(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let db = InMemoryTrieDB::new();
        db.put(vec![1, 2], vec![9, 9, 9]).unwrap();
        assert_eq!(db.get(vec![1, 2]).unwrap(), Some(vec![9, 9, 9]));
        assert_eq!(db.get(vec![3]).unwrap(), None);
    }

    #[test]
    fn put_batch_inserts_all_entries() {
        let db = InMemoryTrieDB::new();
        db.put_batch(vec![(vec![1], vec![10]), (vec![2], vec![20])])
            .unwrap();
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn kv_trie_db_isolates_by_bucket_prefix() {
        let store: Arc<dyn Store> = Arc::new(thor_kv::InMemoryStore::new());
        let account_db = KvTrieDB::new(Bucket::new(store.clone(), b"a".to_vec()));
        let storage_db = KvTrieDB::new(Bucket::new(store, b"s1".to_vec()));
        account_db.put(vec![1], vec![100]).unwrap();
        storage_db.put(vec![1], vec![200]).unwrap();
        assert_eq!(account_db.get(vec![1]).unwrap(), Some(vec![100]));
        assert_eq!(storage_db.get(vec![1]).unwrap(), Some(vec![200]));
    }
}
