use std::collections::HashMap;

use bytes::Bytes;
use thor_common::{Account, AccountMetadata, Hash};
use thor_trie::SecureTrie;

use crate::account_store::AccountStore;
use crate::code_cache::CodeCache;
use crate::error::StateError;

/// Per-account read-through cache, lazily populated on first access within a `State`'s
/// lifetime: the account's storage trie handle, a cache of slots read through it, and
/// its contract code (falling through a process-wide LRU before the code store).
pub struct CachedObject {
    pub account: Account,
    pub metadata: AccountMetadata,
    storage_trie: Option<SecureTrie>,
    slot_cache: HashMap<Hash, Bytes>,
    code: Option<Bytes>,
}

impl CachedObject {
    pub fn new(account: Account, metadata: AccountMetadata) -> Self {
        Self {
            account,
            metadata,
            storage_trie: None,
            slot_cache: HashMap::new(),
            code: None,
        }
    }

    /// Raw RLP storage payload for `key` (empty if absent). Populates the slot cache
    /// on a trie read.
    pub fn get_storage_raw(&mut self, key: Hash, store: &AccountStore) -> Result<Bytes, StateError> {
        if let Some(cached) = self.slot_cache.get(&key) {
            return Ok(cached.clone());
        }
        let Some(root) = self.account.storage_root else {
            return Ok(Bytes::new());
        };
        let trie = self
            .storage_trie
            .get_or_insert_with(|| store.open_storage_trie(&self.metadata.storage_id, root));
        let (value, _metadata) = trie.get(key.as_bytes())?;
        self.slot_cache.insert(key, value.clone());
        Ok(value)
    }

    pub fn get_code(&mut self, store: &AccountStore, code_cache: &CodeCache) -> Result<Bytes, StateError> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        let Some(hash) = self.account.code_hash else {
            return Ok(Bytes::new());
        };
        if let Some(code) = code_cache.get(&hash) {
            self.code = Some(code.clone());
            return Ok(code);
        }
        let code = store.load_code(hash)?;
        code_cache.insert(hash, code.clone());
        self.code = Some(code.clone());
        Ok(code)
    }
}
