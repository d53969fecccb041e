use std::sync::Arc;

use bytes::Bytes;
use thor_common::{Account, AccountMetadata, Address, Hash};
use thor_kv::{is_not_found, Bucket, Bulk, Store};
use thor_rlp::decode::RLPDecode;
use thor_rlp::encode::RLPEncode;
use thor_trie::{KvTrieDB, SecureTrie, TrieDB};

use crate::error::StateError;

/// Owns the single global account trie (bucket `"a"`) and wires up per-account storage
/// tries (bucket `"s" ++ storage_id`) and the shared code store (bucket `"state.code"`)
/// over one physical `Store`.
pub struct AccountStore {
    kv: Arc<dyn Store>,
    account_trie: SecureTrie,
    code_bucket: Bucket,
}

impl AccountStore {
    pub fn open(kv: Arc<dyn Store>, account_root: Hash) -> Self {
        let account_db: Arc<dyn TrieDB> = Arc::new(KvTrieDB::new(Bucket::new(kv.clone(), b"a".to_vec())));
        let code_bucket = Bucket::new(kv.clone(), b"state.code".to_vec());
        Self {
            kv,
            account_trie: SecureTrie::open(account_db, account_root),
            code_bucket,
        }
    }

    pub fn account_root(&self) -> Hash {
        self.account_trie.hash()
    }

    pub fn account_trie(&mut self) -> &mut SecureTrie {
        &mut self.account_trie
    }

    /// Cheap copy-on-write fork: shares the backing store and current account root,
    /// starting with an empty trie dirty layer of its own.
    pub fn copy(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            account_trie: self.account_trie.copy(),
            code_bucket: self.code_bucket.clone(),
        }
    }

    pub fn load_account(&self, addr: Address) -> Result<(Account, AccountMetadata), StateError> {
        let (value, metadata) = self.account_trie.get(addr.as_bytes())?;
        let account = if value.is_empty() {
            Account::default()
        } else {
            Account::decode(&value)?
        };
        let metadata = if metadata.is_empty() {
            AccountMetadata::default()
        } else {
            AccountMetadata::decode(&metadata)?
        };
        Ok((account, metadata))
    }

    /// An empty account deletes its leaf; otherwise the body and metadata are
    /// re-encoded and saved together (§4.3).
    pub fn save_account(
        &mut self,
        addr: Address,
        account: &Account,
        metadata: &AccountMetadata,
    ) -> Result<(), StateError> {
        let (value, meta) = if account.is_empty() {
            (Bytes::new(), Bytes::new())
        } else {
            let meta = if metadata.is_default() {
                Bytes::new()
            } else {
                Bytes::from(metadata.encode_to_vec())
            };
            (Bytes::from(account.encode_to_vec()), meta)
        };
        self.account_trie.update(addr.as_bytes(), value, meta)?;
        Ok(())
    }

    /// Opens the storage trie for a generation identified by `storage_id` at `root`.
    pub fn open_storage_trie(&self, storage_id: &Bytes, root: Hash) -> SecureTrie {
        let db: Arc<dyn TrieDB> = Arc::new(KvTrieDB::new(self.storage_bucket(storage_id)));
        SecureTrie::open(db, root)
    }

    /// Opens a fresh (empty) storage trie for a newly assigned `storage_id`.
    pub fn new_storage_trie(&self, storage_id: &Bytes) -> SecureTrie {
        let db: Arc<dyn TrieDB> = Arc::new(KvTrieDB::new(self.storage_bucket(storage_id)));
        SecureTrie::new(db)
    }

    fn storage_bucket(&self, storage_id: &Bytes) -> Bucket {
        let mut prefix = b"s".to_vec();
        prefix.extend_from_slice(storage_id);
        Bucket::new(self.kv.clone(), prefix)
    }

    pub fn load_code(&self, hash: Hash) -> Result<Bytes, StateError> {
        match self.code_bucket.get(hash.as_bytes()) {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if is_not_found(&err) => Ok(Bytes::new()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save_codes(&self, codes: impl IntoIterator<Item = (Hash, Bytes)>) -> Result<(), StateError> {
        let mut bulk = self.code_bucket.bulk();
        for (hash, code) in codes {
            bulk.put(hash.as_bytes().to_vec(), code.to_vec());
        }
        bulk.write()?;
        Ok(())
    }

    /// A handle to the shared code bucket, for a [`crate::state::Stage`] to flush
    /// staged code into at commit time.
    pub fn code_bucket_handle(&self) -> Bucket {
        self.code_bucket.clone()
    }
}
