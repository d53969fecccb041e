use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use thor_common::{Account, AccountMetadata, Address, BigInt, Hash, WEI_PER_ETHER};
use thor_kv::{Bucket, Bulk, Store};
use thor_rlp::encode::RLPEncode;
use thor_trie::{SecureTrie, EMPTY_TRIE_HASH};

use crate::account_store::AccountStore;
use crate::cached_object::CachedObject;
use crate::code_cache::CodeCache;
use crate::error::StateError;
use crate::key::{Key, Value};
use crate::params::ProtocolParams;
use crate::stacked_map::StackedMap;
use crate::storage_codec::{decode_storage_word, encode_storage_word};
use tracing::{debug, instrument};

/// The public world-state API used by the execution engine (§4.6). Reads route through
/// the journaled overlay, then the per-account cache, then the account/storage tries;
/// writes land only in the overlay until [`State::stage`] walks the journal.
pub struct State {
    account_store: AccountStore,
    overlay: StackedMap,
    object_cache: HashMap<Address, CachedObject>,
    code_cache: CodeCache,
    params: ProtocolParams,
    steady_block_num: u64,
    storage_id_seq: u64,
}

impl State {
    /// Opens a read-write view of the world at `root`. `steady_block_num` is the
    /// watermark below which state is considered finalized; this in-memory
    /// implementation records it but has no separate fast path to gate on it.
    pub fn state_at(
        kv: Arc<dyn Store>,
        root: Hash,
        steady_block_num: u64,
        params: ProtocolParams,
        code_cache: CodeCache,
    ) -> Self {
        Self {
            account_store: AccountStore::open(kv, root),
            overlay: StackedMap::new(),
            object_cache: HashMap::new(),
            code_cache,
            params,
            steady_block_num,
            storage_id_seq: 0,
        }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    fn ensure_cached(&mut self, addr: Address) -> Result<(), StateError> {
        if !self.object_cache.contains_key(&addr) {
            let (account, metadata) = self.account_store.load_account(addr)?;
            self.object_cache.insert(addr, CachedObject::new(account, metadata));
        }
        Ok(())
    }

    fn resolve_account(&mut self, addr: Address) -> Result<Account, StateError> {
        if let Some(Value::Account(account)) = self.overlay.get(&Key::Account(addr)) {
            return Ok(account.clone());
        }
        self.ensure_cached(addr)?;
        Ok(self.object_cache[&addr].account.clone())
    }

    fn put_account(&mut self, addr: Address, account: Account) {
        self.overlay.put(Key::Account(addr), Value::Account(account));
    }

    fn current_barrier(&self, addr: Address) -> u64 {
        match self.overlay.get(&Key::StorageBarrier(addr)) {
            Some(Value::Barrier(n)) => *n,
            _ => 0,
        }
    }

    pub fn get_balance(&mut self, addr: Address) -> Result<BigInt, StateError> {
        Ok(self.resolve_account(addr)?.balance)
    }

    pub fn set_balance(&mut self, addr: Address, balance: BigInt) -> Result<(), StateError> {
        let mut account = self.resolve_account(addr)?;
        account.balance = balance;
        self.put_account(addr, account);
        Ok(())
    }

    /// `account.energy + (t − account.block_time) × balance × growth_rate / 1e18`,
    /// only when the balance is non-zero and `t` is past the last materialization.
    pub fn get_energy(&mut self, addr: Address, block_time: u64) -> Result<BigInt, StateError> {
        let account = self.resolve_account(addr)?;
        Ok(accrue_energy(&account, block_time, &self.params.growth_rate))
    }

    pub fn set_energy(&mut self, addr: Address, energy: BigInt, block_time: u64) -> Result<(), StateError> {
        let mut account = self.resolve_account(addr)?;
        account.energy = energy;
        account.block_time = block_time;
        self.put_account(addr, account);
        Ok(())
    }

    pub fn get_master(&mut self, addr: Address) -> Result<Address, StateError> {
        Ok(self.resolve_account(addr)?.master.unwrap_or_default())
    }

    /// A zero address clears the field.
    pub fn set_master(&mut self, addr: Address, master: Address) -> Result<(), StateError> {
        let mut account = self.resolve_account(addr)?;
        account.master = if master.is_zero() { None } else { Some(master) };
        self.put_account(addr, account);
        Ok(())
    }

    pub fn get_raw_storage(&mut self, addr: Address, key: Hash) -> Result<Bytes, StateError> {
        let barrier = self.current_barrier(addr);
        if let Some(Value::Storage(raw)) = self.overlay.get(&Key::Storage { addr, barrier, key }) {
            return Ok(raw.clone());
        }
        if barrier > 0 {
            return Ok(Bytes::new());
        }
        self.ensure_cached(addr)?;
        let object = self.object_cache.get_mut(&addr).expect("ensured above");
        object.get_storage_raw(key, &self.account_store)
    }

    /// A zero-length `raw` deletes the slot; see [`crate::storage_codec`] for the
    /// word-decoding policy applied by [`State::get_storage`].
    pub fn set_raw_storage(&mut self, addr: Address, key: Hash, raw: Bytes) -> Result<(), StateError> {
        let barrier = self.current_barrier(addr);
        self.overlay.put(Key::Storage { addr, barrier, key }, Value::Storage(raw));
        Ok(())
    }

    pub fn decode_storage(&self, raw: &[u8]) -> Result<Hash, StateError> {
        Ok(decode_storage_word(raw)?)
    }

    pub fn encode_storage(&self, value: Hash) -> Bytes {
        encode_storage_word(value)
    }

    pub fn get_storage(&mut self, addr: Address, key: Hash) -> Result<Hash, StateError> {
        let raw = self.get_raw_storage(addr, key)?;
        self.decode_storage(&raw)
    }

    /// A zero `value` deletes the entry.
    pub fn set_storage(&mut self, addr: Address, key: Hash, value: Hash) -> Result<(), StateError> {
        let raw = self.encode_storage(value);
        self.set_raw_storage(addr, key, raw)
    }

    pub fn get_code_hash(&mut self, addr: Address) -> Result<Hash, StateError> {
        Ok(self.resolve_account(addr)?.code_hash.unwrap_or_default())
    }

    pub fn get_code(&mut self, addr: Address) -> Result<Bytes, StateError> {
        if let Some(Value::Code(code)) = self.overlay.get(&Key::Code(addr)) {
            return Ok(code.clone());
        }
        self.ensure_cached(addr)?;
        let object = self.object_cache.get_mut(&addr).expect("ensured above");
        object.get_code(&self.account_store, &self.code_cache)
    }

    /// Empty `code` clears both the account's `code_hash` and the overlay's pending
    /// code entry.
    pub fn set_code(&mut self, addr: Address, code: Bytes) -> Result<(), StateError> {
        let mut account = self.resolve_account(addr)?;
        if code.is_empty() {
            account.code_hash = None;
            self.overlay.put(Key::Code(addr), Value::Code(Bytes::new()));
        } else {
            account.code_hash = Some(thor_crypto::keccak256(&code));
            self.overlay.put(Key::Code(addr), Value::Code(code));
        }
        self.put_account(addr, account);
        Ok(())
    }

    pub fn exists(&mut self, addr: Address) -> Result<bool, StateError> {
        Ok(!self.resolve_account(addr)?.is_empty())
    }

    /// Clears code, writes an empty account, and increments the per-account storage
    /// barrier so every storage read for `addr` in this block reads as empty from here
    /// on, without physically touching the trie (that happens at `stage` time).
    pub fn delete(&mut self, addr: Address) -> Result<(), StateError> {
        self.overlay.put(Key::Code(addr), Value::Code(Bytes::new()));
        self.put_account(addr, Account::default());
        let barrier = self.current_barrier(addr) + 1;
        self.overlay.put(Key::StorageBarrier(addr), Value::Barrier(barrier));
        Ok(())
    }

    pub fn new_checkpoint(&mut self) -> usize {
        self.overlay.push()
    }

    pub fn revert_to(&mut self, handle: usize) {
        self.overlay.pop_to(handle);
    }

    /// The base storage trie for `addr` plus its pending overlay writes at the current
    /// barrier, for debug and trie-level operations. Never committed back.
    pub fn build_storage_trie(&mut self, addr: Address) -> Result<SecureTrie, StateError> {
        let barrier = self.current_barrier(addr);
        let account = self.resolve_account(addr)?;
        self.ensure_cached(addr)?;
        let storage_id = self.object_cache[&addr].metadata.storage_id.clone();

        let mut trie = match account.storage_root {
            Some(root) => self.account_store.open_storage_trie(&storage_id, root),
            None => self.account_store.new_storage_trie(&storage_id),
        };

        let mut pending = Vec::new();
        self.overlay.journal(|entry_key, entry_value| {
            if let (Key::Storage { addr: a, barrier: b, key: slot }, Value::Storage(raw)) =
                (entry_key, entry_value)
            {
                if *a == addr && *b == barrier {
                    pending.push((*slot, raw.clone()));
                }
            }
            true
        });
        for (slot, raw) in pending {
            trie.update(slot.as_bytes(), raw, Bytes::new())?;
        }
        Ok(trie)
    }

    /// Walks the journal once (§4.6's `stage` algorithm), producing the would-be
    /// account-trie root and a [`Stage`] holding everything a later `commit` needs to
    /// flush. Computing the root never touches the backing store.
    #[instrument(level = "debug", name = "state.stage", skip(self), err)]
    pub fn stage(&mut self, new_block_num: u64, new_conflicts: u32) -> Result<(Hash, Stage), StateError> {
        #[derive(Default)]
        struct ChangedAccount {
            data: Option<Account>,
            storage: HashMap<Hash, Bytes>,
            reset: bool,
        }

        let mut changed: HashMap<Address, ChangedAccount> = HashMap::new();
        let mut codes: HashMap<Hash, Bytes> = HashMap::new();

        self.overlay.journal(|key, value| {
            match (key, value) {
                (Key::Account(addr), Value::Account(account)) => {
                    changed.entry(*addr).or_insert_with(ChangedAccount::default).data = Some(account.clone());
                }
                (Key::Code(_addr), Value::Code(code)) => {
                    if !code.is_empty() {
                        codes.insert(thor_crypto::keccak256(code), code.clone());
                    }
                }
                (Key::Storage { addr, key: slot, .. }, Value::Storage(raw)) => {
                    changed
                        .entry(*addr)
                        .or_insert_with(ChangedAccount::default)
                        .storage
                        .insert(*slot, raw.clone());
                }
                (Key::StorageBarrier(addr), Value::Barrier(_)) => {
                    let entry = changed.entry(*addr).or_insert_with(ChangedAccount::default);
                    entry.reset = true;
                    entry.storage.clear();
                }
                _ => {}
            }
            true
        });

        let mut account_trie = self.account_store.account_trie().copy();
        let mut storage_tries = Vec::new();

        for (addr, ch) in changed {
            let (base_account, mut metadata) = self.account_store.load_account(addr)?;
            let mut account = ch.data.unwrap_or(base_account);

            if account.is_empty() {
                account_trie.update(addr.as_bytes(), Bytes::new(), Bytes::new())?;
                continue;
            }

            if ch.reset {
                metadata.storage_id = next_storage_id(new_block_num, new_conflicts, &mut self.storage_id_seq);
            }

            if ch.reset || !ch.storage.is_empty() {
                let mut storage_trie = if ch.reset || account.storage_root.is_none() {
                    self.account_store.new_storage_trie(&metadata.storage_id)
                } else {
                    self.account_store
                        .open_storage_trie(&metadata.storage_id, account.storage_root.expect("checked above"))
                };
                for (slot, raw) in ch.storage {
                    storage_trie.update(slot.as_bytes(), raw, Bytes::new())?;
                }
                let new_root = storage_trie.stage(new_block_num, new_conflicts);
                account.storage_root = if new_root == *EMPTY_TRIE_HASH { None } else { Some(new_root) };
                metadata.storage_major = new_block_num as u32;
                metadata.storage_minor = new_conflicts;
                storage_tries.push(storage_trie);
            }

            let value = Bytes::from(account.encode_to_vec());
            let meta = if metadata.is_default() {
                Bytes::new()
            } else {
                Bytes::from(metadata.encode_to_vec())
            };
            account_trie.update(addr.as_bytes(), value, meta)?;
        }

        let root = account_trie.stage(new_block_num, new_conflicts);
        let stage = Stage {
            account_trie,
            storage_tries,
            codes: codes.into_iter().collect(),
            code_bucket: self.account_store.code_bucket_handle(),
        };
        Ok((root, stage))
    }
}

fn accrue_energy(account: &Account, block_time: u64, growth_rate: &BigInt) -> BigInt {
    if account.balance.is_zero() || block_time <= account.block_time {
        return account.energy;
    }
    let delta_t = BigInt::from(block_time - account.block_time);
    let accrued = delta_t * account.balance * *growth_rate / BigInt::from(WEI_PER_ETHER);
    account.energy + accrued
}

fn next_storage_id(block_num: u64, conflicts: u32, seq: &mut u64) -> Bytes {
    let id = *seq;
    *seq += 1;
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&block_num.to_be_bytes());
    buf.extend_from_slice(&conflicts.to_be_bytes());
    buf.extend_from_slice(&id.to_be_bytes());
    Bytes::from(buf)
}

/// Two-phase commit handle returned by [`State::stage`]: the root is already computed;
/// `commit` flushes the staged tries and code back to the store, in order.
pub struct Stage {
    account_trie: SecureTrie,
    storage_tries: Vec<SecureTrie>,
    codes: Vec<(Hash, Bytes)>,
    code_bucket: Bucket,
}

impl Stage {
    pub fn root(&self) -> Hash {
        self.account_trie.hash()
    }

    #[instrument(level = "debug", name = "stage.commit", skip(self), err)]
    pub fn commit(mut self) -> Result<(), StateError> {
        let root = self.root();
        let storage_tries = self.storage_tries.len();
        let codes = self.codes.len();
        for trie in &mut self.storage_tries {
            trie.commit()?;
        }
        self.account_trie.commit()?;
        let mut bulk = self.code_bucket.bulk();
        for (hash, code) in self.codes {
            bulk.put(hash.as_bytes().to_vec(), code.to_vec());
        }
        bulk.write()?;
        debug!(root = ?root, storage_tries, codes, "stage committed");
        Ok(())
    }
}
