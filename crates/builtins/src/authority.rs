use bytes::{BufMut, Bytes};
use thor_common::{Address, BigInt, Hash};
use thor_crypto::blake2b256;
use thor_rlp::decode::RLPDecode;
use thor_rlp::encode::RLPEncode;
use thor_rlp::error::RLPDecodeError;
use thor_rlp::structs::{Decoder, Encoder};
use thor_state::State;
use tracing::debug;

use crate::error::AuthorityError;

/// One proposer surfaced by [`Authority::candidates`]/[`Authority::all_candidates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub master: Address,
    pub endorsor: Address,
    pub identity: Hash,
    pub active: bool,
}

/// The linked-list node persisted per master (§4.7). `prev`/`next` are `None` at the
/// ends of the list; a master with no entry at all decodes to the all-default value,
/// which [`Entry::is_empty`] treats the same as "never registered".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entry {
    endorsor: Address,
    identity: Hash,
    active: bool,
    prev: Option<Address>,
    next: Option<Address>,
}

impl Entry {
    fn is_empty(&self) -> bool {
        self.endorsor.is_zero() && self.identity.is_zero() && !self.active && self.prev.is_none() && self.next.is_none()
    }
}

impl RLPEncode for Entry {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.endorsor)
            .encode_field(&self.identity)
            .encode_field(&self.active)
            .encode_optional_field(&self.prev)
            .encode_optional_field(&self.next)
            .finish();
    }
}

impl RLPDecode for Entry {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (endorsor, decoder) = decoder.decode_field("endorsor")?;
        let (identity, decoder) = decoder.decode_field("identity")?;
        let (active, decoder) = decoder.decode_field("active")?;
        let (prev, decoder) = decoder.decode_optional_field("prev")?;
        let (next, decoder) = decoder.decode_optional_field("next")?;
        let rest = decoder.finish()?;
        Ok((
            Entry {
                endorsor,
                identity,
                active,
                prev,
                next,
            },
            rest,
        ))
    }
}

/// `bytes32(master)`: the address right-aligned into a 32-byte storage key, matching
/// the usual EVM word representation of an address.
fn entry_key(master: Address) -> Hash {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(master.as_bytes());
    Hash::from(buf)
}

fn head_key() -> Hash {
    blake2b256(b"head")
}

fn tail_key() -> Hash {
    blake2b256(b"tail")
}

/// Proposer registry (§4.7): a doubly linked list of [`Entry`] values keyed by master
/// address, stored in one account's storage. Every operation reads and writes through
/// a caller-supplied [`State`] rather than owning one, so the registry composes with
/// whatever checkpoint/revert scope the caller is already in.
pub struct Authority {
    addr: Address,
}

impl Authority {
    pub fn new(addr: Address) -> Self {
        Self { addr }
    }

    fn load_entry(&self, state: &mut State, master: Address) -> Result<Entry, AuthorityError> {
        let raw = state.get_raw_storage(self.addr, entry_key(master))?;
        if raw.is_empty() {
            Ok(Entry::default())
        } else {
            Ok(Entry::decode(&raw)?)
        }
    }

    fn save_entry(&self, state: &mut State, master: Address, entry: &Entry) -> Result<(), AuthorityError> {
        let raw = if entry.is_empty() {
            Bytes::new()
        } else {
            Bytes::from(entry.encode_to_vec())
        };
        state.set_raw_storage(self.addr, entry_key(master), raw)?;
        Ok(())
    }

    fn load_pointer(&self, state: &mut State, key: Hash) -> Result<Option<Address>, AuthorityError> {
        let raw = state.get_raw_storage(self.addr, key)?;
        if raw.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Address::decode(&raw)?))
        }
    }

    fn save_pointer(&self, state: &mut State, key: Hash, value: Option<Address>) -> Result<(), AuthorityError> {
        let raw = match value {
            Some(addr) => Bytes::from(addr.encode_to_vec()),
            None => Bytes::new(),
        };
        state.set_raw_storage(self.addr, key, raw)?;
        Ok(())
    }

    pub fn head(&self, state: &mut State) -> Result<Option<Address>, AuthorityError> {
        self.load_pointer(state, head_key())
    }

    pub fn tail(&self, state: &mut State) -> Result<Option<Address>, AuthorityError> {
        self.load_pointer(state, tail_key())
    }

    /// An entry is linked (in the list) if it has a neighbor on either side, or is the
    /// sole entry (`head == master` with no neighbors).
    fn is_linked(&self, state: &mut State, master: Address, entry: &Entry) -> Result<bool, AuthorityError> {
        if entry.prev.is_some() || entry.next.is_some() {
            return Ok(true);
        }
        Ok(self.head(state)? == Some(master))
    }

    /// Fails (`Ok(false)`) if `master` already has a non-empty entry.
    pub fn add(&self, state: &mut State, master: Address, endorsor: Address, identity: Hash) -> Result<bool, AuthorityError> {
        let existing = self.load_entry(state, master)?;
        if !existing.is_empty() {
            debug!(?master, "authority.add: master already has an entry");
            return Ok(false);
        }
        let old_tail = self.tail(state)?;
        let entry = Entry {
            endorsor,
            identity,
            active: true,
            prev: old_tail,
            next: None,
        };
        self.save_entry(state, master, &entry)?;
        match old_tail {
            Some(tail_master) => {
                let mut tail_entry = self.load_entry(state, tail_master)?;
                tail_entry.next = Some(master);
                self.save_entry(state, tail_master, &tail_entry)?;
            }
            None => self.save_pointer(state, head_key(), Some(master))?,
        }
        self.save_pointer(state, tail_key(), Some(master))?;
        Ok(true)
    }

    /// Unlinks `master`, fixing up its neighbors and the head/tail pointers. The entry
    /// stays in storage with `active = false` so `get` can still answer for it.
    pub fn revoke(&self, state: &mut State, master: Address) -> Result<bool, AuthorityError> {
        let mut entry = self.load_entry(state, master)?;
        if !self.is_linked(state, master, &entry)? {
            debug!(?master, "authority.revoke: master is not linked");
            return Ok(false);
        }
        match entry.prev {
            Some(prev_master) => {
                let mut prev_entry = self.load_entry(state, prev_master)?;
                prev_entry.next = entry.next;
                self.save_entry(state, prev_master, &prev_entry)?;
            }
            None => self.save_pointer(state, head_key(), entry.next)?,
        }
        match entry.next {
            Some(next_master) => {
                let mut next_entry = self.load_entry(state, next_master)?;
                next_entry.prev = entry.prev;
                self.save_entry(state, next_master, &next_entry)?;
            }
            None => self.save_pointer(state, tail_key(), entry.prev)?,
        }
        entry.prev = None;
        entry.next = None;
        entry.active = false;
        self.save_entry(state, master, &entry)?;
        Ok(true)
    }

    /// Only toggles `active` while `master` is linked.
    pub fn update(&self, state: &mut State, master: Address, active: bool) -> Result<bool, AuthorityError> {
        let mut entry = self.load_entry(state, master)?;
        if !self.is_linked(state, master, &entry)? {
            debug!(?master, "authority.update: master is not linked");
            return Ok(false);
        }
        entry.active = active;
        self.save_entry(state, master, &entry)?;
        Ok(true)
    }

    pub fn get(&self, state: &mut State, master: Address) -> Result<(bool, Address, Hash, bool), AuthorityError> {
        let entry = self.load_entry(state, master)?;
        let listed = self.is_linked(state, master, &entry)?;
        Ok((listed, entry.endorsor, entry.identity, entry.active))
    }

    /// Walks head-to-tail, keeping entries whose endorsor balance is at least
    /// `min_endorsement`, stopping once `limit` candidates have been collected.
    pub fn candidates(&self, state: &mut State, min_endorsement: BigInt, limit: usize) -> Result<Vec<Candidate>, AuthorityError> {
        let mut result = Vec::new();
        let mut cursor = self.head(state)?;
        while let Some(master) = cursor {
            if result.len() >= limit {
                break;
            }
            let entry = self.load_entry(state, master)?;
            if state.get_balance(entry.endorsor)? >= min_endorsement {
                result.push(Candidate {
                    master,
                    endorsor: entry.endorsor,
                    identity: entry.identity,
                    active: entry.active,
                });
            }
            cursor = entry.next;
        }
        Ok(result)
    }

    pub fn all_candidates(&self, state: &mut State) -> Result<Vec<Candidate>, AuthorityError> {
        self.candidates(state, BigInt::zero(), usize::MAX)
    }

    pub fn first(&self, state: &mut State) -> Result<Option<Address>, AuthorityError> {
        self.head(state)
    }

    pub fn next(&self, state: &mut State, master: Address) -> Result<Option<Address>, AuthorityError> {
        Ok(self.load_entry(state, master)?.next)
    }
}
