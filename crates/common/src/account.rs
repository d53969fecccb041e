use bytes::{BufMut, Bytes};
use thor_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::types::{Address, BigInt, Hash};

/// Consensus-relevant account body stored at `addr` in the account trie.
///
/// Mirrors `AccountInfo`/`AccountUpdate` in the teacher's account model, but carries the
/// two VeChainThor-specific fields (`energy`, `block_time`) that make energy accrual a
/// pure function of the account body rather than a side table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Account {
    pub balance: BigInt,
    pub energy: BigInt,
    pub block_time: u64,
    pub master: Option<Address>,
    pub code_hash: Option<Hash>,
    pub storage_root: Option<Hash>,
}

impl Account {
    /// An account is empty when it holds no value and has never been touched by a
    /// contract deployment or delegation. An empty account is removed from the trie
    /// even if `storage_root` is still set — its storage becomes unreachable garbage.
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero()
            && self.energy.is_zero()
            && self.master.is_none()
            && self.code_hash.is_none()
    }
}

impl RLPEncode for Account {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.balance)
            .encode_field(&self.energy)
            .encode_field(&self.block_time)
            .encode_optional_field(&self.master)
            .encode_optional_field(&self.code_hash)
            .encode_optional_field(&self.storage_root)
            .finish();
    }
}

impl RLPDecode for Account {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (energy, decoder) = decoder.decode_field("energy")?;
        let (block_time, decoder) = decoder.decode_field("block_time")?;
        let (master, decoder) = decoder.decode_optional_field("master")?;
        let (code_hash, decoder) = decoder.decode_optional_field("code_hash")?;
        let (storage_root, decoder) = decoder.decode_optional_field("storage_root")?;
        let rest = decoder.finish()?;
        Ok((
            Account {
                balance,
                energy,
                block_time,
                master,
                code_hash,
                storage_root,
            },
            rest,
        ))
    }
}

/// Per-leaf metadata kept alongside an account, outside the consensus hash.
///
/// `storage_id` identifies a *generation* of an account's storage: it is regenerated
/// whenever an account is deleted and later recreated, so nodes from the old storage
/// trie can never be reattached to the new one (see the storage-barrier invariant in
/// the state facade).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountMetadata {
    pub storage_id: Bytes,
    pub storage_major: u32,
    pub storage_minor: u32,
}

impl AccountMetadata {
    pub fn is_default(&self) -> bool {
        self.storage_id.is_empty() && self.storage_major == 0 && self.storage_minor == 0
    }
}

impl RLPEncode for AccountMetadata {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.storage_id)
            .encode_field(&self.storage_major)
            .encode_field(&self.storage_minor)
            .finish();
    }
}

impl RLPDecode for AccountMetadata {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (storage_id, decoder) = decoder.decode_field("storage_id")?;
        let (storage_major, decoder) = decoder.decode_field("storage_major")?;
        let (storage_minor, decoder) = decoder.decode_field("storage_minor")?;
        let rest = decoder.finish()?;
        Ok((
            AccountMetadata {
                storage_id,
                storage_major,
                storage_minor,
            },
            rest,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_account_round_trips() {
        let acc = Account::default();
        assert!(acc.is_empty());
        let encoded = acc.encode_to_vec();
        let decoded = Account::decode(&encoded).unwrap();
        assert_eq!(acc, decoded);
    }

    #[test]
    fn full_account_round_trips() {
        let acc = Account {
            balance: BigInt::from(10u64),
            energy: BigInt::from(20u64),
            block_time: 42,
            master: Some(Address::repeat_byte(1)),
            code_hash: Some(Hash::repeat_byte(2)),
            storage_root: Some(Hash::repeat_byte(3)),
        };
        assert!(!acc.is_empty());
        let encoded = acc.encode_to_vec();
        let decoded = Account::decode(&encoded).unwrap();
        assert_eq!(acc, decoded);
    }

    #[test]
    fn partially_set_account_round_trips() {
        let acc = Account {
            balance: BigInt::zero(),
            energy: BigInt::zero(),
            block_time: 0,
            master: None,
            code_hash: Some(Hash::repeat_byte(9)),
            storage_root: None,
        };
        let encoded = acc.encode_to_vec();
        let decoded = Account::decode(&encoded).unwrap();
        assert_eq!(acc, decoded);
    }
}
