//! # thor-crypto
//!
//! The two hash functions the state engine relies on: `keccak256` for code
//! hashes and secure-trie key transformation, and `blake2b-256` for the fixed
//! internal slot keys used by the builtin contracts (e.g. `blake2b("head")`).

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};
use ethereum_types::H256;
use sha3::{Digest, Keccak256};

/// `keccak256(data)`.
pub fn keccak256(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(Keccak256::digest(data.as_ref()).as_slice())
}

/// `blake2b-256(data)`.
pub fn blake2b256(data: impl AsRef<[u8]>) -> H256 {
    let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b output size");
    hasher.update(data.as_ref());
    let mut out = [0u8; 32];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer matches requested size");
    H256::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_is_deterministic_and_nonzero() {
        let h = keccak256(b"hello");
        assert_eq!(h, keccak256(b"hello"));
        assert_ne!(h, H256::zero());
    }

    #[test]
    fn blake2b256_is_deterministic() {
        assert_eq!(blake2b256(b"head"), blake2b256(b"head"));
        assert_ne!(blake2b256(b"head"), blake2b256(b"tail"));
    }
}
