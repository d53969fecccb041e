use thiserror::Error;
use thor_rlp::error::RLPDecodeError;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("trie node decoding failed: {0}")]
    Decode(#[from] RLPDecodeError),
    #[error("underlying store error: {0}")]
    Store(String),
    #[error("inconsistent trie: {0}")]
    Inconsistent(String),
}
