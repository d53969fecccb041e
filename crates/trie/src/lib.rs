//! # thor-trie
//!
//! A secure Merkle-Patricia trie: the consensus key for every entry is
//! `keccak256(user_key)`, with the original key's context carried as an opaque
//! metadata blob outside the root hash. Mutations stage purely in memory; nothing
//! reaches the backing [`db::TrieDB`] until [`trie::Trie::commit`] runs.
//!
//! ## Modules
//!
//! - [`nibbles`]: half-byte path representation and hex-prefix (compact) encoding.
//! - [`node_hash`]: inline-vs-hashed child references.
//! - [`node`]: branch/extension/leaf node shapes and their RLP encodings.
//! - [`db`]: the [`db::TrieDB`] storage trait and an in-memory implementation.
//! - [`state`]: the dirty-node cache sitting between a trie and its `TrieDB`.
//! - [`trie`]: the [`trie::Trie`] / [`trie::SecureTrie`] facades.
//! - [`error`]: [`error::TrieError`].

pub mod db;
pub mod error;
pub mod nibbles;
pub mod node;
pub mod node_hash;
pub mod state;
pub mod trie;

pub use db::{InMemoryTrieDB, KvTrieDB, TrieDB};
pub use error::TrieError;
pub use nibbles::Nibbles;
pub use node_hash::NodeHash;
pub use trie::{SecureTrie, Trie, EMPTY_TRIE_HASH};
