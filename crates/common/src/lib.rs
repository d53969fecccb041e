//! # thor-common
//!
//! Shared data model for the state engine: address/hash/bigint aliases and the
//! `Account` / `AccountMetadata` records stored in the account trie (§3 of the
//! state engine design).

pub mod account;
pub mod types;

pub use account::{Account, AccountMetadata};
pub use types::{Address, BigInt, Hash, WEI_PER_ETHER};
