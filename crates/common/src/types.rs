/// 20-byte account identifier.
pub use ethereum_types::Address;
/// 32-byte hash / storage key / trie root.
pub use ethereum_types::H256 as Hash;
/// Arbitrary-precision unsigned integer used for balances, energies and supplies.
///
/// `U256` saturates rather than panics on overflow in release builds elsewhere in this
/// workspace's dependency tree, but the state engine relies on checked arithmetic at
/// every call site instead of on that behavior.
pub use ethereum_types::U256 as BigInt;

/// Normalizing denominator for energy-growth arithmetic (`1e18`).
pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;
