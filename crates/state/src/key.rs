use bytes::Bytes;
use thor_common::{Account, Address, Hash};

/// Tagged union of everything the journaled overlay (C5) can hold a pending write for.
/// Modeled as a closed sum type with exhaustive matching at `stage` time, never open
/// polymorphism, per the design notes on `StackedMap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// An account's consensus body.
    Account(Address),
    /// An account's contract bytecode, keyed by address rather than code hash so a
    /// `set_code` overwrite within the same block replaces the pending entry in place.
    Code(Address),
    /// A single storage slot, tagged with the storage barrier in effect when it was
    /// written. A `delete` bumps the barrier, so pre-delete and post-delete writes to
    /// the same `(addr, key)` never collide in the overlay even within one block.
    Storage { addr: Address, barrier: u64, key: Hash },
    /// The per-address storage barrier counter itself.
    StorageBarrier(Address),
}

/// The value half of an overlay entry, one variant per `Key` shape.
#[derive(Debug, Clone)]
pub enum Value {
    Account(Account),
    Code(Bytes),
    /// Raw RLP-encoded storage payload; empty means "deleted".
    Storage(Bytes),
    Barrier(u64),
}
