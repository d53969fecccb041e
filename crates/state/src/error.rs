use thiserror::Error;

/// Uniform error surface the facade exposes to the execution engine, wrapping the
/// lower layers' own typed errors so callers distinguish I/O failure from the routine
/// `ok=false` outcomes builtins return directly as values, never as `Err`.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("trie error: {0}")]
    Trie(#[from] thor_trie::TrieError),
    #[error("kv store error: {0}")]
    Kv(#[from] thor_kv::KvError),
    #[error("rlp decode error: {0}")]
    Rlp(#[from] thor_rlp::error::RLPDecodeError),
}
