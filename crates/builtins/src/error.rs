use thiserror::Error;
use thor_rlp::error::RLPDecodeError;

/// Logic constraints (duplicate `add`, revoke on an unlinked master, `update` on an
/// unlinked master) are never `Err` — they return `Ok(false)`. Only I/O/decode
/// failures bubbling out of the world state reach here.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("state error: {0}")]
    State(#[from] thor_state::StateError),
    #[error("malformed authority registry entry: {0}")]
    Decode(#[from] RLPDecodeError),
}

/// Same policy as [`AuthorityError`]: insufficient balance in `sub` is a routine
/// `Ok(false)`, never an error.
#[derive(Debug, Error)]
pub enum EnergyError {
    #[error("state error: {0}")]
    State(#[from] thor_state::StateError),
    #[error("malformed energy ledger record: {0}")]
    Decode(#[from] RLPDecodeError),
}
