use thiserror::Error;

/// The only error surface the store exposes: everything that isn't "missing" collapses
/// into `Other`, so callers that only care about presence can match on `NotFound` alone.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key not found")]
    NotFound,
    #[error("store error: {0}")]
    Other(String),
}

pub fn is_not_found(err: &KvError) -> bool {
    matches!(err, KvError::NotFound)
}
