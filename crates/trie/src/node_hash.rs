use ethereum_types::H256;
use thor_crypto::keccak256;

/// A reference to a child node, either inlined when its RLP encoding fits in under 32
/// bytes, or the `keccak256` of the encoding otherwise. Mirrors the classic Ethereum MPT
/// "embedded node" optimization: small subtrees don't need a separate DB entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeHash {
    Hashed(H256),
    Inline(Vec<u8>),
}

impl NodeHash {
    /// Builds the reference a parent should hold for a child whose canonical RLP
    /// encoding is `encoded`.
    pub fn from_encoded(encoded: &[u8]) -> Self {
        if encoded.len() < 32 {
            NodeHash::Inline(encoded.to_vec())
        } else {
            NodeHash::Hashed(keccak256(encoded))
        }
    }

    /// The hash a caller outside this crate should see (used for roots and proofs): an
    /// inlined child is hashed on demand since callers never see raw node bytes.
    pub fn finalize(&self) -> H256 {
        match self {
            NodeHash::Hashed(h) => *h,
            NodeHash::Inline(bytes) => keccak256(bytes),
        }
    }

    pub fn as_inline(&self) -> Option<&[u8]> {
        match self {
            NodeHash::Inline(bytes) => Some(bytes),
            NodeHash::Hashed(_) => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, NodeHash::Inline(_))
    }
}

impl From<H256> for NodeHash {
    fn from(hash: H256) -> Self {
        NodeHash::Hashed(hash)
    }
}
