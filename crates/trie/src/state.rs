use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::H256;

use crate::db::TrieDB;
use crate::error::TrieError;
use crate::node::Node;
use crate::node_hash::NodeHash;

/// Holds nodes written since the last commit (the dirty layer) plus the shared
/// `TrieDB` handle for everything already persisted. `stage` reads through this cache
/// without touching the database; `commit` flushes it in one batch.
pub struct TrieState {
    db: Arc<dyn TrieDB>,
    dirty: HashMap<H256, Node>,
    /// Version tag (`block_num`, `conflicts`) recorded for nodes flushed by the last
    /// `commit_with_version` call. Kept purely for introspection: the in-memory `TrieDB`
    /// this crate ships has no GC policy to act on it, so nothing else in this crate
    /// reads it back. A backing store with generational pruning would persist this
    /// alongside each node instead of discarding it here.
    versions: HashMap<H256, (u64, u32)>,
}

impl TrieState {
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self {
            db,
            dirty: HashMap::new(),
            versions: HashMap::new(),
        }
    }

    /// Resolves a child reference into its node, decoding inline children directly and
    /// checking the dirty cache before falling back to the database for hashed ones.
    pub fn get_node(&self, hash: &NodeHash) -> Result<Option<Node>, TrieError> {
        match hash {
            NodeHash::Inline(bytes) => Ok(Some(Node::decode_raw(bytes)?)),
            NodeHash::Hashed(h) => {
                if let Some(node) = self.dirty.get(h) {
                    return Ok(Some(node.clone()));
                }
                match self.db.get(h.as_bytes().to_vec())? {
                    Some(bytes) => Ok(Some(Node::decode_raw(&bytes)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Computes `node`'s reference and, if it hashes to a full 32-byte digest, stages it
    /// in the dirty layer. Nodes small enough to inline are never written to the DB on
    /// their own: they travel embedded in their parent's encoding.
    pub fn insert_node(&mut self, node: Node) -> NodeHash {
        let hash = node.compute_hash();
        if let NodeHash::Hashed(h) = hash {
            self.dirty.insert(h, node);
        }
        hash
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Flushes the dirty layer to the database in one batch and clears it.
    pub fn commit(&mut self) -> Result<(), TrieError> {
        self.commit_with_version(None)
    }

    /// Flushes the dirty layer, tagging every node written in this batch with `version`
    /// (`block_num`, `conflicts`) when one is given.
    pub fn commit_with_version(&mut self, version: Option<(u64, u32)>) -> Result<(), TrieError> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        if let Some(v) = version {
            for hash in self.dirty.keys() {
                self.versions.insert(*hash, v);
            }
        }
        let batch = self
            .dirty
            .drain()
            .map(|(hash, node)| (hash.as_bytes().to_vec(), node.encode_raw()))
            .collect();
        self.db.put_batch(batch)
    }

    pub fn version_of(&self, hash: &H256) -> Option<(u64, u32)> {
        self.versions.get(hash).copied()
    }

    pub fn db(&self) -> Arc<dyn TrieDB> {
        self.db.clone()
    }
}
