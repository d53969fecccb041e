use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::H256;
use lazy_static::lazy_static;
use thor_crypto::keccak256;
use tracing::{debug, error};

use crate::db::{InMemoryTrieDB, TrieDB};
use crate::error::TrieError;
use crate::nibbles::Nibbles;
use crate::node::{BranchNode, ExtensionNode, LeafNode, Node};
use crate::node_hash::NodeHash;
use crate::state::TrieState;

lazy_static! {
    /// Root hash of a trie with no entries: `keccak256` of the RLP encoding of an empty
    /// byte string, matching the classic Ethereum convention.
    pub static ref EMPTY_TRIE_HASH: H256 = keccak256(&[0x80]);
}

/// A Merkle-Patricia trie over raw nibble paths. Mutations only touch the in-memory
/// dirty layer of [`TrieState`] — nothing reaches the backing [`TrieDB`] until
/// [`Trie::commit`] runs, so `hash()` and `stage()` are pure.
pub struct Trie {
    state: TrieState,
    root: Option<NodeHash>,
    pending_version: Option<(u64, u32)>,
}

impl Trie {
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self {
            state: TrieState::new(db),
            root: None,
            pending_version: None,
        }
    }

    pub fn new_in_memory() -> Self {
        Self::new(Arc::new(InMemoryTrieDB::new()))
    }

    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Self {
        let root = if root == *EMPTY_TRIE_HASH {
            None
        } else {
            Some(NodeHash::Hashed(root))
        };
        Self {
            state: TrieState::new(db),
            root,
            pending_version: None,
        }
    }

    pub fn hash(&self) -> H256 {
        match &self.root {
            Some(hash) => hash.finalize(),
            None => *EMPTY_TRIE_HASH,
        }
    }

    /// Computes the post-mutation root without writing anything, and remembers
    /// `(block_num, conflicts)` so the next [`Trie::commit`] tags the batch it flushes.
    pub fn stage(&mut self, block_num: u64, conflicts: u32) -> H256 {
        self.pending_version = Some((block_num, conflicts));
        let root = self.hash();
        debug!(block_num, conflicts, root = ?root, "trie staged");
        root
    }

    pub fn commit(&mut self) -> Result<(), TrieError> {
        let version = self.pending_version.take();
        match self.state.commit_with_version(version) {
            Ok(()) => {
                debug!(root = ?self.hash(), "trie committed");
                Ok(())
            }
            Err(err) => {
                error!(%err, "trie commit failed");
                Err(err)
            }
        }
    }

    /// Cheap copy-on-write snapshot: shares the backing `TrieDB` (an `Arc` clone) and
    /// the current root, but starts with an empty dirty layer of its own. Safe to call
    /// once the source trie's pending mutations have been committed; uncommitted writes
    /// on the source are not visible through the copy.
    pub fn copy(&self) -> Trie {
        Trie {
            state: TrieState::new(self.state.db()),
            root: self.root.clone(),
            pending_version: None,
        }
    }

    pub fn get(&self, path: &Nibbles) -> Result<Option<(Bytes, Bytes)>, TrieError> {
        let mut current = self.root.clone();
        let mut remaining = path.clone();
        loop {
            let Some(node_ref) = current else {
                return Ok(None);
            };
            let node = self
                .state
                .get_node(&node_ref)?
                .ok_or_else(|| TrieError::Inconsistent("dangling node reference".into()))?;
            match node {
                Node::Leaf(leaf) => {
                    return Ok(if leaf.partial == remaining {
                        Some((leaf.value, leaf.metadata))
                    } else {
                        None
                    });
                }
                Node::Extension(ext) => {
                    let common = ext.prefix.count_prefix(&remaining);
                    if common != ext.prefix.len() {
                        return Ok(None);
                    }
                    remaining = remaining.offset(common);
                    current = Some(ext.child);
                }
                Node::Branch(branch) => {
                    if remaining.is_empty() || remaining.at(0) == 16 {
                        return Ok(branch.value.map(|v| (v, Bytes::new())));
                    }
                    let nibble = remaining.at(0);
                    current = branch.choices[nibble].clone();
                    remaining = remaining.offset(1);
                }
            }
        }
    }

    /// Returns the RLP-encoded nodes visited on the path to `path`, suitable for a
    /// Merkle proof. Stops as soon as the path can no longer be followed.
    pub fn get_proof(&self, path: &Nibbles) -> Result<Vec<Vec<u8>>, TrieError> {
        let mut proof = Vec::new();
        let mut current = self.root.clone();
        let mut remaining = path.clone();
        loop {
            let Some(node_ref) = current else { break };
            let node = self
                .state
                .get_node(&node_ref)?
                .ok_or_else(|| TrieError::Inconsistent("dangling node reference".into()))?;
            proof.push(node.encode_canonical());
            match node {
                Node::Leaf(_) => break,
                Node::Extension(ext) => {
                    let common = ext.prefix.count_prefix(&remaining);
                    if common != ext.prefix.len() {
                        break;
                    }
                    remaining = remaining.offset(common);
                    current = Some(ext.child);
                }
                Node::Branch(branch) => {
                    if remaining.is_empty() || remaining.at(0) == 16 {
                        break;
                    }
                    let nibble = remaining.at(0);
                    current = branch.choices[nibble].clone();
                    remaining = remaining.offset(1);
                }
            }
        }
        Ok(proof)
    }

    pub fn insert(&mut self, path: Nibbles, value: Bytes, metadata: Bytes) -> Result<(), TrieError> {
        if value.is_empty() {
            return self.remove(&path);
        }
        self.root = Some(self.insert_into(self.root.clone(), path, value, metadata)?);
        Ok(())
    }

    fn insert_into(
        &mut self,
        node_ref: Option<NodeHash>,
        path: Nibbles,
        value: Bytes,
        metadata: Bytes,
    ) -> Result<NodeHash, TrieError> {
        let Some(node_ref) = node_ref else {
            let leaf = LeafNode::new(path, value, metadata);
            return Ok(self.state.insert_node(Node::Leaf(leaf)));
        };
        let node = self
            .state
            .get_node(&node_ref)?
            .ok_or_else(|| TrieError::Inconsistent("dangling node reference".into()))?;
        match node {
            Node::Leaf(leaf) => self.insert_into_leaf(leaf, path, value, metadata),
            Node::Extension(ext) => self.insert_into_extension(ext, path, value, metadata),
            Node::Branch(branch) => self.insert_into_branch(*branch, path, value, metadata),
        }
    }

    fn insert_into_leaf(
        &mut self,
        leaf: LeafNode,
        path: Nibbles,
        value: Bytes,
        metadata: Bytes,
    ) -> Result<NodeHash, TrieError> {
        if leaf.partial == path {
            return Ok(self
                .state
                .insert_node(Node::Leaf(LeafNode::new(path, value, metadata))));
        }
        let common = leaf.partial.count_prefix(&path);

        let mut branch = BranchNode::new();
        let leaf_rest = leaf.partial.offset(common);
        let path_rest = path.offset(common);
        if leaf_rest.is_empty() || path_rest.is_empty() || leaf_rest.at(0) == 16 || path_rest.at(0) == 16 {
            return Err(TrieError::Inconsistent(
                "branch value-slot terminator unsupported for fixed-length secure keys".into(),
            ));
        }

        let leaf_nibble = leaf_rest.at(0);
        let leaf_ref = self.state.insert_node(Node::Leaf(LeafNode::new(
            leaf_rest.offset(1),
            leaf.value,
            leaf.metadata,
        )));
        branch.choices[leaf_nibble] = Some(leaf_ref);

        let path_nibble = path_rest.at(0);
        let path_ref = self.state.insert_node(Node::Leaf(LeafNode::new(
            path_rest.offset(1),
            value,
            metadata,
        )));
        branch.choices[path_nibble] = Some(path_ref);

        let branch_ref = self.state.insert_node(Node::Branch(Box::new(branch)));
        if common == 0 {
            Ok(branch_ref)
        } else {
            let ext = ExtensionNode::new(path.slice(0, common), branch_ref);
            Ok(self.state.insert_node(Node::Extension(ext)))
        }
    }

    fn insert_into_extension(
        &mut self,
        ext: ExtensionNode,
        path: Nibbles,
        value: Bytes,
        metadata: Bytes,
    ) -> Result<NodeHash, TrieError> {
        let common = ext.prefix.count_prefix(&path);
        if common == ext.prefix.len() {
            let child_path = path.offset(common);
            let new_child = self.insert_into(Some(ext.child), child_path, value, metadata)?;
            let new_ext = ExtensionNode::new(ext.prefix, new_child);
            return Ok(self.state.insert_node(Node::Extension(new_ext)));
        }

        let mut branch = BranchNode::new();
        let ext_rest = ext.prefix.offset(common);
        let path_rest = path.offset(common);
        if ext_rest.is_empty() || path_rest.is_empty() || ext_rest.at(0) == 16 || path_rest.at(0) == 16 {
            return Err(TrieError::Inconsistent(
                "branch value-slot terminator unsupported for fixed-length secure keys".into(),
            ));
        }

        let ext_nibble = ext_rest.at(0);
        let ext_new_prefix = ext_rest.offset(1);
        let ext_child_ref = if ext_new_prefix.is_empty() {
            ext.child
        } else {
            self.state
                .insert_node(Node::Extension(ExtensionNode::new(ext_new_prefix, ext.child)))
        };
        branch.choices[ext_nibble] = Some(ext_child_ref);

        let path_nibble = path_rest.at(0);
        let new_leaf_ref = self.state.insert_node(Node::Leaf(LeafNode::new(
            path_rest.offset(1),
            value,
            metadata,
        )));
        branch.choices[path_nibble] = Some(new_leaf_ref);

        let branch_ref = self.state.insert_node(Node::Branch(Box::new(branch)));
        if common == 0 {
            Ok(branch_ref)
        } else {
            let new_ext = ExtensionNode::new(path.slice(0, common), branch_ref);
            Ok(self.state.insert_node(Node::Extension(new_ext)))
        }
    }

    fn insert_into_branch(
        &mut self,
        mut branch: BranchNode,
        path: Nibbles,
        value: Bytes,
        metadata: Bytes,
    ) -> Result<NodeHash, TrieError> {
        if path.is_empty() || path.at(0) == 16 {
            return Err(TrieError::Inconsistent(
                "branch value-slot terminator unsupported for fixed-length secure keys".into(),
            ));
        }
        let nibble = path.at(0);
        let rest = path.offset(1);
        let child_ref = branch.choices[nibble].clone();
        let new_child = self.insert_into(child_ref, rest, value, metadata)?;
        branch.choices[nibble] = Some(new_child);
        Ok(self.state.insert_node(Node::Branch(Box::new(branch))))
    }

    pub fn remove(&mut self, path: &Nibbles) -> Result<(), TrieError> {
        if let Some(root) = self.root.clone() {
            self.root = self.remove_from(Some(root), path)?;
        }
        Ok(())
    }

    fn remove_from(
        &mut self,
        node_ref: Option<NodeHash>,
        path: &Nibbles,
    ) -> Result<Option<NodeHash>, TrieError> {
        let Some(node_ref) = node_ref else {
            return Ok(None);
        };
        let node = self
            .state
            .get_node(&node_ref)?
            .ok_or_else(|| TrieError::Inconsistent("dangling node reference".into()))?;
        match node {
            Node::Leaf(leaf) => {
                if &leaf.partial == path {
                    Ok(None)
                } else {
                    Ok(Some(node_ref))
                }
            }
            Node::Extension(ext) => {
                let common = ext.prefix.count_prefix(path);
                if common != ext.prefix.len() {
                    return Ok(Some(node_ref));
                }
                let child_path = path.offset(common);
                match self.remove_from(Some(ext.child.clone()), &child_path)? {
                    None => Ok(None),
                    Some(new_child) if new_child == ext.child => Ok(Some(node_ref)),
                    Some(new_child) => self.merge_extension(ext.prefix, new_child).map(Some),
                }
            }
            Node::Branch(branch) => {
                let mut branch = *branch;
                if path.is_empty() || path.at(0) == 16 {
                    return Ok(Some(node_ref));
                }
                let nibble = path.at(0);
                let rest = path.offset(1);
                let child_ref = branch.choices[nibble].clone();
                branch.choices[nibble] = self.remove_from(child_ref, &rest)?;
                self.collapse_branch(branch).map(Some)
            }
        }
    }

    /// Merges a `prefix` in front of `child`, folding stacked extensions/leaves into a
    /// single node so the invariant "no extension points to another extension" holds.
    fn merge_extension(&mut self, prefix: Nibbles, child_ref: NodeHash) -> Result<NodeHash, TrieError> {
        let child = self
            .state
            .get_node(&child_ref)?
            .ok_or_else(|| TrieError::Inconsistent("dangling node reference".into()))?;
        match child {
            Node::Leaf(leaf) => {
                let merged = prefix.concat(&leaf.partial);
                Ok(self
                    .state
                    .insert_node(Node::Leaf(LeafNode::new(merged, leaf.value, leaf.metadata))))
            }
            Node::Extension(ext) => {
                let merged = prefix.concat(&ext.prefix);
                Ok(self
                    .state
                    .insert_node(Node::Extension(ExtensionNode::new(merged, ext.child))))
            }
            Node::Branch(_) => Ok(self
                .state
                .insert_node(Node::Extension(ExtensionNode::new(prefix, child_ref)))),
        }
    }

    /// After a child slot changes, collapses a branch that has been reduced to a single
    /// child back into a leaf/extension, preserving the trie's canonical shape.
    fn collapse_branch(&mut self, branch: BranchNode) -> Result<NodeHash, TrieError> {
        let populated = branch.populated_slots();
        match (populated.len(), &branch.value) {
            (0, None) => Err(TrieError::Inconsistent("branch has no children left".into())),
            (0, Some(_)) => Err(TrieError::Inconsistent(
                "branch value-slot terminator unsupported for fixed-length secure keys".into(),
            )),
            (1, None) => {
                let only = populated[0];
                let child_ref = branch.choices[only].clone().expect("slot checked populated");
                self.merge_extension(Nibbles::from_hex(vec![only as u8]), child_ref)
            }
            _ => Ok(self.state.insert_node(Node::Branch(Box::new(branch)))),
        }
    }
}

/// A trie keyed by `keccak256(user_key)`. The original key never appears in the trie
/// path; callers that need it back read it from the `metadata` they stored alongside
/// the value (see `crate::trie`'s module docs and the state facade's account/storage
/// metadata records).
pub struct SecureTrie {
    trie: Trie,
}

impl SecureTrie {
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self { trie: Trie::new(db) }
    }

    pub fn new_in_memory() -> Self {
        Self { trie: Trie::new_in_memory() }
    }

    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Self {
        Self {
            trie: Trie::open(db, root),
        }
    }

    fn path_for(key: &[u8]) -> Nibbles {
        Nibbles::from_bytes(keccak256(key).as_bytes())
    }

    /// Returns `(value, metadata)`; an absent key yields two empty blobs.
    pub fn get(&self, key: &[u8]) -> Result<(Bytes, Bytes), TrieError> {
        Ok(self
            .trie
            .get(&Self::path_for(key))?
            .unwrap_or((Bytes::new(), Bytes::new())))
    }

    /// A zero-length `value` deletes the entry.
    pub fn update(&mut self, key: &[u8], value: Bytes, metadata: Bytes) -> Result<(), TrieError> {
        let path = Self::path_for(key);
        if value.is_empty() {
            self.trie.remove(&path)
        } else {
            self.trie.insert(path, value, metadata)
        }
    }

    pub fn hash(&self) -> H256 {
        self.trie.hash()
    }

    pub fn stage(&mut self, block_num: u64, conflicts: u32) -> H256 {
        self.trie.stage(block_num, conflicts)
    }

    pub fn commit(&mut self) -> Result<(), TrieError> {
        self.trie.commit()
    }

    pub fn copy(&self) -> SecureTrie {
        SecureTrie { trie: self.trie.copy() }
    }

    pub fn get_proof(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, TrieError> {
        self.trie.get_proof(&Self::path_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_trie_has_the_canonical_empty_root() {
        let trie = Trie::new_in_memory();
        assert_eq!(trie.hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut trie = SecureTrie::new_in_memory();
        trie.update(b"alice", Bytes::from_static(b"100"), Bytes::from_static(b"meta"))
            .unwrap();
        let (value, metadata) = trie.get(b"alice").unwrap();
        assert_eq!(value, Bytes::from_static(b"100"));
        assert_eq!(metadata, Bytes::from_static(b"meta"));
    }

    #[test]
    fn get_on_missing_key_returns_empty() {
        let trie = SecureTrie::new_in_memory();
        let (value, metadata) = trie.get(b"nobody").unwrap();
        assert!(value.is_empty());
        assert!(metadata.is_empty());
    }

    #[test]
    fn update_with_empty_value_deletes() {
        let mut trie = SecureTrie::new_in_memory();
        trie.update(b"alice", Bytes::from_static(b"100"), Bytes::new()).unwrap();
        assert_ne!(trie.hash(), *EMPTY_TRIE_HASH);
        trie.update(b"alice", Bytes::new(), Bytes::new()).unwrap();
        assert_eq!(trie.hash(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn many_keys_round_trip_and_order_independent_root() {
        let mut a = SecureTrie::new_in_memory();
        let mut b = SecureTrie::new_in_memory();
        let entries: Vec<(&[u8], &[u8])> = vec![
            (b"alice", b"1"),
            (b"bob", b"2"),
            (b"carol", b"3"),
            (b"dave", b"4"),
        ];
        for (k, v) in &entries {
            a.update(k, Bytes::copy_from_slice(v), Bytes::new()).unwrap();
        }
        for (k, v) in entries.iter().rev() {
            b.update(k, Bytes::copy_from_slice(v), Bytes::new()).unwrap();
        }
        assert_eq!(a.hash(), b.hash());
        for (k, v) in &entries {
            let (value, _) = a.get(k).unwrap();
            assert_eq!(value, Bytes::copy_from_slice(v));
        }
    }

    #[test]
    fn deleting_one_of_many_keys_preserves_the_rest() {
        let mut trie = SecureTrie::new_in_memory();
        trie.update(b"alice", Bytes::from_static(b"1"), Bytes::new()).unwrap();
        trie.update(b"bob", Bytes::from_static(b"2"), Bytes::new()).unwrap();
        trie.update(b"carol", Bytes::from_static(b"3"), Bytes::new()).unwrap();
        trie.update(b"bob", Bytes::new(), Bytes::new()).unwrap();
        assert!(trie.get(b"bob").unwrap().0.is_empty());
        assert_eq!(trie.get(b"alice").unwrap().0, Bytes::from_static(b"1"));
        assert_eq!(trie.get(b"carol").unwrap().0, Bytes::from_static(b"3"));
    }

    #[test]
    fn insert_and_full_delete_reaches_the_same_root_as_never_inserting() {
        let mut trie = SecureTrie::new_in_memory();
        let empty_root = trie.hash();
        trie.update(b"x", Bytes::from_static(b"1"), Bytes::new()).unwrap();
        trie.update(b"y", Bytes::from_static(b"2"), Bytes::new()).unwrap();
        trie.update(b"x", Bytes::new(), Bytes::new()).unwrap();
        trie.update(b"y", Bytes::new(), Bytes::new()).unwrap();
        assert_eq!(trie.hash(), empty_root);
    }

    #[test]
    fn stage_does_not_touch_the_backing_store_until_commit() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = SecureTrie::open(db.clone(), *EMPTY_TRIE_HASH);
        trie.update(b"alice", Bytes::from_static(b"1"), Bytes::new()).unwrap();
        let staged_root = trie.stage(1, 0);
        assert!(db.is_empty());
        trie.commit().unwrap();
        assert!(!db.is_empty());

        let reopened = SecureTrie::open(db, staged_root);
        assert_eq!(reopened.get(b"alice").unwrap().0, Bytes::from_static(b"1"));
    }

    #[test]
    fn copy_shares_committed_state_but_diverges_independently() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut original = SecureTrie::open(db.clone(), *EMPTY_TRIE_HASH);
        original.update(b"alice", Bytes::from_static(b"1"), Bytes::new()).unwrap();
        original.commit().unwrap();

        let mut copy = original.copy();
        copy.update(b"bob", Bytes::from_static(b"2"), Bytes::new()).unwrap();

        assert_eq!(original.get(b"alice").unwrap().0, Bytes::from_static(b"1"));
        assert!(original.get(b"bob").unwrap().0.is_empty());
        assert_eq!(copy.get(b"alice").unwrap().0, Bytes::from_static(b"1"));
        assert_eq!(copy.get(b"bob").unwrap().0, Bytes::from_static(b"2"));
        assert_ne!(original.hash(), copy.hash());
    }
}
