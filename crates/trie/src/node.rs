use bytes::{BufMut, Bytes};
use thor_rlp::{
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::nibbles::Nibbles;
use crate::node_hash::NodeHash;

/// A trie node in one of the three classic Merkle-Patricia shapes.
///
/// Branch and extension nodes are consensus-only: their on-disk encoding is the same as
/// the bytes that get hashed. Leaf nodes additionally carry an opaque `metadata` blob
/// (see [`LeafNode`]) that rides alongside the node in storage but never enters the hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BranchNode {
    pub choices: [Option<NodeHash>; 16],
    pub value: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeHash,
}

/// A terminal node. `metadata` is an opaque, caller-supplied blob (e.g. the account
/// metadata record) that the secure-trie wrapper attaches to each leaf but that is
/// excluded from `compute_hash`: two tries with leaves differing only in metadata share
/// the same root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: Bytes,
    pub metadata: Bytes,
}

impl BranchNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.choices.iter().all(Option::is_none)
    }

    /// Indices of the populated child slots (the value slot is not included).
    pub fn populated_slots(&self) -> Vec<usize> {
        self.choices
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| i))
            .collect()
    }

    fn encode_list(&self, buf: &mut dyn BufMut) {
        let mut encoder = Encoder::new(buf);
        for choice in &self.choices {
            encoder = match choice {
                Some(NodeHash::Hashed(h)) => encoder.encode_field(h),
                Some(NodeHash::Inline(bytes)) => encoder.encode_raw(bytes),
                None => encoder.encode_field(&Bytes::new()),
            };
        }
        encoder = match &self.value {
            Some(v) => encoder.encode_field(v),
            None => encoder.encode_field(&Bytes::new()),
        };
        encoder.finish();
    }

    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_list(&mut buf);
        buf
    }

    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_raw())
    }

    fn decode_choice(decoder: Decoder) -> Result<(Option<NodeHash>, Decoder), RLPDecodeError> {
        let (raw, decoder) = decoder.get_encoded_item()?;
        let choice = decode_child_ref(&raw);
        Ok((choice, decoder))
    }

    pub fn decode_raw(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let mut decoder = Decoder::new(buf)?;
        let mut choices: [Option<NodeHash>; 16] = Default::default();
        for slot in &mut choices {
            let (choice, next) = Self::decode_choice(decoder)?;
            *slot = choice;
            decoder = next;
        }
        let (raw_value, decoder) = decoder.get_encoded_item()?;
        let value = decode_optional_value(&raw_value);
        let rest = decoder.finish()?;
        Ok((BranchNode { choices, value }, rest))
    }
}

impl ExtensionNode {
    pub fn new(prefix: Nibbles, child: NodeHash) -> Self {
        Self { prefix, child }
    }

    fn encode_list(&self, buf: &mut dyn BufMut) {
        let compact = Bytes::from(self.prefix.encode_compact());
        let encoder = Encoder::new(buf).encode_field(&compact);
        let encoder = match &self.child {
            NodeHash::Hashed(h) => encoder.encode_field(h),
            NodeHash::Inline(bytes) => encoder.encode_raw(bytes),
        };
        encoder.finish();
    }

    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_list(&mut buf);
        buf
    }

    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_raw())
    }

    pub fn decode_raw(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (compact, decoder): (Bytes, _) = decoder.decode_field("prefix")?;
        let (prefix, is_leaf) = Nibbles::decode_compact(&compact);
        if is_leaf {
            return Err(RLPDecodeError::Custom(
                "extension node prefix carries leaf flag".into(),
            ));
        }
        let (raw_child, decoder) = decoder.get_encoded_item()?;
        let child = decode_child_ref(&raw_child)
            .ok_or_else(|| RLPDecodeError::Custom("extension node missing child".into()))?;
        let rest = decoder.finish()?;
        Ok((ExtensionNode { prefix, child }, rest))
    }
}

impl LeafNode {
    pub fn new(partial: Nibbles, value: Bytes, metadata: Bytes) -> Self {
        Self {
            partial,
            value,
            metadata,
        }
    }

    /// The two-item `[partial, value]` encoding whose hash is part of the consensus root.
    pub fn encode_canonical(&self) -> Vec<u8> {
        let compact = Bytes::from(self.partial.encode_compact());
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&compact)
            .encode_field(&self.value)
            .finish();
        buf
    }

    /// The three-item `[partial, value, metadata]` encoding persisted to storage.
    pub fn encode_raw(&self) -> Vec<u8> {
        let compact = Bytes::from(self.partial.encode_compact());
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&compact)
            .encode_field(&self.value)
            .encode_field(&self.metadata)
            .finish();
        buf
    }

    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_canonical())
    }

    pub fn decode_raw(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(buf)?;
        let (compact, decoder): (Bytes, _) = decoder.decode_field("prefix")?;
        let (partial, is_leaf) = Nibbles::decode_compact(&compact);
        if !is_leaf {
            return Err(RLPDecodeError::Custom(
                "leaf node prefix missing leaf flag".into(),
            ));
        }
        let (value, decoder) = decoder.decode_field("value")?;
        let (metadata, decoder) = if decoder.is_done() {
            (Bytes::new(), decoder)
        } else {
            decoder.decode_field("metadata")?
        };
        let rest = decoder.finish()?;
        Ok((
            LeafNode {
                partial,
                value,
                metadata,
            },
            rest,
        ))
    }
}

fn decode_child_ref(raw: &[u8]) -> Option<NodeHash> {
    if raw == [0x80u8] {
        return None;
    }
    if raw.len() == 33 && raw[0] == 0xA0 {
        return Some(NodeHash::Hashed(ethereum_types::H256::from_slice(
            &raw[1..],
        )));
    }
    Some(NodeHash::Inline(raw.to_vec()))
}

fn decode_optional_value(raw: &[u8]) -> Option<Bytes> {
    if raw == [0x80u8] {
        return None;
    }
    use thor_rlp::decode::RLPDecode;
    Bytes::decode(raw).ok()
}

impl Node {
    pub fn encode_raw(&self) -> Vec<u8> {
        match self {
            Node::Branch(b) => b.encode_raw(),
            Node::Extension(e) => e.encode_raw(),
            Node::Leaf(l) => l.encode_raw(),
        }
    }

    /// The encoding whose hash is the consensus node hash: identical to `encode_raw`
    /// for branch/extension nodes, but strips the metadata field for leaves.
    pub fn encode_canonical(&self) -> Vec<u8> {
        match self {
            Node::Branch(b) => b.encode_raw(),
            Node::Extension(e) => e.encode_raw(),
            Node::Leaf(l) => l.encode_canonical(),
        }
    }

    pub fn compute_hash(&self) -> NodeHash {
        match self {
            Node::Branch(b) => b.compute_hash(),
            Node::Extension(e) => e.compute_hash(),
            Node::Leaf(l) => l.compute_hash(),
        }
    }

    /// Decodes a node from its storage encoding. A 17-item list is a branch; a 2-item
    /// (or 3-item, leaf-with-metadata) list is a leaf or extension, distinguished by the
    /// compact-prefix leaf flag on the first item.
    pub fn decode_raw(buf: &[u8]) -> Result<Self, RLPDecodeError> {
        let mut decoder = Decoder::new(buf)?;
        let mut items = 0usize;
        let mut first: Option<Vec<u8>> = None;
        while !decoder.is_done() {
            let (item, next) = decoder.get_encoded_item()?;
            if items == 0 {
                first = Some(item);
            }
            items += 1;
            decoder = next;
        }
        match items {
            17 => {
                let (branch, _) = BranchNode::decode_raw(buf)?;
                Ok(Node::Branch(Box::new(branch)))
            }
            2 | 3 => {
                let first = first.ok_or(RLPDecodeError::MalformedData)?;
                let (compact, _) = thor_rlp::decode::decode_bytes(&first)
                    .map_err(|_| RLPDecodeError::MalformedData)?;
                let is_leaf = !compact.is_empty() && (compact[0] >> 4) & 0x2 != 0;
                if is_leaf {
                    let (leaf, _) = LeafNode::decode_raw(buf)?;
                    Ok(Node::Leaf(leaf))
                } else {
                    let (ext, _) = ExtensionNode::decode_raw(buf)?;
                    Ok(Node::Extension(ext))
                }
            }
            _ => Err(RLPDecodeError::MalformedData),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_canonical_encoding_excludes_metadata() {
        let a = LeafNode::new(
            Nibbles::from_bytes(&[1, 2, 3]),
            Bytes::from_static(&[9]),
            Bytes::new(),
        );
        let b = LeafNode::new(
            Nibbles::from_bytes(&[1, 2, 3]),
            Bytes::from_static(&[9]),
            Bytes::from_static(&[7, 7, 7]),
        );
        assert_eq!(a.encode_canonical(), b.encode_canonical());
        assert_eq!(a.compute_hash(), b.compute_hash());
        assert_ne!(a.encode_raw(), b.encode_raw());
    }

    #[test]
    fn leaf_round_trips_through_storage_encoding() {
        let leaf = LeafNode::new(
            Nibbles::from_bytes(&[0xAB]),
            Bytes::from_static(&[1, 2, 3]),
            Bytes::from_static(&[4, 5]),
        );
        let encoded = leaf.encode_raw();
        let (decoded, rest) = LeafNode::decode_raw(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(leaf, decoded);
    }

    #[test]
    fn branch_round_trips_with_mixed_slots() {
        let mut branch = BranchNode::new();
        branch.choices[0] = Some(NodeHash::Inline(vec![1, 2]));
        branch.choices[5] = Some(NodeHash::Hashed(ethereum_types::H256::repeat_byte(9)));
        branch.value = Some(Bytes::from_static(&[42]));
        let encoded = branch.encode_raw();
        let (decoded, rest) = BranchNode::decode_raw(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(branch, decoded);
    }

    #[test]
    fn extension_round_trips() {
        let ext = ExtensionNode::new(
            Nibbles::from_raw(&[0xAB, 0xCD], false),
            NodeHash::Hashed(ethereum_types::H256::repeat_byte(3)),
        );
        let encoded = ext.encode_raw();
        let (decoded, rest) = ExtensionNode::decode_raw(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(ext, decoded);
    }
}
