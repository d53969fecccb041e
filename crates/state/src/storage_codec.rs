use bytes::Bytes;
use thor_common::Hash;
use thor_crypto::blake2b256;
use thor_rlp::decode::decode_rlp_item;
use thor_rlp::encode::RLPEncode;
use thor_rlp::error::RLPDecodeError;

/// Strips leading zero bytes and RLP-encodes the remainder as a byte string. An
/// all-zero word encodes to an empty `Bytes`, which is this crate's uniform
/// "delete this slot" marker.
pub fn encode_storage_word(word: Hash) -> Bytes {
    let bytes = word.as_bytes();
    let Some(start) = bytes.iter().position(|&b| b != 0) else {
        return Bytes::new();
    };
    let trimmed = Bytes::copy_from_slice(&bytes[start..]);
    let mut buf = Vec::new();
    trimmed.encode(&mut buf);
    Bytes::from(buf)
}

/// Applies the storage-slot decode policy: empty raw storage is the zero word; a
/// byte-string RLP item is right-padded into the low bytes of the word; a list item
/// is a *structured* value and decodes to the `blake2b256` hash of its raw RLP, so
/// every storage read presents a uniform 32-byte word to a caller expecting one.
pub fn decode_storage_word(raw: &[u8]) -> Result<Hash, RLPDecodeError> {
    if raw.is_empty() {
        return Ok(Hash::zero());
    }
    let (is_list, payload, _rest) = decode_rlp_item(raw)?;
    if is_list {
        return Ok(blake2b256(raw));
    }
    if payload.len() > 32 {
        return Err(RLPDecodeError::InvalidLength);
    }
    let mut word = [0u8; 32];
    word[32 - payload.len()..].copy_from_slice(payload);
    Ok(Hash::from(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_raw_storage_decodes_to_zero_word() {
        assert_eq!(decode_storage_word(&[]).unwrap(), Hash::zero());
    }

    #[test]
    fn zero_word_encodes_to_the_delete_marker() {
        assert!(encode_storage_word(Hash::zero()).is_empty());
    }

    #[test]
    fn byte_string_round_trips_right_padded() {
        let word = {
            let mut w = [0u8; 32];
            w[30] = b'v';
            w[31] = b'2';
            Hash::from(w)
        };
        let encoded = encode_storage_word(word);
        let decoded = decode_storage_word(&encoded).unwrap();
        assert_eq!(decoded, word);
    }

    #[test]
    fn list_item_decodes_to_its_blake2b_hash() {
        let mut raw = Vec::new();
        vec![1u8, 2, 3].encode(&mut raw);
        let decoded = decode_storage_word(&raw).unwrap();
        assert_eq!(decoded, blake2b256(&raw));
    }
}
