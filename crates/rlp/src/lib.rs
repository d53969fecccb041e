//! # thor-rlp
//!
//! Recursive Length Prefix (RLP) encoding and decoding, used throughout the state
//! engine to serialize accounts, trie nodes and builtin-contract records.
//!
//! ## Modules
//!
//! - [`encode`]: the [`encode::RLPEncode`] trait and primitive implementations.
//! - [`decode`]: the [`decode::RLPDecode`] trait and primitive implementations.
//! - [`structs`]: [`structs::Encoder`] / [`structs::Decoder`] builders for composite types.
//! - [`error`]: decode error type.
//! - [`constants`]: RLP protocol constants.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod structs;

pub use decode::RLPDecode;
pub use encode::RLPEncode;
pub use error::RLPDecodeError;

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ethereum_types::{Address, H256, U256};

    #[test]
    fn round_trips_u64() {
        for v in [0u64, 1, 127, 128, 55, 56, 300, u64::MAX] {
            let encoded = v.encode_to_vec();
            assert_eq!(u64::decode(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn round_trips_bytes() {
        let v = Bytes::from_static(&[1u8, 2, 3, 4, 5]);
        let encoded = v.encode_to_vec();
        assert_eq!(Bytes::decode(&encoded).unwrap(), v);
    }

    #[test]
    fn round_trips_empty_bytes_as_null() {
        let v = Bytes::new();
        let encoded = v.encode_to_vec();
        assert_eq!(encoded, vec![constants::RLP_NULL]);
    }

    #[test]
    fn round_trips_u256() {
        let v = U256::from(123456789u64);
        let encoded = v.encode_to_vec();
        assert_eq!(U256::decode(&encoded).unwrap(), v);
    }

    #[test]
    fn round_trips_address_and_hash() {
        let a = Address::repeat_byte(0xab);
        assert_eq!(Address::decode(&a.encode_to_vec()).unwrap(), a);
        let h = H256::repeat_byte(0xcd);
        assert_eq!(H256::decode(&h.encode_to_vec()).unwrap(), h);
    }

    #[test]
    fn round_trips_list() {
        let v = vec![1u64, 2, 3, 300];
        let encoded = v.encode_to_vec();
        assert_eq!(Vec::<u64>::decode(&encoded).unwrap(), v);
    }

    struct Pair {
        a: u64,
        b: Option<Address>,
    }

    impl RLPEncode for Pair {
        fn encode(&self, buf: &mut dyn bytes::BufMut) {
            structs::Encoder::new(buf)
                .encode_field(&self.a)
                .encode_optional_field(&self.b)
                .finish();
        }
    }

    impl RLPDecode for Pair {
        fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
            let decoder = structs::Decoder::new(buf)?;
            let (a, decoder) = decoder.decode_field("a")?;
            let (b, decoder) = decoder.decode_optional_field("b")?;
            let rest = decoder.finish()?;
            Ok((Pair { a, b }, rest))
        }
    }

    #[test]
    fn optional_field_round_trips_both_variants() {
        let with_addr = Pair {
            a: 7,
            b: Some(Address::repeat_byte(0x11)),
        };
        let encoded = with_addr.encode_to_vec();
        let decoded = Pair::decode(&encoded).unwrap();
        assert_eq!(decoded.a, 7);
        assert_eq!(decoded.b, Some(Address::repeat_byte(0x11)));

        let without_addr = Pair { a: 9, b: None };
        let encoded = without_addr.encode_to_vec();
        let decoded = Pair::decode(&encoded).unwrap();
        assert_eq!(decoded.a, 9);
        assert_eq!(decoded.b, None);
    }
}
