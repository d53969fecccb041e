use bytes::{BufMut, Bytes};
use ethereum_types::{Address, H256, U256};

use super::constants::{RLP_EMPTY_LIST, RLP_NULL};

/// Encodes a value to a freshly allocated buffer.
pub fn encode<T: RLPEncode>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    buf
}

/// Writes the RLP length prefix for a list (or already-encoded) payload of `payload_len` bytes.
pub fn encode_length(payload_len: usize, buf: &mut dyn BufMut) {
    if payload_len < 56 {
        buf.put_u8(RLP_EMPTY_LIST + payload_len as u8);
    } else {
        let be = payload_len.to_be_bytes();
        let first_nonzero = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
        let trimmed = &be[first_nonzero..];
        buf.put_u8(RLP_EMPTY_LIST + 55 + trimmed.len() as u8);
        buf.put_slice(trimmed);
    }
}

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut counter = Vec::new();
        self.encode(&mut counter);
        counter.len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl RLPEncode for bool {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_u8(if *self { 0x01 } else { RLP_NULL });
    }
}

fn encode_be_int(value_be: &[u8], buf: &mut dyn BufMut) {
    let first_nonzero = value_be.iter().position(|b| *b != 0);
    let Some(start) = first_nonzero else {
        buf.put_u8(RLP_NULL);
        return;
    };
    let trimmed = &value_be[start..];
    if trimmed.len() == 1 && trimmed[0] <= 0x7f {
        buf.put_u8(trimmed[0]);
        return;
    }
    encode_bytes_header(trimmed.len(), buf);
    buf.put_slice(trimmed);
}

fn encode_bytes_header(len: usize, buf: &mut dyn BufMut) {
    if len < 56 {
        buf.put_u8(RLP_NULL + len as u8);
    } else {
        let be = len.to_be_bytes();
        let start = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
        let trimmed = &be[start..];
        buf.put_u8(RLP_NULL + 55 + trimmed.len() as u8);
        buf.put_slice(trimmed);
    }
}

macro_rules! impl_encode_uint {
    ($t:ty) => {
        impl RLPEncode for $t {
            fn encode(&self, buf: &mut dyn BufMut) {
                encode_be_int(&self.to_be_bytes(), buf);
            }
        }
    };
}

impl_encode_uint!(u8);
impl_encode_uint!(u16);
impl_encode_uint!(u32);
impl_encode_uint!(u64);
impl_encode_uint!(u128);

impl RLPEncode for usize {
    fn encode(&self, buf: &mut dyn BufMut) {
        (*self as u64).encode(buf);
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        let be = self.to_big_endian();
        encode_be_int(&be, buf);
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] <= 0x7f {
            buf.put_u8(self[0]);
            return;
        }
        encode_bytes_header(self.len(), buf);
        buf.put_slice(self);
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_ref().encode(buf)
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_slice().encode(buf)
    }
}

impl RLPEncode for Address {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for H256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for str {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_bytes().encode(buf)
    }
}

impl RLPEncode for String {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.as_str().encode(buf)
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        for item in self {
            item.encode(&mut payload);
        }
        encode_length(payload.len(), buf);
        buf.put_slice(&payload);
    }
}

