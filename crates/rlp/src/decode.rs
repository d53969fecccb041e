use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

use super::error::RLPDecodeError;

/// Splits the header off an RLP item, returning `(is_list, payload, rest)`.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let (item, rest) = get_item_with_prefix(data)?;
    let is_list = item.first().is_some_and(|b| *b >= 0xc0);
    let payload = strip_prefix(item)?;
    Ok((is_list, payload, rest))
}

/// Returns the encoded item (including its length prefix) and the remaining bytes.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let first = *data.first().ok_or(RLPDecodeError::MalformedData)?;
    let total_len = match first {
        0x00..=0x7f => 1,
        0x80..=0xb7 => 1 + (first - 0x80) as usize,
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            1 + len_of_len + read_length(data, 1, len_of_len)?
        }
        0xc0..=0xf7 => 1 + (first - 0xc0) as usize,
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            1 + len_of_len + read_length(data, 1, len_of_len)?
        }
    };
    if total_len > data.len() {
        return Err(RLPDecodeError::MalformedData);
    }
    Ok(data.split_at(total_len))
}

fn read_length(data: &[u8], offset: usize, len_of_len: usize) -> Result<usize, RLPDecodeError> {
    let bytes = data
        .get(offset..offset + len_of_len)
        .ok_or(RLPDecodeError::MalformedData)?;
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf) as usize)
}

/// Strips the header off a single encoded item, returning its payload.
fn strip_prefix(item: &[u8]) -> Result<&[u8], RLPDecodeError> {
    let first = *item.first().ok_or(RLPDecodeError::MalformedData)?;
    let payload = match first {
        0x00..=0x7f => item,
        0x80..=0xb7 => &item[1..],
        0xb8..=0xbf => &item[1 + (first - 0xb7) as usize..],
        0xc0..=0xf7 => &item[1..],
        0xf8..=0xff => &item[1 + (first - 0xf7) as usize..],
    };
    Ok(payload)
}

/// Decodes a byte string item, returning `(content, rest)`.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let first = *data.first().ok_or(RLPDecodeError::MalformedData)?;
    match first {
        0x00..=0x7f => Ok((&data[..1], &data[1..])),
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            let content = data.get(1..1 + len).ok_or(RLPDecodeError::MalformedData)?;
            Ok((content, &data[1 + len..]))
        }
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            let len = read_length(data, 1, len_of_len)?;
            let start = 1 + len_of_len;
            let content = data
                .get(start..start + len)
                .ok_or(RLPDecodeError::MalformedData)?;
            Ok((content, &data[start + len..]))
        }
        0xc0..=0xff => Err(RLPDecodeError::UnexpectedList),
    }
}

pub trait RLPDecode: Sized {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(buf: &[u8]) -> Result<Self, RLPDecodeError> {
        let (value, rest) = Self::decode_unfinished(buf)?;
        if rest.is_empty() {
            Ok(value)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }
}

impl RLPDecode for bool {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(buf)?;
        match bytes {
            [] => Ok((false, rest)),
            [0x01] => Ok((true, rest)),
            _ => Err(RLPDecodeError::MalformedData),
        }
    }
}

macro_rules! impl_decode_uint {
    ($t:ty) => {
        impl RLPDecode for $t {
            fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
                let (bytes, rest) = decode_bytes(buf)?;
                if bytes.len() > std::mem::size_of::<$t>() {
                    return Err(RLPDecodeError::InvalidLength);
                }
                if bytes.first() == Some(&0) {
                    return Err(RLPDecodeError::MalformedData);
                }
                let mut padded = [0u8; std::mem::size_of::<$t>()];
                padded[std::mem::size_of::<$t>() - bytes.len()..].copy_from_slice(bytes);
                Ok((<$t>::from_be_bytes(padded), rest))
            }
        }
    };
}

impl_decode_uint!(u8);
impl_decode_uint!(u16);
impl_decode_uint!(u32);
impl_decode_uint!(u64);
impl_decode_uint!(u128);

impl RLPDecode for usize {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (value, rest) = u64::decode_unfinished(buf)?;
        Ok((value as usize, rest))
    }
}

impl RLPDecode for U256 {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(buf)?;
        if bytes.len() > 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((U256::from_big_endian(bytes), rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(buf)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl RLPDecode for Address {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(buf)?;
        if bytes.len() != 20 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((Address::from_slice(bytes), rest))
    }
}

impl RLPDecode for H256 {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(buf)?;
        if bytes.len() != 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((H256::from_slice(bytes), rest))
    }
}

impl RLPDecode for String {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(buf)?;
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| RLPDecodeError::MalformedData)?;
        Ok((s, rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(buf)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, remaining) = T::decode_unfinished(payload)?;
            items.push(item);
            payload = remaining;
        }
        Ok((items, rest))
    }
}
