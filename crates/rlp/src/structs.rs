use bytes::BufMut;

use super::{
    decode::{RLPDecode, decode_rlp_item, get_item_with_prefix},
    encode::{RLPEncode, encode_length},
    error::{RLPDecodeError, field_decode_error},
};

/// Fluent encoder for RLP lists (structs encoded as lists of their fields in order).
#[must_use = "`Encoder` must be consumed with `finish` to write the encoded bytes"]
pub struct Encoder<'a> {
    buf: &'a mut dyn BufMut,
    temp_buf: Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut dyn BufMut) -> Self {
        Self {
            buf,
            temp_buf: Vec::new(),
        }
    }

    pub fn encode_field<T: RLPEncode>(mut self, value: &T) -> Self {
        value.encode(&mut self.temp_buf);
        self
    }

    /// Encodes `Some(value)` as the field, or an empty string marker when `None`.
    /// Always occupies a list slot so decoding stays positional.
    pub fn encode_optional_field<T: RLPEncode>(mut self, value: &Option<T>) -> Self {
        match value {
            Some(value) => value.encode(&mut self.temp_buf),
            None => Vec::<u8>::new().encode(&mut self.temp_buf),
        }
        self
    }

    pub fn encode_raw(mut self, value: &[u8]) -> Self {
        self.temp_buf.put_slice(value);
        self
    }

    pub fn finish(self) {
        encode_length(self.temp_buf.len(), self.buf);
        self.buf.put_slice(&self.temp_buf);
    }
}

/// Fluent decoder for RLP lists, used to implement [`RLPDecode`] for structs.
#[derive(Debug)]
#[must_use = "`Decoder` must be consumed with `finish` to perform decoding checks"]
pub struct Decoder<'a> {
    payload: &'a [u8],
    remaining: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, RLPDecodeError> {
        match decode_rlp_item(buf)? {
            (true, payload, remaining) => Ok(Self { payload, remaining }),
            (false, _, _) => Err(RLPDecodeError::UnexpectedString),
        }
    }

    pub fn decode_field<T: RLPDecode>(self, name: &str) -> Result<(T, Self), RLPDecodeError> {
        let (field, rest) = T::decode_unfinished(self.payload)
            .map_err(|err| field_decode_error::<T>(name, err))?;
        Ok((field, Self { payload: rest, ..self }))
    }

    /// Decodes a field encoded via `encode_optional_field`: an empty string marks `None`,
    /// anything else is decoded as `T`. Always consumes one list slot.
    pub fn decode_optional_field<T: RLPDecode>(
        self,
        name: &str,
    ) -> Result<(Option<T>, Self), RLPDecodeError> {
        let (item, rest) = get_item_with_prefix(self.payload)?;
        if item == [0x80u8] {
            return Ok((None, Self { payload: rest, ..self }));
        }
        let (field, remaining) =
            T::decode_unfinished(self.payload).map_err(|err| field_decode_error::<T>(name, err))?;
        debug_assert_eq!(remaining, rest);
        Ok((Some(field), Self { payload: rest, ..self }))
    }

    pub fn get_encoded_item(self) -> Result<(Vec<u8>, Self), RLPDecodeError> {
        let (item, rest) = get_item_with_prefix(self.payload)?;
        Ok((item.to_vec(), Self { payload: rest, ..self }))
    }

    pub fn is_done(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn finish(self) -> Result<&'a [u8], RLPDecodeError> {
        if self.payload.is_empty() {
            Ok(self.remaining)
        } else {
            Err(RLPDecodeError::MalformedData)
        }
    }
}
