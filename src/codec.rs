// SPDX-License-Identifier: MPL-2.0

//! Support for encoding and decoding the byte strings exchanged between the IDPF key generator
//! and the parties that evaluate the key shares.
//!
//! Every message in this crate has a fixed length that is a function of the IDPF parameters, so
//! there are no length prefixes: a decoder is told the shape up front through
//! [`ParameterizedDecode`], and [`ParameterizedDecode::get_decoded_with_param`] refuses input with
//! trailing bytes.

use std::{
    error::Error,
    io::{Cursor, Read},
};

/// An error that occurred during decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error, typically a read past the end of the input.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Extra data remained in the input after decoding a value.
    #[error("{0} bytes left in buffer after decoding value")]
    BytesLeftOver(usize),

    /// The input contained a value that is not valid for its type.
    #[error("unexpected value")]
    UnexpectedValue,

    /// Any other decoding error.
    #[error("other error: {0}")]
    Other(#[source] Box<dyn Error + Send + Sync + 'static>),
}

/// Describes how to decode an object from a byte sequence.
pub trait Decode: Sized {
    /// Read and decode an encoded object from `bytes`. On success, the decoded value is returned
    /// and `bytes` is advanced by the encoded size of the value.
    fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError>;

    /// Convenience method to get a decoded value. Returns an error if [`Self::decode`] fails, or
    /// if there are any bytes left in `bytes` after decoding a value.
    fn get_decoded(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::get_decoded_with_param(&(), bytes)
    }
}

/// Describes how to decode an object from a byte sequence and a decoding parameter that provides
/// additional context.
pub trait ParameterizedDecode<P>: Sized {
    /// Read and decode an encoded object from `bytes`. `decoding_parameter` provides details of
    /// the wire encoding such as lengths of different portions of the message.
    fn decode_with_param(
        decoding_parameter: &P,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError>;

    /// Convenience method to get a decoded value. Returns an error if
    /// [`Self::decode_with_param`] fails, or if there are any bytes left in `bytes` after
    /// decoding a value.
    fn get_decoded_with_param(decoding_parameter: &P, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let decoded = Self::decode_with_param(decoding_parameter, &mut cursor)?;
        if cursor.position() as usize != bytes.len() {
            return Err(CodecError::BytesLeftOver(
                bytes.len() - cursor.position() as usize,
            ));
        }

        Ok(decoded)
    }
}

impl<D: Decode + ?Sized, T> ParameterizedDecode<T> for D {
    fn decode_with_param(
        _decoding_parameter: &T,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        Self::decode(bytes)
    }
}

/// Describes how to encode objects into a byte sequence.
pub trait Encode {
    /// Append the encoded form of this object to the end of `bytes`, growing the vector as needed.
    fn encode(&self, bytes: &mut Vec<u8>);

    /// Convenience method to encode a value into a new `Vec<u8>`.
    fn get_encoded(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len().unwrap_or_default());
        self.encode(&mut bytes);
        bytes
    }

    /// Returns an optional hint indicating how many bytes will be required to encode this value,
    /// or `None` by default.
    fn encoded_len(&self) -> Option<usize> {
        None
    }
}

impl Encode for u8 {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(*self);
    }

    fn encoded_len(&self) -> Option<usize> {
        Some(1)
    }
}

impl Decode for u8 {
    fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut value = [0u8; 1];
        bytes.read_exact(&mut value)?;
        Ok(value[0])
    }
}

/// Decode `count` consecutive items of a type that needs no decoding parameter.
pub(crate) fn decode_fixed_items<D: Decode>(
    count: usize,
    bytes: &mut Cursor<&[u8]>,
) -> Result<Vec<D>, CodecError> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(D::decode(bytes)?);
    }
    Ok(items)
}

/// Encode each item in `items`, back to back, with no length prefix.
pub(crate) fn encode_fixed_items<E: Encode>(bytes: &mut Vec<u8>, items: &[E]) {
    for item in items {
        item.encode(bytes);
    }
}
