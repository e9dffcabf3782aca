// SPDX-License-Identifier: MPL-2.0

//! The values exchanged between the key generator and the evaluating parties: the public share,
//! made of one correction word per tree level, and the per-party key.
//!
//! A correction word is encoded as
//!
//! ```text
//! seed_cw[16] || control || value_cw[value_len]
//! ```
//!
//! where bit 0 of `control` is the left control bit correction, bit 1 is the right one, and the
//! remaining bits are zero. The elements of `value_cw` are big-endian [`Field64`] elements at the
//! inner levels and [`Field128`] elements at the leaf level. The public share is the concatenation
//! of the correction words from the root level down.
//!
//! A key is `root_seed[16] || control_bit`, where `control_bit` is `0x00` or `0x01`.
//!
//! [`Field64`]: crate::field::Field64
//! [`Field128`]: crate::field::Field128

use crate::{
    codec::{
        decode_fixed_items, encode_fixed_items, CodecError, Decode, Encode, ParameterizedDecode,
    },
    field::FieldElement,
    idpf::{node::SEED_SIZE, IdpfParameters},
    xof::Seed,
};
use std::io::{Cursor, Read};
use subtle::{Choice, ConstantTimeEq};

/// The correction word of one tree level.
#[derive(Debug, Clone)]
pub struct IdpfCorrectionWord<F> {
    pub(crate) seed: [u8; SEED_SIZE],
    pub(crate) control_bits: [Choice; 2],
    pub(crate) value: Vec<F>,
}

impl<F: FieldElement> IdpfCorrectionWord<F> {
    fn len_for(value_len: usize) -> usize {
        SEED_SIZE + 1 + value_len * F::ENCODED_SIZE
    }
}

impl<F: ConstantTimeEq> ConstantTimeEq for IdpfCorrectionWord<F> {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.seed.ct_eq(&other.seed)
            & self.control_bits[0].ct_eq(&other.control_bits[0])
            & self.control_bits[1].ct_eq(&other.control_bits[1])
            & self.value.as_slice().ct_eq(other.value.as_slice())
    }
}

impl<F: ConstantTimeEq> PartialEq for IdpfCorrectionWord<F> {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl<F: ConstantTimeEq> Eq for IdpfCorrectionWord<F> {}

impl<F: FieldElement> Encode for IdpfCorrectionWord<F> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.seed);
        bytes.push(self.control_bits[0].unwrap_u8() | (self.control_bits[1].unwrap_u8() << 1));
        encode_fixed_items(bytes, &self.value);
    }

    fn encoded_len(&self) -> Option<usize> {
        Some(Self::len_for(self.value.len()))
    }
}

impl<F: FieldElement> ParameterizedDecode<usize> for IdpfCorrectionWord<F> {
    fn decode_with_param(value_len: &usize, bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut seed = [0; SEED_SIZE];
        bytes.read_exact(&mut seed)?;

        let control = u8::decode(bytes)?;
        if control & !0b11 != 0 {
            return Err(CodecError::UnexpectedValue);
        }
        let control_bits = [Choice::from(control & 1), Choice::from(control >> 1)];

        let value = decode_fixed_items(*value_len, bytes)?;

        Ok(Self {
            seed,
            control_bits,
            value,
        })
    }
}

/// An IDPF public share. This contains the list of correction words used by all parties when
/// evaluating the IDPF.
#[derive(Debug, Clone)]
pub struct IdpfPublicShare<FI, FL> {
    /// Correction words for each inner node level.
    pub(crate) inner_correction_words: Vec<IdpfCorrectionWord<FI>>,
    /// Correction word for the leaf node level.
    pub(crate) leaf_correction_word: IdpfCorrectionWord<FL>,
}

impl<FI: FieldElement, FL: FieldElement> IdpfPublicShare<FI, FL> {
    /// Number of tree levels covered by this public share.
    pub fn bits(&self) -> usize {
        self.inner_correction_words.len() + 1
    }

    /// Length of the vectors programmed at each level.
    pub fn value_len(&self) -> usize {
        self.leaf_correction_word.value.len()
    }

    /// Encoded length of a public share with the given parameters.
    pub fn encoded_len_for(parameters: &IdpfParameters) -> usize {
        parameters.bits.saturating_sub(1)
            * IdpfCorrectionWord::<FI>::len_for(parameters.value_len)
            + IdpfCorrectionWord::<FL>::len_for(parameters.value_len)
    }
}

impl<FI: ConstantTimeEq, FL: ConstantTimeEq> ConstantTimeEq for IdpfPublicShare<FI, FL> {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.inner_correction_words
            .as_slice()
            .ct_eq(other.inner_correction_words.as_slice())
            & self.leaf_correction_word.ct_eq(&other.leaf_correction_word)
    }
}

impl<FI: ConstantTimeEq, FL: ConstantTimeEq> PartialEq for IdpfPublicShare<FI, FL> {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl<FI: ConstantTimeEq, FL: ConstantTimeEq> Eq for IdpfPublicShare<FI, FL> {}

impl<FI: FieldElement, FL: FieldElement> Encode for IdpfPublicShare<FI, FL> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        for correction_word in self.inner_correction_words.iter() {
            correction_word.encode(bytes);
        }
        self.leaf_correction_word.encode(bytes);
    }

    fn encoded_len(&self) -> Option<usize> {
        Some(Self::encoded_len_for(&IdpfParameters {
            bits: self.bits(),
            value_len: self.value_len(),
        }))
    }
}

impl<FI: FieldElement, FL: FieldElement> ParameterizedDecode<IdpfParameters>
    for IdpfPublicShare<FI, FL>
{
    fn decode_with_param(
        parameters: &IdpfParameters,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        if parameters.bits == 0 {
            return Err(CodecError::UnexpectedValue);
        }

        let mut inner_correction_words = Vec::with_capacity(parameters.bits - 1);
        for _ in 0..parameters.bits - 1 {
            inner_correction_words.push(IdpfCorrectionWord::decode_with_param(
                &parameters.value_len,
                bytes,
            )?);
        }
        let leaf_correction_word =
            IdpfCorrectionWord::decode_with_param(&parameters.value_len, bytes)?;

        Ok(Self {
            inner_correction_words,
            leaf_correction_word,
        })
    }
}

/// One party's IDPF key: the seed and control bit of its root node.
#[derive(Debug, Clone)]
pub struct IdpfKey {
    pub(crate) seed: Seed<SEED_SIZE>,
    pub(crate) control_bit: Choice,
}

impl IdpfKey {
    /// Size in bytes of an encoded key.
    pub const ENCODED_SIZE: usize = SEED_SIZE + 1;

    pub(crate) fn new(seed: Seed<SEED_SIZE>, agg_id: usize) -> Self {
        Self {
            seed,
            control_bit: Choice::from(u8::from(agg_id != 0)),
        }
    }

    /// The index of the party this key was generated for.
    pub fn agg_id(&self) -> usize {
        usize::from(self.control_bit.unwrap_u8())
    }
}

impl ConstantTimeEq for IdpfKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.seed.ct_eq(&other.seed) & self.control_bit.ct_eq(&other.control_bit)
    }
}

impl PartialEq for IdpfKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for IdpfKey {}

impl Encode for IdpfKey {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.seed.encode(bytes);
        bytes.push(self.control_bit.unwrap_u8());
    }

    fn encoded_len(&self) -> Option<usize> {
        Some(Self::ENCODED_SIZE)
    }
}

impl Decode for IdpfKey {
    fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let seed = Seed::decode(bytes)?;
        let control_bit = match u8::decode(bytes)? {
            0 => Choice::from(0),
            1 => Choice::from(1),
            _ => return Err(CodecError::UnexpectedValue),
        };
        Ok(Self { seed, control_bit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field128, Field64};
    use assert_matches::assert_matches;

    fn parameters(bits: usize, value_len: usize) -> IdpfParameters {
        IdpfParameters { bits, value_len }
    }

    fn sample_public_share() -> IdpfPublicShare<Field64, Field128> {
        IdpfPublicShare {
            inner_correction_words: vec![IdpfCorrectionWord {
                seed: [0xaa; SEED_SIZE],
                control_bits: [Choice::from(1), Choice::from(0)],
                value: vec![Field64::from(1u64), Field64::from(2u64)],
            }],
            leaf_correction_word: IdpfCorrectionWord {
                seed: [0xbb; SEED_SIZE],
                control_bits: [Choice::from(0), Choice::from(1)],
                value: vec![Field128::from(3u128), Field128::from(4u128)],
            },
        }
    }

    #[test]
    fn public_share_layout() {
        let public_share = sample_public_share();
        let encoded = public_share.get_encoded();
        assert_eq!(
            hex::encode(&encoded),
            concat!(
                "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "01",
                "0000000000000001",
                "0000000000000002",
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                "02",
                "00000000000000000000000000000003",
                "00000000000000000000000000000004",
            )
        );
        assert_eq!(
            encoded.len(),
            IdpfPublicShare::<Field64, Field128>::encoded_len_for(&parameters(2, 2))
        );
        assert_eq!(public_share.encoded_len(), Some(encoded.len()));

        let decoded = IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
            &parameters(2, 2),
            &encoded,
        )
        .unwrap();
        assert_eq!(decoded, public_share);
        assert_eq!(decoded.bits(), 2);
        assert_eq!(decoded.value_len(), 2);
    }

    #[test]
    fn public_share_unused_control_bits() {
        let mut encoded = sample_public_share().get_encoded();
        encoded[SEED_SIZE] |= 0b100;
        assert_matches!(
            IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
                &parameters(2, 2),
                &encoded
            ),
            Err(CodecError::UnexpectedValue)
        );
    }

    #[test]
    fn public_share_wrong_length() {
        let encoded = sample_public_share().get_encoded();
        assert_matches!(
            IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
                &parameters(2, 2),
                &encoded[..encoded.len() - 1]
            ),
            Err(CodecError::Io(_))
        );
        assert_matches!(
            IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
                &parameters(1, 2),
                &encoded
            ),
            Err(_)
        );
        assert_matches!(
            IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
                &parameters(0, 2),
                &encoded
            ),
            Err(CodecError::UnexpectedValue)
        );

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert_matches!(
            IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
                &parameters(2, 2),
                &trailing
            ),
            Err(CodecError::BytesLeftOver(1))
        );
    }

    #[test]
    fn public_share_non_canonical_element() {
        let mut encoded = sample_public_share().get_encoded();
        // Overwrite the first inner value with the Field64 modulus.
        encoded[SEED_SIZE + 1..SEED_SIZE + 9].copy_from_slice(&Field64::modulus().to_be_bytes());
        assert_matches!(
            IdpfPublicShare::<Field64, Field128>::get_decoded_with_param(
                &parameters(2, 2),
                &encoded
            ),
            Err(CodecError::Other(_))
        );
    }

    #[test]
    fn key_encoding() {
        let key = IdpfKey::new(Seed::from_bytes([7; SEED_SIZE]), 1);
        let encoded = key.get_encoded();
        assert_eq!(encoded.len(), IdpfKey::ENCODED_SIZE);
        assert_eq!(encoded[SEED_SIZE], 1);
        assert_eq!(IdpfKey::get_decoded(&encoded).unwrap(), key);
        assert_eq!(key.agg_id(), 1);

        let mut bad_control = encoded.clone();
        bad_control[SEED_SIZE] = 2;
        assert_matches!(
            IdpfKey::get_decoded(&bad_control),
            Err(CodecError::UnexpectedValue)
        );
        assert_matches!(
            IdpfKey::get_decoded(&encoded[..SEED_SIZE]),
            Err(CodecError::Io(_))
        );
    }
}
