// SPDX-License-Identifier: MPL-2.0

//! Finite field arithmetic.
//!
//! The IDPF programs its values over two prime fields: [`Field64`] for the inner levels of the
//! prefix tree and the larger [`Field128`] for the leaf level. Elements of both fields are encoded
//! as fixed-size big-endian integers.

#[cfg(any(test, feature = "test-util"))]
use crate::prng::Prng;
use crate::{
    codec::{CodecError, Decode, Encode},
    fp::{FP128, FP64},
};
use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{Cursor, Read},
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};
use subtle::{Choice, ConditionallyNegatable, ConditionallySelectable, ConstantTimeEq};

/// Possible errors from finite field operations.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    /// Input sizes do not match.
    #[error("input sizes do not match")]
    InputSizeMismatch,
    /// Returned when decoding a `FieldElement` from a short byte string.
    #[error("short read from bytes")]
    ShortRead,
    /// Returned when decoding a `FieldElement` from a byte string encoding an integer larger than
    /// or equal to the field modulus.
    #[error("read from byte slice exceeds modulus")]
    ModulusOverflow,
}

/// Objects with this trait represent an element of `GF(p)` for some prime `p`.
pub trait FieldElement:
    Sized
    + Debug
    + Display
    + Copy
    + Default
    + PartialEq
    + Eq
    + ConstantTimeEq
    + ConditionallySelectable
    + ConditionallyNegatable
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + SubAssign
    + Mul<Output = Self>
    + MulAssign
    + Neg<Output = Self>
    + From<<Self as FieldElement>::Integer>
    + for<'a> TryFrom<&'a [u8], Error = FieldError>
    + Encode
    + Decode
    + Send
    + Sync
    + 'static
{
    /// Size in bytes of the encoding of a value.
    const ENCODED_SIZE: usize;

    /// The integer representation of the field element.
    type Integer: Copy + Debug + Eq + Ord + From<Self>;

    /// Returns the prime modulus `p`.
    fn modulus() -> Self::Integer;

    /// Interprets the first [`Self::ENCODED_SIZE`] bytes of the input slice as an element of the
    /// field, after clearing every bit above the bit length of the modulus.
    ///
    /// # Errors
    ///
    /// An error is returned if the provided slice is too small to encode a field element or if the
    /// masked value is not smaller than the field modulus. Callers sampling field elements retry
    /// on [`FieldError::ModulusOverflow`].
    #[doc(hidden)]
    fn try_from_random(bytes: &[u8]) -> Result<Self, FieldError>;

    /// Returns the additive identity.
    fn zero() -> Self;

    /// Returns the multiplicative identity.
    fn one() -> Self;
}

macro_rules! make_field {
    (
        $(#[$meta:meta])*
        $elem:ident, $int:ident, $fp:ident, $encoding_size:literal,
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default)]
        pub struct $elem(u128);

        impl $elem {
            /// Attempts to instantiate an `$elem` from the first `Self::ENCODED_SIZE` bytes in the
            /// provided slice, read as a big-endian integer. The decoded value is bitwise-ANDed
            /// with `mask` before it is compared against the field modulus.
            fn try_from_bytes(bytes: &[u8], mask: u128) -> Result<Self, FieldError> {
                if Self::ENCODED_SIZE > bytes.len() {
                    return Err(FieldError::ShortRead);
                }

                let mut int = 0u128;
                for byte in &bytes[..Self::ENCODED_SIZE] {
                    int = (int << 8) | u128::from(*byte);
                }
                int &= mask;

                if int >= $fp.p {
                    return Err(FieldError::ModulusOverflow);
                }
                Ok(Self(int))
            }
        }

        impl ConstantTimeEq for $elem {
            fn ct_eq(&self, rhs: &Self) -> Choice {
                self.0.to_be_bytes().ct_eq(&rhs.0.to_be_bytes())
            }
        }

        impl PartialEq for $elem {
            fn eq(&self, rhs: &Self) -> bool {
                self.ct_eq(rhs).into()
            }
        }

        impl Eq for $elem {}

        impl ConditionallySelectable for $elem {
            fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
                let lo = u64::conditional_select(&(a.0 as u64), &(b.0 as u64), choice);
                let hi = u64::conditional_select(
                    &((a.0 >> 64) as u64),
                    &((b.0 >> 64) as u64),
                    choice,
                );
                Self((u128::from(hi) << 64) | u128::from(lo))
            }
        }

        impl Add for $elem {
            type Output = $elem;
            fn add(self, rhs: Self) -> Self {
                Self($fp.add(self.0, rhs.0))
            }
        }

        impl AddAssign for $elem {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl Sub for $elem {
            type Output = $elem;
            fn sub(self, rhs: Self) -> Self {
                Self($fp.sub(self.0, rhs.0))
            }
        }

        impl SubAssign for $elem {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl Mul for $elem {
            type Output = $elem;
            fn mul(self, rhs: Self) -> Self {
                Self($fp.mul(self.0, rhs.0))
            }
        }

        impl MulAssign for $elem {
            fn mul_assign(&mut self, rhs: Self) {
                *self = *self * rhs;
            }
        }

        impl Neg for $elem {
            type Output = $elem;
            fn neg(self) -> Self {
                Self($fp.neg(self.0))
            }
        }

        impl Neg for &$elem {
            type Output = $elem;
            fn neg(self) -> $elem {
                -(*self)
            }
        }

        impl From<$int> for $elem {
            fn from(x: $int) -> Self {
                Self($fp.elem(u128::from(x)))
            }
        }

        impl From<$elem> for $int {
            fn from(x: $elem) -> Self {
                // Canonical elements are smaller than the modulus, which fits in `$int`.
                x.0 as $int
            }
        }

        impl<'a> TryFrom<&'a [u8]> for $elem {
            type Error = FieldError;

            fn try_from(bytes: &[u8]) -> Result<Self, FieldError> {
                Self::try_from_bytes(bytes, u128::MAX)
            }
        }

        impl Display for $elem {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Debug for $elem {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Encode for $elem {
            fn encode(&self, bytes: &mut Vec<u8>) {
                bytes.extend_from_slice(&self.0.to_be_bytes()[16 - Self::ENCODED_SIZE..]);
            }

            fn encoded_len(&self) -> Option<usize> {
                Some(Self::ENCODED_SIZE)
            }
        }

        impl Decode for $elem {
            fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
                let mut value = [0u8; $encoding_size];
                bytes.read_exact(&mut value)?;
                Self::try_from_bytes(&value, u128::MAX).map_err(|e| CodecError::Other(Box::new(e)))
            }
        }

        impl FieldElement for $elem {
            const ENCODED_SIZE: usize = $encoding_size;
            type Integer = $int;

            fn modulus() -> Self::Integer {
                $fp.p as $int
            }

            fn try_from_random(bytes: &[u8]) -> Result<Self, FieldError> {
                Self::try_from_bytes(bytes, $fp.bit_mask)
            }

            fn zero() -> Self {
                Self(0)
            }

            fn one() -> Self {
                Self(1)
            }
        }
    };
}

make_field!(
    /// `GF(18446744069414584321)`, a 64-bit field. This is the field of the inner tree levels.
    Field64,
    u64,
    FP64,
    8,
);

make_field!(
    /// `GF(340282366920938462946865773367900766209)`, a 128-bit field. This is the field of the
    /// leaf level.
    Field128,
    u128,
    FP128,
    16,
);

/// Merge two vectors of field elements by summing `other_vector` into `accumulator`.
///
/// # Errors
///
/// Fails if the two vectors do not have the same length.
pub fn merge_vector<F: FieldElement>(
    accumulator: &mut [F],
    other_vector: &[F],
) -> Result<(), FieldError> {
    if accumulator.len() != other_vector.len() {
        return Err(FieldError::InputSizeMismatch);
    }
    for (a, o) in accumulator.iter_mut().zip(other_vector.iter()) {
        *a += *o;
    }

    Ok(())
}

/// Returns a vector of `len` zeros.
pub fn zero_vector<F: FieldElement>(len: usize) -> Vec<F> {
    vec![F::zero(); len]
}

/// Generate a vector of uniformly random field elements.
#[cfg(any(test, feature = "test-util"))]
pub fn random_vector<F: FieldElement>(len: usize) -> Vec<F> {
    Prng::from_seed_stream(rand::rng()).take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_encoding() {
        let x = Field64::from(0x0102_0304_0506_0708u64);
        assert_eq!(x.get_encoded(), [1, 2, 3, 4, 5, 6, 7, 8]);

        let y = Field128::from(1u128);
        let mut expected = [0u8; 16];
        expected[15] = 1;
        assert_eq!(y.get_encoded(), expected);
    }

    #[test]
    fn test_accumulate() {
        let mut lhs = vec![Field64::from(1u64); 10];
        let rhs = vec![Field64::from(2u64); 10];

        merge_vector(&mut lhs, &rhs).unwrap();

        lhs.iter().for_each(|f| assert_eq!(*f, Field64::from(3u64)));
        rhs.iter().for_each(|f| assert_eq!(*f, Field64::from(2u64)));

        let wrong_len = zero_vector::<Field64>(9);
        let result = merge_vector(&mut lhs, &wrong_len);
        assert_matches!(result, Err(FieldError::InputSizeMismatch));
    }

    #[test]
    fn test_reduction_on_conversion() {
        assert_eq!(Field64::from(u64::MAX), Field64::from(u64::MAX - Field64::modulus()));
        assert_eq!(u64::from(Field64::from(Field64::modulus())), 0);
        assert_eq!(u128::from(Field128::from(Field128::modulus() + 5)), 5);
    }

    #[test]
    fn test_decode_rejects_modulus() {
        let too_big = 18446744069414584321u64.to_be_bytes();
        assert_matches!(
            Field64::get_decoded(&too_big),
            Err(CodecError::Other(_))
        );
        assert_matches!(
            Field64::try_from(&[0u8; 4][..]),
            Err(FieldError::ShortRead)
        );
    }

    #[test]
    fn test_try_from_random() {
        // Every 8-byte string maps into Field64 after masking except those above the modulus.
        assert_matches!(
            Field64::try_from_random(&[0xff; 8]),
            Err(FieldError::ModulusOverflow)
        );
        assert_eq!(
            Field64::try_from_random(&[0, 0, 0, 0, 0, 0, 0, 7]).unwrap(),
            Field64::from(7u64)
        );
        assert_matches!(
            Field128::try_from_random(&[0xff; 16]),
            Err(FieldError::ModulusOverflow)
        );
    }

    fn field_element_test<F: FieldElement>() {
        let zero = F::zero();
        let one = F::one();
        let two = one + one;
        let four = two + two;

        // add + sub
        assert_eq!(zero - one + one, zero);
        assert_eq!(two - one, one);
        for _ in 0..100 {
            let v = random_vector::<F>(2);
            let (f, g) = (v[0], v[1]);
            assert_eq!(f + g - f - g, zero);
            assert_eq!(f + g - g, f);
            assert_eq!(f + (-f), zero);
        }

        // mul
        assert_eq!(two * two, four);
        assert_eq!(two * one, two);
        assert_eq!(two * zero, zero);
        assert_eq!((-one) * (-one), one);

        // constant-time selection and negation
        assert_eq!(F::conditional_select(&one, &two, Choice::from(0)), one);
        assert_eq!(F::conditional_select(&one, &two, Choice::from(1)), two);
        let mut x = two;
        x.conditional_negate(Choice::from(0));
        assert_eq!(x, two);
        x.conditional_negate(Choice::from(1));
        assert_eq!(x, -two);

        // serialization
        let test_inputs = [zero, one, -one, random_vector::<F>(1)[0]];
        for want in test_inputs.iter() {
            let bytes = want.get_encoded();
            assert_eq!(bytes.len(), F::ENCODED_SIZE);
            assert_eq!(F::get_decoded(&bytes).unwrap(), *want);
            assert_eq!(F::try_from(bytes.as_slice()).unwrap(), *want);
        }
    }

    #[test]
    fn test_field64() {
        field_element_test::<Field64>();
    }

    #[test]
    fn test_field128() {
        field_element_test::<Field128>();
    }
}
