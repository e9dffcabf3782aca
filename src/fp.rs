// SPDX-License-Identifier: MPL-2.0

//! Modular arithmetic for any prime field GF(p) with p < 2^128.
//!
//! Elements are kept in canonical form, i.e. as integers in `[0, p)`. None of the arithmetic
//! routines below branch on their operands.

/// This structure represents the parameters of a finite field GF(p) for which p < 2^128.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FieldParameters {
    /// The prime modulus `p`.
    pub p: u128,
    /// Mask applied to pseudorandom bytes before rejection sampling. This clears every bit above
    /// the bit length of `p`.
    pub bit_mask: u128,
}

impl FieldParameters {
    /// Addition.
    pub fn add(&self, x: u128, y: u128) -> u128 {
        let (z, overflow) = x.overflowing_add(y);
        let (w, underflow) = z.overflowing_sub(self.p);
        // If the sum wrapped around 2^128 then it is certainly at least p, and `w` holds the
        // reduced value. Otherwise `z` is already reduced exactly when `z - p` underflowed.
        let keep_z = mask(!overflow & underflow);
        (z & keep_z) | (w & !keep_z)
    }

    /// Subtraction.
    pub fn sub(&self, x: u128, y: u128) -> u128 {
        let (z, borrow) = x.overflowing_sub(y);
        z.wrapping_add(mask(borrow) & self.p)
    }

    /// Negation, i.e., `-x (mod p)` where `p` is the modulus.
    pub fn neg(&self, x: u128) -> u128 {
        self.sub(0, x)
    }

    /// Multiplication by double-and-add over the bits of `y`, most significant first. Every
    /// iteration performs the same operations regardless of the bit value.
    pub fn mul(&self, x: u128, y: u128) -> u128 {
        let mut acc = 0;
        for i in (0..128).rev() {
            acc = self.add(acc, acc);
            acc = self.add(acc, x & mask((y >> i) & 1 == 1));
        }
        acc
    }

    /// Maps an arbitrary integer to its canonical representative.
    pub fn elem(&self, x: u128) -> u128 {
        x % self.p
    }
}

/// All ones if `bit` is set, all zeros otherwise.
fn mask(bit: bool) -> u128 {
    0u128.wrapping_sub(bit as u128)
}

pub(crate) const FP64: FieldParameters = FieldParameters {
    p: 18446744069414584321, // 2^64 - 2^32 + 1
    bit_mask: 18446744073709551615,
};

pub(crate) const FP128: FieldParameters = FieldParameters {
    p: 340282366920938462946865773367900766209, // 2^66 * (2^62 - 2^3 + 1) + 1
    bit_mask: 340282366920938463463374607431768211455,
};
