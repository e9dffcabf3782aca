// SPDX-License-Identifier: MPL-2.0

//! Predicates over bit-string prefixes and tree levels.
//!
//! An IDPF input is an unsigned integer of `bits` bits. The node at tree level `level` is named by
//! the `level + 1` most significant bits of the input, and those bits are consumed most significant
//! first on the way down the tree.

use crate::idpf::IdpfError;
use subtle::Choice;

/// The field that output shares of a tree level are expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CurrentField {
    /// The inner field, used by every level except the last.
    Inner,
    /// The leaf field, used by the last level.
    Leaf,
}

/// Returns [`CurrentField::Inner`] for `level < bits - 1` and [`CurrentField::Leaf`] for
/// `level == bits - 1`.
///
/// # Errors
///
/// Fails with [`IdpfError::InvalidInput`] if `level >= bits`.
pub fn current_field(level: usize, bits: usize) -> Result<CurrentField, IdpfError> {
    if level >= bits {
        return Err(IdpfError::InvalidInput(format!(
            "level {level} out of range for {bits}-bit inputs"
        )));
    }
    if level + 1 == bits {
        Ok(CurrentField::Leaf)
    } else {
        Ok(CurrentField::Inner)
    }
}

/// Returns true if the low-order `len` bits of `x` are equal to the high-order `len` bits of the
/// `bits`-bit representation of `y`.
///
/// Returns false if `len` is not in `1..=bits` or if `bits` exceeds 128.
pub fn is_prefix(x: u128, y: u128, len: usize, bits: usize) -> bool {
    if len == 0 || len > bits || bits > 128 {
        return false;
    }
    let low_bits = if len == 128 {
        x
    } else {
        x & ((1 << len) - 1)
    };
    low_bits == y >> (bits - len)
}

/// Returns true if `x < 2^len`.
pub(crate) fn fits_in_bits(x: u128, len: usize) -> bool {
    len >= 128 || x >> len == 0
}

/// Returns the bit of `prefix` that selects a child at tree level `step`, for a prefix naming a
/// node at tree level `level`.
pub(crate) fn path_bit(prefix: u128, step: usize, level: usize) -> Choice {
    debug_assert!(step <= level);
    Choice::from(((prefix >> (level - step)) & 1) as u8)
}

/// Returns the name of the node at tree level `step` on the path to the node `prefix` at tree
/// level `level`.
pub(crate) fn ancestor(prefix: u128, step: usize, level: usize) -> u128 {
    debug_assert!(step <= level);
    prefix >> (level - step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn is_prefix_matches_high_bits() {
        // 5 = 0b101 as a 3-bit string.
        assert!(is_prefix(0b1, 5, 1, 3));
        assert!(!is_prefix(0b0, 5, 1, 3));
        assert!(is_prefix(0b10, 5, 2, 3));
        assert!(!is_prefix(0b11, 5, 2, 3));
        assert!(is_prefix(0b101, 5, 3, 3));
        assert!(!is_prefix(0b100, 5, 3, 3));

        // Bits of `x` above `len` are ignored.
        assert!(is_prefix(0b1110, 5, 2, 3));
    }

    #[test]
    fn is_prefix_out_of_range() {
        assert!(!is_prefix(0, 0, 0, 3));
        assert!(!is_prefix(5, 5, 4, 3));
        assert!(!is_prefix(0, 0, 1, 129));
    }

    #[test]
    fn is_prefix_full_width() {
        let y = 0x8000_0000_0000_0000_0000_0000_0000_0001u128;
        assert!(is_prefix(y, y, 128, 128));
        assert!(is_prefix(1, y, 1, 128));
        assert!(!is_prefix(0, y, 1, 128));
        assert!(is_prefix(y >> 64, y, 64, 128));
    }

    #[test]
    fn current_field_boundaries() {
        assert_eq!(current_field(0, 3).unwrap(), CurrentField::Inner);
        assert_eq!(current_field(1, 3).unwrap(), CurrentField::Inner);
        assert_eq!(current_field(2, 3).unwrap(), CurrentField::Leaf);
        assert_eq!(current_field(0, 1).unwrap(), CurrentField::Leaf);
        assert_matches!(current_field(3, 3), Err(IdpfError::InvalidInput(_)));
    }

    #[test]
    fn path_walk() {
        // Node 0b101 at level 2: root bit first.
        let bits: Vec<u8> = (0..=2).map(|step| path_bit(0b101, step, 2).unwrap_u8()).collect();
        assert_eq!(bits, [1, 0, 1]);
        assert_eq!(ancestor(0b101, 0, 2), 0b1);
        assert_eq!(ancestor(0b101, 1, 2), 0b10);
        assert_eq!(ancestor(0b101, 2, 2), 0b101);
    }

    #[test]
    fn range_checks() {
        assert!(fits_in_bits(7, 3));
        assert!(!fits_in_bits(8, 3));
        assert!(fits_in_bits(u128::MAX, 128));
        assert!(fits_in_bits(0, 0));
        assert!(!fits_in_bits(1, 0));
    }
}
