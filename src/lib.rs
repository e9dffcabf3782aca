// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # poplar-idpf
//!
//! An incremental distributed point function (IDPF) as used by the Poplar protocol for private
//! heavy-hitters aggregation.
//!
//! A point function is zero everywhere except at one secret input `alpha`, where it takes a
//! programmed vector value. [`idpf::Idpf::gen`] splits such a function into a public share
//! and two key shares. Each party evaluates its key share with [`idpf::Idpf::eval`] on any
//! prefix of any length; the sum of both parties' outputs is the programmed value for the prefix
//! of `alpha` at that length, and zero for every other prefix.
//!
//! ```
//! use poplar_idpf::{
//!     field::{Field128, Field64},
//!     idpf::{Idpf, IdpfOutputShares, IdpfPoplar},
//! };
//!
//! let idpf: IdpfPoplar = IdpfPoplar::new(3, 1).unwrap();
//! let beta_inner = vec![vec![Field64::from(1u64)], vec![Field64::from(2u64)]];
//! let beta_leaf = vec![Field128::from(3u128)];
//! // The first half is party 0's root seed and the second half party 1's.
//! let rand: Vec<u8> = (0..32).collect();
//! let (public_share, keys) = idpf.gen(5, &beta_inner, &beta_leaf, &rand).unwrap();
//!
//! let out_0 = idpf.eval(0, &public_share, &keys[0], 2, &[5, 6]).unwrap();
//! let out_1 = idpf.eval(1, &public_share, &keys[1], 2, &[5, 6]).unwrap();
//! let sum = out_0.merge(out_1).unwrap();
//! assert_eq!(
//!     sum,
//!     IdpfOutputShares::Leaf(vec![vec![Field128::from(3u128)], vec![Field128::from(0u128)]])
//! );
//! ```

pub mod codec;
pub mod field;
mod fp;
pub mod idpf;
mod prng;
pub mod xof;

/// The version of the IDPF key derivation, mixed into every domain separation tag.
pub const VERSION: u8 = 1;
