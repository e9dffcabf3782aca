// SPDX-License-Identifier: MPL-2.0

//! This module implements the incremental distributed point function (IDPF) of the Poplar protocol
//! for private heavy-hitters aggregation, as a two-party tree DPF in the style of
//! [[draft-irtf-cfrg-vdaf-03]].
//!
//! Inputs are `bits`-bit unsigned integers. Key generation programs one vector of `value_len`
//! field elements per tree level along the path of the secret input `alpha`. A party evaluates its
//! key at a level `0 <= level < bits` on prefixes of `level + 1` bits. Summing both parties'
//! outputs for a prefix yields the vector programmed at that level if the prefix is a prefix of
//! `alpha`, and the zero vector otherwise.
//!
//! [draft-irtf-cfrg-vdaf-03]: https://datatracker.ietf.org/doc/draft-irtf-cfrg-vdaf/03/

mod cache;
mod node;
mod prefix;
mod public_share;

pub use cache::{HashMapCache, IdpfCache, NoCache, RingBufferCache};
pub use node::SEED_SIZE;
pub use prefix::{current_field, is_prefix, CurrentField};
pub use public_share::{IdpfCorrectionWord, IdpfKey, IdpfPublicShare};

use crate::{
    codec::{Encode, ParameterizedDecode},
    field::{merge_vector, Field128, Field64, FieldElement, FieldError},
    idpf::{
        node::{root_seeds, Node, NodeDeriver},
        prefix::{ancestor, fits_in_bits, path_bit},
    },
    xof::{Xof, XofTurboShake128},
};
use rand_core::{OsRng, TryRngCore};
#[cfg(feature = "multithreaded")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use subtle::Choice;
use tracing::{debug, trace};

/// IDPF-related errors.
#[derive(Debug, thiserror::Error)]
pub enum IdpfError {
    /// Invalid input to key generation or evaluation, or malformed key material.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Vector arithmetic on vectors of different lengths.
    #[error("vector lengths do not match")]
    LengthMismatch,

    /// Error from incompatible shares at different levels.
    #[error("tried to merge shares from incompatible levels")]
    MismatchedLevel,

    /// The operating system's randomness source failed.
    #[error("randomness source failed: {0}")]
    Rng(#[from] rand_core::OsError),
}

impl From<FieldError> for IdpfError {
    fn from(e: FieldError) -> Self {
        match e {
            FieldError::InputSizeMismatch => IdpfError::LengthMismatch,
            e => IdpfError::InvalidInput(e.to_string()),
        }
    }
}

/// Parameters of an IDPF instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdpfParameters {
    /// Bit length of the inputs, which is also the number of tree levels.
    pub bits: usize,
    /// Length of the vector programmed at each level.
    pub value_len: usize,
}

/// One party's output shares from evaluating a batch of prefixes at one level, one vector per
/// prefix, in query order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdpfOutputShares<FI, FL> {
    /// Output shares at an inner tree level.
    Inner(Vec<Vec<FI>>),
    /// Output shares at the leaf level.
    Leaf(Vec<Vec<FL>>),
}

impl<FI, FL> IdpfOutputShares<FI, FL>
where
    FI: FieldElement,
    FL: FieldElement,
{
    /// Combine another party's output shares for the same batch into this one.
    pub fn merge(self, other: Self) -> Result<Self, IdpfError> {
        match (self, other) {
            (IdpfOutputShares::Inner(mut self_value), IdpfOutputShares::Inner(other_value)) => {
                merge_batch(&mut self_value, &other_value)?;
                Ok(IdpfOutputShares::Inner(self_value))
            }
            (IdpfOutputShares::Leaf(mut self_value), IdpfOutputShares::Leaf(other_value)) => {
                merge_batch(&mut self_value, &other_value)?;
                Ok(IdpfOutputShares::Leaf(self_value))
            }
            (_, _) => Err(IdpfError::MismatchedLevel),
        }
    }

    /// The field these shares are in.
    pub fn current_field(&self) -> CurrentField {
        match self {
            IdpfOutputShares::Inner(_) => CurrentField::Inner,
            IdpfOutputShares::Leaf(_) => CurrentField::Leaf,
        }
    }

    /// Number of prefixes in the batch.
    pub fn len(&self) -> usize {
        match self {
            IdpfOutputShares::Inner(shares) => shares.len(),
            IdpfOutputShares::Leaf(shares) => shares.len(),
        }
    }

    /// Returns true if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn merge_batch<F: FieldElement>(
    accumulator: &mut [Vec<F>],
    other: &[Vec<F>],
) -> Result<(), IdpfError> {
    if accumulator.len() != other.len() {
        return Err(IdpfError::LengthMismatch);
    }
    for (a, o) in accumulator.iter_mut().zip(other) {
        merge_vector(a, o)?;
    }
    Ok(())
}

/// An incremental distributed point function.
///
/// Key shares and the public share are exchanged as byte strings. Output shares are vectors over
/// [`Self::FieldInner`] at every level except the last, where they are over [`Self::FieldLeaf`].
pub trait Idpf {
    /// Number of key shares produced by key generation.
    const SHARES: usize;

    /// Size in bytes of each key share.
    const KEY_SIZE: usize;

    /// Number of random bytes consumed by key generation.
    const RAND_SIZE: usize;

    /// Field of the inner tree levels.
    type FieldInner: FieldElement;

    /// Field of the leaf level.
    type FieldLeaf: FieldElement;

    /// Bit length of the inputs.
    fn bits(&self) -> usize;

    /// Length of the programmed and output vectors.
    fn value_len(&self) -> usize;

    /// Generate the public share and one key share per party.
    ///
    /// `beta_inner[level]` is programmed at each level `0..bits - 1` along the path of `alpha`, and
    /// `beta_leaf` at the last level. The output is a deterministic function of the inputs,
    /// including the `RAND_SIZE` bytes of `rand`.
    #[allow(clippy::type_complexity)]
    fn gen(
        &self,
        alpha: u128,
        beta_inner: &[Vec<Self::FieldInner>],
        beta_leaf: &[Self::FieldLeaf],
        rand: &[u8],
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), IdpfError>;

    /// Evaluate party `agg_id`'s key share at `level` on each of `prefixes`, where each prefix is a
    /// `level + 1`-bit integer.
    fn eval(
        &self,
        agg_id: usize,
        public_share: &[u8],
        key: &[u8],
        level: usize,
        prefixes: &[u128],
    ) -> Result<IdpfOutputShares<Self::FieldInner, Self::FieldLeaf>, IdpfError>;

    /// The field of the output shares at `level`.
    fn current_field(&self, level: usize) -> Result<CurrentField, IdpfError> {
        prefix::current_field(level, self.bits())
    }

    /// Returns true if the low-order `len` bits of `x` are the high-order `len` bits of `y`.
    fn is_prefix(&self, x: u128, y: u128, len: usize) -> bool {
        prefix::is_prefix(x, y, len, self.bits())
    }
}

/// The two-party IDPF of Poplar, with inner field [`Field64`] and leaf field [`Field128`].
///
/// `P` is the XOF used to derive tree nodes.
#[derive(Clone, Debug)]
pub struct IdpfPoplar<P = XofTurboShake128> {
    bits: usize,
    value_len: usize,
    deriver: NodeDeriver<P>,
}

impl<P: Xof<SEED_SIZE>> IdpfPoplar<P> {
    /// Construct an instance for `bits`-bit inputs, `1 <= bits <= 128`, programming vectors of
    /// `value_len >= 1` elements.
    pub fn new(bits: usize, value_len: usize) -> Result<Self, IdpfError> {
        if !(1..=128).contains(&bits) {
            return Err(IdpfError::InvalidInput(format!(
                "invalid number of bits: {bits}"
            )));
        }
        if value_len == 0 {
            return Err(IdpfError::InvalidInput(
                "value length must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            bits,
            value_len,
            deriver: NodeDeriver::new(&[]),
        })
    }

    /// Construct an instance from a parameter set.
    pub fn from_parameters(parameters: &IdpfParameters) -> Result<Self, IdpfError> {
        Self::new(parameters.bits, parameters.value_len)
    }

    /// Bind every node derivation to `binder`, such as a nonce identifying the report. Key
    /// generation and evaluation must use the same binder.
    pub fn with_binder(mut self, binder: &[u8]) -> Self {
        self.deriver = NodeDeriver::new(binder);
        self
    }

    /// The parameters of this instance.
    pub fn parameters(&self) -> IdpfParameters {
        IdpfParameters {
            bits: self.bits,
            value_len: self.value_len,
        }
    }

    /// The IDPF key generation algorithm, returning the public share and keys as typed values.
    ///
    /// The first half of `rand` is party 0's root seed and the second half party 1's.
    pub fn gen_typed(
        &self,
        alpha: u128,
        beta_inner: &[Vec<Field64>],
        beta_leaf: &[Field128],
        rand: &[u8; 2 * SEED_SIZE],
    ) -> Result<(IdpfPublicShare<Field64, Field128>, [IdpfKey; 2]), IdpfError> {
        if !fits_in_bits(alpha, self.bits) {
            return Err(IdpfError::InvalidInput(format!(
                "alpha does not fit in {} bits",
                self.bits
            )));
        }
        if beta_inner.len() != self.bits - 1 {
            return Err(IdpfError::InvalidInput(format!(
                "expected {} inner values, got {}",
                self.bits - 1,
                beta_inner.len()
            )));
        }
        if let Some(beta) = beta_inner.iter().find(|beta| beta.len() != self.value_len) {
            return Err(IdpfError::InvalidInput(format!(
                "inner value has length {}, expected {}",
                beta.len(),
                self.value_len
            )));
        }
        if beta_leaf.len() != self.value_len {
            return Err(IdpfError::InvalidInput(format!(
                "leaf value has length {}, expected {}",
                beta_leaf.len(),
                self.value_len
            )));
        }
        debug!(
            bits = self.bits,
            value_len = self.value_len,
            "IDPF key generation"
        );

        let [seed_0, seed_1] = root_seeds(rand);
        let mut nodes = [
            Node::new(seed_0.0, Choice::from(0)),
            Node::new(seed_1.0, Choice::from(1)),
        ];
        let leaf_level = self.bits - 1;

        let inner_correction_words = beta_inner
            .iter()
            .enumerate()
            .map(|(level, beta)| {
                self.deriver.generate_correction_word(
                    level,
                    path_bit(alpha, level, leaf_level),
                    beta,
                    &mut nodes,
                )
            })
            .collect();
        let leaf_correction_word = self.deriver.generate_correction_word(
            leaf_level,
            path_bit(alpha, leaf_level, leaf_level),
            beta_leaf,
            &mut nodes,
        );

        let public_share = IdpfPublicShare {
            inner_correction_words,
            leaf_correction_word,
        };
        Ok((
            public_share,
            [IdpfKey::new(seed_0, 0), IdpfKey::new(seed_1, 1)],
        ))
    }

    /// Like [`Idpf::gen`], drawing the randomness from the operating system.
    #[allow(clippy::type_complexity)]
    pub fn gen_random(
        &self,
        alpha: u128,
        beta_inner: &[Vec<Field64>],
        beta_leaf: &[Field128],
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), IdpfError> {
        let mut rand = [0; 2 * SEED_SIZE];
        OsRng.try_fill_bytes(&mut rand)?;
        self.gen(alpha, beta_inner, beta_leaf, &rand)
    }

    /// Decode a public share for this instance's parameters.
    pub fn decode_public_share(
        &self,
        encoded: &[u8],
    ) -> Result<IdpfPublicShare<Field64, Field128>, IdpfError> {
        IdpfPublicShare::get_decoded_with_param(&self.parameters(), encoded)
            .map_err(|e| IdpfError::InvalidInput(format!("malformed public share: {e}")))
    }

    /// Decode a key share.
    pub fn decode_key(&self, encoded: &[u8]) -> Result<IdpfKey, IdpfError> {
        if encoded.len() != IdpfKey::ENCODED_SIZE {
            return Err(IdpfError::InvalidInput(format!(
                "key has length {}, expected {}",
                encoded.len(),
                IdpfKey::ENCODED_SIZE
            )));
        }
        IdpfKey::get_decoded_with_param(&(), encoded)
            .map_err(|e| IdpfError::InvalidInput(format!("malformed key: {e}")))
    }

    /// The IDPF key evaluation algorithm, on typed inputs.
    ///
    /// Tree nodes computed along the way are stored in `cache`, and cached nodes are used to
    /// shorten later walks. The result does not depend on the cache's contents, provided the cache
    /// has only been used with this key and public share.
    pub fn eval_with_cache(
        &self,
        agg_id: usize,
        public_share: &IdpfPublicShare<Field64, Field128>,
        key: &IdpfKey,
        level: usize,
        prefixes: &[u128],
        cache: &mut dyn IdpfCache,
    ) -> Result<IdpfOutputShares<Field64, Field128>, IdpfError> {
        self.validate_eval(agg_id, public_share, key, level, prefixes)?;
        debug!(
            agg_id,
            level,
            prefixes = prefixes.len(),
            "IDPF evaluation"
        );

        let is_leader = agg_id == 0;
        Ok(match current_field(level, self.bits)? {
            CurrentField::Inner => IdpfOutputShares::Inner(
                prefixes
                    .iter()
                    .map(|prefix| {
                        self.eval_inner(is_leader, public_share, key, level, *prefix, cache)
                    })
                    .collect(),
            ),
            CurrentField::Leaf => IdpfOutputShares::Leaf(
                prefixes
                    .iter()
                    .map(|prefix| {
                        self.eval_leaf(is_leader, public_share, key, level, *prefix, cache)
                    })
                    .collect(),
            ),
        })
    }

    /// Like [`Idpf::eval`], evaluating the prefixes in parallel. Each prefix is walked from the
    /// root.
    #[cfg(feature = "multithreaded")]
    pub fn eval_multithreaded(
        &self,
        agg_id: usize,
        public_share: &[u8],
        key: &[u8],
        level: usize,
        prefixes: &[u128],
    ) -> Result<IdpfOutputShares<Field64, Field128>, IdpfError> {
        self.validate_eval_inputs(agg_id, level, prefixes)?;
        let public_share = self.decode_public_share(public_share)?;
        let key = self.decode_key(key)?;
        self.validate_eval(agg_id, &public_share, &key, level, prefixes)?;
        debug!(
            agg_id,
            level,
            prefixes = prefixes.len(),
            "IDPF evaluation (multithreaded)"
        );

        let is_leader = agg_id == 0;
        Ok(match current_field(level, self.bits)? {
            CurrentField::Inner => IdpfOutputShares::Inner(
                prefixes
                    .par_iter()
                    .map(|prefix| {
                        self.eval_inner(
                            is_leader,
                            &public_share,
                            &key,
                            level,
                            *prefix,
                            &mut NoCache::new(),
                        )
                    })
                    .collect(),
            ),
            CurrentField::Leaf => IdpfOutputShares::Leaf(
                prefixes
                    .par_iter()
                    .map(|prefix| {
                        self.eval_leaf(
                            is_leader,
                            &public_share,
                            &key,
                            level,
                            *prefix,
                            &mut NoCache::new(),
                        )
                    })
                    .collect(),
            ),
        })
    }

    /// Checks that need neither the public share nor the key.
    fn validate_eval_inputs(
        &self,
        agg_id: usize,
        level: usize,
        prefixes: &[u128],
    ) -> Result<(), IdpfError> {
        if agg_id >= Self::SHARES {
            return Err(IdpfError::InvalidInput(format!(
                "invalid aggregator ID {agg_id}"
            )));
        }
        if level >= self.bits {
            return Err(IdpfError::InvalidInput(format!(
                "level {level} out of range for {}-bit inputs",
                self.bits
            )));
        }
        if let Some(prefix) = prefixes.iter().find(|p| !fits_in_bits(**p, level + 1)) {
            return Err(IdpfError::InvalidInput(format!(
                "prefix {prefix} does not fit in {} bits",
                level + 1
            )));
        }
        Ok(())
    }

    fn validate_eval(
        &self,
        agg_id: usize,
        public_share: &IdpfPublicShare<Field64, Field128>,
        key: &IdpfKey,
        level: usize,
        prefixes: &[u128],
    ) -> Result<(), IdpfError> {
        self.validate_eval_inputs(agg_id, level, prefixes)?;
        if public_share.bits() != self.bits || public_share.value_len() != self.value_len {
            return Err(IdpfError::InvalidInput(
                "public share does not match the IDPF parameters".to_string(),
            ));
        }
        if key.agg_id() != agg_id {
            return Err(IdpfError::InvalidInput(format!(
                "key was not generated for aggregator {agg_id}"
            )));
        }
        Ok(())
    }

    /// Walk from the root, or from the deepest cached ancestor, to the parent of the node `prefix`
    /// at `level`. Returns the root itself at level 0.
    fn walk_to_parent(
        &self,
        public_share: &IdpfPublicShare<Field64, Field128>,
        key: &IdpfKey,
        level: usize,
        prefix: u128,
        cache: &mut dyn IdpfCache,
    ) -> Node {
        let mut node = Node::new(key.seed.0, key.control_bit);
        let mut start_level = 0;

        // The node itself is never looked up: its output needs the seed from before its level was
        // processed, which the cache does not hold.
        for step in (0..level).rev() {
            // A control bit other than 0 or 1 did not come from this walk, so it counts as a miss.
            let Some((seed, control_bit @ (0 | 1))) =
                cache.get(step, ancestor(prefix, step, level))
            else {
                continue;
            };
            trace!(level = step, "IDPF cache hit");
            node = Node::new(seed, Choice::from(control_bit));
            start_level = step + 1;
            break;
        }

        for (step, correction_word) in public_share.inner_correction_words[..level]
            .iter()
            .enumerate()
            .skip(start_level)
        {
            self.deriver.walk_next(
                step,
                &mut node,
                &correction_word.seed,
                &correction_word.control_bits,
                path_bit(prefix, step, level),
            );
            cache.insert(
                step,
                ancestor(prefix, step, level),
                &(node.seed, node.control_bit.unwrap_u8()),
            );
        }

        node
    }

    fn eval_inner(
        &self,
        is_leader: bool,
        public_share: &IdpfPublicShare<Field64, Field128>,
        key: &IdpfKey,
        level: usize,
        prefix: u128,
        cache: &mut dyn IdpfCache,
    ) -> Vec<Field64> {
        let mut node = self.walk_to_parent(public_share, key, level, prefix, cache);
        let output = self.deriver.eval_next(
            is_leader,
            level,
            &mut node,
            &public_share.inner_correction_words[level],
            path_bit(prefix, level, level),
        );
        cache.insert(level, prefix, &(node.seed, node.control_bit.unwrap_u8()));
        output
    }

    fn eval_leaf(
        &self,
        is_leader: bool,
        public_share: &IdpfPublicShare<Field64, Field128>,
        key: &IdpfKey,
        level: usize,
        prefix: u128,
        cache: &mut dyn IdpfCache,
    ) -> Vec<Field128> {
        let mut node = self.walk_to_parent(public_share, key, level, prefix, cache);
        // Nothing lies below the leaf level, so its node is not cached.
        self.deriver.eval_next(
            is_leader,
            level,
            &mut node,
            &public_share.leaf_correction_word,
            path_bit(prefix, level, level),
        )
    }
}

impl<P: Xof<SEED_SIZE>> Idpf for IdpfPoplar<P> {
    const SHARES: usize = 2;
    const KEY_SIZE: usize = IdpfKey::ENCODED_SIZE;
    const RAND_SIZE: usize = 2 * SEED_SIZE;

    type FieldInner = Field64;
    type FieldLeaf = Field128;

    fn bits(&self) -> usize {
        self.bits
    }

    fn value_len(&self) -> usize {
        self.value_len
    }

    fn gen(
        &self,
        alpha: u128,
        beta_inner: &[Vec<Field64>],
        beta_leaf: &[Field128],
        rand: &[u8],
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), IdpfError> {
        let rand: &[u8; 2 * SEED_SIZE] = rand.try_into().map_err(|_| {
            IdpfError::InvalidInput(format!(
                "expected {} bytes of randomness, got {}",
                Self::RAND_SIZE,
                rand.len()
            ))
        })?;
        let (public_share, keys) = self.gen_typed(alpha, beta_inner, beta_leaf, rand)?;
        Ok((
            public_share.get_encoded(),
            keys.iter().map(Encode::get_encoded).collect(),
        ))
    }

    fn eval(
        &self,
        agg_id: usize,
        public_share: &[u8],
        key: &[u8],
        level: usize,
        prefixes: &[u128],
    ) -> Result<IdpfOutputShares<Field64, Field128>, IdpfError> {
        self.validate_eval_inputs(agg_id, level, prefixes)?;
        let public_share = self.decode_public_share(public_share)?;
        let key = self.decode_key(key)?;
        // Prefixes in one batch often share ancestors, so the walk is memoized for the duration of
        // this call.
        let mut cache = HashMapCache::new();
        self.eval_with_cache(agg_id, &public_share, &key, level, prefixes, &mut cache)
    }
}
