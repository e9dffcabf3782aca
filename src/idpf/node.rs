// SPDX-License-Identifier: MPL-2.0

//! Derivation of prefix tree nodes.
//!
//! A node is a seed and a control bit. `extend` expands a seed into the seeds and control bits of
//! both children; `convert` turns a corrected child seed into the seed used at the next level and
//! the child's pseudorandom field vector. Both are keyed by the tree level so that expansions at
//! different depths never share output.

use crate::{
    field::FieldElement,
    idpf::public_share::IdpfCorrectionWord,
    prng::Prng,
    xof::{Seed, Xof},
    VERSION,
};
use rand_core::RngCore;
use std::marker::PhantomData;
use subtle::{Choice, ConditionallySelectable};

/// Size in bytes of a node seed.
pub const SEED_SIZE: usize = 16;

const USAGE_EXTEND: &[u8] = b"idpf-poplar extend";
const USAGE_CONVERT: &[u8] = b"idpf-poplar convert";

/// State of one party at one node of the prefix tree.
#[derive(Clone, Copy)]
pub(crate) struct Node {
    pub(crate) seed: [u8; SEED_SIZE],
    pub(crate) control_bit: Choice,
}

impl Node {
    pub(crate) fn new(seed: [u8; SEED_SIZE], control_bit: Choice) -> Self {
        Self { seed, control_bit }
    }
}

/// Derives the children of tree nodes with the XOF `P`.
#[derive(Clone, Debug)]
pub(crate) struct NodeDeriver<P> {
    dst_extend: Vec<u8>,
    dst_convert: Vec<u8>,
    binder: Vec<u8>,
    phantom: PhantomData<fn() -> P>,
}

impl<P> NodeDeriver<P>
where
    P: Xof<SEED_SIZE>,
{
    pub(crate) fn new(binder: &[u8]) -> Self {
        Self {
            dst_extend: [&[VERSION][..], USAGE_EXTEND].concat(),
            dst_convert: [&[VERSION][..], USAGE_CONVERT].concat(),
            binder: binder.to_vec(),
            phantom: PhantomData,
        }
    }

    fn seed_stream(&self, seed: &[u8; SEED_SIZE], dst: &[u8], level: usize) -> P::SeedStream {
        let mut xof = P::init(seed, dst);
        // Levels are below 128.
        xof.update(&(level as u16).to_be_bytes());
        xof.update(&self.binder);
        xof.into_seed_stream()
    }

    /// Expand `seed` into the seeds and control bits of its left and right children.
    pub(crate) fn extend(
        &self,
        seed: &[u8; SEED_SIZE],
        level: usize,
    ) -> ([[u8; SEED_SIZE]; 2], [Choice; 2]) {
        let mut seed_stream = self.seed_stream(seed, &self.dst_extend, level);

        let mut seeds = [[0; SEED_SIZE]; 2];
        seed_stream.fill_bytes(&mut seeds[0]);
        seed_stream.fill_bytes(&mut seeds[1]);

        let mut byte = [0];
        seed_stream.fill_bytes(&mut byte);
        let control_bits = [
            Choice::from(byte[0] & 1),
            Choice::from((byte[0] >> 1) & 1),
        ];

        (seeds, control_bits)
    }

    /// Derive the next-level seed and `value_len` pseudorandom field elements from a corrected
    /// child seed.
    pub(crate) fn convert<F: FieldElement>(
        &self,
        seed: &[u8; SEED_SIZE],
        level: usize,
        value_len: usize,
    ) -> ([u8; SEED_SIZE], Vec<F>) {
        let mut seed_stream = self.seed_stream(seed, &self.dst_convert, level);

        let mut next_seed = [0; SEED_SIZE];
        seed_stream.fill_bytes(&mut next_seed);
        let elements = Prng::from_seed_stream(seed_stream)
            .take(value_len)
            .collect();

        (next_seed, elements)
    }

    /// Like [`Self::convert`], for nodes whose field vector is not needed.
    pub(crate) fn convert_seed_only(
        &self,
        seed: &[u8; SEED_SIZE],
        level: usize,
    ) -> [u8; SEED_SIZE] {
        let mut seed_stream = self.seed_stream(seed, &self.dst_convert, level);
        let mut next_seed = [0; SEED_SIZE];
        seed_stream.fill_bytes(&mut next_seed);
        next_seed
    }

    /// Compute the correction word for one level of key generation and move both parties' nodes
    /// to the child selected by `path_bit`.
    pub(crate) fn generate_correction_word<F: FieldElement>(
        &self,
        level: usize,
        path_bit: Choice,
        beta: &[F],
        nodes: &mut [Node; 2],
    ) -> IdpfCorrectionWord<F> {
        let (seeds_0, control_bits_0) = self.extend(&nodes[0].seed, level);
        let (seeds_1, control_bits_1) = self.extend(&nodes[1].seed, level);

        let (keep, lose) = (path_bit, !path_bit);

        let seed_cw = xor_seeds(
            &select_seed(lose, &seeds_0),
            &select_seed(lose, &seeds_1),
        );
        let control_bits_cw = [
            control_bits_0[0] ^ control_bits_1[0] ^ path_bit ^ Choice::from(1),
            control_bits_0[1] ^ control_bits_1[1] ^ path_bit,
        ];
        let control_bit_cw_keep =
            Choice::conditional_select(&control_bits_cw[0], &control_bits_cw[1], keep);

        let mut elements = Vec::with_capacity(2);
        for (node, (seeds, control_bits)) in nodes
            .iter_mut()
            .zip([(seeds_0, control_bits_0), (seeds_1, control_bits_1)])
        {
            let mut seed = select_seed(keep, &seeds);
            conditional_xor_seed(&mut seed, &seed_cw, node.control_bit);
            let control_bit_keep =
                Choice::conditional_select(&control_bits[0], &control_bits[1], keep);
            let control_bit = control_bit_keep ^ (control_bit_cw_keep & node.control_bit);

            let (next_seed, w) = self.convert::<F>(&seed, level, beta.len());
            *node = Node::new(next_seed, control_bit);
            elements.push(w);
        }

        let mut value_cw: Vec<F> = beta
            .iter()
            .zip(elements[0].iter().zip(elements[1].iter()))
            .map(|(b, (w_0, w_1))| *b - *w_0 + *w_1)
            .collect();
        for x in value_cw.iter_mut() {
            x.conditional_negate(nodes[1].control_bit);
        }

        IdpfCorrectionWord {
            seed: seed_cw,
            control_bits: control_bits_cw,
            value: value_cw,
        }
    }

    /// Apply one level's correction to the children of `node` and descend to the child selected
    /// by `input_bit`. Returns the corrected child seed, which still has to be converted.
    pub(crate) fn step(
        &self,
        level: usize,
        node: &mut Node,
        seed_cw: &[u8; SEED_SIZE],
        control_bits_cw: &[Choice; 2],
        input_bit: Choice,
    ) -> [u8; SEED_SIZE] {
        let (mut seeds, mut control_bits) = self.extend(&node.seed, level);
        for (seed, (control_bit, control_bit_cw)) in seeds
            .iter_mut()
            .zip(control_bits.iter_mut().zip(control_bits_cw))
        {
            conditional_xor_seed(seed, seed_cw, node.control_bit);
            *control_bit ^= *control_bit_cw & node.control_bit;
        }

        node.control_bit = Choice::conditional_select(&control_bits[0], &control_bits[1], input_bit);
        select_seed(input_bit, &seeds)
    }

    /// Evaluate one level along `input_bit` and return this party's share of the level's output.
    pub(crate) fn eval_next<F: FieldElement>(
        &self,
        is_leader: bool,
        level: usize,
        node: &mut Node,
        correction_word: &IdpfCorrectionWord<F>,
        input_bit: Choice,
    ) -> Vec<F> {
        let seed = self.step(
            level,
            node,
            &correction_word.seed,
            &correction_word.control_bits,
            input_bit,
        );
        let (next_seed, elements) =
            self.convert::<F>(&seed, level, correction_word.value.len());
        node.seed = next_seed;

        elements
            .into_iter()
            .zip(correction_word.value.iter())
            .map(|(w, cw)| {
                let mut y = w + F::conditional_select(&F::zero(), cw, node.control_bit);
                y.conditional_negate(Choice::from(u8::from(!is_leader)));
                y
            })
            .collect()
    }

    /// Descend one level along `input_bit` without computing the level's output.
    pub(crate) fn walk_next(
        &self,
        level: usize,
        node: &mut Node,
        seed_cw: &[u8; SEED_SIZE],
        control_bits_cw: &[Choice; 2],
        input_bit: Choice,
    ) {
        let seed = self.step(level, node, seed_cw, control_bits_cw, input_bit);
        node.seed = self.convert_seed_only(&seed, level);
    }
}

/// Split `RAND_SIZE` bytes of randomness into the two root seeds.
pub(crate) fn root_seeds(rand: &[u8; 2 * SEED_SIZE]) -> [Seed<SEED_SIZE>; 2] {
    let mut seeds = [[0; SEED_SIZE]; 2];
    seeds[0].copy_from_slice(&rand[..SEED_SIZE]);
    seeds[1].copy_from_slice(&rand[SEED_SIZE..]);
    seeds.map(Seed::from_bytes)
}

fn xor_seeds(left: &[u8; SEED_SIZE], right: &[u8; SEED_SIZE]) -> [u8; SEED_SIZE] {
    let mut seed = *left;
    for (s, r) in seed.iter_mut().zip(right) {
        *s ^= r;
    }
    seed
}

/// XOR `seed_cw` into `seed` if `control` is set, without branching on `control`.
fn conditional_xor_seed(seed: &mut [u8; SEED_SIZE], seed_cw: &[u8; SEED_SIZE], control: Choice) {
    for (s, c) in seed.iter_mut().zip(seed_cw) {
        *s ^= u8::conditional_select(&0, c, control);
    }
}

/// Returns `seeds[1]` if `select` is set and `seeds[0]` otherwise, without branching on `select`.
fn select_seed(select: Choice, seeds: &[[u8; SEED_SIZE]; 2]) -> [u8; SEED_SIZE] {
    let mut seed = [0; SEED_SIZE];
    for (s, (a, b)) in seed.iter_mut().zip(seeds[0].iter().zip(seeds[1].iter())) {
        *s = u8::conditional_select(a, b, select);
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{Field128, Field64},
        xof::{XofShake128, XofTurboShake128},
    };

    #[test]
    fn seed_algebra() {
        let a = [0x0f; SEED_SIZE];
        let b = [0xf0; SEED_SIZE];
        assert_eq!(xor_seeds(&a, &b), [0xff; SEED_SIZE]);
        assert_eq!(select_seed(Choice::from(0), &[a, b]), a);
        assert_eq!(select_seed(Choice::from(1), &[a, b]), b);

        let mut c = a;
        conditional_xor_seed(&mut c, &b, Choice::from(0));
        assert_eq!(c, a);
        conditional_xor_seed(&mut c, &b, Choice::from(1));
        assert_eq!(c, [0xff; SEED_SIZE]);
    }

    #[test]
    fn extend_is_level_separated() {
        let deriver = NodeDeriver::<XofTurboShake128>::new(b"");
        let seed = [1; SEED_SIZE];

        let (seeds_0, bits_0) = deriver.extend(&seed, 0);
        let (seeds_0_again, bits_0_again) = deriver.extend(&seed, 0);
        assert_eq!(seeds_0, seeds_0_again);
        assert_eq!(
            bits_0.map(|b| b.unwrap_u8()),
            bits_0_again.map(|b| b.unwrap_u8())
        );

        let (seeds_1, _) = deriver.extend(&seed, 1);
        assert_ne!(seeds_0, seeds_1);
        assert_ne!(seeds_0[0], seeds_0[1]);
    }

    #[test]
    fn binder_separates_derivations() {
        let seed = [2; SEED_SIZE];
        let (plain, _) = NodeDeriver::<XofTurboShake128>::new(b"").extend(&seed, 3);
        let (bound, _) = NodeDeriver::<XofTurboShake128>::new(b"nonce").extend(&seed, 3);
        assert_ne!(plain, bound);

        let (other_xof, _) = NodeDeriver::<XofShake128>::new(b"").extend(&seed, 3);
        assert_ne!(plain, other_xof);
    }

    #[test]
    fn convert_seed_matches_full_convert() {
        let deriver = NodeDeriver::<XofTurboShake128>::new(b"binder");
        let seed = [3; SEED_SIZE];
        let (next_seed, inner) = deriver.convert::<Field64>(&seed, 5, 4);
        assert_eq!(inner.len(), 4);
        assert_eq!(deriver.convert_seed_only(&seed, 5), next_seed);

        let (leaf_seed, leaf) = deriver.convert::<Field128>(&seed, 5, 2);
        assert_eq!(leaf_seed, next_seed);
        assert_eq!(leaf.len(), 2);
    }

    #[test]
    fn one_level_sums_to_beta() {
        let deriver = NodeDeriver::<XofTurboShake128>::new(b"");
        let beta = vec![Field64::from(10u64), Field64::from(20u64)];

        for path_bit in [0u8, 1] {
            let roots = [
                Node::new([4; SEED_SIZE], Choice::from(0)),
                Node::new([5; SEED_SIZE], Choice::from(1)),
            ];
            let mut nodes = roots;
            let cw =
                deriver.generate_correction_word(0, Choice::from(path_bit), &beta, &mut nodes);

            for input_bit in [0u8, 1] {
                let mut leader = roots[0];
                let mut helper = roots[1];
                let y_0 = deriver.eval_next(true, 0, &mut leader, &cw, Choice::from(input_bit));
                let y_1 = deriver.eval_next(false, 0, &mut helper, &cw, Choice::from(input_bit));
                let sum: Vec<Field64> =
                    y_0.iter().zip(y_1.iter()).map(|(a, b)| *a + *b).collect();
                if input_bit == path_bit {
                    assert_eq!(sum, beta);
                    // On the path, both parties land where key generation left them.
                    assert_eq!(leader.seed, nodes[0].seed);
                    assert_eq!(helper.seed, nodes[1].seed);
                } else {
                    assert_eq!(sum, vec![Field64::zero(); 2]);
                    // Off the path, the parties' nodes agree.
                    assert_eq!(leader.seed, helper.seed);
                    assert_eq!(
                        leader.control_bit.unwrap_u8(),
                        helper.control_bit.unwrap_u8()
                    );
                }
            }
        }
    }
}
