// SPDX-License-Identifier: MPL-2.0

//! Tool for generating pseudorandom field elements.

use crate::field::FieldElement;
use rand_core::RngCore;
use std::marker::PhantomData;

/// This type implements an iterator that generates a pseudorandom sequence of field elements. The
/// sequence is derived from a seed stream, typically the output of an XOF, by rejection sampling:
/// each candidate consumes [`FieldElement::ENCODED_SIZE`] bytes of the stream.
#[derive(Debug)]
pub(crate) struct Prng<F, S> {
    phantom: PhantomData<F>,
    seed_stream: S,
    buffer: Vec<u8>,
}

impl<F, S> Prng<F, S>
where
    F: FieldElement,
    S: RngCore,
{
    pub(crate) fn from_seed_stream(seed_stream: S) -> Self {
        Self {
            phantom: PhantomData,
            seed_stream,
            buffer: vec![0; F::ENCODED_SIZE],
        }
    }

    pub(crate) fn get(&mut self) -> F {
        loop {
            self.seed_stream.fill_bytes(&mut self.buffer);
            // The buffer is exactly one encoded element long, so the only possible error is
            // `ModulusOverflow`.
            if let Ok(x) = F::try_from_random(&self.buffer) {
                return x;
            }
        }
    }
}

impl<F, S> Iterator for Prng<F, S>
where
    F: FieldElement,
    S: RngCore,
{
    type Item = F;

    fn next(&mut self) -> Option<F> {
        Some(self.get())
    }
}
