//! Seeded random streams.
//!
//! Sequential systems draw from a named stream that persists across steps.
//! Per-household draws made in parallel use a generator derived from
//! (seed, stream, household, step), so the outcome does not depend on how
//! work is split across threads.

use std::collections::HashMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub type StreamId = u32;

pub struct RngManager {
    master: ChaCha8Rng,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: HashMap::new(),
        }
    }

    pub fn stream(&mut self, name: &str) -> SystemRng<'_> {
        let master = &mut self.master;
        let entry = self
            .streams
            .entry(name.to_string())
            .or_insert_with(|| ChaCha8Rng::seed_from_u64(master.next_u64()));
        SystemRng { inner: entry }
    }
}

/// Mixes the run seed with a stream, an entity and a step.
pub fn derive_seed(seed: u64, stream: StreamId, entity: u64, step: u64) -> u64 {
    let mut mixed = seed;
    mixed = mixed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    mixed ^= (stream as u64).wrapping_mul(1103515245);
    mixed = mixed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    mixed ^= entity.wrapping_mul(48271);
    mixed = mixed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    mixed ^= step.wrapping_mul(69069);
    mixed
}

pub fn entity_rng(seed: u64, stream: StreamId, entity: u64, step: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_seed(seed, stream, entity, step))
}

pub struct SystemRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl<'a> RngCore for SystemRng<'a> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
