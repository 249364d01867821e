//! Epoch reshuffling of the video list.
//!
//! The list keeps its records and their usable durations in two parallel
//! sequences. Both are shuffled in place by two engines built from the same
//! seed and driven by the same algorithm, so every reshuffle applies one
//! permutation to both sequences and index `i` keeps referring to a single
//! video.

use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// Reorders two parallel sequences with one permutation per call.
///
/// # Example
/// ```ignore
/// let mut coordinator = ShuffleCoordinator::new(42);
/// coordinator.shuffle_pair(&mut paths, &mut durations)?;
/// ```
#[derive(Debug, Clone)]
pub struct ShuffleCoordinator {
    seed: u64,
    record_rng: StdRng,
    duration_rng: StdRng,
    shuffles: usize,
}

impl ShuffleCoordinator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            record_rng: StdRng::seed_from_u64(seed),
            duration_rng: StdRng::seed_from_u64(seed),
            shuffles: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of reshuffles performed so far.
    pub fn shuffles(&self) -> usize {
        self.shuffles
    }

    /// Shuffles `records` and `durations` in place with the same permutation.
    pub fn shuffle_pair<A, B>(&mut self, records: &mut [A], durations: &mut [B]) -> Result<()> {
        ensure!(
            records.len() == durations.len(),
            "Parallel sequences differ in length ({} records, {} durations)",
            records.len(),
            durations.len()
        );
        records.shuffle(&mut self.record_rng);
        durations.shuffle(&mut self.duration_rng);
        self.shuffles += 1;
        Ok(())
    }
}
