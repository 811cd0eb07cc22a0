//! Seeded RNGs for tests that sample spaces or drive sessions.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// The RNG type sessions use, seeded for reproducible tests.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
