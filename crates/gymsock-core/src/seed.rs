//! Deterministic per-connection seeds.
//!
//! A server configured with a root seed gives every accepted connection its
//! own child seed, so the sampled actions of connection *k* are reproducible
//! regardless of how other connections interleave:
//!
//! ```text
//! Root seed
//! └── Connection seed (per accepted connection, by index)
//! ```

use std::hash::{DefaultHasher, Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Derive a child seed from a parent seed and a string key.
///
/// ```
/// use gymsock_core::seed::derive_seed;
///
/// let child = derive_seed(42, "session");
/// assert_eq!(child, derive_seed(42, "session"));
/// ```
#[must_use]
pub fn derive_seed(parent: u64, key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    parent.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

/// Derive a child seed from a parent seed and a numeric index.
///
/// ```
/// use gymsock_core::seed::derive_seed_indexed;
///
/// assert_ne!(derive_seed_indexed(42, 0), derive_seed_indexed(42, 1));
/// ```
#[must_use]
pub fn derive_seed_indexed(parent: u64, index: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    parent.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}

/// RNG for the session of connection `index`: derived from `root` when one is
/// configured, otherwise seeded from OS entropy.
#[must_use]
pub fn session_rng(root: Option<u64>, index: u64) -> ChaCha8Rng {
    match root {
        Some(root) => ChaCha8Rng::seed_from_u64(derive_seed_indexed(root, index)),
        None => ChaCha8Rng::from_entropy(),
    }
}
