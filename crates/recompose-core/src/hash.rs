//! Hashing backends used for group keys and the runtime's internal maps.
//!
//! The default build uses ahash for key hashing and FxHash for maps. The
//! `std-hash` feature swaps both for the standard library's SipHash, which
//! is slower but keeps the dependency surface minimal for audits.

use std::hash::{Hash, Hasher};

use crate::Key;

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
}

#[cfg(feature = "std-hash")]
fn key_hasher() -> std::collections::hash_map::DefaultHasher {
    std::collections::hash_map::DefaultHasher::new()
}

#[cfg(not(feature = "std-hash"))]
fn key_hasher() -> ahash::AHasher {
    use std::hash::BuildHasher;
    // Fixed seeds: keys must hash identically across passes and processes.
    ahash::RandomState::with_seeds(0x5bd1_e995, 0x27d4_eb2f, 0x1656_67b1, 0x9e37_79b9)
        .build_hasher()
}

/// Hashes an arbitrary host key into a group [`Key`].
pub fn hash_key<K: Hash + ?Sized>(key: &K) -> Key {
    let mut hasher = key_hasher();
    key.hash(&mut hasher);
    hasher.finish()
}
