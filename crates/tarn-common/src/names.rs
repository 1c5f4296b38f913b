//! Identifier name hashing.
//!
//! Identifier and field lookups compare a cached hash before falling back
//! to full string equality. The hash is only ever a fast-path rejection:
//! two names are equal iff the strings are equal.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Cached hash of an identifier name.
pub type NameHash = u64;

/// Hash an identifier name with the Fx hasher.
#[inline]
#[must_use]
pub fn hash_name(name: &str) -> NameHash {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}
