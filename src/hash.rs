//! Zero-sized hash builder for the engine's internal maps and sets.
//!
//! Dependency ids, watcher ids and canonical path strings are all produced by
//! the engine itself, so HashDoS resistance buys nothing here. `FastHashBuilder`
//! uses foldhash with a fixed seed, which also keeps iteration order of the
//! hashed (non-indexed) collections stable from run to run.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};
use indexmap::{IndexMap, IndexSet};

/// A zero-sized `BuildHasher` backed by foldhash with a fixed seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x9e37_79b9_7f4a_7c15).build_hasher()
    }
}

/// Insertion-ordered map using [`FastHashBuilder`].
pub type FastIndexMap<K, V> = IndexMap<K, V, FastHashBuilder>;

/// Insertion-ordered set using [`FastHashBuilder`].
pub type FastIndexSet<T> = IndexSet<T, FastHashBuilder>;

/// Unordered set using [`FastHashBuilder`].
pub type FastHashSet<T> = std::collections::HashSet<T, FastHashBuilder>;

/// Unordered map using [`FastHashBuilder`].
pub type FastHashMap<K, V> = std::collections::HashMap<K, V, FastHashBuilder>;
