//! Hashing for property maps.
//!
//! A props diff looks every key of the old map up in the new one and the
//! other way round. Both maps come from different render passes, so they must
//! hash keys identically: a per-map random seed would still be correct, but it
//! would put a seed into every element's map. [`PropsHasher`] is zero-sized
//! and always uses [`PROPS_SEED`]. Keys are property names written by the
//! application, so flooding resistance buys nothing here.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

/// Seed shared by every props map.
pub const PROPS_SEED: u64 = 0x6669_6265_726b_6974;

/// Hash builder of [`Props`](crate::Props) maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropsHasher;

impl BuildHasher for PropsHasher {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(PROPS_SEED).build_hasher()
    }
}
