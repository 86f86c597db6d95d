//! Dense symbol and alternative sets shared by the ATN and DFA layers.

pub mod bits;
pub mod interval;

pub use bits::BitSet;
pub use interval::{Interval, IntervalSet};

/// Seed for the structural hashes cached on prediction contexts, lexer
/// action executors and frozen configuration sets.
pub(crate) const HASH_SEED: u64 = 0x517c_c1b7_2722_0a95;

/// Folds `value` into `hash` with a splitmix-style finalizer.
///
/// The engine compares deeply shared DAGs by cached hash before falling back
/// to structural equality, so the mix has to be deterministic within a
/// process but does not need to be portable.
#[inline]
pub(crate) fn mix(hash: u64, value: u64) -> u64 {
    let mut x = hash ^ value.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
