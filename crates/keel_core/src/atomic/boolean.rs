//! # Atomic Boolean
//!
//! A flag stored in the same 32-bit word as `AtomicInt`: `0` is `false`,
//! `1` is `true`. Used across the engine for cache-invalidation flags.

use std::fmt;
use std::sync::atomic::AtomicI32;

use super::primitives::{atomic_add, atomic_compare_and_set};

/// A boolean flag with lock-free, sequentially consistent access.
///
/// Only `0` and `1` are ever written to the word. That invariant is what
/// makes [`store`](Self::store) behave as a plain set even though it is a
/// single compare-and-swap.
#[repr(transparent)]
pub struct AtomicBool {
    word: AtomicI32,
}

impl AtomicBool {
    /// Creates a flag holding `value`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_lossless)] // `i32::from` is not const
    pub const fn new(value: bool) -> Self {
        Self {
            word: AtomicI32::new(value as i32),
        }
    }

    /// Returns the current value (an ordered `add(0) != 0`).
    #[inline]
    #[must_use]
    pub fn load(&self) -> bool {
        atomic_add(&self.word, 0) != 0
    }

    /// Sets the flag to `value`.
    ///
    /// One compare-and-swap from the complementary value. If it fails, the
    /// word already held `value`, so there is nothing left to do.
    #[inline]
    pub fn store(&self, value: bool) {
        let complement = i32::from(!value);
        atomic_compare_and_set(&self.word, complement, i32::from(value));
    }
}

impl Default for AtomicBool {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for AtomicBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicBool").field(&self.load()).finish()
    }
}
