//! # Atomic Integer
//!
//! 32-bit signed counter. This is the word inside every `Object` refcount.

use std::fmt;
use std::sync::atomic::AtomicI32;

use super::primitives::{atomic_add, atomic_compare_and_set, atomic_decrement, atomic_increment};

/// A 32-bit signed integer with lock-free, sequentially consistent access.
///
/// # Example
///
/// ```rust,ignore
/// use keel_core::AtomicInt;
///
/// let counter = AtomicInt::new(5);
/// assert_eq!(counter.increment(), 6);
/// assert_eq!(counter.decrement(), 5);
/// assert_eq!(counter.test_and_set(5, 9), 5);
/// assert_eq!(counter.load(), 9);
/// ```
#[repr(transparent)]
pub struct AtomicInt {
    word: AtomicI32,
}

impl AtomicInt {
    /// Creates a counter holding `value`.
    #[inline]
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self {
            word: AtomicI32::new(value),
        }
    }

    /// Returns the current value (an ordered `add(0)`).
    #[inline]
    #[must_use]
    pub fn load(&self) -> i32 {
        atomic_add(&self.word, 0)
    }

    /// Adds 1 and returns the new value.
    #[inline]
    pub fn increment(&self) -> i32 {
        atomic_increment(&self.word)
    }

    /// Subtracts 1 and returns the new value.
    #[inline]
    pub fn decrement(&self) -> i32 {
        atomic_decrement(&self.word)
    }

    /// Adds `delta` and returns the value held before the addition.
    #[inline]
    pub fn add(&self, delta: i32) -> i32 {
        atomic_add(&self.word, delta)
    }

    /// Stores `new` iff the counter holds `expected`.
    ///
    /// Returns the value present before the attempt; the store happened iff
    /// that value equals `expected`.
    #[inline]
    pub fn test_and_set(&self, expected: i32, new: i32) -> i32 {
        atomic_compare_and_set(&self.word, expected, new)
    }
}

impl Default for AtomicInt {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for AtomicInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicInt").field(&self.load()).finish()
    }
}
