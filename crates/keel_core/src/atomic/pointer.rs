//! # Atomic Pointer
//!
//! An atomically accessed pointer *value*. The pointee is never owned:
//! dropping an `AtomicPointer` does nothing to whatever it points at.

use std::fmt;
use std::ptr;
use std::sync::atomic::AtomicPtr;

use super::primitives::{atomic_pointer_compare_and_set, atomic_pointer_load, atomic_pointer_store};

/// A raw pointer with lock-free, sequentially consistent access.
///
/// # Example
///
/// ```rust,ignore
/// use keel_core::AtomicPointer;
///
/// let mut a = 1u32;
/// let mut b = 2u32;
///
/// let slot = AtomicPointer::new(&mut a as *mut u32);
/// let replaced = slot.store(&mut b as *mut u32);
///
/// assert_eq!(replaced, &mut a as *mut u32);
/// assert_eq!(slot.load(), &mut b as *mut u32);
/// ```
#[repr(transparent)]
pub struct AtomicPointer<T> {
    word: AtomicPtr<T>,
}

impl<T> AtomicPointer<T> {
    /// Creates a slot holding `value`.
    #[inline]
    #[must_use]
    pub const fn new(value: *mut T) -> Self {
        Self {
            word: AtomicPtr::new(value),
        }
    }

    /// Creates a slot holding null.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Returns the current pointer (self compare-and-swap read).
    #[inline]
    #[must_use]
    pub fn load(&self) -> *mut T {
        atomic_pointer_load(&self.word)
    }

    /// Stores `value` and returns the pointer it replaced.
    #[inline]
    pub fn store(&self, value: *mut T) -> *mut T {
        atomic_pointer_store(&self.word, value)
    }

    /// Stores `new` iff the slot holds `expected`; returns the previous value.
    #[inline]
    pub fn compare_and_set(&self, expected: *mut T, new: *mut T) -> *mut T {
        atomic_pointer_compare_and_set(&self.word, expected, new)
    }

    /// Returns `true` if the slot currently holds null.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.load().is_null()
    }
}

impl<T> Default for AtomicPointer<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicPointer").field(&self.load()).finish()
    }
}
