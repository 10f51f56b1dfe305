//! # Atomic Primitives
//!
//! The single contract every typed atomic and every refcount is built on.
//!
//! ## Contract
//!
//! | Operation                 | Effect                       | Returns          |
//! |---------------------------|------------------------------|------------------|
//! | `atomic_increment`        | `word += 1`                  | value **after**  |
//! | `atomic_decrement`        | `word -= 1`                  | value **after**  |
//! | `atomic_add`              | `word += delta`              | value **before** |
//! | `atomic_compare_and_set`  | `word = new` iff `== expected` | value **before** |
//!
//! The pointer-width set (`atomic_pointer_*`) follows the same rules.
//!
//! Every operation is `SeqCst`. There are no relaxed variants: the callers of
//! this layer never need them and a single ordering keeps every backend
//! identical.
//!
//! Arithmetic wraps on overflow, exactly like the hardware instruction.

use std::sync::atomic::{AtomicI32, AtomicPtr, Ordering};

#[cfg(not(all(target_has_atomic = "32", target_has_atomic = "ptr")))]
compile_error!("keel_core requires native 32-bit and pointer-width atomics");

/// The one memory ordering used by this layer.
const ORDER: Ordering = Ordering::SeqCst;

/// Atomically adds 1 to `word` and returns the new value.
#[inline]
pub fn atomic_increment(word: &AtomicI32) -> i32 {
    word.fetch_add(1, ORDER).wrapping_add(1)
}

/// Atomically subtracts 1 from `word` and returns the new value.
#[inline]
pub fn atomic_decrement(word: &AtomicI32) -> i32 {
    word.fetch_sub(1, ORDER).wrapping_sub(1)
}

/// Atomically adds `delta` to `word` and returns the value it held **before**
/// the addition (fetch-and-add).
///
/// `atomic_add(word, 0)` is therefore an ordered read with no side effect.
#[inline]
pub fn atomic_add(word: &AtomicI32, delta: i32) -> i32 {
    word.fetch_add(delta, ORDER)
}

/// Stores `new` into `word` iff it currently holds `expected`.
///
/// Always returns the value present immediately before the attempt, whether
/// or not the store happened. The attempt succeeded iff the return value
/// equals `expected`.
#[inline]
pub fn atomic_compare_and_set(word: &AtomicI32, expected: i32, new: i32) -> i32 {
    match word.compare_exchange(expected, new, ORDER, ORDER) {
        Ok(previous) | Err(previous) => previous,
    }
}

/// Reads a pointer word through a self compare-and-swap.
///
/// `CAS(null, null)` can only ever replace null with null, so it never changes
/// the word, but it reports the current value with read-modify-write ordering.
#[inline]
pub fn atomic_pointer_load<T>(word: &AtomicPtr<T>) -> *mut T {
    atomic_pointer_compare_and_set(word, std::ptr::null_mut(), std::ptr::null_mut())
}

/// Unconditionally stores `new` into a pointer word and returns the value it
/// replaced.
///
/// Implemented as a compare-and-swap retry loop: every failed attempt retries
/// with the value it just observed. Concurrent writers only ever replace the
/// word, so the loop terminates once contention drops.
#[inline]
pub fn atomic_pointer_store<T>(word: &AtomicPtr<T>, new: *mut T) -> *mut T {
    let mut current = word.load(ORDER);
    loop {
        let observed = atomic_pointer_compare_and_set(word, current, new);
        if observed == current {
            return observed;
        }
        current = observed;
        std::hint::spin_loop();
    }
}

/// Stores `new` into a pointer word iff it currently holds `expected`.
///
/// Returns the true previous value, never an echo of `expected`.
#[inline]
pub fn atomic_pointer_compare_and_set<T>(
    word: &AtomicPtr<T>,
    expected: *mut T,
    new: *mut T,
) -> *mut T {
    match word.compare_exchange(expected, new, ORDER, ORDER) {
        Ok(previous) | Err(previous) => previous,
    }
}
