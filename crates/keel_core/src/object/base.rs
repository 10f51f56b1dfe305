//! # Object Base
//!
//! The embedded header of every reference-counted value.
//!
//! ## Safety Note
//!
//! Destruction goes through raw pointers: the count lives inside the value it
//! frees. All unsafe blocks are documented.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

use tracing::trace;

use crate::atomic::AtomicInt;

/// Opaque construction-time type tag.
///
/// Owners use it for cheap dispatch without reflection. The value carries no
/// meaning inside this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Uid(u32);

impl Uid {
    /// Creates a tag from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid:{}", self.0)
    }
}

/// Custom destruction routine for an [`Object`].
///
/// Receives the address of the allocation that was handed to the first
/// [`SmartPointer`](crate::SmartPointer), type-erased. The routine must drop
/// the value and free its memory exactly once.
///
/// # Safety
///
/// Called exactly once, after the last reference is gone, with the address of
/// a live value of the type the deleter was written for.
pub type Deleter = unsafe fn(*mut ());

/// Reference-count header embedded in every shared value.
///
/// The count starts at 0: a fresh `Object` is not owned by anybody. The first
/// [`SmartPointer`](crate::SmartPointer) takes it to 1 and the value is
/// destroyed inside whichever [`release`](Self::release) brings it back to 0.
///
/// `Object` is deliberately neither `Clone` nor `Copy`.
pub struct Object {
    uid: Uid,
    count: AtomicInt,
    deleter: Option<Deleter>,
}

impl Object {
    /// Creates an unowned header destroyed by the default routine
    /// (dropping the `Box` it was allocated in).
    #[inline]
    #[must_use]
    pub const fn new(uid: Uid) -> Self {
        Self {
            uid,
            count: AtomicInt::new(0),
            deleter: None,
        }
    }

    /// Creates an unowned header destroyed by `deleter`.
    #[inline]
    #[must_use]
    pub const fn with_deleter(uid: Uid, deleter: Deleter) -> Self {
        Self {
            uid,
            count: AtomicInt::new(0),
            deleter: Some(deleter),
        }
    }

    /// Returns the construction-time type tag.
    #[inline]
    #[must_use]
    pub const fn uid(&self) -> Uid {
        self.uid
    }

    /// Returns the custom deleter, if one was supplied.
    #[inline]
    #[must_use]
    pub const fn deleter(&self) -> Option<Deleter> {
        self.deleter
    }

    /// Adds one reference.
    #[inline]
    pub fn add_reference(&self) {
        let count = self.count.increment();
        debug_assert!(count > 0, "refcount overflow on {}", self.uid);
    }

    /// Returns the current count.
    ///
    /// Racy by construction: another thread may change it right after the
    /// read. Tests and diagnostics only, never control flow.
    #[inline]
    #[must_use]
    pub fn reference_count(&self) -> i32 {
        self.count.load()
    }

    /// Drops one reference held on `this`, destroying it when none remain.
    ///
    /// The value is destroyed synchronously inside the call that observes the
    /// count reach 0, using the custom deleter or, without one, by dropping
    /// the `Box<T>` it was allocated in.
    ///
    /// # Safety
    ///
    /// - `this` must point to a live value on which the caller owns one
    ///   reference (taken with [`add_reference`](Self::add_reference)).
    /// - Without a custom deleter, `this` must come from `Box<T>`.
    /// - The caller must not touch `this` afterwards.
    ///
    /// Releasing more often than referencing is a refcount underflow. It is
    /// caught by a debug assertion only.
    pub unsafe fn release<T: ?Sized + Referenced>(this: NonNull<T>) {
        // SAFETY: the caller's reference keeps `this` alive until the decrement.
        let object = unsafe { this.as_ref() }.object();
        let remaining = object.count.decrement();
        debug_assert!(remaining >= 0, "refcount underflow on {}", object.uid);

        if remaining == 0 {
            let uid = object.uid;
            let deleter = object.deleter;
            trace!(uid = uid.get(), "releasing last reference");

            // SAFETY: the count reached 0 in this call, so no other holder
            // exists and nobody can take a new reference.
            unsafe { destroy(this, deleter) };
        }
    }
}

/// Runs the deleter, or drops the owning `Box`.
///
/// # Safety
///
/// `this` must be live and unreferenced; see [`Object::release`].
unsafe fn destroy<T: ?Sized>(this: NonNull<T>, deleter: Option<Deleter>) {
    match deleter {
        // SAFETY: the deleter was written for the concrete type behind `this`.
        Some(deleter) => unsafe { deleter(this.as_ptr().cast::<()>()) },
        // SAFETY: without a deleter the value came from `Box<T>`.
        None => drop(unsafe { Box::from_raw(this.as_ptr()) }),
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("uid", &self.uid)
            .field("references", &self.reference_count())
            .field("custom_deleter", &self.deleter.is_some())
            .finish()
    }
}

/// A value that embeds an [`Object`] and may be shared via
/// [`SmartPointer`](crate::SmartPointer).
///
/// Use the [`referenced!`](crate::referenced) macro for the common case of a
/// struct with an `Object` field.
///
/// # Safety
///
/// `object` must always return the same `Object`, stored inside `self`. The
/// count in that object decides when `self` is freed.
pub unsafe trait Referenced {
    /// Returns the embedded header.
    fn object(&self) -> &Object;

    /// Returns the header's type tag.
    #[inline]
    fn uid(&self) -> Uid {
        self.object().uid()
    }
}

// SAFETY: an Object is its own header.
unsafe impl Referenced for Object {
    #[inline]
    fn object(&self) -> &Object {
        self
    }
}

/// Implements [`Referenced`] for a struct that stores its [`Object`] in a
/// named field.
///
/// ```rust,ignore
/// use keel_core::{referenced, Object, Referenced, Uid};
///
/// struct Texture {
///     header: Object,
///     width: u32,
/// }
///
/// referenced!(Texture, header);
///
/// let texture = Texture { header: Object::new(Uid::new(3)), width: 64 };
/// assert_eq!(texture.uid(), Uid::new(3));
/// ```
#[macro_export]
macro_rules! referenced {
    ($ty:ty, $field:ident) => {
        // SAFETY: the header is a field of the value itself.
        unsafe impl $crate::Referenced for $ty {
            #[inline]
            fn object(&self) -> &$crate::Object {
                &self.$field
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DELETED: AtomicUsize = AtomicUsize::new(0);

    unsafe fn counting_deleter(ptr: *mut ()) {
        DELETED.fetch_add(1, Ordering::SeqCst);
        // SAFETY: the tests below only hand this deleter `Box<Object>` pointers.
        drop(unsafe { Box::from_raw(ptr.cast::<Object>()) });
    }

    #[test]
    fn test_object_starts_unowned() {
        let object = Object::new(Uid::new(7));
        assert_eq!(object.uid(), Uid::new(7));
        assert_eq!(object.reference_count(), 0);
        assert!(object.deleter().is_none());
    }

    #[test]
    fn test_add_reference_counts_up() {
        let object = Object::new(Uid::new(1));
        object.add_reference();
        object.add_reference();
        assert_eq!(object.reference_count(), 2);
    }

    #[test]
    fn test_release_runs_deleter_once() {
        let raw = Box::into_raw(Box::new(Object::with_deleter(Uid::new(2), counting_deleter)));
        let ptr = NonNull::new(raw).unwrap();

        // SAFETY: `raw` is a live Box allocation.
        let object = unsafe { ptr.as_ref() };
        object.add_reference();
        object.add_reference();

        // SAFETY: each release matches one add_reference above.
        unsafe { Object::release(ptr) };
        assert_eq!(DELETED.load(Ordering::SeqCst), 0);

        unsafe { Object::release(ptr) };
        assert_eq!(DELETED.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "refcount underflow")]
    fn test_release_without_reference_asserts() {
        let object = Object::new(Uid::new(4));
        // SAFETY: the count is 0, so the assertion fires before any destroy.
        unsafe { Object::release(NonNull::from(&object)) };
    }

    #[test]
    fn test_uid_display() {
        assert_eq!(Uid::new(42).to_string(), "uid:42");
        assert_eq!(Uid::new(42).get(), 42);
    }

    #[test]
    fn test_object_debug() {
        let object = Object::new(Uid::new(9));
        let text = format!("{object:?}");
        assert!(text.contains("references: 0"));
        assert!(text.contains("custom_deleter: false"));
    }
}
