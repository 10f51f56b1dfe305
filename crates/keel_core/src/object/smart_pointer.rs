//! # Smart Pointer
//!
//! Intrusive shared-ownership handle. The count lives in the pointee's
//! [`Object`], so a `SmartPointer` is exactly one pointer wide (two for
//! trait objects) and cloning it touches no other memory.
//!
//! ## Safety Note
//!
//! This module holds raw pointers whose lifetime is governed by the embedded
//! count. All unsafe blocks are documented.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ops::Deref;
use std::ptr::{self, NonNull};

use super::base::{Object, Referenced};

/// Pointer conversion from a concrete shared type to one of its views
/// (usually a trait object), the equivalent of "`U*` converts to `T*`".
///
/// Use the [`upcast!`](crate::upcast) macro to implement it.
///
/// # Safety
///
/// The returned pointer must address the same allocation, and calling
/// [`Referenced::object`] through it must yield the same [`Object`].
pub unsafe trait Upcast<T: ?Sized> {
    /// Converts the pointer.
    fn upcast(ptr: NonNull<Self>) -> NonNull<T>;
}

/// Implements [`Upcast`] through Rust's unsizing coercion, e.g.
/// `upcast!(Circle => dyn Shape)`.
///
/// The target trait must have [`Referenced`] as a supertrait.
#[macro_export]
macro_rules! upcast {
    ($from:ty => $to:ty) => {
        // SAFETY: unsizing keeps the address, and the vtable routes `object()`
        // to the same field.
        unsafe impl $crate::Upcast<$to> for $from {
            #[inline]
            fn upcast(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$to> {
                ptr
            }
        }
    };
}

/// Shared-ownership handle to a value embedding an [`Object`].
///
/// Every live, non-null handle holds one reference. The value is destroyed
/// when the last handle goes away. Reference cycles are never collected.
///
/// ## Usage
///
/// ```rust,ignore
/// use keel_core::{Object, SmartPointer, Uid};
///
/// let a = SmartPointer::new(Object::new(Uid::new(7)));
/// assert_eq!(a.uid(), Uid::new(7));
/// assert_eq!(a.reference_count(), 1);
///
/// let mut b = a.clone();
/// assert_eq!(b.reference_count(), 2);
///
/// b.reset();
/// assert_eq!(a.reference_count(), 1);
/// ```
///
/// ## Thread Safety
///
/// Handles to `Send + Sync` values can be cloned and dropped from any number
/// of threads at once; the count is the only shared state.
pub struct SmartPointer<T: ?Sized + Referenced> {
    ptr: Option<NonNull<T>>,
    _owns: PhantomData<T>,
}

// SAFETY: same rule as `Arc`: the value is shared across threads and may be
// dropped on any of them.
unsafe impl<T: ?Sized + Referenced + Send + Sync> Send for SmartPointer<T> {}
// SAFETY: see above.
unsafe impl<T: ?Sized + Referenced + Send + Sync> Sync for SmartPointer<T> {}

impl<T: Referenced> SmartPointer<T> {
    /// Moves `value` to the heap and takes the first reference.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Returns the raw pointer (null for a null handle). No ownership change.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

impl<T: ?Sized + Referenced> SmartPointer<T> {
    /// Creates a handle that points at nothing.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _owns: PhantomData,
        }
    }

    /// Takes ownership of a boxed value (trait objects included).
    #[must_use]
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));
        // SAFETY: a freshly leaked box is live and owned by nobody else.
        unsafe { Self::from_non_null(ptr) }
    }

    /// Wraps a raw pointer, taking one reference if it is non-null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a live value that will be destroyed only
    /// through its refcount: allocated with `Box<T>` or carrying a custom
    /// [`Deleter`](crate::Deleter) that matches its allocation.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            // SAFETY: forwarded from the caller.
            Some(ptr) => unsafe { Self::from_non_null(ptr) },
            None => Self::null(),
        }
    }

    /// # Safety
    ///
    /// `ptr` must be live for the duration of the call.
    unsafe fn from_non_null(ptr: NonNull<T>) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe { ptr.as_ref() }.object().add_reference();
        Self {
            ptr: Some(ptr),
            _owns: PhantomData,
        }
    }

    /// Copy-constructs a handle to a base view from a handle to a derived type.
    #[must_use]
    pub fn from_derived<U>(other: &SmartPointer<U>) -> Self
    where
        U: ?Sized + Referenced + Upcast<T>,
    {
        match other.ptr {
            // SAFETY: `other` holds a reference, so the value is live, and
            // `Upcast` keeps the address and the header.
            Some(ptr) => unsafe { Self::from_non_null(<U as Upcast<T>>::upcast(ptr)) },
            None => Self::null(),
        }
    }

    /// Converts this handle into a handle to a base view, moving the reference.
    #[must_use]
    pub fn upcast<B>(self) -> SmartPointer<B>
    where
        B: ?Sized + Referenced,
        T: Upcast<B>,
    {
        SmartPointer {
            ptr: self.into_raw().map(<T as Upcast<B>>::upcast),
            _owns: PhantomData,
        }
    }

    /// Points this handle at the same value as `other`.
    ///
    /// The new reference is taken before the old one is dropped, so assigning
    /// a handle to the value it already holds never destroys that value.
    pub fn assign(&mut self, other: &Self) {
        // SAFETY: `other` keeps its target live for the whole call.
        unsafe { self.replace(other.ptr) };
    }

    /// Points this handle at `ptr` (or at nothing when null).
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw).
    pub unsafe fn assign_raw(&mut self, ptr: *mut T) {
        // SAFETY: forwarded from the caller.
        unsafe { self.replace(NonNull::new(ptr)) };
    }

    /// Drops this handle's reference and leaves it null.
    #[inline]
    pub fn reset(&mut self) {
        // SAFETY: null needs no liveness guarantee.
        unsafe { self.replace(None) };
    }

    /// Acquire-then-release swap shared by every assignment.
    ///
    /// # Safety
    ///
    /// A non-null `new` must be live for the duration of the call.
    unsafe fn replace(&mut self, new: Option<NonNull<T>>) {
        if let Some(target) = new {
            // SAFETY: forwarded from the caller.
            unsafe { target.as_ref() }.object().add_reference();
        }
        let old = mem::replace(&mut self.ptr, new);
        if let Some(old) = old {
            // SAFETY: this handle owned one reference on `old`.
            unsafe { Object::release(old) };
        }
    }

    /// Returns the value, or `None` for a null handle.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-null handle holds a reference, so the value is live
        // for at least as long as `self` is borrowed.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Returns the pointer, or `None` for a null handle. No ownership change.
    #[inline]
    #[must_use]
    pub fn as_non_null(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    /// Consumes the handle without releasing its reference.
    ///
    /// The caller becomes responsible for that reference, typically by
    /// passing the pointer back to [`Object::release`].
    #[must_use = "dropping the pointer leaks a reference"]
    pub fn into_raw(self) -> Option<NonNull<T>> {
        let this = ManuallyDrop::new(self);
        this.ptr
    }

    /// Returns `true` if this handle points at nothing.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Returns the shared count of the pointee, or 0 for a null handle.
    ///
    /// Diagnostics only: the value may change right after the read.
    #[inline]
    #[must_use]
    pub fn reference_count(&self) -> i32 {
        self.get().map_or(0, |value| value.object().reference_count())
    }

    /// Returns `true` if both handles point at the same value (or both are
    /// null).
    #[inline]
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.address() == b.address()
    }

    fn address(&self) -> *const () {
        self.ptr
            .map_or(ptr::null(), |ptr| ptr.as_ptr().cast::<()>().cast_const())
    }
}

impl<T: ?Sized + Referenced> Clone for SmartPointer<T> {
    fn clone(&self) -> Self {
        if let Some(value) = self.get() {
            value.object().add_reference();
        }
        Self {
            ptr: self.ptr,
            _owns: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T: ?Sized + Referenced> Drop for SmartPointer<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: this handle owned one reference on `ptr`.
            unsafe { Object::release(ptr) };
        }
    }
}

impl<T: ?Sized + Referenced> Deref for SmartPointer<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is null. Use [`get`](SmartPointer::get) when null
    /// is an expected state.
    #[inline]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null SmartPointer"),
        }
    }
}

impl<T: ?Sized + Referenced> Default for SmartPointer<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + Referenced> From<Box<T>> for SmartPointer<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized + Referenced> PartialEq for SmartPointer<T> {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: ?Sized + Referenced> Eq for SmartPointer<T> {}

impl<T: ?Sized + Referenced> fmt::Debug for SmartPointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartPointer")
            .field("address", &self.address())
            .field("references", &self.reference_count())
            .finish()
    }
}
