//! # KEEL Core
//!
//! The ownership layer every other KEEL subsystem is built on:
//! - Lock-free atomic primitives with one contract on every target
//! - Typed atomics (`AtomicInt`, `AtomicBool`, `AtomicPointer<T>`)
//! - `Object`: an embedded atomic refcount, a type tag and an optional deleter
//! - `SmartPointer<T>`: the intrusive shared-ownership handle
//! - `MemoryManager`: the process-wide allocation entry point
//!
//! ## Architecture Rules
//!
//! 1. **No mutex on the refcount path** - every count change is one atomic op
//! 2. **Acquire before release** - a handle takes its new reference before
//!    dropping the old one
//! 3. **Cycles are never collected** - intrusive refcounting, not a GC
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_core::{referenced, Object, Referenced, SmartPointer, Uid};
//!
//! struct Mesh {
//!     object: Object,
//!     vertices: u32,
//! }
//!
//! referenced!(Mesh, object);
//!
//! let mesh = SmartPointer::new(Mesh {
//!     object: Object::new(Uid::new(7)),
//!     vertices: 3,
//! });
//! let shared = mesh.clone();
//!
//! assert_eq!(shared.uid(), Uid::new(7));
//! assert_eq!(mesh.reference_count(), 2);
//! assert_eq!(shared.vertices, 3);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod atomic;
pub mod error;
pub mod memory;
pub mod object;

pub use atomic::{
    atomic_add, atomic_compare_and_set, atomic_decrement, atomic_increment,
    atomic_pointer_compare_and_set, atomic_pointer_load, atomic_pointer_store,
    AtomicBool, AtomicInt, AtomicPointer,
};
pub use error::{MemoryError, MemoryResult};
pub use memory::{
    managed_deleter, AllocationRecord, LeakReport, MemoryConfig, MemoryManager, MemoryStats,
    TrackingMode,
};
pub use object::{Deleter, Object, Referenced, SmartPointer, Uid, Upcast};
