//! # Atomics
//!
//! Lock-free building blocks. No locks. No per-call ordering choices.
//!
//! ```text
//!   ┌────────────┐ ┌────────────┐ ┌──────────────────┐
//!   │ AtomicInt  │ │ AtomicBool │ │ AtomicPointer<T> │
//!   └─────┬──────┘ └─────┬──────┘ └────────┬─────────┘
//!         │              │                 │
//!         └──────────────┼─────────────────┘
//!                        ▼
//!             ┌─────────────────────┐
//!             │  primitives (SeqCst) │
//!             └─────────────────────┘
//! ```
//!
//! The typed wrappers are thin: every method is one primitive call.

mod boolean;
mod int;
mod pointer;
mod primitives;

pub use boolean::AtomicBool;
pub use int::AtomicInt;
pub use pointer::AtomicPointer;
pub use primitives::{
    atomic_add, atomic_compare_and_set, atomic_decrement, atomic_increment,
    atomic_pointer_compare_and_set, atomic_pointer_load, atomic_pointer_store,
};
