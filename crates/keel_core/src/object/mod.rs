//! # Shared Ownership
//!
//! Intrusive reference counting for engine resources.
//!
//! ```text
//!   SmartPointer<Mesh> ──┐
//!   SmartPointer<Mesh> ──┼──► ┌──────────────────────────┐
//!   SmartPointer<dyn R> ─┘    │ Mesh                     │
//!                             │ ┌──────────────────────┐ │
//!                             │ │ Object               │ │
//!                             │ │  uid | count | del   │ │
//!                             │ └──────────────────────┘ │
//!                             │ ... mesh data ...        │
//!                             └──────────────────────────┘
//! ```
//!
//! ## Collaborator Contract
//!
//! A type that wants shared, thread-safe ownership:
//! 1. Embeds an [`Object`]
//! 2. Implements [`Referenced`] (usually via [`referenced!`](crate::referenced))
//! 3. Is only ever reached through [`SmartPointer`], never dropped by hand
//!
//! Reference cycles are never freed. Break them with raw pointers or
//! [`AtomicPointer`](crate::AtomicPointer) back-links.

mod base;
mod smart_pointer;

pub use base::{Deleter, Object, Referenced, Uid};
pub use smart_pointer::{SmartPointer, Upcast};
