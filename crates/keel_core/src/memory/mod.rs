//! # Memory Management
//!
//! The process-wide allocation entry point.
//!
//! ## Lifecycle
//!
//! ```text
//!   MemoryManager::init(config) ──┐
//!                                 ├──► installed ──► MemoryManager::deinit()
//!   MemoryManager::instance() ────┘    (Arc)          └─► LeakReport
//!        (first use, default config)
//! ```
//!
//! Teardown is explicit. Nothing happens in a static destructor, so the
//! caller decides where shutdown sits relative to other global state.
//!
//! ## Modes
//!
//! - **Tracked** (debug): every block records size, alignment, file, line
//! - **Passthrough** (release): straight to the system allocator

mod config;
mod manager;

pub use config::{MemoryConfig, TrackingMode};
pub use manager::{managed_deleter, AllocationRecord, LeakReport, MemoryManager, MemoryStats};
