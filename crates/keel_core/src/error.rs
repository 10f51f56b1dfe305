//! # Core Error Types
//!
//! The ownership layer never fails at runtime: CAS failure is a normal
//! outcome and refcount misuse is a debug assertion. Only the allocation
//! side has recoverable errors.

use thiserror::Error;

/// Errors reported by the [`MemoryManager`](crate::MemoryManager).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Zero-sized allocations are not handed to the system allocator.
    #[error("zero-sized allocation requested")]
    ZeroSized,

    /// The system allocator returned null.
    #[error("out of memory: {size} bytes aligned to {align}")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },

    /// A tracked manager was asked to free an address it never handed out.
    #[error("unknown allocation at {address:#x}")]
    UnknownAllocation {
        /// The rejected address.
        address: usize,
    },

    /// A tracked allocation was freed with a different size or alignment.
    #[error(
        "layout mismatch at {address:#x}: allocated {expected_size} bytes aligned to \
         {expected_align}, freed as {actual_size} aligned to {actual_align}"
    )]
    LayoutMismatch {
        /// The address being freed.
        address: usize,
        /// Size recorded at allocation time.
        expected_size: usize,
        /// Size passed to the free call.
        actual_size: usize,
        /// Alignment recorded at allocation time.
        expected_align: usize,
        /// Alignment passed to the free call.
        actual_align: usize,
    },

    /// `MemoryManager::init` was called while a manager is installed.
    #[error("memory manager already initialized")]
    AlreadyInitialized,

    /// Configuration could not be parsed.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for allocation operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
