//! # Memory Manager
//!
//! Single process-wide allocation entry point.
//!
//! ## Safety Note
//!
//! This module talks to the system allocator directly. All unsafe blocks are
//! documented.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::Location;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};
use tracing::{debug, error, trace, warn};

use super::config::{MemoryConfig, TrackingMode};
use crate::atomic::AtomicBool;
use crate::error::{MemoryError, MemoryResult};

/// Process-wide state behind [`MemoryManager::instance`].
///
/// Statics never run destructors, so teardown only happens through
/// [`MemoryManager::deinit`].
static GLOBAL: Mutex<Global> = const_mutex(Global {
    installed: None,
    retired: BTreeSet::new(),
});

struct Global {
    installed: Option<Arc<MemoryManager>>,
    /// Blocks still live when their manager was deinitialized. No installed
    /// manager knows them, so [`managed_deleter`] frees them directly.
    retired: BTreeSet<usize>,
}

/// One live tracked allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Start address.
    pub address: usize,
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
    /// Source file of the allocating call.
    pub file: &'static str,
    /// Source line of the allocating call.
    pub line: u32,
}

/// Allocations still live when a manager shut down.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Outstanding allocations, ordered by call site.
    pub leaks: Vec<AllocationRecord>,
}

impl LeakReport {
    /// Returns `true` if nothing leaked.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }

    /// Total bytes still outstanding.
    #[must_use]
    pub fn leaked_bytes(&self) -> usize {
        self.leaks.iter().map(|record| record.size).sum()
    }
}

/// Counters of a tracked manager. All zero in passthrough mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Allocations currently live.
    pub live_allocations: usize,
    /// Bytes currently live.
    pub live_bytes: usize,
    /// Allocations made since creation.
    pub total_allocations: u64,
    /// Frees performed since creation.
    pub total_frees: u64,
}

/// Tracking table. Only touched in tracked mode.
#[derive(Default)]
struct Tracking {
    records: HashMap<usize, AllocationRecord>,
    live_bytes: usize,
    total_allocations: u64,
    total_frees: u64,
}

/// Process-wide allocator front end.
///
/// In tracked mode every allocation records where it came from (through
/// `#[track_caller]`) so leaks can be reported at shutdown. In passthrough
/// mode it is a thin layer over the global allocator.
///
/// # Example
///
/// ```rust,ignore
/// use keel_core::{MemoryConfig, MemoryManager};
/// use std::alloc::Layout;
///
/// let manager = MemoryManager::new(MemoryConfig::debug());
/// let layout = Layout::new::<[u64; 4]>();
///
/// let block = manager.allocate(layout)?;
/// assert_eq!(manager.stats().live_bytes, 32);
///
/// // SAFETY: `block` came from this manager with this layout.
/// unsafe { manager.deallocate(block, layout)? };
/// assert!(manager.shutdown().is_clean());
/// # Ok::<(), keel_core::MemoryError>(())
/// ```
pub struct MemoryManager {
    config: MemoryConfig,
    /// Lock-free hint so passthrough never touches the table. Only cleared
    /// with the table locked, so a re-check under the lock is authoritative.
    tracked: AtomicBool,
    tracking: Mutex<Tracking>,
}

impl MemoryManager {
    /// Creates a standalone manager.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        let tracked = config.mode == TrackingMode::Tracked;
        Self {
            config,
            tracked: AtomicBool::new(tracked),
            tracking: Mutex::new(Tracking::default()),
        }
    }

    /// Installs the process-wide manager with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::AlreadyInitialized`] if a manager is installed,
    /// including one created lazily by [`instance`](Self::instance).
    pub fn init(config: MemoryConfig) -> MemoryResult<Arc<Self>> {
        let mut global = GLOBAL.lock();
        if global.installed.is_some() {
            return Err(MemoryError::AlreadyInitialized);
        }

        debug!(mode = ?config.mode, "memory manager initialized");
        let manager = Arc::new(Self::new(config));
        global.installed = Some(Arc::clone(&manager));
        Ok(manager)
    }

    /// Returns the process-wide manager, creating it with
    /// [`MemoryConfig::default`] on first use.
    #[must_use]
    pub fn instance() -> Arc<Self> {
        let mut global = GLOBAL.lock();
        let manager = global.installed.get_or_insert_with(|| {
            let config = MemoryConfig::default();
            debug!(mode = ?config.mode, "memory manager created on first use");
            Arc::new(Self::new(config))
        });
        Arc::clone(manager)
    }

    /// Returns `true` if a process-wide manager is installed.
    #[must_use]
    pub fn is_initialized() -> bool {
        GLOBAL.lock().installed.is_some()
    }

    /// Tears down the process-wide manager and releases its tracking table.
    ///
    /// Returns the leak report, or `None` if no manager was installed. Handles
    /// obtained earlier keep working in passthrough mode; the next
    /// [`instance`](Self::instance) call starts a fresh manager.
    ///
    /// Values using [`managed_deleter`] may outlive the manager: their blocks
    /// are remembered and freed directly, never handed to a later manager.
    pub fn deinit() -> Option<LeakReport> {
        let mut global = GLOBAL.lock();
        let manager = global.installed.take()?;
        let report = manager.shutdown();
        global
            .retired
            .extend(report.leaks.iter().map(|record| record.address));
        drop(global);

        debug!(leaks = report.leaks.len(), "memory manager deinitialized");
        Some(report)
    }

    /// Returns the configuration this manager was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Returns `true` while allocations are being recorded.
    #[inline]
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracked.load()
    }

    /// Allocates a block for `layout`.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::ZeroSized`] for zero-sized layouts
    /// - [`MemoryError::OutOfMemory`] if the system allocator fails
    #[track_caller]
    pub fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(MemoryError::ZeroSized);
        }

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or(MemoryError::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        })?;

        if self.tracked.load() {
            self.track(ptr, layout, Location::caller());
        }
        Ok(ptr)
    }

    /// Returns a block to the system allocator.
    ///
    /// In tracked mode the block is checked against the table first. A block
    /// that fails the check is **not** freed.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::ZeroSized`] for zero-sized layouts
    /// - [`MemoryError::UnknownAllocation`] if the table has no such block
    /// - [`MemoryError::LayoutMismatch`] if it was allocated with another size or
    ///   alignment
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`allocate`](Self::allocate) with the same
    /// `layout` and must not be used afterwards.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> MemoryResult<()> {
        if layout.size() == 0 {
            return Err(MemoryError::ZeroSized);
        }

        self.untrack(ptr.as_ptr() as usize, layout)?;
        // SAFETY: forwarded from the caller; the table agreed with the layout.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
        Ok(())
    }

    /// Moves `value` into a new allocation.
    ///
    /// Zero-sized types get a dangling pointer and are never tracked.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfMemory`] if the system allocator fails.
    #[track_caller]
    pub fn create<T>(&self, value: T) -> MemoryResult<NonNull<T>> {
        let layout = Layout::new::<T>();
        let ptr = if layout.size() == 0 {
            NonNull::<T>::dangling()
        } else {
            self.allocate(layout)?.cast::<T>()
        };

        // SAFETY: `ptr` is either a fresh block sized for `T` or a valid
        // dangling pointer for a zero-sized `T`.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Drops the value at `ptr` and frees its allocation.
    ///
    /// In tracked mode the allocation is checked first; on failure the value
    /// is neither dropped nor freed.
    ///
    /// # Errors
    ///
    /// Same as [`deallocate`](Self::deallocate), minus `ZeroSized`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`create`](Self::create) for the same `T` and
    /// must not be used afterwards.
    pub unsafe fn destroy<T>(&self, ptr: NonNull<T>) -> MemoryResult<()> {
        let layout = Layout::new::<T>();
        if layout.size() != 0 {
            self.untrack(ptr.as_ptr() as usize, layout)?;
        }

        // SAFETY: forwarded from the caller; the table agreed with the layout.
        unsafe { drop_and_free(ptr) };
        Ok(())
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let tracking = self.tracking.lock();
        MemoryStats {
            live_allocations: tracking.records.len(),
            live_bytes: tracking.live_bytes,
            total_allocations: tracking.total_allocations,
            total_frees: tracking.total_frees,
        }
    }

    /// Returns a snapshot of every live tracked allocation, ordered by call
    /// site.
    #[must_use]
    pub fn leaks(&self) -> Vec<AllocationRecord> {
        let tracking = self.tracking.lock();
        let mut records: Vec<_> = tracking.records.values().copied().collect();
        sort_by_site(&mut records);
        records
    }

    /// Stops tracking, drains the table and reports what was still live.
    ///
    /// The manager keeps serving allocations in passthrough mode afterwards.
    /// Leaked blocks stay allocated.
    pub fn shutdown(&self) -> LeakReport {
        let mut tracking = self.tracking.lock();
        self.tracked.store(false);

        let mut leaks: Vec<_> = tracking.records.drain().map(|(_, record)| record).collect();
        tracking.records.shrink_to_fit();
        tracking.live_bytes = 0;
        drop(tracking);

        sort_by_site(&mut leaks);
        if self.config.report_leaks_on_shutdown {
            for leak in &leaks {
                warn!(
                    address = leak.address,
                    size = leak.size,
                    file = leak.file,
                    line = leak.line,
                    "leaked allocation"
                );
            }
        }

        LeakReport { leaks }
    }

    fn track(&self, ptr: NonNull<u8>, layout: Layout, site: &'static Location<'static>) {
        let mut tracking = self.tracking.lock();
        if !self.tracked.load() {
            return;
        }

        let record = AllocationRecord {
            address: ptr.as_ptr() as usize,
            size: layout.size(),
            align: layout.align(),
            file: site.file(),
            line: site.line(),
        };
        if self.config.log_allocations {
            trace!(
                address = record.address,
                size = record.size,
                file = record.file,
                line = record.line,
                "allocate"
            );
        }

        tracking.records.insert(record.address, record);
        tracking.live_bytes += record.size;
        tracking.total_allocations += 1;
    }

    fn untrack(&self, address: usize, layout: Layout) -> MemoryResult<()> {
        if !self.tracked.load() {
            return Ok(());
        }

        let mut tracking = self.tracking.lock();
        if !self.tracked.load() {
            return Ok(());
        }

        let Some(record) = tracking.records.get(&address).copied() else {
            error!(address, size = layout.size(), "free of unknown allocation");
            return Err(MemoryError::UnknownAllocation { address });
        };
        if record.size != layout.size() || record.align != layout.align() {
            error!(
                address,
                expected_size = record.size,
                actual_size = layout.size(),
                expected_align = record.align,
                actual_align = layout.align(),
                "free with wrong layout"
            );
            return Err(MemoryError::LayoutMismatch {
                address,
                expected_size: record.size,
                actual_size: layout.size(),
                expected_align: record.align,
                actual_align: layout.align(),
            });
        }

        tracking.records.remove(&address);
        tracking.live_bytes -= record.size;
        tracking.total_frees += 1;
        if self.config.log_allocations {
            trace!(address, size = record.size, "free");
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.config)
            .field("tracking", &self.is_tracking())
            .field("stats", &self.stats())
            .finish()
    }
}

fn sort_by_site(records: &mut [AllocationRecord]) {
    records.sort_unstable_by(|a, b| {
        (a.file, a.line, a.address).cmp(&(b.file, b.line, b.address))
    });
}

/// Drops the value at `ptr` and frees its block without consulting a table.
///
/// # Safety
///
/// `ptr` must come from [`MemoryManager::create`] for the same `T` and must
/// not be used afterwards.
unsafe fn drop_and_free<T>(ptr: NonNull<T>) {
    let layout = Layout::new::<T>();
    // SAFETY: forwarded from the caller.
    unsafe { ptr.as_ptr().drop_in_place() };
    if layout.size() != 0 {
        // SAFETY: `create` allocated this block with `Layout::new::<T>()`.
        unsafe { alloc::dealloc(ptr.as_ptr().cast::<u8>(), layout) };
    }
}

/// [`Deleter`](crate::Deleter) for shared values allocated with
/// `MemoryManager::instance().create(..)`.
///
/// Drops the value and returns its block to the manager that is installed
/// now. It never creates a manager: with none installed, or for a block left
/// over from a deinitialized manager, the block is freed directly. If the
/// installed manager rejects the block, the value is leaked and an error is
/// logged.
///
/// # Safety
///
/// `ptr` must come from [`MemoryManager::create`] on the process-wide
/// manager, for this exact `T`.
pub unsafe fn managed_deleter<T>(ptr: *mut ()) {
    let Some(ptr) = NonNull::new(ptr.cast::<T>()) else {
        return;
    };

    let owner = {
        let mut global = GLOBAL.lock();
        if global.retired.remove(&(ptr.as_ptr() as usize)) {
            None
        } else {
            global.installed.clone()
        }
    };

    match owner {
        Some(manager) => {
            // SAFETY: forwarded from the caller.
            if let Err(err) = unsafe { manager.destroy(ptr) } {
                error!(%err, "managed deleter failed, value leaked");
            }
        }
        None => {
            trace!(address = ptr.as_ptr() as usize, "freeing block outside a live manager");
            // SAFETY: forwarded from the caller; no manager tracks the block.
            unsafe { drop_and_free(ptr) };
        }
    }
}
