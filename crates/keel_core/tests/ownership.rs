//! # Ownership Integration Tests
//!
//! Refcount accounting, destruction exactly once, and handle assignment
//! under single- and multi-threaded use.

#![allow(unsafe_code)]

use keel_core::{referenced, upcast, Object, Referenced, SmartPointer, Uid};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

// ============================================================================
// Helpers
// ============================================================================

/// A shared resource that counts its own destruction.
struct Resource {
    object: Object,
    payload: u64,
    drops: Arc<AtomicUsize>,
}

referenced!(Resource, object);

impl Drop for Resource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn resource(uid: u32, payload: u64, drops: &Arc<AtomicUsize>) -> SmartPointer<Resource> {
    SmartPointer::new(Resource {
        object: Object::new(Uid::new(uid)),
        payload,
        drops: Arc::clone(drops),
    })
}

trait Component: Referenced + Send + Sync {
    fn weight(&self) -> u64;
}

impl Component for Resource {
    fn weight(&self) -> u64 {
        self.payload
    }
}

upcast!(Resource => dyn Component);

// ============================================================================
// Accounting
// ============================================================================

/// Test: wrapping a fresh object takes the count from 0 to 1.
#[test]
fn test_wrap_takes_first_reference() {
    let object = Box::new(Object::new(Uid::new(7)));
    assert_eq!(object.reference_count(), 0);

    let a = SmartPointer::from_box(object);
    assert_eq!(a.uid(), Uid::new(7));
    assert_eq!(a.reference_count(), 1);
}

/// Test: copy, reset, reset - deleter fires exactly once at the end.
#[test]
fn test_refcount_accounting_and_single_destruction() {
    let drops = Arc::new(AtomicUsize::new(0));

    let mut a = resource(1, 10, &drops);
    assert_eq!(a.reference_count(), 1);

    let mut b = a.clone();
    assert_eq!(a.reference_count(), 2);
    assert_eq!(b.reference_count(), 2);

    b.reset();
    assert_eq!(a.reference_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    a.reset();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// Test: a custom deleter runs instead of the default one.
#[test]
fn test_custom_deleter_runs_once() {
    static DELETED: AtomicUsize = AtomicUsize::new(0);

    unsafe fn delete_object(ptr: *mut ()) {
        DELETED.fetch_add(1, Ordering::SeqCst);
        // SAFETY: only `Box<Object>` pointers reach this deleter.
        drop(unsafe { Box::from_raw(ptr.cast::<Object>()) });
    }

    let a = SmartPointer::new(Object::with_deleter(Uid::new(3), delete_object));
    let b = a.clone();
    let c = b.clone();
    assert_eq!(c.reference_count(), 3);

    drop(a);
    drop(b);
    assert_eq!(DELETED.load(Ordering::SeqCst), 0);

    drop(c);
    assert_eq!(DELETED.load(Ordering::SeqCst), 1);
}

/// Test: raw construction of a null pointer is a null handle.
#[test]
fn test_from_raw_null() {
    // SAFETY: null is always accepted.
    let handle: SmartPointer<Object> = unsafe { SmartPointer::from_raw(std::ptr::null_mut()) };
    assert!(handle.is_null());
    assert_eq!(handle.reference_count(), 0);
}

// ============================================================================
// Assignment
// ============================================================================

/// Test: assigning a handle to another handle of the same object, at count 1
/// after the alias is gone, never destroys the object.
#[test]
fn test_self_assignment_is_safe() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut a = resource(2, 99, &drops);

    // Same-object handle, then back down to a single owner.
    let alias = a.clone();
    a.clone_from(&alias);
    drop(alias);
    assert_eq!(a.reference_count(), 1);

    // Raw self-assignment at count 1.
    let raw = a.as_ptr();
    // SAFETY: `a` keeps `raw` alive for the call.
    unsafe { a.assign_raw(raw) };

    assert_eq!(a.reference_count(), 1);
    assert_eq!(a.payload, 99);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(a);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// Test: reassignment releases the old target and keeps the new one.
#[test]
fn test_reassignment_releases_old_target() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut a = resource(1, 1, &drops);
    let b = resource(2, 2, &drops);

    a.assign(&b);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(a.payload, 2);
    assert_eq!(b.reference_count(), 2);
}

/// Test: a base-view handle shares the derived handle's count.
#[test]
fn test_upcast_shares_lifetime() {
    let drops = Arc::new(AtomicUsize::new(0));
    let concrete = resource(5, 42, &drops);

    let view: SmartPointer<dyn Component> = SmartPointer::from_derived(&concrete);
    assert_eq!(view.weight(), 42);
    assert_eq!(view.uid(), Uid::new(5));
    assert_eq!(concrete.reference_count(), 2);

    drop(concrete);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(view.reference_count(), 1);

    drop(view);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Test: many threads cloning and dropping one object destroy it exactly once.
#[test]
fn test_concurrent_clone_drop_single_destruction() {
    const THREADS: usize = 8;
    const CLONES: usize = 5_000;

    let drops = Arc::new(AtomicUsize::new(0));
    let shared = resource(9, 7, &drops);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let local = shared.clone();
            thread::spawn(move || {
                let mut held = Vec::with_capacity(16);
                for i in 0..CLONES {
                    held.push(local.clone());
                    if i % 16 == 15 {
                        held.clear();
                    }
                }
                assert_eq!(local.payload, 7);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.reference_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(shared);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// Test: the last owner can be on any thread, trait-object handles included.
#[test]
fn test_last_owner_on_worker_thread() {
    let drops = Arc::new(AtomicUsize::new(0));
    let view: SmartPointer<dyn Component> = resource(4, 3, &drops).upcast();

    let worker = thread::spawn(move || {
        let copy = view.clone();
        drop(view);
        copy.weight()
    });

    assert_eq!(worker.join().unwrap(), 3);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

/// Test: concurrent reassignment between two objects never loses or
/// double-frees either of them.
#[test]
fn test_concurrent_reassignment() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 2_000;

    let drops = Arc::new(AtomicUsize::new(0));
    let first = resource(1, 1, &drops);
    let second = resource(2, 2, &drops);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let first = first.clone();
            let second = second.clone();
            thread::spawn(move || {
                let mut slot = first.clone();
                for round in 0..ROUNDS {
                    if round % 2 == 0 {
                        slot.assign(&second);
                    } else {
                        slot.assign(&first);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(first.reference_count(), 1);
    assert_eq!(second.reference_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(first);
    drop(second);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}
