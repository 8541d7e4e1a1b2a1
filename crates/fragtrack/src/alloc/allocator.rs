// Interception approach based on https://github.com/fornwall/allocation-counter
//
// Licensed under either of:
// - Apache License, Version 2.0.
// - MIT/X Consortium License
//
// Modifications:
// - Records every live block by address instead of counting bytes
// - Generic over the inner allocator and the registry it reports to

use std::alloc::{GlobalAlloc, Layout, System};

use super::core::TrackingGuard;
use super::registry::{self, AllocationRecord, Registry};

/// Global allocator that forwards to `A` and records every live block in a
/// [`Registry`].
///
/// ```rust,no_run
/// use fragtrack::TrackingAllocator;
///
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator::system();
///
/// fn main() {
///     let data = vec![0u8; 256];
///     assert_eq!(fragtrack::global().get(data.as_ptr() as usize), Some(256));
/// }
/// ```
///
/// Allocations made while the current thread is already inside tracking
/// logic (for instance the registry growing its own storage) are served but
/// not recorded. Tracking never fails the caller's request.
pub struct TrackingAllocator<A = System> {
    inner: A,
    registry: Option<&'static Registry>,
}

impl TrackingAllocator<System> {
    /// Wraps the system allocator and reports to [`global`](crate::global).
    pub const fn system() -> Self {
        Self::new(System)
    }
}

impl<A> TrackingAllocator<A> {
    /// Wraps `inner` and reports to [`global`](crate::global).
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            registry: None,
        }
    }

    /// Wraps `inner` and reports to `registry`.
    pub const fn with_registry(inner: A, registry: &'static Registry) -> Self {
        Self {
            inner,
            registry: Some(registry),
        }
    }

    pub const fn inner(&self) -> &A {
        &self.inner
    }

    /// The registry this allocator reports to.
    #[inline]
    pub fn registry(&self) -> &'static Registry {
        match self.registry {
            Some(registry) => registry,
            None => registry::global(),
        }
    }

    #[inline]
    fn track_alloc(&self, ptr: *mut u8, size: usize) {
        if ptr.is_null() {
            return;
        }
        if let Some(_guard) = TrackingGuard::try_enter() {
            // A rejected record only costs observability.
            let _ = self.registry().insert(ptr as usize, size);
        }
    }

    #[inline]
    fn track_dealloc(&self, ptr: *mut u8) -> Option<AllocationRecord> {
        let _guard = TrackingGuard::try_enter()?;
        self.registry().remove(ptr as usize)
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc(layout) };
        self.track_alloc(ptr, layout.size());
        ptr
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        self.track_alloc(ptr, layout.size());
        ptr
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ptr.is_null() {
            return;
        }

        // The record goes first: once the block is released another thread
        // may be handed the same address.
        self.track_dealloc(ptr);

        unsafe { self.inner.dealloc(ptr, layout) }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let previous = self.track_dealloc(ptr);

        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };

        if new_ptr.is_null() {
            // The old block is still live.
            if let Some(record) = previous {
                self.track_alloc(ptr, record.size);
            }
        } else {
            self.track_alloc(new_ptr, new_size);
        }
        new_ptr
    }
}
