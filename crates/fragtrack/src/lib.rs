//! Global allocator wrapper that keeps an address-ordered registry of every
//! live heap block and measures how fragmented the heap is.
//!
//! Install [`TrackingAllocator`] as the `#[global_allocator]` (or let the
//! [`main`] macro do it), then read metrics from [`global`]:
//!
//! ```rust,no_run
//! use fragtrack::TrackingAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: TrackingAllocator = TrackingAllocator::system();
//!
//! fn main() {
//!     let a = vec![0u8; 1024];
//!     let b = vec![0u8; 64];
//!     drop(a);
//!
//!     let stats = fragtrack::global().stats();
//!     println!("fragmentation index: {:.3}", stats.fragmentation_index);
//!     println!("largest free block: {} B", stats.largest_free_block);
//!     # drop(b);
//! }
//! ```

mod alloc;

pub use alloc::allocator::TrackingAllocator;
pub use alloc::core::{is_tracking_suppressed, suppress_tracking, TrackingGuard};
pub use alloc::registry::{
    global, AllocationRecord, FragmentationLevel, HeapStats, RecordError, Registry,
};

#[cfg(feature = "report")]
mod guard;
#[cfg(feature = "report")]
pub(crate) mod output;
#[cfg(feature = "report")]
pub(crate) mod reporters;

#[cfg(feature = "report")]
pub use fragtrack_macros::main;
#[cfg(feature = "report")]
pub use guard::{ReportGuard, ReportGuardBuilder};
#[cfg(feature = "report")]
pub use output::{format_bytes, Format, HeapReport, Reporter};
