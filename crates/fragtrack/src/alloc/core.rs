use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    /// `true` while the current thread is inside tracking logic.
    static IN_TRACKER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as being inside tracking logic for as long as it
/// is alive. Allocations made by this thread while a guard exists are served
/// by the inner allocator but are not recorded.
///
/// The previous state is restored on drop, so guards nest and the flag is
/// reset on every exit path, including unwinding.
#[must_use = "tracking resumes as soon as the guard is dropped"]
pub struct TrackingGuard {
    previous: bool,
    // The flag is thread-local, restoring it from another thread would be wrong.
    _not_send: PhantomData<*const ()>,
}

impl TrackingGuard {
    /// Enters tracking logic if this thread is not already inside it.
    ///
    /// Returns `None` for re-entrant calls, and also when thread-local storage
    /// is no longer reachable (thread teardown), in which case the caller
    /// skips tracking.
    #[inline]
    pub(crate) fn try_enter() -> Option<Self> {
        IN_TRACKER
            .try_with(|flag| {
                if flag.replace(true) {
                    None
                } else {
                    Some(Self {
                        previous: false,
                        _not_send: PhantomData,
                    })
                }
            })
            .ok()
            .flatten()
    }

    #[inline]
    fn suppress() -> Self {
        let previous = IN_TRACKER.try_with(|flag| flag.replace(true)).unwrap_or(true);
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for TrackingGuard {
    #[inline]
    fn drop(&mut self) {
        let _ = IN_TRACKER.try_with(|flag| flag.set(self.previous));
    }
}

/// Stops recording allocations made by the current thread until the returned
/// guard is dropped.
///
/// Releases are skipped too: a tracked block freed under the guard keeps its
/// record, and counts towards the metrics, until another block is recorded at
/// the same address.
///
/// ```rust
/// let _untracked = fragtrack::suppress_tracking();
/// let scratch = vec![0u8; 1024]; // served, but never recorded
/// # drop(scratch);
/// ```
#[inline]
pub fn suppress_tracking() -> TrackingGuard {
    TrackingGuard::suppress()
}

/// Whether allocations made by the current thread are currently skipped.
#[inline]
pub fn is_tracking_suppressed() -> bool {
    IN_TRACKER.try_with(Cell::get).unwrap_or(true)
}
