//! # Fetch Guard
//!
//! A single in-flight marker per content store. `try_acquire` checks and sets the
//! marker in one atomic step; when it is already set the caller gets `None` and is
//! expected to rely on the running fetch instead of queuing another one.
//!
//! The marker is released by dropping the returned `FetchPermit`, which happens on
//! every exit path of the fetch: success, error, early return, panic unwinding, or
//! the fetch future being dropped mid-flight.
//!
//! The guard prevents overlap only. Two fetches that do not overlap may still
//! complete out of order relative to the backend writes they observe.

use std::sync::atomic::{AtomicBool, Ordering};

/// The in-flight marker.
#[derive(Debug, Default)]
pub struct FetchGuard {
    in_flight: AtomicBool,
}

impl FetchGuard {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Claims the marker. Returns `None` while another permit is alive.
    pub fn try_acquire(&self) -> Option<FetchPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FetchPermit { guard: self })
    }

    /// Whether a fetch currently holds the marker.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns the in-flight marker. Releases it on drop.
#[derive(Debug)]
pub struct FetchPermit<'a> {
    guard: &'a FetchGuard,
}

impl Drop for FetchPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}
