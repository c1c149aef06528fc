//! # Zero-Count Signal
//!
//! Broadcast event tied to the lease count reaching zero.
//!
//! The signal itself carries no count; it is a generation number that moves
//! on every broadcast. A waiter samples the generation, checks its predicate
//! under the owner's lock, and only parks if the generation is still the
//! sampled one. A broadcast landing between the check and the park bumps the
//! generation, so it can't be lost, and spurious wakeups just go round the
//! loop again.
//!
//! With `std` the waiter parks on a condition variable and wakes every stall
//! period to report. Without it, the waiter spins the way magma fences do.

use core::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// PARKING
// =============================================================================

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        use std::sync::{Condvar, Mutex, PoisonError};
        use std::time::Duration;

        #[derive(Debug)]
        struct Parker {
            lock: Mutex<()>,
            cond: Condvar,
            period: Duration,
        }

        impl Parker {
            fn new(stall: StallReport) -> Self {
                Self {
                    lock: Mutex::new(()),
                    cond: Condvar::new(),
                    period: Duration::from_millis(stall.interval_ms.max(1)),
                }
            }

            fn bump_and_wake(&self, generation: &AtomicU64) {
                let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
                generation.fetch_add(1, Ordering::SeqCst);
                self.cond.notify_all();
            }

            /// Park until `generation` leaves `seen`. `false` on a stall period.
            fn park(&self, generation: &AtomicU64, seen: u64) -> bool {
                let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
                let (_guard, timeout) = self
                    .cond
                    .wait_timeout_while(guard, self.period, |_| {
                        generation.load(Ordering::SeqCst) == seen
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                !timeout.timed_out()
            }
        }
    } else {
        #[derive(Debug)]
        struct Parker {
            spins: u64,
        }

        impl Parker {
            fn new(stall: StallReport) -> Self {
                Self { spins: stall.spins.max(1) }
            }

            fn bump_and_wake(&self, generation: &AtomicU64) {
                generation.fetch_add(1, Ordering::SeqCst);
            }

            fn park(&self, generation: &AtomicU64, seen: u64) -> bool {
                for _ in 0..self.spins {
                    if generation.load(Ordering::SeqCst) != seen {
                        return true;
                    }
                    core::hint::spin_loop();
                }
                false
            }
        }
    }
}

// =============================================================================
// STALL REPORTING
// =============================================================================

/// How often a blocked waiter reports that it is still blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallReport {
    /// Report period when parked on a condition variable
    pub interval_ms: u64,
    /// Report period, in spin iterations, when spinning
    pub spins: u64,
}

impl Default for StallReport {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            spins: 1 << 24,
        }
    }
}

// =============================================================================
// SIGNAL
// =============================================================================

/// Broadcast raised each time the lease count drops to zero
#[derive(Debug)]
pub struct ZeroCountSignal {
    generation: AtomicU64,
    parker: Parker,
}

impl ZeroCountSignal {
    /// Create a signal that has never fired
    pub fn new(stall: StallReport) -> Self {
        Self {
            generation: AtomicU64::new(0),
            parker: Parker::new(stall),
        }
    }

    /// Number of broadcasts so far
    pub fn broadcasts(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Wake every waiter
    pub(crate) fn broadcast(&self) {
        self.parker.bump_and_wake(&self.generation);
    }

    /// Block until `done` returns true.
    ///
    /// `done` runs with no lock of this signal held, so it may take the
    /// owner's locks. `stalled` is called with the running number of stall
    /// periods each time one elapses without a broadcast.
    pub fn wait_until(&self, mut done: impl FnMut() -> bool, mut stalled: impl FnMut(u32)) {
        let mut stalls = 0u32;
        loop {
            let seen = self.generation.load(Ordering::SeqCst);
            if done() {
                return;
            }
            while !self.parker.park(&self.generation, seen) {
                stalls = stalls.saturating_add(1);
                stalled(stalls);
            }
        }
    }
}
