//! # Power Transition Trigger
//!
//! Edge detection on the lease count. Only the 0→1 and 1→0 crossings
//! produce a [`Transition`]; every other step is silent.

use core::sync::atomic::{AtomicU64, Ordering};

/// A boundary crossing of the lease count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// 0 → 1: the GPU must be made active
    BecameActive,
    /// 1 → 0: the GPU may go idle
    BecameIdle,
}

/// Stateless edge detector
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeTrigger;

impl EdgeTrigger {
    /// Edge produced by incrementing from `old`
    #[inline]
    pub const fn on_increment(old: u32) -> Option<Transition> {
        if old == 0 {
            Some(Transition::BecameActive)
        } else {
            None
        }
    }

    /// Edge produced by decrementing from `old` (`old` must be nonzero)
    #[inline]
    pub const fn on_decrement(old: u32) -> Option<Transition> {
        if old == 1 {
            Some(Transition::BecameIdle)
        } else {
            None
        }
    }
}

/// Count of edges fired since bring-up
#[derive(Debug, Default)]
pub struct TransitionStats {
    activations: AtomicU64,
    idles: AtomicU64,
}

impl TransitionStats {
    /// Create zeroed statistics
    pub const fn new() -> Self {
        Self {
            activations: AtomicU64::new(0),
            idles: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, transition: Transition) {
        match transition {
            Transition::BecameActive => self.activations.fetch_add(1, Ordering::Relaxed),
            Transition::BecameIdle => self.idles.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Number of 0→1 crossings
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Number of 1→0 crossings
    pub fn idles(&self) -> u64 {
        self.idles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_boundaries_fire() {
        assert_eq!(EdgeTrigger::on_increment(0), Some(Transition::BecameActive));
        assert_eq!(EdgeTrigger::on_increment(1), None);
        assert_eq!(EdgeTrigger::on_increment(7), None);

        assert_eq!(EdgeTrigger::on_decrement(1), Some(Transition::BecameIdle));
        assert_eq!(EdgeTrigger::on_decrement(2), None);
        assert_eq!(EdgeTrigger::on_decrement(3), None);
    }

    #[test]
    fn test_stats_follow_walk() {
        // 0 -> 3 -> 0 -> 1 -> 0
        let stats = TransitionStats::new();
        let mut count = 0u32;
        let steps: [i8; 8] = [1, 1, 1, -1, -1, -1, 1, -1];
        for step in steps {
            let edge = if step > 0 {
                let e = EdgeTrigger::on_increment(count);
                count += 1;
                e
            } else {
                let e = EdgeTrigger::on_decrement(count);
                count -= 1;
                e
            };
            if let Some(t) = edge {
                stats.record(t);
            }
        }
        assert_eq!(count, 0);
        assert_eq!(stats.activations(), 2);
        assert_eq!(stats.idles(), 2);
    }
}
