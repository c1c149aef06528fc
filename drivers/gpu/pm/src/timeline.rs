//! # PM Timeline
//!
//! A bounded trace of power-management events with the lease count seen at
//! each one. The ring keeps the most recent [`TIMELINE_DEPTH`] records and
//! silently overwrites older ones.
//!
//! The timeline lock is a leaf: it is taken while any of the hierarchy's
//! locks may be held, and nothing is acquired under it.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use heapless::HistoryBuffer;
use spin::Mutex;

/// Records kept by the timeline
pub const TIMELINE_DEPTH: usize = 256;

/// Kind of timeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// A lease was taken
    ContextActive,
    /// A lease was released
    ContextIdle,
    /// A lease request was refused by the suspend policy
    LeaseRejected,
    /// A no-reactivate request found the GPU powered off
    HoldRejected,
    /// The count crossed 0 → 1
    GpuActive,
    /// The count crossed 1 → 0
    GpuIdle,
    /// The suspend flag was raised
    SuspendStart,
    /// The count was observed at zero during suspend
    DrainComplete,
    /// Hardware suspend finished
    Suspended,
    /// Resume started
    ResumeStart,
    /// Resume finished
    Resumed,
}

/// One timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    /// Monotonic sequence number
    pub seq: u64,
    /// What happened
    pub event: TraceEvent,
    /// Lease count at the time
    pub refcount: u32,
}

/// Event trace for one device
pub struct PmTimeline {
    enabled: bool,
    seq: AtomicU64,
    ring: Mutex<HistoryBuffer<TraceRecord, TIMELINE_DEPTH>>,
}

impl PmTimeline {
    /// Create an empty timeline; a disabled one records nothing
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seq: AtomicU64::new(0),
            ring: Mutex::new(HistoryBuffer::new()),
        }
    }

    /// Whether events are being recorded
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn record(&self, event: TraceEvent, refcount: u32) {
        if !self.enabled {
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.ring.lock().write(TraceRecord { seq, event, refcount });
    }

    /// Total events recorded, including overwritten ones
    pub fn recorded(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Retained records, oldest first
    pub fn snapshot(&self) -> Vec<TraceRecord> {
        let ring = self.ring.lock();
        let mut records: Vec<TraceRecord> = ring.oldest_ordered().copied().collect();
        // Writers race between taking a sequence number and the ring lock.
        records.sort_unstable_by_key(|r| r.seq);
        records
    }

    /// Retained records of one kind, oldest first
    pub fn events(&self, event: TraceEvent) -> Vec<TraceRecord> {
        let mut records = self.snapshot();
        records.retain(|r| r.event == event);
        records
    }

    /// Drop every retained record
    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}

impl core::fmt::Debug for PmTimeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PmTimeline")
            .field("enabled", &self.enabled)
            .field("recorded", &self.recorded())
            .finish()
    }
}
