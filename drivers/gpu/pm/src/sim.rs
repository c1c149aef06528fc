//! # Simulated Collaborators
//!
//! Software stand-ins for the hardware layer, the job scheduler and the
//! counter backend, for hosted testing and bring-up without a GPU. Every
//! call they receive is appended to a shared [`Journal`], so tests can
//! assert on the order in which the power core drove them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::vec::Vec;

use crate::backend::{GpuPower, LeaseControl, LeaseOutcome, PowerBackend, PowerUpFlags, SchedulerControl};
use crate::error::{HwError, Rejected};
use crate::instr::{VendorHwcnt, VinstrContext};
use crate::policy::SuspendPolicy;

// =============================================================================
// JOURNAL
// =============================================================================

/// A call received by a simulated collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JournalEntry {
    /// `PowerBackend::power_up`
    PowerUp,
    /// `PowerBackend::power_down`
    PowerDown,
    /// `PowerBackend::notify_active`
    NotifyActive,
    /// `PowerBackend::keep_active`
    KeepActive,
    /// `PowerBackend::notify_idle`
    NotifyIdle,
    /// `PowerBackend::hardware_suspend`
    HardwareSuspend,
    /// `PowerBackend::hardware_resume`
    HardwareResume,
    /// `SchedulerControl::suspend_scheduler`
    SchedulerSuspend,
    /// `SchedulerControl::resume_scheduler`
    SchedulerResume,
    /// `SchedulerControl::resume_soft_jobs`
    SoftJobsResume,
    /// Counter collection stopped
    CountersSuspend,
    /// Counter collection restarted
    CountersResume,
}

/// Ordered record of collaborator calls, shared between collaborators
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: JournalEntry) {
        self.lock().push(entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JournalEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.lock().clone()
    }

    /// How many times `entry` was recorded
    pub fn count(&self, entry: JournalEntry) -> usize {
        self.lock().iter().filter(|e| **e == entry).count()
    }

    /// Index of the first `entry`
    pub fn position(&self, entry: JournalEntry) -> Option<usize> {
        self.lock().iter().position(|e| *e == entry)
    }

    /// Index of the last `entry`
    pub fn last_position(&self, entry: JournalEntry) -> Option<usize> {
        self.lock().iter().rposition(|e| *e == entry)
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.lock().clear();
    }
}

// =============================================================================
// GPU
// =============================================================================

/// What the simulated power policy does when the GPU goes idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimPolicy {
    /// Power down on idle, up on active
    Demand,
    /// Stay powered once up
    AlwaysOn,
}

/// Simulated hardware power layer
#[derive(Debug)]
pub struct SimGpu {
    journal: Journal,
    policy: SimPolicy,
    powered: AtomicBool,
    powerup_flags: Mutex<Option<PowerUpFlags>>,
    fail_power_up: Mutex<Option<HwError>>,
    fail_suspend: Mutex<Option<HwError>>,
    fail_resume: Mutex<Option<HwError>>,
}

impl SimGpu {
    /// Create a powered-off GPU
    pub fn new(journal: Journal, policy: SimPolicy) -> Self {
        Self {
            journal,
            policy,
            powered: AtomicBool::new(false),
            powerup_flags: Mutex::new(None),
            fail_power_up: Mutex::new(None),
            fail_suspend: Mutex::new(None),
            fail_resume: Mutex::new(None),
        }
    }

    /// Whether the simulated rails are on
    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    /// Flags passed to the last `power_up`
    pub fn powerup_flags(&self) -> Option<PowerUpFlags> {
        *self.powerup_flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `power_up` fail with `error`
    pub fn fail_next_power_up(&self, error: HwError) {
        arm(&self.fail_power_up, error);
    }

    /// Make the next `hardware_suspend` fail with `error`
    pub fn fail_next_suspend(&self, error: HwError) {
        arm(&self.fail_suspend, error);
    }

    /// Make the next `hardware_resume` fail with `error`
    pub fn fail_next_resume(&self, error: HwError) {
        arm(&self.fail_resume, error);
    }

    fn set_power(&self, power: GpuPower) -> GpuPower {
        self.powered.store(power.is_on(), Ordering::SeqCst);
        power
    }
}

fn arm(slot: &Mutex<Option<HwError>>, error: HwError) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
}

fn take(slot: &Mutex<Option<HwError>>) -> Option<HwError> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl PowerBackend for SimGpu {
    fn power_up(&self, flags: PowerUpFlags) -> Result<GpuPower, HwError> {
        self.journal.push(JournalEntry::PowerUp);
        if let Some(error) = take(&self.fail_power_up) {
            return Err(error);
        }
        *self.powerup_flags.lock().unwrap_or_else(PoisonError::into_inner) = Some(flags);
        Ok(self.set_power(GpuPower::On))
    }

    fn power_down(&self) {
        self.journal.push(JournalEntry::PowerDown);
        self.set_power(GpuPower::Off);
    }

    fn notify_active(&self) -> GpuPower {
        self.journal.push(JournalEntry::NotifyActive);
        self.set_power(GpuPower::On)
    }

    fn keep_active(&self) {
        self.journal.push(JournalEntry::KeepActive);
    }

    fn notify_idle(&self) -> GpuPower {
        self.journal.push(JournalEntry::NotifyIdle);
        match self.policy {
            SimPolicy::Demand => self.set_power(GpuPower::Off),
            SimPolicy::AlwaysOn => GpuPower::from(self.is_powered()),
        }
    }

    fn hardware_suspend(&self) -> Result<(), HwError> {
        self.journal.push(JournalEntry::HardwareSuspend);
        if let Some(error) = take(&self.fail_suspend) {
            return Err(error);
        }
        self.set_power(GpuPower::Off);
        Ok(())
    }

    fn hardware_resume(&self) -> Result<GpuPower, HwError> {
        self.journal.push(JournalEntry::HardwareResume);
        if let Some(error) = take(&self.fail_resume) {
            return Err(error);
        }
        Ok(self.set_power(GpuPower::On))
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Simulated job scheduler.
///
/// Each submitted job holds one `DontIncrease` lease until it completes.
/// Suspend releases the leases of every in-flight job and resume re-takes
/// them, as a scheduler that evicts and replays work would.
#[derive(Debug)]
pub struct SimScheduler {
    journal: Journal,
    running: AtomicU32,
    evicted: AtomicU32,
    suspended: AtomicBool,
}

impl SimScheduler {
    /// Create an idle, running scheduler
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            running: AtomicU32::new(0),
            evicted: AtomicU32::new(0),
            suspended: AtomicBool::new(false),
        }
    }

    /// Submit one job.
    ///
    /// Refused while the scheduler itself is suspended, or when the lease is.
    pub fn submit(&self, leases: &dyn LeaseControl) -> Result<LeaseOutcome, Rejected> {
        if self.suspended.load(Ordering::SeqCst) {
            return Err(Rejected::Suspending);
        }
        let outcome = leases.acquire_lease(SuspendPolicy::DontIncrease)?;
        self.running.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    /// Complete one job; `false` if nothing was running
    pub fn complete(&self, leases: &dyn LeaseControl) -> bool {
        let done = self
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if done {
            leases.release_lease();
        }
        done
    }

    /// Jobs currently holding a lease
    pub fn running(&self) -> u32 {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the scheduler is suspended
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

impl SchedulerControl for SimScheduler {
    fn suspend_scheduler(&self, leases: &dyn LeaseControl) {
        self.journal.push(JournalEntry::SchedulerSuspend);
        self.suspended.store(true, Ordering::SeqCst);
        let evicted = self.running.swap(0, Ordering::SeqCst);
        for _ in 0..evicted {
            leases.release_lease();
        }
        self.evicted.fetch_add(evicted, Ordering::SeqCst);
    }

    fn resume_scheduler(&self, leases: &dyn LeaseControl) {
        self.journal.push(JournalEntry::SchedulerResume);
        self.suspended.store(false, Ordering::SeqCst);
        let evicted = self.evicted.swap(0, Ordering::SeqCst);
        for _ in 0..evicted {
            match leases.acquire_lease(SuspendPolicy::DontIncrease) {
                Ok(_) => {
                    self.running.fetch_add(1, Ordering::SeqCst);
                }
                Err(reason) => log::warn!("GPU PM: sim job not replayed: {}", reason),
            }
        }
    }

    fn resume_soft_jobs(&self, _leases: &dyn LeaseControl) {
        self.journal.push(JournalEntry::SoftJobsResume);
    }
}

// =============================================================================
// COUNTERS
// =============================================================================

/// Simulated counter collector, usable as either backend
#[derive(Debug)]
pub struct SimCounters {
    journal: Journal,
    collecting: AtomicBool,
}

impl SimCounters {
    /// Create a collecting counter block
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            collecting: AtomicBool::new(true),
        }
    }

    /// Whether counters are being collected
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.journal.push(JournalEntry::CountersSuspend);
        self.collecting.store(false, Ordering::SeqCst);
    }

    fn start(&self) {
        self.journal.push(JournalEntry::CountersResume);
        self.collecting.store(true, Ordering::SeqCst);
    }
}

impl VinstrContext for SimCounters {
    fn suspend(&self) {
        self.stop();
    }

    fn resume(&self) {
        self.start();
    }
}

impl VendorHwcnt for SimCounters {
    fn disable(&self) {
        self.stop();
    }

    fn enable(&self) {
        self.start();
    }
}

impl VinstrContext for Arc<SimCounters> {
    fn suspend(&self) {
        self.stop();
    }

    fn resume(&self) {
        self.start();
    }
}

impl VendorHwcnt for Arc<SimCounters> {
    fn disable(&self) {
        self.stop();
    }

    fn enable(&self) {
        self.start();
    }
}
