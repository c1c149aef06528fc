//! # Collaborator Contracts
//!
//! The power core drives three collaborators it does not own:
//!
//! ```text
//!                      ┌──────────────────┐
//!   leases ──────────▶ │     PmDevice     │
//!                      └──┬──────┬─────┬──┘
//!             notify/     │      │     │ suspend/resume
//!             suspend     ▼      │     ▼
//!              ┌──────────────┐  │  ┌─────────────────┐
//!              │ PowerBackend │  │  │ SchedulerControl│──▶ releases its
//!              └──────────────┘  │  └─────────────────┘    own leases
//!                                ▼
//!                      ┌──────────────────┐
//!                      │  CounterQuiesce  │  (see `instr`)
//!                      └──────────────────┘
//! ```
//!
//! Every call is synchronous and returns only once the effect is complete.

use crate::error::{HwError, Rejected};
use crate::policy::SuspendPolicy;

// =============================================================================
// POWER-UP FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Options for the initial power-up
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PowerUpFlags: u32 {
        /// Enable GPU interrupts once powered
        const ENABLE_IRQS = 1 << 0;
        /// Probe the hardware for known issues needing workarounds
        const HW_ISSUES_DETECT = 1 << 1;
    }
}

/// Physical power state reported by the hardware layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuPower {
    /// Clocks and power rails are on
    On,
    /// The GPU is powered down
    Off,
}

impl GpuPower {
    /// Whether the GPU is powered
    pub const fn is_on(self) -> bool {
        matches!(self, GpuPower::On)
    }
}

impl From<bool> for GpuPower {
    fn from(on: bool) -> Self {
        if on {
            GpuPower::On
        } else {
            GpuPower::Off
        }
    }
}

// =============================================================================
// HARDWARE LAYER
// =============================================================================

/// Hardware power sequencing below the power core.
///
/// `notify_active`, `keep_active` and `notify_idle` are called with the
/// run-pool and pm locks held and must not call back into the device's
/// lease API. The same goes for the readers on [`PowerContext`]
/// (`snapshot`, `active_count`, `is_suspending`, `phase`): they take the pm
/// lock themselves and would spin forever. Nothing catches this at compile
/// time. The callbacks report the power state they leave the GPU in; the
/// policy behind them may keep the GPU on after going idle.
///
/// [`PowerContext`]: crate::PowerContext
pub trait PowerBackend: Send + Sync {
    /// Power the GPU up at bring-up
    fn power_up(&self, flags: PowerUpFlags) -> Result<GpuPower, HwError>;

    /// Power the GPU down for teardown
    fn power_down(&self);

    /// First lease taken: make the GPU and the policy's cores available
    fn notify_active(&self) -> GpuPower;

    /// First lease taken while the GPU was already powered.
    ///
    /// Called with the hardware-access and power-state locks held.
    fn keep_active(&self) {
        let _ = self.notify_active();
    }

    /// Last lease released: the GPU may be powered down
    fn notify_idle(&self) -> GpuPower;

    /// Power down for system suspend
    fn hardware_suspend(&self) -> Result<(), HwError>;

    /// Restore power after system suspend
    fn hardware_resume(&self) -> Result<GpuPower, HwError>;
}

// =============================================================================
// LEASES
// =============================================================================

/// Whether an acquired lease powered the GPU up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseOutcome {
    /// This lease made the count cross 0 → 1
    Activated,
    /// The GPU was already active; the count just grew
    Joined,
}

impl LeaseOutcome {
    /// Whether this lease performed the activation
    pub const fn activated(self) -> bool {
        matches!(self, LeaseOutcome::Activated)
    }
}

/// Lease API handed to collaborators that hold leases of their own
pub trait LeaseControl {
    /// Take one lease
    fn acquire_lease(&self, policy: SuspendPolicy) -> Result<LeaseOutcome, Rejected>;

    /// Drop one lease
    fn release_lease(&self);
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Job scheduler, as seen by suspend/resume
pub trait SchedulerControl: Send + Sync {
    /// Stop scheduling.
    ///
    /// On return the scheduler holds no lease and takes none until
    /// [`resume_scheduler`](Self::resume_scheduler).
    fn suspend_scheduler(&self, leases: &dyn LeaseControl);

    /// Restart scheduling; may take leases immediately
    fn resume_scheduler(&self, leases: &dyn LeaseControl);

    /// Restart work that was paused mid-flight by the suspend
    fn resume_soft_jobs(&self, _leases: &dyn LeaseControl) {}
}
