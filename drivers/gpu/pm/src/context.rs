//! # Power Context
//!
//! All shared mutable state of the power core, one instance per device.
//!
//! ```text
//!   runpool : OrderedLock<Runpool,  ()>
//!   pm      : OrderedLock<Pm,       PmState { active_count, suspending, phase }>
//!   hwaccess: OrderedLock<HwAccess, ()>
//!   powered : OrderedLock<Powered,  PoweredState { gpu_powered }>
//!   zero    : ZeroCountSignal        broadcast on every count → 0
//! ```
//!
//! Decisions are made on `active_count` with the pm lock held. The lock-free
//! readers below are for diagnostics and tests only.

use crate::backend::GpuPower;
use crate::config::PmConfig;
use crate::lock::{HwAccess, LockCtx, OrderedLock, Pm, Powered, Runpool};
use crate::orchestrator::SuspendPhase;
use crate::timeline::PmTimeline;
use crate::trigger::TransitionStats;
use crate::wait::ZeroCountSignal;

/// State guarded by the pm lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmState {
    /// Outstanding leases
    pub active_count: u32,
    /// A suspend is in progress or its drain is pending
    pub suspending: bool,
    /// Suspend/resume state machine position
    pub phase: SuspendPhase,
}

impl PmState {
    const fn new() -> Self {
        Self {
            active_count: 0,
            suspending: false,
            phase: SuspendPhase::Running,
        }
    }
}

/// State guarded by the power-state spinlock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoweredState {
    /// Hardware power is currently on
    pub gpu_powered: bool,
}

/// Consistent view of the power state, taken under the locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSnapshot {
    /// Outstanding leases
    pub active_count: u32,
    /// Suspend flag
    pub suspending: bool,
    /// Hardware power
    pub gpu_powered: bool,
    /// Suspend/resume state
    pub phase: SuspendPhase,
}

/// Per-device power-management state
#[derive(Debug)]
pub struct PowerContext {
    pub(crate) runpool: OrderedLock<Runpool, ()>,
    pub(crate) pm: OrderedLock<Pm, PmState>,
    pub(crate) hwaccess: OrderedLock<HwAccess, ()>,
    pub(crate) powered: OrderedLock<Powered, PoweredState>,
    pub(crate) zero: ZeroCountSignal,
    pub(crate) stats: TransitionStats,
    pub(crate) timeline: PmTimeline,
    pub(crate) strict: bool,
}

impl PowerContext {
    /// Fresh context: no leases, not suspending, GPU off
    pub fn new(config: &PmConfig) -> Self {
        Self {
            runpool: OrderedLock::new(()),
            pm: OrderedLock::new(PmState::new()),
            hwaccess: OrderedLock::new(()),
            powered: OrderedLock::new(PoweredState { gpu_powered: false }),
            zero: ZeroCountSignal::new(config.stall_report),
            stats: TransitionStats::new(),
            timeline: PmTimeline::new(config.trace_events),
            strict: config.strict_contracts,
        }
    }

    /// Current lease count
    pub fn active_count(&self) -> u32 {
        let mut ctx = LockCtx::unlocked();
        let (pm, _) = ctx.lock(&self.pm);
        pm.active_count
    }

    /// Whether a suspend is in progress
    pub fn is_suspending(&self) -> bool {
        let mut ctx = LockCtx::unlocked();
        let (pm, _) = ctx.lock(&self.pm);
        pm.suspending
    }

    /// Whether hardware power is on
    pub fn gpu_powered(&self) -> bool {
        let mut ctx = LockCtx::unlocked();
        let (powered, _) = ctx.lock(&self.powered);
        powered.gpu_powered
    }

    /// Suspend/resume state machine position
    pub fn phase(&self) -> SuspendPhase {
        let mut ctx = LockCtx::unlocked();
        let (pm, _) = ctx.lock(&self.pm);
        pm.phase
    }

    /// Lease count, suspend flag, phase and power state, read together
    pub fn snapshot(&self) -> PowerSnapshot {
        let mut ctx = LockCtx::unlocked();
        let (pm, mut ctx) = ctx.lock(&self.pm);
        let (powered, _) = ctx.lock(&self.powered);
        PowerSnapshot {
            active_count: pm.active_count,
            suspending: pm.suspending,
            gpu_powered: powered.gpu_powered,
            phase: pm.phase,
        }
    }

    /// Boundary crossings fired so far
    pub fn transitions(&self) -> &TransitionStats {
        &self.stats
    }

    /// Drain-to-zero signal
    pub fn zero_signal(&self) -> &ZeroCountSignal {
        &self.zero
    }

    /// Event timeline
    pub fn timeline(&self) -> &PmTimeline {
        &self.timeline
    }

    /// Record the hardware power state.
    ///
    /// For the hardware layer's own power changes, e.g. error recovery
    /// forcing the GPU off while leases are still held.
    pub fn set_gpu_powered(&self, power: GpuPower) {
        let mut ctx = LockCtx::unlocked();
        let (_hw, mut ctx) = ctx.lock(&self.hwaccess);
        let (mut powered, _) = ctx.lock(&self.powered);
        if powered.gpu_powered != power.is_on() {
            log::debug!("GPU PM: gpu_powered -> {:?}", power);
        }
        powered.gpu_powered = power.is_on();
    }

    /// Record the power state reported by a hardware call made under `Pm`
    pub(crate) fn record_power(&self, ctx: &mut LockCtx<'_, Pm>, power: GpuPower) {
        let (_hw, mut ctx) = ctx.lock(&self.hwaccess);
        let (mut powered, _) = ctx.lock(&self.powered);
        powered.gpu_powered = power.is_on();
    }
}

static_assertions::assert_impl_all!(PowerContext: Send, Sync);
