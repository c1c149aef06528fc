//! # Suspend/Resume Orchestration
//!
//! ```text
//!   Running ──suspend()──▶ Suspending ──drained + hw suspend──▶ Suspended
//!      ▲                                                            │
//!      └──────── release internal lease ◀── Resuming ◀──resume()────┘
//! ```
//!
//! Suspend raises the flag first, so from then on the lease count can only
//! fall (`DontReactivate` may still join a nonzero count). The scheduler
//! drops its leases, instrumentation goes quiet, and the drain waits on the
//! zero-count signal. Once zero is observed nothing can bring the count
//! back up, and the hardware is suspended.
//!
//! Resume restores hardware first. Nothing may take a lease before that.
//! It then holds an internal lease across the restart of instrumentation
//! and scheduler, so dependents can submit work before the matching idle
//! call lets the GPU power down again.

use crate::backend::{GpuPower, PowerBackend, SchedulerControl};
use crate::device::PmDevice;
use crate::error::{contract_violation, Contract, HwOp, PmError, PmResult};
use crate::instr::CounterQuiesce;
use crate::lock::LockCtx;
use crate::policy::SuspendPolicy;
use crate::timeline::TraceEvent;

/// Position in the suspend/resume state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SuspendPhase {
    /// Normal operation
    #[default]
    Running,
    /// Suspend flag raised, draining leases
    Suspending,
    /// Hardware suspended
    Suspended,
    /// Resume sequence in progress
    Resuming,
}

impl SuspendPhase {
    /// Whether the device is anywhere between `suspend()` and the end of
    /// `resume()`
    pub const fn in_suspend_window(self) -> bool {
        !matches!(self, SuspendPhase::Running)
    }
}

impl<H, S, Q> PmDevice<H, S, Q>
where
    H: PowerBackend,
    S: SchedulerControl,
    Q: CounterQuiesce,
{
    /// Suspend the GPU.
    ///
    /// Blocks until every lease has been released; there is no timeout, but
    /// a drain that makes no progress is reported every stall period.
    ///
    /// A hardware failure leaves the device in [`SuspendPhase::Suspending`]
    /// with the scheduler and counters stopped. Neither `suspend` nor
    /// `resume` will run again; the owner must tear the device down.
    pub fn suspend(&self) -> PmResult<()> {
        let pm = self.context();
        {
            let mut ctx = LockCtx::unlocked();
            let (mut state, _) = ctx.lock(&pm.pm);
            if state.suspending {
                contract_violation(pm.strict, Contract::DoubleSuspend);
                return Err(Contract::DoubleSuspend.into());
            }
            state.suspending = true;
            state.phase = SuspendPhase::Suspending;
            pm.timeline.record(TraceEvent::SuspendStart, state.active_count);
            log::info!("GPU PM: suspend started, {} leases outstanding", state.active_count);
        }

        log::debug!("GPU PM: suspending scheduler");
        self.scheduler().suspend_scheduler(self);

        log::debug!("GPU PM: suspending counters");
        self.counters().suspend_counters();

        self.drain();

        if let Err(error) = self.hardware().hardware_suspend() {
            log::error!("GPU PM: hardware suspend failed: {}", error);
            return Err(PmError::Hardware { op: HwOp::Suspend, error });
        }
        pm.set_gpu_powered(GpuPower::Off);

        let mut ctx = LockCtx::unlocked();
        let (mut state, _) = ctx.lock(&pm.pm);
        state.phase = SuspendPhase::Suspended;
        pm.timeline.record(TraceEvent::Suspended, state.active_count);
        log::info!("GPU PM: suspended");
        Ok(())
    }

    /// Resume the GPU after [`suspend`](Self::suspend).
    ///
    /// The suspend flag clears as soon as the hardware is back, while the
    /// phase is still [`SuspendPhase::Resuming`]: from there on leases of
    /// every policy are granted, so the scheduler can re-take its own.
    /// A failed hardware resume is a device fault, as for `suspend`.
    pub fn resume(&self) -> PmResult<()> {
        let pm = self.context();
        {
            let mut ctx = LockCtx::unlocked();
            let (mut state, _) = ctx.lock(&pm.pm);
            if state.phase != SuspendPhase::Suspended {
                contract_violation(pm.strict, Contract::ResumeWithoutSuspend);
                return Err(Contract::ResumeWithoutSuspend.into());
            }
            state.phase = SuspendPhase::Resuming;
            pm.timeline.record(TraceEvent::ResumeStart, state.active_count);
        }
        log::info!("GPU PM: resume started");

        let power = self.hardware().hardware_resume().map_err(|error| {
            log::error!("GPU PM: hardware resume failed: {}", error);
            PmError::Hardware { op: HwOp::Resume, error }
        })?;
        pm.set_gpu_powered(power);

        {
            let mut ctx = LockCtx::unlocked();
            let (mut state, _) = ctx.lock(&pm.pm);
            state.suspending = false;
        }

        let internal = pm.acquire_lease(self.hardware(), SuspendPolicy::NotPossible);

        log::debug!("GPU PM: resuming counters");
        self.counters().resume_counters();

        log::debug!("GPU PM: resuming soft jobs and scheduler");
        self.scheduler().resume_soft_jobs(self);
        self.scheduler().resume_scheduler(self);

        if internal.is_ok() {
            pm.release_lease(self.hardware());
        }

        let mut ctx = LockCtx::unlocked();
        let (mut state, _) = ctx.lock(&pm.pm);
        state.phase = SuspendPhase::Running;
        pm.timeline.record(TraceEvent::Resumed, state.active_count);
        log::info!("GPU PM: resumed, {} leases outstanding", state.active_count);
        Ok(())
    }

    /// Caller-facing alias for [`suspend`](Self::suspend)
    #[inline]
    pub fn request_suspend(&self) -> PmResult<()> {
        self.suspend()
    }

    /// Caller-facing alias for [`resume`](Self::resume)
    #[inline]
    pub fn request_resume(&self) -> PmResult<()> {
        self.resume()
    }

    /// Wait for the lease count to reach zero with the suspend flag raised.
    fn drain(&self) {
        let pm = self.context();
        pm.zero.wait_until(
            || pm.active_count() == 0,
            |stalls| {
                log::warn!(
                    "GPU PM: suspend still waiting for {} leases ({} stall periods)",
                    pm.active_count(),
                    stalls
                );
            },
        );
        pm.timeline.record(TraceEvent::DrainComplete, 0);
        log::debug!("GPU PM: active count drained");
    }
}
