//! # Reference-Active Counter
//!
//! Lease acquisition and release on a [`PowerContext`].
//!
//! Every path takes the run-pool lock then the pm lock, decides on the exact
//! count, mutates it, and fires the hardware notification for a boundary
//! crossing before either lock is dropped. Two callers therefore can't both
//! see themselves as the 0→1 (or 1→0) crossing, and a caller whose acquire
//! returns `Activated` knows the GPU has been told to power up.

use crate::backend::{LeaseOutcome, PowerBackend};
use crate::context::{PmState, PowerContext};
use crate::error::{contract_violation, Contract, Rejected};
use crate::lock::LockCtx;
use crate::policy::{admit, Admission, SuspendPolicy};
use crate::timeline::TraceEvent;
use crate::trigger::EdgeTrigger;

impl PowerContext {
    /// Apply `policy` to the current state. `Err` leaves everything untouched.
    fn admit_lease(&self, policy: SuspendPolicy, pm: &PmState) -> Result<(), Rejected> {
        match admit(policy, pm.suspending, pm.active_count) {
            Admission::Grant => Ok(()),
            Admission::Reject(reason) => {
                log::debug!(
                    "GPU PM: {:?} lease rejected: {} (count {})",
                    policy,
                    reason,
                    pm.active_count
                );
                self.timeline.record(TraceEvent::LeaseRejected, pm.active_count);
                Err(reason)
            }
            Admission::Violation => {
                // Contained: the lease is granted as if no suspend were running.
                contract_violation(self.strict, Contract::AcquireDuringSuspend);
                Ok(())
            }
        }
    }

    /// Take one lease, powering the GPU up on the 0→1 crossing.
    ///
    /// Returns once the hardware layer has been notified, so an `Activated`
    /// caller may submit work straight away.
    pub fn acquire_lease<H>(&self, hw: &H, policy: SuspendPolicy) -> Result<LeaseOutcome, Rejected>
    where
        H: PowerBackend + ?Sized,
    {
        let mut ctx = LockCtx::unlocked();
        let (_runpool, mut ctx) = ctx.lock(&self.runpool);
        let (mut pm, mut ctx) = ctx.lock(&self.pm);

        self.admit_lease(policy, &pm)?;

        let old = pm.active_count;
        pm.active_count = old + 1;
        log::trace!("GPU PM: context active, count {}", pm.active_count);
        self.timeline.record(TraceEvent::ContextActive, pm.active_count);

        match EdgeTrigger::on_increment(old) {
            Some(edge) => {
                let power = hw.notify_active();
                self.record_power(&mut ctx, power);
                self.stats.record(edge);
                self.timeline.record(TraceEvent::GpuActive, pm.active_count);
                log::debug!("GPU PM: first context active, GPU {:?}", power);
                Ok(LeaseOutcome::Activated)
            }
            None => Ok(LeaseOutcome::Joined),
        }
    }

    /// Drop one lease, letting the GPU idle on the 1→0 crossing.
    ///
    /// Waiters on the zero-count signal are woken only after the idle
    /// notification has returned.
    pub fn release_lease<H>(&self, hw: &H)
    where
        H: PowerBackend + ?Sized,
    {
        let mut ctx = LockCtx::unlocked();
        let (_runpool, mut ctx) = ctx.lock(&self.runpool);
        let (mut pm, mut ctx) = ctx.lock(&self.pm);

        if pm.active_count == 0 {
            contract_violation(self.strict, Contract::LeaseUnderflow);
            return;
        }

        let old = pm.active_count;
        pm.active_count = old - 1;
        log::trace!("GPU PM: context idle, count {}", pm.active_count);
        self.timeline.record(TraceEvent::ContextIdle, pm.active_count);

        if let Some(edge) = EdgeTrigger::on_decrement(old) {
            let power = hw.notify_idle();
            self.record_power(&mut ctx, power);
            self.stats.record(edge);
            self.timeline.record(TraceEvent::GpuIdle, 0);
            log::debug!("GPU PM: last context idle, GPU {:?}", power);
            // Waiters re-take the pm lock before trusting the count.
            self.zero.broadcast();
        }
    }

    /// Take one lease only if the GPU is already powered.
    ///
    /// The power check and the increment happen under the power-state
    /// spinlock, so a concurrent power-down either lands before (and this
    /// fails with [`Rejected::GpuPoweredOff`]) or after the lease is held.
    pub fn try_acquire_lease_no_reactivate<H>(
        &self,
        hw: &H,
        policy: SuspendPolicy,
    ) -> Result<LeaseOutcome, Rejected>
    where
        H: PowerBackend + ?Sized,
    {
        let mut ctx = LockCtx::unlocked();
        let (_runpool, mut ctx) = ctx.lock(&self.runpool);
        let (mut pm, mut ctx) = ctx.lock(&self.pm);
        let (_hw, mut ctx) = ctx.lock(&self.hwaccess);
        let (powered, _) = ctx.lock(&self.powered);

        if !powered.gpu_powered {
            self.timeline.record(TraceEvent::HoldRejected, pm.active_count);
            return Err(Rejected::GpuPoweredOff);
        }

        self.admit_lease(policy, &pm)?;

        let old = pm.active_count;
        pm.active_count = old + 1;
        log::trace!("GPU PM: context hold, count {}", pm.active_count);
        self.timeline.record(TraceEvent::ContextActive, pm.active_count);

        match EdgeTrigger::on_increment(old) {
            Some(edge) => {
                hw.keep_active();
                self.stats.record(edge);
                self.timeline.record(TraceEvent::GpuActive, pm.active_count);
                Ok(LeaseOutcome::Activated)
            }
            None => Ok(LeaseOutcome::Joined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuPower, PowerUpFlags};
    use crate::config::PmConfig;
    use crate::error::HwError;
    use core::sync::atomic::{AtomicU32, Ordering};

    /// Powers on when active, off when idle
    #[derive(Default)]
    struct DemandGpu {
        active: AtomicU32,
        idle: AtomicU32,
        keep: AtomicU32,
    }

    impl PowerBackend for DemandGpu {
        fn power_up(&self, _flags: PowerUpFlags) -> Result<GpuPower, HwError> {
            Ok(GpuPower::On)
        }

        fn power_down(&self) {}

        fn notify_active(&self) -> GpuPower {
            self.active.fetch_add(1, Ordering::SeqCst);
            GpuPower::On
        }

        fn keep_active(&self) {
            self.keep.fetch_add(1, Ordering::SeqCst);
        }

        fn notify_idle(&self) -> GpuPower {
            self.idle.fetch_add(1, Ordering::SeqCst);
            GpuPower::Off
        }

        fn hardware_suspend(&self) -> Result<(), HwError> {
            Ok(())
        }

        fn hardware_resume(&self) -> Result<GpuPower, HwError> {
            Ok(GpuPower::On)
        }
    }

    fn lenient() -> PmConfig {
        PmConfig::default().with_strict_contracts(false)
    }

    fn set_suspending(pm: &PowerContext, suspending: bool) {
        let mut ctx = LockCtx::unlocked();
        let (mut state, _) = ctx.lock(&pm.pm);
        state.suspending = suspending;
    }

    #[test]
    fn test_three_leases_one_edge_each_way() {
        let pm = PowerContext::new(&PmConfig::default());
        let gpu = DemandGpu::default();

        let outcomes: [LeaseOutcome; 3] = core::array::from_fn(|_| {
            pm.acquire_lease(&gpu, SuspendPolicy::NotPossible).unwrap()
        });
        assert_eq!(
            outcomes,
            [LeaseOutcome::Activated, LeaseOutcome::Joined, LeaseOutcome::Joined]
        );
        assert_eq!(pm.active_count(), 3);
        assert_eq!(gpu.active.load(Ordering::SeqCst), 1);
        assert!(pm.gpu_powered());

        for _ in 0..3 {
            pm.release_lease(&gpu);
        }
        assert_eq!(pm.active_count(), 0);
        assert_eq!(gpu.idle.load(Ordering::SeqCst), 1);
        assert_eq!(pm.zero_signal().broadcasts(), 1);
        assert!(!pm.gpu_powered());
        assert_eq!(pm.transitions().activations(), 1);
        assert_eq!(pm.transitions().idles(), 1);
    }

    #[test]
    fn test_dont_reactivate_during_suspend() {
        let pm = PowerContext::new(&PmConfig::default());
        let gpu = DemandGpu::default();
        set_suspending(&pm, true);

        assert_eq!(
            pm.acquire_lease(&gpu, SuspendPolicy::DontReactivate),
            Err(Rejected::Suspending)
        );
        assert_eq!(pm.active_count(), 0);
        assert_eq!(gpu.active.load(Ordering::SeqCst), 0);

        set_suspending(&pm, false);
        pm.acquire_lease(&gpu, SuspendPolicy::NotPossible).unwrap();
        pm.acquire_lease(&gpu, SuspendPolicy::NotPossible).unwrap();
        set_suspending(&pm, true);

        assert_eq!(
            pm.acquire_lease(&gpu, SuspendPolicy::DontReactivate),
            Ok(LeaseOutcome::Joined)
        );
        assert_eq!(pm.active_count(), 3);
        assert_eq!(
            pm.acquire_lease(&gpu, SuspendPolicy::DontIncrease),
            Err(Rejected::Suspending)
        );
        assert_eq!(pm.active_count(), 3);
        assert_eq!(pm.timeline().events(TraceEvent::LeaseRejected).len(), 2);
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_release_underflow_strict() {
        let pm = PowerContext::new(&PmConfig::default().with_strict_contracts(true));
        pm.release_lease(&DemandGpu::default());
    }

    #[test]
    fn test_release_underflow_contained() {
        let pm = PowerContext::new(&lenient());
        let gpu = DemandGpu::default();
        pm.release_lease(&gpu);
        assert_eq!(pm.active_count(), 0);
        assert_eq!(gpu.idle.load(Ordering::SeqCst), 0);
        assert_eq!(pm.zero_signal().broadcasts(), 0);
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_not_possible_during_suspend_strict() {
        let pm = PowerContext::new(&PmConfig::default().with_strict_contracts(true));
        set_suspending(&pm, true);
        let _ = pm.acquire_lease(&DemandGpu::default(), SuspendPolicy::NotPossible);
    }

    #[test]
    fn test_not_possible_during_suspend_contained() {
        let pm = PowerContext::new(&lenient());
        let gpu = DemandGpu::default();
        set_suspending(&pm, true);
        assert_eq!(
            pm.acquire_lease(&gpu, SuspendPolicy::NotPossible),
            Ok(LeaseOutcome::Activated)
        );
        assert_eq!(pm.active_count(), 1);
    }

    #[test]
    fn test_hold_requires_power() {
        let pm = PowerContext::new(&PmConfig::default());
        let gpu = DemandGpu::default();

        assert_eq!(
            pm.try_acquire_lease_no_reactivate(&gpu, SuspendPolicy::DontIncrease),
            Err(Rejected::GpuPoweredOff)
        );
        assert_eq!(pm.active_count(), 0);

        pm.set_gpu_powered(GpuPower::On);
        assert_eq!(
            pm.try_acquire_lease_no_reactivate(&gpu, SuspendPolicy::DontIncrease),
            Ok(LeaseOutcome::Activated)
        );
        assert_eq!(gpu.keep.load(Ordering::SeqCst), 1);
        assert_eq!(gpu.active.load(Ordering::SeqCst), 0);
        assert_eq!(pm.transitions().activations(), 1);

        assert_eq!(
            pm.try_acquire_lease_no_reactivate(&gpu, SuspendPolicy::DontIncrease),
            Ok(LeaseOutcome::Joined)
        );
        assert_eq!(pm.active_count(), 2);
    }

    #[test]
    fn test_hold_follows_suspend_policy() {
        let pm = PowerContext::new(&PmConfig::default());
        let gpu = DemandGpu::default();
        pm.set_gpu_powered(GpuPower::On);
        set_suspending(&pm, true);

        assert_eq!(
            pm.try_acquire_lease_no_reactivate(&gpu, SuspendPolicy::DontIncrease),
            Err(Rejected::Suspending)
        );
        assert_eq!(
            pm.try_acquire_lease_no_reactivate(&gpu, SuspendPolicy::DontReactivate),
            Err(Rejected::Suspending)
        );
        assert_eq!(pm.active_count(), 0);
    }

    #[test]
    fn test_forced_power_off_with_leases() {
        let pm = PowerContext::new(&PmConfig::default());
        let gpu = DemandGpu::default();
        pm.acquire_lease(&gpu, SuspendPolicy::NotPossible).unwrap();

        // Error recovery powers the GPU off under a live lease.
        pm.set_gpu_powered(GpuPower::Off);
        assert_eq!(pm.active_count(), 1);
        assert_eq!(
            pm.try_acquire_lease_no_reactivate(&gpu, SuspendPolicy::NotPossible),
            Err(Rejected::GpuPoweredOff)
        );
        assert_eq!(
            pm.acquire_lease(&gpu, SuspendPolicy::NotPossible),
            Ok(LeaseOutcome::Joined)
        );
    }

    /// Records which locks are held when the hardware layer is called
    struct LockWitness<'a> {
        pm: &'a PowerContext,
        held: AtomicU32,
    }

    impl LockWitness<'_> {
        fn observe(&self) {
            let mut held = 0;
            if self.pm.runpool.is_locked() {
                held |= 1;
            }
            if self.pm.pm.is_locked() {
                held |= 2;
            }
            self.held.store(held, Ordering::SeqCst);
        }
    }

    impl PowerBackend for LockWitness<'_> {
        fn power_up(&self, _flags: PowerUpFlags) -> Result<GpuPower, HwError> {
            Ok(GpuPower::On)
        }

        fn power_down(&self) {}

        fn notify_active(&self) -> GpuPower {
            self.observe();
            GpuPower::On
        }

        fn notify_idle(&self) -> GpuPower {
            self.observe();
            GpuPower::Off
        }

        fn hardware_suspend(&self) -> Result<(), HwError> {
            Ok(())
        }

        fn hardware_resume(&self) -> Result<GpuPower, HwError> {
            Ok(GpuPower::On)
        }
    }

    #[test]
    fn test_notifications_run_under_pm_lock() {
        let pm = PowerContext::new(&PmConfig::default());
        let witness = LockWitness { pm: &pm, held: AtomicU32::new(0) };

        pm.acquire_lease(&witness, SuspendPolicy::NotPossible).unwrap();
        assert_eq!(witness.held.swap(0, Ordering::SeqCst), 3);
        assert!(!pm.pm.is_locked());

        pm.release_lease(&witness);
        assert_eq!(witness.held.load(Ordering::SeqCst), 3);
        assert!(!pm.runpool.is_locked());
    }
}
