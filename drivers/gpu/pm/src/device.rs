//! # PM Device
//!
//! [`PmDevice`] binds a [`PowerContext`] to the collaborators it drives and
//! is the entry point for everything outside the power core: job
//! submission takes leases here, the platform layer calls suspend and
//! resume here, and bring-up and teardown go through `power_up`/`halt`.

use alloc::boxed::Box;

use crate::backend::{GpuPower, LeaseControl, LeaseOutcome, PowerBackend, SchedulerControl};
use crate::config::PmConfig;
use crate::context::{PowerContext, PowerSnapshot};
use crate::error::{ConfigError, HwOp, PmError, PmResult, Rejected};
use crate::instr::{CounterBackend, CounterQuiesce, VendorHwcnt, VinstrContext};
use crate::policy::SuspendPolicy;

/// Power-management core for one GPU
#[derive(Debug)]
pub struct PmDevice<H, S, Q = CounterBackend> {
    pm: PowerContext,
    hw: H,
    scheduler: S,
    counters: Q,
    config: PmConfig,
}

impl<H, S, Q> PmDevice<H, S, Q>
where
    H: PowerBackend,
    S: SchedulerControl,
    Q: CounterQuiesce,
{
    /// Create the device with no leases, not suspending and the GPU off.
    ///
    /// `counters` must be of the kind named by `config.counter_backend`.
    pub fn new(config: PmConfig, hw: H, scheduler: S, counters: Q) -> PmResult<Self> {
        let supplied = counters.kind();
        if supplied != config.counter_backend {
            let err = ConfigError::CounterBackendMismatch {
                configured: config.counter_backend,
                supplied,
            };
            log::error!("GPU PM: {}", err);
            return Err(err.into());
        }
        log::debug!("GPU PM: device created ({:?})", config);
        Ok(Self {
            pm: PowerContext::new(&config),
            hw,
            scheduler,
            counters,
            config,
        })
    }

    /// Shared power state
    pub fn context(&self) -> &PowerContext {
        &self.pm
    }

    /// Hardware power layer
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Job scheduler
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Instrumentation backend
    pub fn counters(&self) -> &Q {
        &self.counters
    }

    /// Configuration the device was created with
    pub fn config(&self) -> &PmConfig {
        &self.config
    }

    /// Lease count, suspend flag, phase and power state
    pub fn snapshot(&self) -> PowerSnapshot {
        self.pm.snapshot()
    }

    // =========================================================================
    // Bring-up / teardown
    // =========================================================================

    /// Initial power-up with the configured flags.
    ///
    /// Takes no lease; the GPU stays in whatever state the hardware layer
    /// reports until the first lease or the next idle notification.
    pub fn power_up(&self) -> PmResult<()> {
        let flags = self.config.powerup_flags;
        let power = self.hw.power_up(flags).map_err(|error| {
            log::error!("GPU PM: power-up failed: {}", error);
            PmError::Hardware { op: HwOp::PowerUp, error }
        })?;
        self.pm.set_gpu_powered(power);
        log::info!("GPU PM: powered up ({:?}), GPU {:?}", flags, power);
        Ok(())
    }

    /// Power the GPU down for teardown.
    pub fn halt(&self) {
        let outstanding = self.pm.active_count();
        if outstanding != 0 {
            log::warn!("GPU PM: halting with {} leases outstanding", outstanding);
        }
        self.hw.power_down();
        self.pm.set_gpu_powered(GpuPower::Off);
        log::info!("GPU PM: halted");
    }

    // =========================================================================
    // Leases
    // =========================================================================

    /// Take one lease under `policy`.
    ///
    /// On `Activated` the GPU has been told to power up before this returns.
    /// A rejection changes nothing.
    pub fn acquire_lease(&self, policy: SuspendPolicy) -> Result<LeaseOutcome, Rejected> {
        self.pm.acquire_lease(&self.hw, policy)
    }

    /// Drop one lease.
    pub fn release_lease(&self) {
        self.pm.release_lease(&self.hw)
    }

    /// Take one lease only if the GPU is already powered
    pub fn try_acquire_lease_no_reactivate(
        &self,
        policy: SuspendPolicy,
    ) -> Result<LeaseOutcome, Rejected> {
        self.pm.try_acquire_lease_no_reactivate(&self.hw, policy)
    }

    /// Take a lease that may not be refused, e.g. for work already
    /// committed before any suspend could start.
    pub fn context_active(&self) {
        // NotPossible never rejects; a violation is reported inside.
        let _ = self.pm.acquire_lease(&self.hw, SuspendPolicy::NotPossible);
    }

    /// Release a lease taken with [`context_active`](Self::context_active)
    pub fn context_idle(&self) {
        self.pm.release_lease(&self.hw)
    }

    /// Take a lease that is released when the guard drops.
    pub fn lease(&self, policy: SuspendPolicy) -> Result<LeaseGuard<'_, H>, Rejected> {
        let outcome = self.pm.acquire_lease(&self.hw, policy)?;
        Ok(LeaseGuard {
            pm: &self.pm,
            hw: &self.hw,
            outcome,
        })
    }

    /// Hardware-layer notification of a power change made outside the
    /// lease path, such as a reset or error recovery powering the GPU off.
    pub fn gpu_power_changed(&self, power: GpuPower) {
        log::debug!("GPU PM: hardware reports GPU {:?}", power);
        self.pm.set_gpu_powered(power);
    }
}

impl<H, S> PmDevice<H, S, CounterBackend>
where
    H: PowerBackend,
    S: SchedulerControl,
{
    /// Create the device, selecting the counter backend named by
    /// `config.counter_backend` from what the platform offers.
    pub fn with_counters(
        config: PmConfig,
        hw: H,
        scheduler: S,
        vinstr: Option<Box<dyn VinstrContext>>,
        vendor: Option<Box<dyn VendorHwcnt>>,
    ) -> PmResult<Self> {
        let counters = CounterBackend::select(config.counter_backend, vinstr, vendor)?;
        Self::new(config, hw, scheduler, counters)
    }
}

impl<H, S, Q> LeaseControl for PmDevice<H, S, Q>
where
    H: PowerBackend,
    S: SchedulerControl,
    Q: CounterQuiesce,
{
    fn acquire_lease(&self, policy: SuspendPolicy) -> Result<LeaseOutcome, Rejected> {
        PmDevice::acquire_lease(self, policy)
    }

    fn release_lease(&self) {
        PmDevice::release_lease(self)
    }
}

// =============================================================================
// LEASE GUARD
// =============================================================================

/// A held lease; released on drop
#[must_use = "dropping the guard releases the lease"]
pub struct LeaseGuard<'a, H: PowerBackend> {
    pm: &'a PowerContext,
    hw: &'a H,
    outcome: LeaseOutcome,
}

impl<H: PowerBackend> LeaseGuard<'_, H> {
    /// Whether taking this lease powered the GPU up
    pub fn outcome(&self) -> LeaseOutcome {
        self.outcome
    }
}

impl<H: PowerBackend> Drop for LeaseGuard<'_, H> {
    fn drop(&mut self) {
        self.pm.release_lease(self.hw);
    }
}

impl<H: PowerBackend> core::fmt::Debug for LeaseGuard<'_, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("outcome", &self.outcome)
            .finish()
    }
}
