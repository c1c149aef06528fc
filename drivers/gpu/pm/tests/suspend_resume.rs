//! Suspend/resume sequencing against the simulated collaborators.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use helix_gpu_pm::instr::{VendorHwcnt, VinstrContext};
use helix_gpu_pm::sim::{Journal, JournalEntry, SimCounters, SimGpu, SimPolicy, SimScheduler};
use helix_gpu_pm::{
    ConfigError, CounterBackend, CounterBackendKind, CounterQuiesce, GpuPower, HwError, HwOp,
    PmConfig, PmDevice, PmError, Rejected, SuspendPhase, SuspendPolicy, TraceEvent,
};

type Device = PmDevice<SimGpu, SimScheduler, CounterBackend>;

fn device(kind: CounterBackendKind, policy: SimPolicy) -> (Device, Journal, Arc<SimCounters>) {
    let journal = Journal::new();
    let counters = Arc::new(SimCounters::new(journal.clone()));
    let vinstr: Option<Box<dyn VinstrContext>> = Some(Box::new(Arc::clone(&counters)));
    let vendor: Option<Box<dyn VendorHwcnt>> = Some(Box::new(Arc::clone(&counters)));
    let backend = CounterBackend::select(kind, vinstr, vendor).unwrap();
    let dev = PmDevice::new(
        PmConfig::default()
            .with_strict_contracts(true)
            .with_counter_backend(kind),
        SimGpu::new(journal.clone(), policy),
        SimScheduler::new(journal.clone()),
        backend,
    )
    .unwrap();
    dev.power_up().unwrap();
    journal.clear();
    (dev, journal, counters)
}

#[test]
fn test_suspend_rejects_new_work() {
    let (dev, _journal, _counters) = device(CounterBackendKind::Vinstr, SimPolicy::Demand);
    dev.scheduler().submit(&dev).unwrap();

    dev.request_suspend().unwrap();

    assert_eq!(dev.scheduler().running(), 0);
    assert!(dev.scheduler().is_suspended());
    assert_eq!(
        dev.acquire_lease(SuspendPolicy::DontIncrease),
        Err(Rejected::Suspending)
    );
    assert_eq!(
        dev.try_acquire_lease_no_reactivate(SuspendPolicy::DontReactivate),
        Err(Rejected::GpuPoweredOff)
    );
    assert_eq!(dev.snapshot().active_count, 0);
}

#[test]
fn test_suspend_waits_for_outstanding_lease() {
    let (dev, journal, _counters) = device(CounterBackendKind::Disabled, SimPolicy::Demand);
    let dev = Arc::new(dev);
    dev.context_active();

    let holder = {
        let dev = Arc::clone(&dev);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            dev.context_idle();
        })
    };

    dev.suspend().unwrap();
    holder.join().unwrap();

    let idle = journal.position(JournalEntry::NotifyIdle).unwrap();
    let suspend = journal.position(JournalEntry::HardwareSuspend).unwrap();
    assert!(idle < suspend);

    let drained = dev.context().timeline().events(TraceEvent::DrainComplete);
    let idled = dev.context().timeline().events(TraceEvent::GpuIdle);
    assert_eq!(drained.len(), 1);
    assert!(idled.last().unwrap().seq < drained[0].seq);
}

#[test]
fn test_resume_order() {
    let (dev, journal, counters) = device(CounterBackendKind::Vinstr, SimPolicy::Demand);
    dev.suspend().unwrap();
    assert!(!counters.is_collecting());

    journal.clear();
    dev.request_resume().unwrap();
    assert!(counters.is_collecting());

    let at = |entry| journal.position(entry).unwrap();
    assert!(at(JournalEntry::HardwareResume) < at(JournalEntry::NotifyActive));
    assert!(at(JournalEntry::NotifyActive) < at(JournalEntry::CountersResume));
    assert!(at(JournalEntry::CountersResume) < at(JournalEntry::SoftJobsResume));
    assert!(at(JournalEntry::SoftJobsResume) < at(JournalEntry::SchedulerResume));
    // The internal lease is dropped last.
    assert_eq!(
        journal.last_position(JournalEntry::NotifyIdle),
        Some(journal.entries().len() - 1)
    );
}

#[test]
fn test_round_trip_replays_work() {
    let (dev, _journal, _counters) = device(CounterBackendKind::Vinstr, SimPolicy::AlwaysOn);
    dev.scheduler().submit(&dev).unwrap();
    dev.scheduler().submit(&dev).unwrap();
    let before = dev.snapshot();

    dev.suspend().unwrap();
    dev.resume().unwrap();

    let after = dev.snapshot();
    assert_eq!(after, before);
    assert_eq!(after.phase, SuspendPhase::Running);
    assert_eq!(dev.scheduler().running(), 2);

    assert!(dev.scheduler().complete(&dev));
    assert!(dev.scheduler().complete(&dev));
    assert!(!dev.scheduler().complete(&dev));
    assert_eq!(dev.snapshot().active_count, 0);
}

#[test]
fn test_timeline_phases() {
    let (dev, _journal, _counters) = device(CounterBackendKind::Disabled, SimPolicy::Demand);
    dev.suspend().unwrap();
    dev.resume().unwrap();

    let phases: Vec<TraceEvent> = dev
        .context()
        .timeline()
        .snapshot()
        .into_iter()
        .map(|r| r.event)
        .filter(|e| {
            matches!(
                e,
                TraceEvent::SuspendStart
                    | TraceEvent::DrainComplete
                    | TraceEvent::Suspended
                    | TraceEvent::ResumeStart
                    | TraceEvent::Resumed
            )
        })
        .collect();
    assert_eq!(
        phases,
        [
            TraceEvent::SuspendStart,
            TraceEvent::DrainComplete,
            TraceEvent::Suspended,
            TraceEvent::ResumeStart,
            TraceEvent::Resumed,
        ]
    );
}

#[test]
fn test_vendor_hwcnt_backend() {
    let (dev, journal, counters) = device(CounterBackendKind::VendorHwcnt, SimPolicy::Demand);
    assert_eq!(dev.counters().kind(), CounterBackendKind::VendorHwcnt);

    dev.suspend().unwrap();
    assert!(!counters.is_collecting());
    assert!(
        journal.position(JournalEntry::CountersSuspend).unwrap()
            < journal.position(JournalEntry::HardwareSuspend).unwrap()
    );

    dev.resume().unwrap();
    assert!(counters.is_collecting());
    assert_eq!(journal.count(JournalEntry::CountersResume), 1);
}

#[test]
fn test_vinstr_requires_context() {
    let err = CounterBackend::select(CounterBackendKind::Vinstr, None, None).unwrap_err();
    let err: PmError = err.into();
    assert!(matches!(err, PmError::Config(_)));
    assert!(!err.is_device_fault());
}

#[test]
fn test_configured_backend_is_enforced() {
    let journal = Journal::new();
    let err = PmDevice::new(
        PmConfig::default().with_counter_backend(CounterBackendKind::Vinstr),
        SimGpu::new(journal.clone(), SimPolicy::Demand),
        SimScheduler::new(journal.clone()),
        CounterBackend::Disabled,
    )
    .unwrap_err();
    assert_eq!(
        err,
        PmError::Config(ConfigError::CounterBackendMismatch {
            configured: CounterBackendKind::Vinstr,
            supplied: CounterBackendKind::Disabled,
        })
    );
    // No device was built, so nothing was ever driven.
    assert!(journal.entries().is_empty());
}

#[test]
fn test_failed_suspend_reports_device_fault() {
    let (dev, journal, _counters) = device(CounterBackendKind::Disabled, SimPolicy::Demand);
    dev.hardware().fail_next_suspend(HwError::Timeout);

    let err = dev.suspend().unwrap_err();
    assert_eq!(err, PmError::Hardware { op: HwOp::Suspend, error: HwError::Timeout });
    assert!(err.is_device_fault());
    assert_eq!(journal.count(JournalEntry::HardwareSuspend), 1);

    // Leases stay refused: the suspend window never closed.
    let snap = dev.snapshot();
    assert!(snap.suspending);
    assert_eq!(snap.phase, SuspendPhase::Suspending);
    assert_eq!(
        dev.acquire_lease(SuspendPolicy::DontIncrease),
        Err(Rejected::Suspending)
    );
}

#[test]
fn test_external_power_loss() {
    let (dev, _journal, _counters) = device(CounterBackendKind::Disabled, SimPolicy::AlwaysOn);
    dev.context_active();
    assert!(dev.snapshot().gpu_powered);

    dev.gpu_power_changed(GpuPower::Off);
    assert_eq!(
        dev.try_acquire_lease_no_reactivate(SuspendPolicy::DontIncrease),
        Err(Rejected::GpuPoweredOff)
    );
    assert_eq!(dev.snapshot().active_count, 1);

    dev.context_idle();
    dev.suspend().unwrap();
    dev.resume().unwrap();
    assert!(dev.snapshot().gpu_powered);
    assert!(dev
        .try_acquire_lease_no_reactivate(SuspendPolicy::DontIncrease)
        .is_ok());
    dev.release_lease();
}
