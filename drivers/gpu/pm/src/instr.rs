//! # Instrumentation Quiescence
//!
//! Hardware counter collection must be stopped before the GPU is suspended
//! and restarted after it resumes. Platforms provide one of two collectors:
//!
//! - **vinstr**: the driver's own counter instrumentation; `suspend` blocks
//!   until collection has stopped.
//! - **vendor hwcnt**: vendor `disable`/`enable` callbacks, either of which
//!   may be absent, serialized under the counter lock.
//!
//! The device sees only [`CounterQuiesce`]. Which backend sits behind it is
//! chosen once, from [`PmConfig::counter_backend`](crate::PmConfig), and
//! device construction refuses a backend of any other kind.

use alloc::boxed::Box;
use core::fmt;

use spin::Mutex;

use crate::error::ConfigError;

/// Stop/restart contract for the instrumentation collaborator
pub trait CounterQuiesce: Send + Sync {
    /// Stop counter collection; returns once nothing is collecting
    fn suspend_counters(&self);

    /// Restart counter collection
    fn resume_counters(&self);

    /// Backend kind, checked against the device configuration
    fn kind(&self) -> CounterBackendKind;
}

/// Counter backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CounterBackendKind {
    /// No counter collection on this device
    #[default]
    Disabled,
    /// Driver instrumentation (vinstr)
    Vinstr,
    /// Vendor hardware-counter callbacks
    VendorHwcnt,
}

// =============================================================================
// BACKEND INTERFACES
// =============================================================================

/// Driver instrumentation context
pub trait VinstrContext: Send + Sync {
    /// Suspend collection, blocking until it has stopped
    fn suspend(&self);

    /// Resume collection
    fn resume(&self);
}

/// Vendor hardware-counter callbacks
pub trait VendorHwcnt: Send + Sync {
    /// Disable counters, if the vendor supports it
    fn disable(&self) {}

    /// Re-enable counters, if the vendor supports it
    fn enable(&self) {}
}

// =============================================================================
// VENDOR COUNTERS
// =============================================================================

/// Vendor callbacks behind the counter lock
pub struct VendorCounters {
    mlock: Mutex<()>,
    callbacks: Option<Box<dyn VendorHwcnt>>,
}

impl VendorCounters {
    /// Wrap the vendor's callbacks; `None` when the vendor has none
    pub fn new(callbacks: Option<Box<dyn VendorHwcnt>>) -> Self {
        Self {
            mlock: Mutex::new(()),
            callbacks,
        }
    }
}

impl fmt::Debug for VendorCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorCounters")
            .field("callbacks", &self.callbacks.is_some())
            .finish()
    }
}

impl CounterQuiesce for VendorCounters {
    fn suspend_counters(&self) {
        let _mlock = self.mlock.lock();
        if let Some(cb) = &self.callbacks {
            cb.disable();
        }
    }

    fn resume_counters(&self) {
        let _mlock = self.mlock.lock();
        if let Some(cb) = &self.callbacks {
            cb.enable();
        }
    }

    fn kind(&self) -> CounterBackendKind {
        CounterBackendKind::VendorHwcnt
    }
}

// =============================================================================
// SELECTED BACKEND
// =============================================================================

/// The counter backend a device was configured with
pub enum CounterBackend {
    /// Nothing to quiesce
    Disabled,
    /// Driver instrumentation
    Vinstr(Box<dyn VinstrContext>),
    /// Vendor callbacks
    VendorHwcnt(VendorCounters),
}

impl CounterBackend {
    /// Build the backend named by `kind` from whatever the platform offers.
    ///
    /// Vinstr requires a context. Vendor callbacks are optional, as on
    /// platforms whose vendor layer implements neither.
    pub fn select(
        kind: CounterBackendKind,
        vinstr: Option<Box<dyn VinstrContext>>,
        vendor: Option<Box<dyn VendorHwcnt>>,
    ) -> Result<Self, ConfigError> {
        let backend = match kind {
            CounterBackendKind::Disabled => CounterBackend::Disabled,
            CounterBackendKind::Vinstr => match vinstr {
                Some(ctx) => CounterBackend::Vinstr(ctx),
                None => return Err(ConfigError::MissingCounterBackend(kind)),
            },
            CounterBackendKind::VendorHwcnt => {
                CounterBackend::VendorHwcnt(VendorCounters::new(vendor))
            }
        };
        log::debug!("GPU PM: counter backend {:?}", backend.kind());
        Ok(backend)
    }
}

impl fmt::Debug for CounterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterBackend::VendorHwcnt(v) => f.debug_tuple("VendorHwcnt").field(v).finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

impl CounterQuiesce for CounterBackend {
    fn suspend_counters(&self) {
        match self {
            CounterBackend::Disabled => {}
            CounterBackend::Vinstr(ctx) => ctx.suspend(),
            CounterBackend::VendorHwcnt(v) => v.suspend_counters(),
        }
    }

    fn resume_counters(&self) {
        match self {
            CounterBackend::Disabled => {}
            CounterBackend::Vinstr(ctx) => ctx.resume(),
            CounterBackend::VendorHwcnt(v) => v.resume_counters(),
        }
    }

    fn kind(&self) -> CounterBackendKind {
        match self {
            CounterBackend::Disabled => CounterBackendKind::Disabled,
            CounterBackend::Vinstr(_) => CounterBackendKind::Vinstr,
            CounterBackend::VendorHwcnt(_) => CounterBackendKind::VendorHwcnt,
        }
    }
}
