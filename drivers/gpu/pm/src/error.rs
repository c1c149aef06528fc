//! # GPU PM Error Handling
//!
//! Three kinds of failure leave this core, each with its own type:
//!
//! | Kind                | Type        | Caller reaction                      |
//! |---------------------|-------------|--------------------------------------|
//! | Policy rejection    | `Rejected`  | Back off, retry at own discretion    |
//! | Contract violation  | `Contract`  | Bug; panics when contracts are strict|
//! | Hardware failure    | `HwError`   | Device-level fault, owner handles it |
//!
//! All types are `no_std` compatible and `Copy`.

use core::fmt;

use crate::instr::CounterBackendKind;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// GPU PM result type alias
pub type PmResult<T> = core::result::Result<T, PmError>;

// =============================================================================
// POLICY REJECTIONS
// =============================================================================

/// A lease request that was refused without side effects.
///
/// This is an expected outcome, not a failure: the caller decides when to
/// try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejected {
    /// A suspend is in progress and the request's policy forbids joining it
    Suspending,
    /// The GPU is not powered and the request must not power it back on
    GpuPoweredOff,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspending => write!(f, "suspend in progress, retry later"),
            Self::GpuPoweredOff => write!(f, "GPU powered off"),
        }
    }
}

// =============================================================================
// CONTRACT VIOLATIONS
// =============================================================================

/// Programming-contract violations detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contract {
    /// `release_lease` with no outstanding lease
    LeaseUnderflow,
    /// `suspend` while a suspend is already in progress
    DoubleSuspend,
    /// `NotPossible` acquisition while suspending
    AcquireDuringSuspend,
    /// `resume` outside the suspended phase
    ResumeWithoutSuspend,
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeaseUnderflow => write!(f, "lease released with active count 0"),
            Self::DoubleSuspend => write!(f, "suspend requested while already suspending"),
            Self::AcquireDuringSuspend => {
                write!(f, "NotPossible lease acquired during suspend")
            }
            Self::ResumeWithoutSuspend => write!(f, "resume requested while not suspended"),
        }
    }
}

/// Report a contract violation.
///
/// Always logged. Panics when `strict` is set, otherwise returns so the
/// caller can contain the damage.
#[track_caller]
pub(crate) fn contract_violation(strict: bool, violation: Contract) {
    log::error!("GPU PM: contract violation: {}", violation);
    if strict {
        panic!("GPU PM contract violation: {}", violation);
    }
}

// =============================================================================
// HARDWARE ERRORS
// =============================================================================

/// Errors reported by the hardware power layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwError {
    /// The power transition did not complete in time
    Timeout,
    /// The GPU reported a fault during the transition
    GpuFault,
    /// The hardware is not in a state that allows the transition
    NotReady,
    /// Platform-specific error code
    Platform(i32),
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "power transition timed out"),
            Self::GpuFault => write!(f, "GPU fault"),
            Self::NotReady => write!(f, "hardware not ready"),
            Self::Platform(code) => write!(f, "platform error {}", code),
        }
    }
}

/// Hardware operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwOp {
    /// Initial power-up at bring-up
    PowerUp,
    /// Hardware suspend at the end of the suspend sequence
    Suspend,
    /// Hardware resume at the start of the resume sequence
    Resume,
}

impl fmt::Display for HwOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerUp => write!(f, "power-up"),
            Self::Suspend => write!(f, "hardware suspend"),
            Self::Resume => write!(f, "hardware resume"),
        }
    }
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

/// Invalid device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigError {
    /// The configured counter backend was not supplied
    MissingCounterBackend(CounterBackendKind),
    /// The supplied counter backend is not the configured one
    CounterBackendMismatch {
        /// Kind named by the configuration
        configured: CounterBackendKind,
        /// Kind actually supplied
        supplied: CounterBackendKind,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCounterBackend(kind) => {
                write!(f, "counter backend {:?} selected but not provided", kind)
            }
            Self::CounterBackendMismatch { configured, supplied } => write!(
                f,
                "counter backend {:?} configured but {:?} supplied",
                configured, supplied
            ),
        }
    }
}

// =============================================================================
// ERROR ENUM
// =============================================================================

/// GPU PM unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PmError {
    /// A hardware power transition failed; the device is in an unknown state
    Hardware {
        /// Operation that failed
        op: HwOp,
        /// Error reported by the hardware layer
        error: HwError,
    },
    /// A contract violation was contained (non-strict mode only)
    Contract(Contract),
    /// The device configuration is invalid
    Config(ConfigError),
}

impl PmError {
    /// Whether the device must be considered faulted
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Hardware { .. })
    }
}

impl fmt::Display for PmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware { op, error } => write!(f, "{} failed: {}", op, error),
            Self::Contract(c) => write!(f, "contract violation: {}", c),
            Self::Config(e) => write!(f, "configuration error: {}", e),
        }
    }
}

impl From<Contract> for PmError {
    fn from(c: Contract) -> Self {
        PmError::Contract(c)
    }
}

impl From<ConfigError> for PmError {
    fn from(e: ConfigError) -> Self {
        PmError::Config(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PmError {}

#[cfg(feature = "std")]
impl std::error::Error for Rejected {}

#[cfg(feature = "std")]
impl std::error::Error for HwError {}
