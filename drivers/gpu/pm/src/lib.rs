//! # Helix GPU Power Management
//!
//! Power-state coordination core for the GPU driver.
//!
//! Every piece of work that needs the GPU holds a *lease*. The count of
//! outstanding leases drives hardware power: the first lease powers the GPU
//! up, the last one lets it idle. System suspend raises a flag that stops
//! new leases from reactivating the GPU, waits for the count to drain to
//! zero, and only then suspends the hardware. Resume reverses that.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          PmDevice                               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐ │
//! │  │   counter    │  │ orchestrator │  │        context         │ │
//! │  │ (leases,     │  │ (suspend,    │  │ (locks, zero signal,   │ │
//! │  │  policies)   │  │  resume)     │  │  timeline, stats)      │ │
//! │  └──────┬───────┘  └──────┬───────┘  └────────────────────────┘ │
//! └─────────┼─────────────────┼─────────────────────────────────────┘
//!           ▼                 ▼
//!    PowerBackend      SchedulerControl + CounterQuiesce
//! ```
//!
//! ## Features
//!
//! - `std` (default): the drain wait parks on a condition variable and the
//!   [`sim`] collaborators are available. Without it the wait spins.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod backend;
pub mod config;
pub mod context;
pub mod counter;
pub mod device;
pub mod error;
pub mod instr;
pub mod lock;
pub mod orchestrator;
pub mod policy;
pub mod timeline;
pub mod trigger;
pub mod wait;

#[cfg(feature = "std")]
pub mod sim;

// Re-exports for convenience
pub use backend::{GpuPower, LeaseControl, LeaseOutcome, PowerBackend, PowerUpFlags, SchedulerControl};
pub use config::PmConfig;
pub use context::{PowerContext, PowerSnapshot};
pub use device::{LeaseGuard, PmDevice};
pub use error::{ConfigError, Contract, HwError, HwOp, PmError, PmResult, Rejected};
pub use instr::{CounterBackend, CounterBackendKind, CounterQuiesce};
pub use orchestrator::SuspendPhase;
pub use policy::SuspendPolicy;
pub use timeline::{TraceEvent, TraceRecord};
