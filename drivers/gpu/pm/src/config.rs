//! # GPU PM Configuration
//!
//! Per-device knobs, fixed at bring-up.

use crate::backend::PowerUpFlags;
use crate::instr::CounterBackendKind;
use crate::wait::StallReport;

/// Power-management configuration for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmConfig {
    /// Panic on contract violations instead of containing them
    pub strict_contracts: bool,
    /// Record PM events in the device timeline
    pub trace_events: bool,
    /// Drain-wait stall reporting
    pub stall_report: StallReport,
    /// Instrumentation backend quiesced across suspend
    pub counter_backend: CounterBackendKind,
    /// Flags passed to the hardware layer at power-up
    pub powerup_flags: PowerUpFlags,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            strict_contracts: cfg!(debug_assertions),
            trace_events: true,
            stall_report: StallReport::default(),
            counter_backend: CounterBackendKind::Disabled,
            powerup_flags: PowerUpFlags::ENABLE_IRQS | PowerUpFlags::HW_ISSUES_DETECT,
        }
    }
}

impl PmConfig {
    /// Set contract strictness
    pub const fn with_strict_contracts(mut self, strict: bool) -> Self {
        self.strict_contracts = strict;
        self
    }

    /// Enable or disable the event timeline
    pub const fn with_trace_events(mut self, enabled: bool) -> Self {
        self.trace_events = enabled;
        self
    }

    /// Set the drain-wait stall report period in milliseconds
    pub const fn with_stall_interval_ms(mut self, ms: u64) -> Self {
        self.stall_report.interval_ms = ms;
        self
    }

    /// Set the drain-wait stall report period in spin iterations
    pub const fn with_stall_spins(mut self, spins: u64) -> Self {
        self.stall_report.spins = spins;
        self
    }

    /// Select the counter backend
    pub const fn with_counter_backend(mut self, kind: CounterBackendKind) -> Self {
        self.counter_backend = kind;
        self
    }

    /// Set the power-up flags
    pub const fn with_powerup_flags(mut self, flags: PowerUpFlags) -> Self {
        self.powerup_flags = flags;
        self
    }
}
