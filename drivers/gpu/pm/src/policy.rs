//! # Suspend Policies
//!
//! How a lease request behaves when it meets a suspend in progress. Outside
//! a suspend every policy is granted.
//!
//! | Policy           | Suspending, count == 0 | Suspending, count > 0 |
//! |------------------|------------------------|-----------------------|
//! | `NotPossible`    | contract violation     | contract violation    |
//! | `DontIncrease`   | rejected               | rejected              |
//! | `DontReactivate` | rejected               | granted               |
//!
//! A `DontReactivate` request and the drain race on the pm lock: whichever
//! takes it first decides. If the drain has already brought the count to
//! zero the request is rejected, otherwise it joins the still-active window.

use crate::error::Rejected;

/// Behaviour of a lease request while a suspend is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendPolicy {
    /// The call site never runs inside a suspend window
    NotPossible,
    /// Refuse the lease; the caller retries later
    DontIncrease,
    /// Join an already-active window, never start a new one
    DontReactivate,
}

/// Verdict of [`admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Take the lease
    Grant,
    /// Refuse without side effects
    Reject(Rejected),
    /// The caller broke its own contract
    Violation,
}

/// Decide a lease request.
///
/// Must be evaluated under the pm lock, against the same `active_count` the
/// increment will apply to.
#[inline]
pub fn admit(policy: SuspendPolicy, suspending: bool, active_count: u32) -> Admission {
    if !suspending {
        return Admission::Grant;
    }
    match policy {
        SuspendPolicy::NotPossible => Admission::Violation,
        SuspendPolicy::DontIncrease => Admission::Reject(Rejected::Suspending),
        SuspendPolicy::DontReactivate if active_count != 0 => Admission::Grant,
        SuspendPolicy::DontReactivate => Admission::Reject(Rejected::Suspending),
    }
}
