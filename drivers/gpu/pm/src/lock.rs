//! # Lock Hierarchy
//!
//! The power core touches four locks, always in this order:
//!
//! ```text
//!   Runpool ──▶ Pm ──▶ HwAccess ──▶ Powered
//!   (outer)                         (innermost, brief, never across a wait)
//! ```
//!
//! Ordering is enforced by the type system. Every [`OrderedLock`] carries a
//! level, and it can only be taken through a [`LockCtx`] whose level is
//! strictly outer to it (`N: LockAfter<L>`). Taking a lock mutably borrows
//! the current context and yields the context for the new level, so a path
//! holding `Pm` has no way to name a `Runpool` context:
//!
//! ```text
//! let mut ctx = LockCtx::unlocked();
//! let (rp, mut ctx) = ctx.lock(&runpool);   // LockCtx<Runpool>
//! let (pm, mut ctx) = ctx.lock(&pm_lock);   // LockCtx<Pm>
//! let (_, _) = ctx.lock(&runpool);          // error: Runpool: LockAfter<Pm> not satisfied
//! ```
//!
//! Skipping levels is allowed (`Unlocked -> Pm` for the suspend flag), going
//! backwards is not.

use core::fmt;
use core::marker::PhantomData;

use spin::{Mutex, MutexGuard};

mod sealed {
    pub trait Sealed {}
}

// =============================================================================
// LEVELS
// =============================================================================

/// A position in the lock hierarchy
pub trait LockLevel: sealed::Sealed {
    /// Name used in diagnostics
    const NAME: &'static str;
}

/// `Self` may be acquired while `Held` is the innermost held level
pub trait LockAfter<Held: LockLevel>: LockLevel {}

macro_rules! lock_levels {
    ($($(#[$meta:meta])* $name:ident => $label:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $name {}

            impl sealed::Sealed for $name {}

            impl LockLevel for $name {
                const NAME: &'static str = $label;
            }
        )*
    };
}

macro_rules! lock_order {
    ($held:ident => $($next:ident),+) => {
        $( impl LockAfter<$held> for $next {} )+
    };
}

lock_levels! {
    /// Nothing held yet
    Unlocked => "unlocked",
    /// Scheduler run-pool lock
    Runpool => "runpool",
    /// Power-management lock (lease count, suspend flag)
    Pm => "pm",
    /// Hardware-access lock
    HwAccess => "hwaccess",
    /// Power-state spinlock (`gpu_powered`)
    Powered => "gpu_powered",
}

lock_order!(Unlocked => Runpool, Pm, HwAccess, Powered);
lock_order!(Runpool => Pm, HwAccess, Powered);
lock_order!(Pm => HwAccess, Powered);
lock_order!(HwAccess => Powered);

// =============================================================================
// ORDERED LOCK
// =============================================================================

/// A spinlock pinned to one level of the hierarchy
pub struct OrderedLock<L: LockLevel, T> {
    inner: Mutex<T>,
    _level: PhantomData<fn() -> L>,
}

impl<L: LockLevel, T> OrderedLock<L, T> {
    /// Create a new lock at level `L`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            _level: PhantomData,
        }
    }

    /// Level name, for diagnostics
    pub fn level_name(&self) -> &'static str {
        L::NAME
    }

    /// Whether some path currently holds the lock. Racy; diagnostics only.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<L: LockLevel, T: fmt::Debug> fmt::Debug for OrderedLock<L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("OrderedLock");
        s.field("level", &L::NAME);
        match self.inner.try_lock() {
            Some(value) => s.field("value", &*value),
            None => s.field("value", &"<locked>"),
        };
        s.finish()
    }
}

// =============================================================================
// LOCK CONTEXT
// =============================================================================

/// Proof that the innermost lock held on this path is at level `L`.
///
/// Zero-sized. The only way to obtain one above `Unlocked` is by locking.
pub struct LockCtx<'a, L: LockLevel> {
    _held: PhantomData<(&'a mut (), fn() -> L)>,
}

impl LockCtx<'static, Unlocked> {
    /// Entry-point context: the caller holds none of the hierarchy's locks
    pub(crate) fn unlocked() -> Self {
        Self { _held: PhantomData }
    }
}

impl<'a, L: LockLevel> LockCtx<'a, L> {
    /// Acquire `lock`, which must sit inside the current level.
    ///
    /// Returns the guard and the context for the new level. The current
    /// context stays borrowed until both are gone.
    pub fn lock<'b, N, T>(
        &'b mut self,
        lock: &'b OrderedLock<N, T>,
    ) -> (MutexGuard<'b, T>, LockCtx<'b, N>)
    where
        N: LockAfter<L>,
    {
        log::trace!("GPU PM: lock {} -> {}", L::NAME, N::NAME);
        (lock.inner.lock(), LockCtx { _held: PhantomData })
    }

    /// Name of the innermost held level
    pub fn level_name(&self) -> &'static str {
        L::NAME
    }
}

impl<L: LockLevel> fmt::Debug for LockCtx<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockCtx").field(&L::NAME).finish()
    }
}

static_assertions::assert_impl_all!(Powered: LockAfter<HwAccess>, LockAfter<Pm>, LockAfter<Runpool>);
static_assertions::assert_impl_all!(Pm: LockAfter<Unlocked>, LockAfter<Runpool>);
static_assertions::assert_not_impl_any!(Runpool: LockAfter<Pm>, LockAfter<HwAccess>, LockAfter<Powered>);
static_assertions::assert_not_impl_any!(Pm: LockAfter<Pm>, LockAfter<HwAccess>);
static_assertions::assert_impl_all!(OrderedLock<Pm, u32>: Send, Sync);
