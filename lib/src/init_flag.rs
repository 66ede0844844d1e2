//! One-shot and re-enterable boolean flags for kernel init sequencing.
//!
//! [`InitFlag`] models "has this subsystem been initialized" — it can only
//! transition uninit → init once, which [`InitFlag::init_once`] makes atomic.
//! [`StateFlag`] models "is this subsystem currently in some state" — it can
//! be entered and left repeatedly, used for shutdown coordination and other
//! reentrant guards.

use core::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be set exactly once and never cleared.
pub struct InitFlag {
    set: AtomicBool,
}

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    /// Returns true once [`mark_set`] (or a winning [`init_once`]) has run.
    ///
    /// [`mark_set`]: InitFlag::mark_set
    /// [`init_once`]: InitFlag::init_once
    #[inline]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Unconditionally mark the flag as set.
    #[inline]
    pub fn mark_set(&self) {
        self.set.store(true, Ordering::Release);
    }

    /// Attempt to claim the flag. Returns `true` for exactly one caller
    /// across the flag's lifetime; all others get `false`.
    #[inline]
    pub fn init_once(&self) -> bool {
        self.set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A flag that can be entered and left repeatedly, e.g. to guard a
/// reentrant critical section or track an in-progress/not state.
pub struct StateFlag {
    active: AtomicBool,
}

impl StateFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// Returns true if the flag is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Try to transition inactive → active. Returns true if this call
    /// performed the transition, false if it was already active.
    #[inline]
    pub fn enter(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transition active → inactive unconditionally.
    #[inline]
    pub fn leave(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Force the flag active without checking the previous state.
    #[inline]
    pub fn set_active(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Atomically read the current state and reset it to inactive.
    #[inline]
    pub fn take(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

impl Default for StateFlag {
    fn default() -> Self {
        Self::new()
    }
}
