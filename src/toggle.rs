//! Benchmark toggle and re-entrancy guard
//!
//! Two flags decide whether an intercepted call may launch a measurement run:
//!
//! - `enabled`: the next eligible call should be measured
//! - `in_execution`: a measurement run issued by this process is in flight
//!
//! Both flags live in a single `AtomicU8` so acquire and release are each one
//! compare-and-set with a total order on the pair. Nothing here blocks.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

const ENABLED: u8 = 0b01;
const IN_EXECUTION: u8 = 0b10;

static PROCESS_WIDE: OnceLock<Arc<ToggleState>> = OnceLock::new();

/// Point-in-time view of both flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleSnapshot {
    pub enabled: bool,
    pub in_execution: bool,
}

/// Shared enable flag plus recursion guard
#[derive(Debug)]
pub struct ToggleState {
    bits: AtomicU8,
}

impl ToggleState {
    /// Create an independent toggle seeded with `enabled`
    pub fn new(enabled: bool) -> Self {
        Self {
            bits: AtomicU8::new(if enabled { ENABLED } else { 0 }),
        }
    }

    /// The toggle shared by every facade in this process.
    ///
    /// The first caller's `seed` wins; later seeds are ignored because the
    /// flags are owned by the dispatch protocol from then on.
    pub fn process_wide(seed: bool) -> Arc<ToggleState> {
        let mut seeded = false;
        let state = PROCESS_WIDE.get_or_init(|| {
            seeded = true;
            Arc::new(ToggleState::new(seed))
        });
        if !seeded {
            tracing::debug!(seed, "process-wide toggle already seeded, ignoring");
        }
        Arc::clone(state)
    }

    /// Transition `(enabled, idle)` to `(disabled, in execution)`.
    ///
    /// Returns false without changing anything when benchmarking is disabled
    /// or another run is already in flight.
    pub fn try_acquire(&self) -> bool {
        self.bits
            .compare_exchange(ENABLED, IN_EXECUTION, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Like [`try_acquire`](Self::try_acquire), but returns a guard that
    /// releases (restoring `enabled`) when dropped.
    pub fn acquire(&self) -> Option<ExecutionGuard<'_>> {
        // Build the guard only on success; dropping one releases the slot
        self.try_acquire().then(|| ExecutionGuard {
            state: self,
            restore_enabled: true,
        })
    }

    /// End the in-flight run.
    ///
    /// # Panics
    ///
    /// Panics if no run is in flight. That means the recursion guard is broken
    /// and continuing would allow nested measurement runs.
    pub fn release(&self, restore_enabled: bool) {
        let next = if restore_enabled { ENABLED } else { 0 };
        if let Err(actual) =
            self.bits
                .compare_exchange(IN_EXECUTION, next, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "guard violation: release without a matching acquire (state {:#04b})",
                actual
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bits.load(Ordering::Acquire) & ENABLED != 0
    }

    pub fn in_execution(&self) -> bool {
        self.bits.load(Ordering::Acquire) & IN_EXECUTION != 0
    }

    /// Read both flags atomically
    pub fn snapshot(&self) -> ToggleSnapshot {
        let bits = self.bits.load(Ordering::Acquire);
        ToggleSnapshot {
            enabled: bits & ENABLED != 0,
            in_execution: bits & IN_EXECUTION != 0,
        }
    }
}

/// Proof that the caller owns the in-flight measurement slot
#[derive(Debug)]
pub struct ExecutionGuard<'a> {
    state: &'a ToggleState,
    restore_enabled: bool,
}

impl ExecutionGuard<'_> {
    /// Leave `enabled` cleared when this guard is released
    pub fn keep_disabled(&mut self) {
        self.restore_enabled = false;
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.state.release(self.restore_enabled);
    }
}
