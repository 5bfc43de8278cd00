// crates/handoff-gate-core/src/runtime/clock.rs
// ============================================================================
// Module: Handoff Gate Clocks
// Description: Wall-clock and manually driven time sources.
// Purpose: Keep timestamp reads behind the injected clock interface.
// Dependencies: crate::{core, interfaces}, time
// ============================================================================

//! ## Overview
//! [`SystemClock`] reports unix milliseconds from the host clock.
//! [`ManualClock`] is advanced explicitly and is used wherever deterministic
//! timestamps matter, such as idle-timeout eviction tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use time::OffsetDateTime;

use crate::core::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: System Clock
// ============================================================================

/// Clock backed by the host's UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Timestamp::UnixMillis(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current unix milliseconds.
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given unix milliseconds.
    #[must_use]
    pub const fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Advances the clock by `delta_ms` milliseconds.
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::UnixMillis(self.now_ms.load(Ordering::SeqCst))
    }
}
