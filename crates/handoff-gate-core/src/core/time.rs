// crates/handoff-gate-core/src/core/time.rs
// ============================================================================
// Module: Handoff Gate Time Model
// Description: Canonical timestamp representations for state and audit records.
// Purpose: Keep the routing core independent of the wall clock.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Conversation state carries explicit timestamps supplied by an injected
//! [`Clock`](crate::interfaces::Clock). The routing core never reads wall-clock
//! time directly, which keeps eviction and ordering deterministic under test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in conversation state and transition events.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Logical ticks are interpreted as milliseconds for interval arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value.
    Logical(u64),
}

impl Timestamp {
    /// Returns the timestamp as unix milliseconds when available.
    #[must_use]
    pub const fn as_unix_millis(&self) -> Option<i64> {
        match self {
            Self::UnixMillis(value) => Some(*value),
            Self::Logical(_) => None,
        }
    }

    /// Returns the timestamp as logical time when available.
    #[must_use]
    pub const fn as_logical(&self) -> Option<u64> {
        match self {
            Self::UnixMillis(_) => None,
            Self::Logical(value) => Some(*value),
        }
    }

    /// Returns the number of milliseconds elapsed since `earlier`.
    ///
    /// Returns `None` when the variants differ; returns `Some(0)` when
    /// `earlier` is later than `self`.
    #[must_use]
    pub fn millis_since(&self, earlier: &Self) -> Option<u64> {
        match (self, earlier) {
            (Self::UnixMillis(now), Self::UnixMillis(then)) => {
                Some(u64::try_from(now.saturating_sub(*then)).unwrap_or(0))
            }
            (Self::Logical(now), Self::Logical(then)) => Some(now.saturating_sub(*then)),
            _ => None,
        }
    }

    /// Returns a comparable ordinal used to order timestamps of the same kind.
    #[must_use]
    pub fn ordinal(&self) -> i128 {
        match self {
            Self::UnixMillis(value) => i128::from(*value),
            Self::Logical(value) => i128::from(*value),
        }
    }
}
