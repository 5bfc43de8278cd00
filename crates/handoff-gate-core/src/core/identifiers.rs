// crates/handoff-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Handoff Gate Identifiers
// Description: Canonical opaque identifiers for handlers, plans, and conversations.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the string-based identifiers used throughout Handoff Gate.
//! Identifiers are opaque and serialize as strings. Validation (non-empty, length)
//! is handled at configuration and dispatch boundaries rather than here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier with the shared constructor surface.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier! {
    /// Identifier of a specialized conversation handler.
    HandlerId
}

string_identifier! {
    /// Identifier of a tool a handler may call on behalf of the user.
    ToolId
}

string_identifier! {
    /// Subscription plan code as supplied by the billing system.
    ///
    /// Codes are matched after normalization; see
    /// [`PlanCode::normalized`].
    PlanCode
}

string_identifier! {
    /// Conversation identifier; the unit of routing state ownership.
    ConversationId
}

string_identifier! {
    /// Guardrail check identifier.
    CheckId
}

string_identifier! {
    /// Caller-supplied request identifier used to correlate audit events.
    RequestId
}

impl PlanCode {
    /// Returns the normalized lookup form of the code.
    ///
    /// Normalization trims whitespace, lowercases ASCII, and folds `-` and
    /// spaces into `_` so `Business-Annual` and `business_annual` match.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0
            .trim()
            .chars()
            .map(|ch| match ch {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect()
    }
}
