// crates/handoff-gate-core/src/core/scope.rs
// ============================================================================
// Module: Handoff Gate Scopes
// Description: Capability scopes granted by subscription plans.
// Purpose: Describe which handlers and tools a caller may reach.
// Dependencies: crate::core::{hashing, identifiers}, serde
// ============================================================================

//! ## Overview
//! A [`Scope`] is the immutable result of resolving a plan code. It carries the
//! enabled handler and tool sets plus a [`ScopeFingerprint`] used to key cached
//! routing graphs. Blocked capabilities are described with [`BlockResponse`],
//! which downstream renderers turn into upgrade prompts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::sha256_canonical_json;
use crate::core::hashing::sha256_hex;
use crate::core::identifiers::HandlerId;
use crate::core::identifiers::PlanCode;
use crate::core::identifiers::ToolId;

// ============================================================================
// SECTION: Scope Fingerprint
// ============================================================================

/// Stable digest of a scope's capability sets.
///
/// # Invariants
/// - Equal handler and tool sets always produce equal fingerprints.
/// - Descriptions and limitations do not contribute to the digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeFingerprint(String);

impl ScopeFingerprint {
    /// Returns the fingerprint as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Canonical payload hashed into a scope fingerprint.
#[derive(Serialize)]
struct FingerprintPayload<'a> {
    /// Enabled handler identifiers (sorted).
    handlers: &'a BTreeSet<HandlerId>,
    /// Enabled tool identifiers (sorted).
    tools: &'a BTreeSet<ToolId>,
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Capabilities granted to a caller for a single resolution.
///
/// # Invariants
/// - Immutable after construction; shared by reference across readers.
/// - `fingerprint` always matches the handler and tool sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    /// Plan that produced this scope (after fallback).
    plan_code: PlanCode,
    /// Enabled handler identifiers.
    enabled_handlers: BTreeSet<HandlerId>,
    /// Enabled tool identifiers.
    enabled_tools: BTreeSet<ToolId>,
    /// Human-readable plan description.
    description: String,
    /// Human-readable limitations of the plan.
    limitations: Vec<String>,
    /// Digest of the capability sets.
    fingerprint: ScopeFingerprint,
}

impl Scope {
    /// Builds a scope and computes its fingerprint.
    #[must_use]
    pub fn new(
        plan_code: PlanCode,
        enabled_handlers: BTreeSet<HandlerId>,
        enabled_tools: BTreeSet<ToolId>,
        description: impl Into<String>,
        limitations: Vec<String>,
    ) -> Self {
        let fingerprint = compute_fingerprint(&enabled_handlers, &enabled_tools);
        Self {
            plan_code,
            enabled_handlers,
            enabled_tools,
            description: description.into(),
            limitations,
            fingerprint,
        }
    }

    /// Returns the plan code that produced the scope.
    #[must_use]
    pub const fn plan_code(&self) -> &PlanCode {
        &self.plan_code
    }

    /// Returns the enabled handler set.
    #[must_use]
    pub const fn enabled_handlers(&self) -> &BTreeSet<HandlerId> {
        &self.enabled_handlers
    }

    /// Returns the enabled tool set.
    #[must_use]
    pub const fn enabled_tools(&self) -> &BTreeSet<ToolId> {
        &self.enabled_tools
    }

    /// Returns the plan description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the plan limitations.
    #[must_use]
    pub fn limitations(&self) -> &[String] {
        &self.limitations
    }

    /// Returns the capability fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &ScopeFingerprint {
        &self.fingerprint
    }

    /// Returns true when the handler is enabled.
    #[must_use]
    pub fn allows_handler(&self, id: &HandlerId) -> bool {
        self.enabled_handlers.contains(id)
    }

    /// Returns true when the tool is enabled.
    #[must_use]
    pub fn allows_tool(&self, id: &ToolId) -> bool {
        self.enabled_tools.contains(id)
    }
}

/// Computes the fingerprint for the provided capability sets.
fn compute_fingerprint(
    handlers: &BTreeSet<HandlerId>,
    tools: &BTreeSet<ToolId>,
) -> ScopeFingerprint {
    let payload = FingerprintPayload {
        handlers,
        tools,
    };
    let digest = sha256_canonical_json(&payload).unwrap_or_else(|_| {
        let mut raw = String::from("h:");
        for handler in handlers {
            raw.push_str(handler.as_str());
            raw.push('\u{1f}');
        }
        raw.push_str("t:");
        for tool in tools {
            raw.push_str(tool.as_str());
            raw.push('\u{1f}');
        }
        sha256_hex(raw.as_bytes())
    });
    ScopeFingerprint(digest)
}

// ============================================================================
// SECTION: Scope Resolution
// ============================================================================

/// Reason a plan code did not resolve to an exact plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No plan code was supplied.
    Missing,
    /// The code is an unrecognized variant of a known plan.
    UnrecognizedVariant,
    /// The code matches no known plan.
    Unknown,
}

impl FallbackReason {
    /// Returns a stable label for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::UnrecognizedVariant => "unrecognized_variant",
            Self::Unknown => "unknown",
        }
    }
}

/// Details of a fallback applied during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFallback {
    /// Plan code as supplied by the caller, when present.
    pub requested: Option<PlanCode>,
    /// Plan the resolver fell back to.
    pub resolved: PlanCode,
    /// Why the fallback was applied.
    pub reason: FallbackReason,
}

/// Result of resolving a plan code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeResolution {
    /// Resolved scope.
    pub scope: Arc<Scope>,
    /// Fallback details when the code did not match exactly.
    pub fallback: Option<ScopeFallback>,
}

// ============================================================================
// SECTION: Block Responses
// ============================================================================

/// Kind of capability that was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedKind {
    /// A handler was blocked.
    Handler,
    /// A tool was blocked.
    Tool,
}

/// Structured response describing a capability the caller's plan lacks.
///
/// # Invariants
/// - `plan_required` is the lowest-ranked plan granting the capability, or
///   `None` when no plan grants it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResponse {
    /// Identifier of the blocked handler or tool.
    pub blocked_id: String,
    /// Kind of blocked capability.
    pub kind: BlockedKind,
    /// Minimum plan that grants the capability.
    pub plan_required: Option<PlanCode>,
    /// Benefits of upgrading to `plan_required`.
    pub benefits: Vec<String>,
}
