// crates/handoff-gate-core/src/core/guardrail.rs
// ============================================================================
// Module: Handoff Gate Guardrail Records
// Description: Phases, verdicts, and pipeline results for safety checks.
// Purpose: Provide serializable guardrail outcomes for responses and audits.
// Dependencies: crate::core::{handlers, identifiers}, serde
// ============================================================================

//! ## Overview
//! Guardrail checks run in an input phase (before any handler is invoked) and an
//! output phase (before a reply is delivered). Each check yields a
//! [`CheckVerdict`]; the pipeline aggregates per-check [`CheckOutcome`] records
//! into a single [`PipelineDecision`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::handlers::RouteNode;
use crate::core::identifiers::CheckId;
use crate::core::identifiers::ConversationId;
use crate::core::identifiers::PlanCode;
use crate::core::identifiers::RequestId;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Pipeline phase a check runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailPhase {
    /// Inbound user message, before handler invocation.
    Input,
    /// Outbound reply, before delivery.
    Output,
}

impl GuardrailPhase {
    /// Returns a stable label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Category of risk a check screens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailCategory {
    /// Attempts to override system instructions.
    PromptInjection,
    /// Attempts to bypass safety policy.
    Jailbreak,
    /// Personally identifiable information.
    Pii,
    /// Abusive or harmful language.
    Toxicity,
    /// Requests outside the product's domain.
    OffTopic,
    /// Payload size limits.
    Length,
    /// Deployment-specific category.
    Other,
}

/// Latency tier of a check.
///
/// # Invariants
/// - Heuristic checks always run before classifier checks in the same phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckTier {
    /// Fast local pattern or heuristic check.
    Heuristic,
    /// Higher-latency check backed by an external classifier.
    Classifier,
}

/// Output-phase tripwire policy for a check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputPolicy {
    /// Deliver the reply unchanged and record the tripwire.
    #[default]
    LogOnly,
    /// Replace the reply with a fallback response.
    Block {
        /// Replacement reply text.
        fallback: String,
    },
}

// ============================================================================
// SECTION: Check Inputs
// ============================================================================

/// Context handed to each check alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailContext {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// Request identifier when provided.
    pub request_id: Option<RequestId>,
    /// Phase being evaluated.
    pub phase: GuardrailPhase,
    /// Plan the caller resolved to.
    pub plan_code: PlanCode,
    /// Node that produced the payload (output phase only).
    pub node: Option<RouteNode>,
}

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// Result reported by a single check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckVerdict {
    /// True when the check wants normal processing halted.
    pub tripwire: bool,
    /// Confidence in the verdict, in `[0, 1]`.
    pub confidence: f64,
    /// Check-provided metadata (never raw payload text).
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl CheckVerdict {
    /// Builds a passing verdict.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            tripwire: false,
            confidence: 0.0,
            info: Map::new(),
        }
    }

    /// Builds a tripped verdict.
    #[must_use]
    pub fn trip(confidence: f64, info: Map<String, Value>) -> Self {
        Self {
            tripwire: true,
            confidence: confidence.clamp(0.0, 1.0),
            info,
        }
    }
}

/// Final status of a check within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// The check passed.
    Passed,
    /// The check reported a tripwire.
    Tripped,
    /// The check failed internally; treated as a pass.
    Failed,
    /// The check exceeded its timeout; treated as a pass.
    TimedOut,
    /// The check was skipped after an earlier tier tripped.
    Skipped,
}

/// Per-check outcome recorded by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Check identifier.
    pub check_id: CheckId,
    /// Check category.
    pub category: GuardrailCategory,
    /// Check tier.
    pub tier: CheckTier,
    /// Final status.
    pub status: CheckStatus,
    /// Verdict confidence when the check completed.
    pub confidence: Option<f64>,
    /// Check metadata when the check completed.
    #[serde(default)]
    pub info: Map<String, Value>,
    /// Failure detail for failed or timed-out checks.
    pub error: Option<String>,
    /// Wall-clock duration of the check in milliseconds.
    pub elapsed_ms: u64,
}

/// Aggregated pipeline decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PipelineDecision {
    /// No blocking tripwire fired.
    Pass,
    /// A blocking tripwire fired.
    Blocked {
        /// Check that fired.
        check_id: CheckId,
        /// Category of the check.
        category: GuardrailCategory,
        /// Verdict confidence.
        confidence: f64,
        /// Check metadata.
        info: Map<String, Value>,
        /// Replacement reply for output-phase blocks.
        fallback: Option<String>,
    },
    /// Output tripwires fired under a log-only policy.
    Flagged {
        /// Checks that fired.
        check_ids: Vec<CheckId>,
    },
}

/// Result of running one pipeline phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Phase that ran.
    pub phase: GuardrailPhase,
    /// Aggregated decision.
    pub decision: PipelineDecision,
    /// Outcomes collected before aggregation completed.
    pub outcomes: Vec<CheckOutcome>,
}

impl PipelineResult {
    /// Returns true when a blocking tripwire fired.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self.decision, PipelineDecision::Blocked { .. })
    }

    /// Returns the outcome recorded for a check.
    #[must_use]
    pub fn outcome(&self, check_id: &CheckId) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|outcome| &outcome.check_id == check_id)
    }
}
