// crates/handoff-gate-core/src/core/state.rs
// ============================================================================
// Module: Handoff Gate Conversation State
// Description: Conversation ownership state, transition requests, and events.
// Purpose: Provide serializable records for routing decisions and audits.
// Dependencies: crate::core::{handlers, identifiers, scope, time}, serde
// ============================================================================

//! ## Overview
//! [`ConversationState`] records which handler currently owns a conversation.
//! It is mutated only by routing transitions under the orchestrator's
//! per-conversation lock. Transition requests and events are plain data so the
//! handler backend never holds a reference to routing internals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::handlers::RouteNode;
use crate::core::identifiers::ConversationId;
use crate::core::identifiers::HandlerId;
use crate::core::scope::ScopeFingerprint;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Conversation State
// ============================================================================

/// Routing state for a single conversation.
///
/// # Invariants
/// - `active_handler` is `None` (coordinator) or a handler enabled in the scope
///   identified by `scope_fingerprint`.
/// - Once published, ownership changes only through `RoutingGraph::transition`
///   or [`ConversationState::reset_to_coordinator`], both under the
///   per-conversation lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// Handler currently owning the conversation; `None` is the coordinator.
    pub active_handler: Option<HandlerId>,
    /// Fingerprint of the scope the state was built for.
    pub scope_fingerprint: ScopeFingerprint,
    /// Time the state was created in this process.
    pub created_at: Timestamp,
    /// Time the state was last accessed.
    pub last_accessed_at: Timestamp,
}

impl ConversationState {
    /// Returns the node currently owning the conversation.
    #[must_use]
    pub fn active_node(&self) -> RouteNode {
        RouteNode::from_active(self.active_handler.as_ref())
    }

    /// Records an access at `at`.
    pub const fn touch(&mut self, at: Timestamp) {
        self.last_accessed_at = at;
    }

    /// Hands the conversation back to the coordinator, returning the previous owner.
    pub const fn reset_to_coordinator(&mut self) -> Option<HandlerId> {
        self.active_handler.take()
    }
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Transition requested by a handler (or the coordinator) in its reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    /// Requested target node.
    pub target: RouteNode,
    /// Structured handoff reason, validated against the edge schema.
    #[serde(default)]
    pub reason: Value,
    /// Explicit topic-change flag required for handler-to-coordinator returns.
    #[serde(default)]
    pub topic_change: bool,
}

impl TransitionRequest {
    /// Builds a handoff request towards a handler.
    #[must_use]
    pub fn handoff(target: HandlerId, reason: Value) -> Self {
        Self {
            target: RouteNode::Handler(target),
            reason,
            topic_change: false,
        }
    }

    /// Builds an explicit topic-change return to the coordinator.
    #[must_use]
    pub fn return_to_coordinator(reason: Value) -> Self {
        Self {
            target: RouteNode::Coordinator,
            reason,
            topic_change: true,
        }
    }
}

/// Transition offered to a node for the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableTransition {
    /// Target node.
    pub target: RouteNode,
    /// Edge description.
    pub description: String,
    /// Reason schema the request must satisfy.
    pub reason_schema: Value,
    /// True when the transition is only honoured with `topic_change = true`.
    pub requires_topic_change: bool,
}

/// Audit record of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// Node that owned the conversation before the transition.
    pub source: RouteNode,
    /// Node owning the conversation after the transition.
    pub target: RouteNode,
    /// Handoff reason.
    pub reason: Value,
    /// Transition time.
    pub at: Timestamp,
}

/// Why a transition request was rejected without a capability block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The target handler is not registered at all.
    UnknownTarget,
    /// The request targets the node that already owns the conversation.
    SelfTransition,
    /// Handlers may only return to the coordinator.
    HandlerToHandler,
    /// A return to the coordinator was requested without `topic_change`.
    TopicChangeRequired,
    /// The reason does not satisfy the edge schema.
    InvalidReason,
}

impl RejectionKind {
    /// Returns a stable label for the rejection.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTarget => "unknown_target",
            Self::SelfTransition => "self_transition",
            Self::HandlerToHandler => "handler_to_handler",
            Self::TopicChangeRequired => "topic_change_required",
            Self::InvalidReason => "invalid_reason",
        }
    }
}

/// Structured rejection of a transition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRejection {
    /// Node that requested the transition.
    pub source: RouteNode,
    /// Requested target.
    pub target: RouteNode,
    /// Rejection classification.
    pub kind: RejectionKind,
    /// Human-readable detail.
    pub detail: String,
}

// ============================================================================
// SECTION: Transcript Turns
// ============================================================================

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The end user.
    User,
    /// A routing node (coordinator or handler).
    Assistant,
}

/// Single transcript turn stored in the durable conversation store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Author of the turn.
    pub role: TurnRole,
    /// Node that produced an assistant turn, or was addressed by a user turn.
    pub node: RouteNode,
    /// Turn text.
    pub text: String,
    /// Turn time.
    pub at: Timestamp,
}
