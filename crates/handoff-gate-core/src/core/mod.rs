// crates/handoff-gate-core/src/core/mod.rs
// ============================================================================
// Module: Handoff Gate Core Types
// Description: Canonical routing, scope, and guardrail data structures.
// Purpose: Provide stable, serializable types shared by all runtime components.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define plans, scopes, handler descriptors, conversation state, and
//! guardrail records. They are pure data: behaviour lives in
//! [`crate::runtime`], collaborators are described in [`crate::interfaces`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod guardrail;
pub mod handlers;
pub mod hashing;
pub mod identifiers;
pub mod plans;
pub mod scope;
pub mod state;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use guardrail::CheckOutcome;
pub use guardrail::CheckStatus;
pub use guardrail::CheckTier;
pub use guardrail::CheckVerdict;
pub use guardrail::GuardrailCategory;
pub use guardrail::GuardrailContext;
pub use guardrail::GuardrailPhase;
pub use guardrail::OutputPolicy;
pub use guardrail::PipelineDecision;
pub use guardrail::PipelineResult;
pub use handlers::HandlerDescriptor;
pub use handlers::RouteNode;
pub use handlers::RoutingEdgeTemplate;
pub use identifiers::CheckId;
pub use identifiers::ConversationId;
pub use identifiers::HandlerId;
pub use identifiers::PlanCode;
pub use identifiers::RequestId;
pub use identifiers::ToolId;
pub use plans::PlanDefinition;
pub use plans::PlanTable;
pub use plans::PlanTableError;
pub use scope::BlockResponse;
pub use scope::BlockedKind;
pub use scope::FallbackReason;
pub use scope::Scope;
pub use scope::ScopeFallback;
pub use scope::ScopeFingerprint;
pub use scope::ScopeResolution;
pub use state::AvailableTransition;
pub use state::ConversationState;
pub use state::RejectionKind;
pub use state::TransitionEvent;
pub use state::TransitionRejection;
pub use state::TransitionRequest;
pub use state::TurnRecord;
pub use state::TurnRole;
pub use time::Timestamp;
