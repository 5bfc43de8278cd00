// crates/handoff-gate-core/src/lib.rs
// ============================================================================
// Module: Handoff Gate Core Library
// Description: Capability-gated conversational routing layer.
// Purpose: Route each user message to exactly one permitted handler.
// Dependencies: async-trait, jsonschema, regex, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! Handoff Gate sits between inbound user messages and a set of specialized
//! conversational handlers. A coordinator owns each conversation until it
//! hands off to a handler enabled by the caller's subscription plan; the
//! handler owns subsequent turns until it explicitly returns with a topic
//! change.
//! Invariants:
//! - A conversation is owned by exactly one node at a time.
//! - Handlers outside the caller's scope are never reachable; requests for them
//!   yield a structured [`BlockResponse`] upgrade hint.
//! - Input guardrail tripwires prevent any handler invocation.
//!
//! Security posture: messages, plan codes, and backend replies are untrusted;
//! audit events never carry raw message text.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use crate::interfaces::CatalogError;
pub use crate::interfaces::CheckError;
pub use crate::interfaces::ClassifierScore;
pub use crate::interfaces::Clock;
pub use crate::interfaces::ConversationStore;
pub use crate::interfaces::GuardrailCheck;
pub use crate::interfaces::HandlerBackend;
pub use crate::interfaces::HandlerError;
pub use crate::interfaces::HandlerInvocation;
pub use crate::interfaces::HandlerReply;
pub use crate::interfaces::PlanCatalog;
pub use crate::interfaces::SafetyClassifier;
pub use crate::interfaces::StoreError;
pub use crate::runtime::*;
