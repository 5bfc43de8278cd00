// crates/handoff-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Handoff Gate Runtime
// Description: Scope resolution, guardrails, routing, caching, and dispatch.
// Purpose: Implement the per-message gating flow over the core data types.
// Dependencies: crate::{core, interfaces}, jsonschema, regex, tokio
// ============================================================================

//! ## Overview
//! Runtime components are assembled once at startup and shared across
//! dispatches:
//! - [`CapabilityResolver`] maps plan codes to scopes.
//! - [`GuardrailPipeline`] screens inbound messages and outbound replies.
//! - [`HandoffRegistry`] builds per-scope [`RoutingGraph`] values.
//! - [`ConversationOrchestrator`] caches graphs and state per conversation.
//! - [`Dispatcher`] drives one message through all of the above.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod capability;
pub mod checks;
pub mod clock;
pub mod dispatcher;
pub mod guardrails;
pub mod orchestrator;
pub mod routing;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::InMemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RoutingAuditEvent;
pub use audit::RoutingAuditKind;
pub use audit::RoutingAuditSink;
pub use audit::StderrAuditSink;
pub use capability::CapabilityResolver;
pub use capability::StaticPlanCatalog;
pub use capability::handler_block_for;
pub use capability::tool_block_for;
pub use checks::CheckBuildError;
pub use checks::ClassifierCheck;
pub use checks::LengthCheck;
pub use checks::PatternCheck;
pub use checks::PatternRule;
pub use checks::PiiCheck;
pub use checks::PiiKind;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use dispatcher::DEFAULT_HANDLER_TIMEOUT;
pub use dispatcher::DEFAULT_MAX_MESSAGE_BYTES;
pub use dispatcher::DispatchError;
pub use dispatcher::DispatchReply;
pub use dispatcher::DispatchRequest;
pub use dispatcher::DispatchResponse;
pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherConfig;
pub use dispatcher::DispatcherParts;
pub use dispatcher::InputRejection;
pub use guardrails::CheckRegistration;
pub use guardrails::DEFAULT_CHECK_TIMEOUT;
pub use guardrails::GuardrailBuildError;
pub use guardrails::GuardrailPipeline;
pub use guardrails::GuardrailPipelineBuilder;
pub use orchestrator::CacheEntryInfo;
pub use orchestrator::ConversationHandle;
pub use orchestrator::ConversationOrchestrator;
pub use orchestrator::EvictionPolicy;
pub use orchestrator::IdleTimeout;
pub use orchestrator::MaxEntries;
pub use orchestrator::NoEviction;
pub use orchestrator::OrchestratorError;
pub use orchestrator::OrchestratorStats;
pub use routing::HandoffRegistry;
pub use routing::RETURN_EDGE_DESCRIPTION;
pub use routing::RegistryError;
pub use routing::RouteEdge;
pub use routing::RoutingGraph;
pub use routing::RoutingGraphSummary;
pub use routing::TransitionResult;
pub use store::InMemoryConversationStore;
