// crates/handoff-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Handoff Gate Interfaces
// Description: Backend-agnostic interfaces for handlers, storage, plans, and checks.
// Purpose: Define the collaborator contracts used by the routing runtime.
// Dependencies: crate::core, async-trait, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Handoff Gate integrates with external systems without
//! embedding backend-specific details. The handler backend and safety
//! classifiers are opaque; the conversation store is the durable source of truth
//! while the in-process cache is a derived view.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AvailableTransition;
use crate::core::CheckVerdict;
use crate::core::ConversationId;
use crate::core::GuardrailContext;
use crate::core::HandlerId;
use crate::core::PlanTable;
use crate::core::RouteNode;
use crate::core::Scope;
use crate::core::Timestamp;
use crate::core::TransitionRequest;
use crate::core::TurnRecord;

// ============================================================================
// SECTION: Handler Backend
// ============================================================================

/// Inputs handed to the handler backend for one turn.
#[derive(Debug, Clone)]
pub struct HandlerInvocation {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// Node being invoked.
    pub node: RouteNode,
    /// Scope the caller resolved to.
    pub scope: Arc<Scope>,
    /// Transcript history loaded from the conversation store.
    pub history: Vec<TurnRecord>,
    /// Current user message.
    pub message: String,
    /// Transitions the node may request this turn.
    pub available_transitions: Vec<AvailableTransition>,
}

/// Reply produced by a handler backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerReply {
    /// Reply text.
    pub reply: String,
    /// Optional transition request.
    #[serde(default)]
    pub transition: Option<TransitionRequest>,
}

impl HandlerReply {
    /// Builds a plain reply without a transition.
    #[must_use]
    pub fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            transition: None,
        }
    }

    /// Attaches a transition request to the reply.
    #[must_use]
    pub fn with_transition(mut self, transition: TransitionRequest) -> Self {
        self.transition = Some(transition);
        self
    }
}

/// Handler backend errors.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The backend reported a failure.
    #[error("handler backend failure: {0}")]
    Failed(String),
    /// The backend is unavailable.
    #[error("handler backend unavailable: {0}")]
    Unavailable(String),
}

/// Backend executing coordinator and handler turns.
#[async_trait]
pub trait HandlerBackend: Send + Sync {
    /// Executes one turn for the invoked node.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the backend cannot produce a reply.
    async fn invoke(&self, invocation: HandlerInvocation) -> Result<HandlerReply, HandlerError>;
}

// ============================================================================
// SECTION: Conversation Store
// ============================================================================

/// Conversation store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("conversation store io error: {0}")]
    Io(String),
    /// Stored data is invalid.
    #[error("conversation store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("conversation store error: {0}")]
    Store(String),
}

/// Durable source of truth for transcripts and the last active handler.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads the last persisted active handler.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    async fn load_active_handler(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<HandlerId>, StoreError>;

    /// Persists the active handler.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    async fn save_active_handler(
        &self,
        conversation_id: &ConversationId,
        active_handler: Option<&HandlerId>,
    ) -> Result<(), StoreError>;

    /// Loads the conversation transcript.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    async fn load_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<TurnRecord>, StoreError>;

    /// Appends finalized turns to the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    async fn append_turns(
        &self,
        conversation_id: &ConversationId,
        turns: &[TurnRecord],
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Plan Catalog
// ============================================================================

/// Plan catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The plan source could not be read.
    #[error("plan catalog unavailable: {0}")]
    Unavailable(String),
    /// The plan source is invalid.
    #[error("plan catalog invalid: {0}")]
    Invalid(String),
}

/// Source of the plan table, consulted on every resolution.
pub trait PlanCatalog: Send + Sync {
    /// Returns the current plan table.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the table cannot be produced.
    fn snapshot(&self) -> Result<Arc<PlanTable>, CatalogError>;
}

// ============================================================================
// SECTION: Guardrail Checks
// ============================================================================

/// Guardrail check errors.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The check failed internally.
    #[error("guardrail check failed: {0}")]
    Failed(String),
    /// An external classifier could not be reached.
    #[error("guardrail classifier unavailable: {0}")]
    Unavailable(String),
}

/// Pluggable guardrail check.
///
/// # Invariants
/// - Checks are independent and side-effect-free with respect to each other.
#[async_trait]
pub trait GuardrailCheck: Send + Sync {
    /// Evaluates the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError`] when the check cannot produce a verdict; the
    /// pipeline treats this as a pass for this check only.
    async fn run(&self, payload: &str, ctx: &GuardrailContext) -> Result<CheckVerdict, CheckError>;
}

/// Score returned by an external safety classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierScore {
    /// Risk score in `[0, 1]`.
    pub score: f64,
    /// Optional classifier label.
    pub label: Option<String>,
}

/// External safety classifier backing classifier-tier checks.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    /// Scores the text.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError`] when the classifier cannot be reached.
    async fn score(&self, text: &str) -> Result<ClassifierScore, CheckError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source injected into the routing runtime.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}
