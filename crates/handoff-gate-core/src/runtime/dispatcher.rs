// crates/handoff-gate-core/src/runtime/dispatcher.rs
// ============================================================================
// Module: Handoff Gate Dispatcher
// Description: Per-message entry point wiring scope, guardrails, and routing.
// Purpose: Turn one inbound user message into exactly one gated response.
// Dependencies: crate::{core, interfaces, runtime}, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! The dispatcher validates the inbound message, resolves the caller's scope,
//! runs the input guardrails, and invokes the handler backend for the node that
//! owns the conversation. A transition requested by the reply is applied under
//! the per-conversation lock and the new owner gets exactly one turn in the same
//! call. The final reply passes through the output guardrails before the turns
//! are appended to the durable store.
//!
//! Security posture: inbound messages and backend replies are untrusted; scope
//! checks are enforced here and in the routing graph, never by the backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::BlockResponse;
use crate::core::CheckId;
use crate::core::ConversationId;
use crate::core::GuardrailCategory;
use crate::core::GuardrailContext;
use crate::core::GuardrailPhase;
use crate::core::HandlerId;
use crate::core::PipelineDecision;
use crate::core::PlanCode;
use crate::core::RequestId;
use crate::core::RouteNode;
use crate::core::Scope;
use crate::core::TransitionEvent;
use crate::core::TurnRecord;
use crate::core::TurnRole;
use crate::interfaces::Clock;
use crate::interfaces::ConversationStore;
use crate::interfaces::HandlerBackend;
use crate::interfaces::HandlerError;
use crate::interfaces::HandlerInvocation;
use crate::interfaces::HandlerReply;
use crate::interfaces::StoreError;
use crate::runtime::audit::RoutingAuditEvent;
use crate::runtime::audit::RoutingAuditKind;
use crate::runtime::audit::RoutingAuditSink;
use crate::runtime::capability::CapabilityResolver;
use crate::runtime::guardrails::GuardrailPipeline;
use crate::runtime::orchestrator::ConversationOrchestrator;
use crate::runtime::orchestrator::OrchestratorError;
use crate::runtime::routing::RoutingGraph;
use crate::runtime::routing::TransitionResult;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default handler backend timeout.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
/// Default maximum inbound message size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// Dispatcher limits and user-facing texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Timeout applied to each handler backend invocation.
    pub handler_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_bytes: usize,
    /// Reply returned when the handler backend fails or times out.
    pub unavailable_message: String,
    /// Reply returned when an input guardrail rejects the message.
    pub input_rejected_message: String,
    /// Reply substituted when an output guardrail blocks without its own fallback.
    pub output_blocked_message: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            unavailable_message: "The assistant is temporarily unavailable. Please try again \
                                  shortly."
                .to_string(),
            input_rejected_message: "Sorry, I can't help with that request.".to_string(),
            output_blocked_message: "Sorry, I can't share that response.".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Requests and Responses
// ============================================================================

/// Inbound user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// Caller's plan code; resolved with fallback when missing or unknown.
    #[serde(default)]
    pub plan_code: Option<PlanCode>,
    /// User message text.
    pub message: String,
    /// Optional request identifier for audit correlation.
    #[serde(default)]
    pub request_id: Option<RequestId>,
}

/// Reply delivered to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReply {
    /// Delivered text (the fallback when an output guardrail blocked).
    pub text: String,
    /// Node that produced the reply.
    pub handled_by: RouteNode,
    /// Transition applied during this dispatch.
    pub transition: Option<TransitionEvent>,
    /// Output checks that fired under a log-only policy.
    pub flagged: Vec<CheckId>,
    /// True when an output guardrail replaced the reply.
    pub output_blocked: bool,
}

/// Input guardrail rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRejection {
    /// Check that fired.
    pub check_id: CheckId,
    /// Check category.
    pub category: GuardrailCategory,
    /// Verdict confidence.
    pub confidence: f64,
    /// User-facing text.
    pub message: String,
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchResponse {
    /// A reply was produced.
    Reply(DispatchReply),
    /// A handoff targeted a handler outside the caller's plan.
    Blocked(BlockResponse),
    /// An input guardrail rejected the message; no handler ran.
    Rejected(InputRejection),
    /// The handler backend failed or timed out; state was not transitioned.
    Unavailable {
        /// User-facing text.
        message: String,
    },
}

/// Dispatch errors surfaced to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The inbound message is malformed.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// The conversation cache could not be used.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl DispatchError {
    /// Returns a stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::Orchestrator(_) => "cache_unavailable",
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Collaborators injected into a [`Dispatcher`].
pub struct DispatcherParts {
    /// Scope resolver.
    pub resolver: Arc<CapabilityResolver>,
    /// Guardrail pipeline assembled at startup.
    pub pipeline: GuardrailPipeline,
    /// Conversation cache.
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// Handler backend.
    pub backend: Arc<dyn HandlerBackend>,
    /// Durable conversation store.
    pub store: Arc<dyn ConversationStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Audit sink.
    pub audit: Arc<dyn RoutingAuditSink>,
}

/// Per-message dispatcher.
pub struct Dispatcher {
    /// Scope resolver.
    resolver: Arc<CapabilityResolver>,
    /// Guardrail pipeline.
    pipeline: GuardrailPipeline,
    /// Conversation cache.
    orchestrator: Arc<ConversationOrchestrator>,
    /// Handler backend.
    backend: Arc<dyn HandlerBackend>,
    /// Durable conversation store.
    store: Arc<dyn ConversationStore>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn RoutingAuditSink>,
    /// Limits and user-facing texts.
    config: DispatcherConfig,
}

/// Correlation identifiers for one dispatch.
struct DispatchIds<'a> {
    /// Conversation identifier.
    conversation_id: &'a ConversationId,
    /// Request identifier.
    request_id: Option<&'a RequestId>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(parts: DispatcherParts, config: DispatcherConfig) -> Self {
        Self {
            resolver: parts.resolver,
            pipeline: parts.pipeline,
            orchestrator: parts.orchestrator,
            backend: parts.backend,
            store: parts.store,
            clock: parts.clock,
            audit: parts.audit,
            config,
        }
    }

    /// Returns the dispatcher configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Returns the conversation cache.
    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<ConversationOrchestrator> {
        &self.orchestrator
    }

    /// Dispatches one inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MalformedInput`] for empty identifiers, empty
    /// messages, or oversized messages, and [`DispatchError::Orchestrator`] when
    /// the conversation cache is unusable.
    pub async fn handle(
        &self,
        request: DispatchRequest,
    ) -> Result<DispatchResponse, DispatchError> {
        self.validate(&request)?;
        let ids = DispatchIds {
            conversation_id: &request.conversation_id,
            request_id: request.request_id.as_ref(),
        };

        let scope = self
            .resolver
            .resolve_for(request.plan_code.as_ref(), Some(ids.conversation_id), ids.request_id)
            .scope;
        let mut ctx = GuardrailContext {
            conversation_id: ids.conversation_id.clone(),
            request_id: ids.request_id.cloned(),
            phase: GuardrailPhase::Input,
            plan_code: scope.plan_code().clone(),
            node: None,
        };
        let input = self.pipeline.run(GuardrailPhase::Input, &request.message, &ctx).await;
        if let PipelineDecision::Blocked {
            check_id,
            category,
            confidence,
            ..
        } = input.decision
        {
            return Ok(DispatchResponse::Rejected(InputRejection {
                check_id,
                category,
                confidence,
                message: self.config.input_rejected_message.clone(),
            }));
        }

        let handle = self.orchestrator.get_or_create(ids.conversation_id, &scope).await?;
        let graph = Arc::clone(handle.graph());
        let mut state = handle.lock_state().await;
        let now = self.clock.now();
        state.touch(now);
        let permitted = state.active_handler.as_ref().is_none_or(|active| {
            self.resolver.can_use_handler(&scope, active) && graph.contains_handler(active)
        });
        if !permitted && let Some(revoked) = state.reset_to_coordinator() {
            self.orchestrator.reset(ids.conversation_id, revoked, "not_permitted").await;
        }

        let history = match self.store.load_history(ids.conversation_id).await {
            Ok(history) => history,
            Err(err) => {
                self.record_store_error(&ids, "load_history", &err);
                Vec::new()
            }
        };
        let addressed = state.active_node();
        let Ok(first) = self
            .invoke(&ids, addressed.clone(), &scope, &graph, history.clone(), &request.message)
            .await
        else {
            return Ok(DispatchResponse::Unavailable {
                message: self.config.unavailable_message.clone(),
            });
        };

        let mut handled_by = addressed.clone();
        let mut reply = first.reply;
        let mut applied = None;
        if let Some(transition) = first.transition {
            match graph.transition(&mut state, &transition, now) {
                TransitionResult::Moved(event) => {
                    self.record(
                        &ids,
                        RoutingAuditKind::Transition {
                            source: event.source.clone(),
                            target: event.target.clone(),
                            reason: event.reason.clone(),
                        },
                    );
                    if let Err(err) = self
                        .store
                        .save_active_handler(ids.conversation_id, state.active_handler.as_ref())
                        .await
                    {
                        self.record_store_error(&ids, "save_active_handler", &err);
                    }
                    let next = state.active_node();
                    if let Ok(second) = self
                        .invoke(&ids, next.clone(), &scope, &graph, history, &request.message)
                        .await
                    {
                        if let Some(extra) = second.transition {
                            self.record(
                                &ids,
                                RoutingAuditKind::HopLimit {
                                    node: next.clone(),
                                    target: extra.target,
                                },
                            );
                        }
                        reply = second.reply;
                        handled_by = next;
                    }
                    applied = Some(event);
                }
                TransitionResult::Denied(cached) => {
                    // Cached graphs outlive plan reloads; the hint comes from the live table.
                    let block = self.resolver.handler_block(&HandlerId::new(cached.blocked_id));
                    self.record(
                        &ids,
                        RoutingAuditKind::TransitionDenied {
                            target: HandlerId::new(block.blocked_id.clone()),
                            plan_required: block.plan_required.clone(),
                        },
                    );
                    let user = self.turn(TurnRole::User, &addressed, &request.message);
                    self.append_turns(&ids, &[user]).await;
                    return Ok(DispatchResponse::Blocked(block));
                }
                TransitionResult::Rejected(rejection) => {
                    self.record(
                        &ids,
                        RoutingAuditKind::TransitionRejected {
                            source: rejection.source,
                            target: rejection.target,
                            kind: rejection.kind,
                            detail: rejection.detail,
                        },
                    );
                }
            }
        }

        ctx.node = Some(handled_by.clone());
        let output = self.pipeline.run(GuardrailPhase::Output, &reply, &ctx).await;
        let (text, flagged, output_blocked) = match output.decision {
            PipelineDecision::Blocked {
                fallback, ..
            } => (
                fallback.unwrap_or_else(|| self.config.output_blocked_message.clone()),
                Vec::new(),
                true,
            ),
            PipelineDecision::Flagged {
                check_ids,
            } => (reply, check_ids, false),
            PipelineDecision::Pass => (reply, Vec::new(), false),
        };

        self.append_turns(
            &ids,
            &[
                self.turn(TurnRole::User, &addressed, &request.message),
                self.turn(TurnRole::Assistant, &handled_by, &text),
            ],
        )
        .await;
        drop(state);

        Ok(DispatchResponse::Reply(DispatchReply {
            text,
            handled_by,
            transition: applied,
            flagged,
            output_blocked,
        }))
    }

    /// Rejects malformed inbound messages.
    fn validate(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        if request.conversation_id.as_str().trim().is_empty() {
            return Err(DispatchError::MalformedInput("conversation id is empty".to_string()));
        }
        if request.message.trim().is_empty() {
            return Err(DispatchError::MalformedInput("message is empty".to_string()));
        }
        if request.message.len() > self.config.max_message_bytes {
            return Err(DispatchError::MalformedInput(format!(
                "message exceeds {} bytes",
                self.config.max_message_bytes
            )));
        }
        Ok(())
    }

    /// Invokes the handler backend for one node under the configured timeout.
    async fn invoke(
        &self,
        ids: &DispatchIds<'_>,
        node: RouteNode,
        scope: &Arc<Scope>,
        graph: &RoutingGraph,
        history: Vec<TurnRecord>,
        message: &str,
    ) -> Result<HandlerReply, HandlerError> {
        let invocation = HandlerInvocation {
            conversation_id: ids.conversation_id.clone(),
            available_transitions: graph.available_transitions(&node),
            node: node.clone(),
            scope: Arc::clone(scope),
            history,
            message: message.to_string(),
        };
        let (outcome, timed_out) =
            match tokio::time::timeout(self.config.handler_timeout, self.backend.invoke(invocation))
                .await
            {
                Ok(outcome) => (outcome, false),
                Err(_) => (
                    Err(HandlerError::Unavailable(format!(
                        "handler timed out after {} ms",
                        u64::try_from(self.config.handler_timeout.as_millis()).unwrap_or(u64::MAX)
                    ))),
                    true,
                ),
            };
        if let Err(err) = &outcome {
            self.record(
                ids,
                RoutingAuditKind::HandlerFailed {
                    node,
                    error: err.to_string(),
                    timed_out,
                },
            );
        }
        outcome
    }

    /// Builds a transcript turn stamped with the current time.
    fn turn(&self, role: TurnRole, node: &RouteNode, text: &str) -> TurnRecord {
        TurnRecord {
            role,
            node: node.clone(),
            text: text.to_string(),
            at: self.clock.now(),
        }
    }

    /// Appends turns to the store, auditing failures.
    async fn append_turns(&self, ids: &DispatchIds<'_>, turns: &[TurnRecord]) {
        if let Err(err) = self.store.append_turns(ids.conversation_id, turns).await {
            self.record_store_error(ids, "append_turns", &err);
        }
    }

    /// Records a dispatch-scoped audit event.
    fn record(&self, ids: &DispatchIds<'_>, kind: RoutingAuditKind) {
        self.audit.record(&RoutingAuditEvent::new(
            Some(ids.conversation_id.clone()),
            ids.request_id.cloned(),
            kind,
        ));
    }

    /// Records a store failure.
    fn record_store_error(&self, ids: &DispatchIds<'_>, operation: &'static str, err: &StoreError) {
        self.record(
            ids,
            RoutingAuditKind::StoreError {
                operation,
                error: err.to_string(),
            },
        );
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
