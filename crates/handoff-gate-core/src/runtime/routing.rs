// crates/handoff-gate-core/src/runtime/routing.rs
// ============================================================================
// Module: Handoff Gate Routing
// Description: Handoff registry, scope-filtered routing graphs, and transitions.
// Purpose: Keep handler ownership moves within the caller's capabilities.
// Dependencies: crate::{core, runtime::capability}, jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The [`HandoffRegistry`] holds static handler descriptors and
//! coordinator-to-handler edge templates. [`HandoffRegistry::build_graph`]
//! materializes a [`RoutingGraph`] for one scope: an edge per template whose
//! target the scope enables, and a return edge per reachable handler that is
//! only honoured for an explicit topic change. The topology is a star; there
//! are no handler-to-handler edges.
//!
//! [`RoutingGraph::transition`] is a pure function over explicitly passed state.
//!
//! Security posture: handoff reasons come from model output and are validated
//! against the edge's JSON Schema before any ownership change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use jsonschema::Draft;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::AvailableTransition;
use crate::core::BlockResponse;
use crate::core::ConversationState;
use crate::core::HandlerDescriptor;
use crate::core::HandlerId;
use crate::core::PlanCode;
use crate::core::PlanTable;
use crate::core::RejectionKind;
use crate::core::RouteNode;
use crate::core::RoutingEdgeTemplate;
use crate::core::Scope;
use crate::core::ScopeFingerprint;
use crate::core::Timestamp;
use crate::core::TransitionEvent;
use crate::core::TransitionRejection;
use crate::core::TransitionRequest;
use crate::runtime::capability::handler_block_for;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Description of the handler-to-coordinator return edge.
pub const RETURN_EDGE_DESCRIPTION: &str = "Return the conversation to the coordinator for a new topic";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Handoff registry construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler identifier is blank.
    #[error("handler id must be non-empty")]
    BlankHandlerId,
    /// Two handlers share an identifier.
    #[error("duplicate handler id: {0}")]
    DuplicateHandler(String),
    /// Two edge templates target the same handler.
    #[error("duplicate edge template for handler: {0}")]
    DuplicateEdge(String),
    /// An edge template targets an unregistered handler.
    #[error("edge template targets unknown handler: {0}")]
    UnknownEdgeTarget(String),
    /// An edge's reason schema does not compile.
    #[error("invalid reason schema for handler {handler}: {error}")]
    InvalidReasonSchema {
        /// Edge target.
        handler: String,
        /// Compiler error.
        error: String,
    },
}

impl RegistryError {
    /// Returns a stable error code label.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BlankHandlerId => "blank_handler_id",
            Self::DuplicateHandler(_) => "duplicate_handler",
            Self::DuplicateEdge(_) => "duplicate_edge",
            Self::UnknownEdgeTarget(_) => "unknown_edge_target",
            Self::InvalidReasonSchema { .. } => "invalid_reason_schema",
        }
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Edge template with its compiled reason schema.
struct CompiledEdge {
    /// Source template.
    template: RoutingEdgeTemplate,
    /// Compiled reason validator.
    validator: Validator,
}

/// Static registry of handlers and coordinator edge templates.
///
/// # Invariants
/// - Handler ids are unique and non-empty.
/// - Each template targets a registered handler and at most one template exists per handler.
/// - Every reason schema compiles as JSON Schema 2020-12.
pub struct HandoffRegistry {
    /// Handler descriptors by id.
    handlers: BTreeMap<HandlerId, HandlerDescriptor>,
    /// Compiled edges by target.
    edges: BTreeMap<HandlerId, Arc<CompiledEdge>>,
}

impl HandoffRegistry {
    /// Validates and builds a registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when ids repeat, templates dangle, or a reason
    /// schema fails to compile.
    pub fn new(
        descriptors: Vec<HandlerDescriptor>,
        templates: Vec<RoutingEdgeTemplate>,
    ) -> Result<Self, RegistryError> {
        let mut handlers = BTreeMap::new();
        for descriptor in descriptors {
            if descriptor.id.as_str().trim().is_empty() {
                return Err(RegistryError::BlankHandlerId);
            }
            let id = descriptor.id.clone();
            if handlers.insert(id.clone(), descriptor).is_some() {
                return Err(RegistryError::DuplicateHandler(id.to_string()));
            }
        }
        let mut edges = BTreeMap::new();
        for template in templates {
            if !handlers.contains_key(&template.target) {
                return Err(RegistryError::UnknownEdgeTarget(template.target.to_string()));
            }
            if edges.contains_key(&template.target) {
                return Err(RegistryError::DuplicateEdge(template.target.to_string()));
            }
            let validator = compile_reason_schema(&template.reason_schema).map_err(|error| {
                RegistryError::InvalidReasonSchema {
                    handler: template.target.to_string(),
                    error,
                }
            })?;
            edges.insert(
                template.target.clone(),
                Arc::new(CompiledEdge {
                    template,
                    validator,
                }),
            );
        }
        Ok(Self {
            handlers,
            edges,
        })
    }

    /// Returns the registered handler identifiers in sorted order.
    pub fn handler_ids(&self) -> impl Iterator<Item = &HandlerId> {
        self.handlers.keys()
    }

    /// Returns a handler descriptor.
    #[must_use]
    pub fn descriptor(&self, id: &HandlerId) -> Option<&HandlerDescriptor> {
        self.handlers.get(id)
    }

    /// Returns the edge template targeting a handler.
    #[must_use]
    pub fn edge_template(&self, id: &HandlerId) -> Option<&RoutingEdgeTemplate> {
        self.edges.get(id).map(|edge| &edge.template)
    }

    /// Materializes the routing graph for a scope.
    ///
    /// Registered handlers the scope does not reach carry an upgrade hint
    /// computed from `plans`.
    #[must_use]
    pub fn build_graph(&self, scope: &Scope, plans: &PlanTable) -> RoutingGraph {
        let mut edges = BTreeMap::new();
        let mut upgrade_hints = BTreeMap::new();
        for id in self.handlers.keys() {
            match self.edges.get(id) {
                Some(edge) if scope.allows_handler(id) => {
                    edges.insert(id.clone(), Arc::clone(edge));
                }
                _ => {
                    upgrade_hints.insert(id.clone(), handler_block_for(plans, id));
                }
            }
        }
        RoutingGraph {
            plan_code: scope.plan_code().clone(),
            fingerprint: scope.fingerprint().clone(),
            edges,
            upgrade_hints,
        }
    }
}

/// Compiles a reason schema.
fn compile_reason_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Routing Graph
// ============================================================================

/// Serializable edge of a routing graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEdge {
    /// Edge source.
    pub source: RouteNode,
    /// Edge target.
    pub target: RouteNode,
    /// Edge description.
    pub description: String,
    /// Reason schema for coordinator edges.
    pub reason_schema: Value,
    /// True for return edges.
    pub requires_topic_change: bool,
}

/// Serializable view of a routing graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingGraphSummary {
    /// Plan the graph was built for.
    pub plan_code: PlanCode,
    /// Scope fingerprint.
    pub fingerprint: ScopeFingerprint,
    /// All edges, coordinator edges first.
    pub edges: Vec<RouteEdge>,
    /// Upgrade hints for registered handlers outside the graph.
    pub upgrade_hints: Vec<BlockResponse>,
}

/// Outcome of applying a transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Ownership moved.
    Moved(TransitionEvent),
    /// The target is registered but outside the caller's scope.
    Denied(BlockResponse),
    /// The request is structurally invalid.
    Rejected(TransitionRejection),
}

/// Immutable, scope-filtered routing graph.
///
/// # Invariants
/// - Every coordinator edge targets a handler enabled by the scope it was built for.
/// - Handler nodes only have a return edge to the coordinator.
pub struct RoutingGraph {
    /// Plan the graph was built for.
    plan_code: PlanCode,
    /// Scope fingerprint.
    fingerprint: ScopeFingerprint,
    /// Coordinator edges by target.
    edges: BTreeMap<HandlerId, Arc<CompiledEdge>>,
    /// Upgrade hints for registered handlers outside the graph.
    upgrade_hints: BTreeMap<HandlerId, BlockResponse>,
}

impl RoutingGraph {
    /// Returns the plan the graph was first built for.
    ///
    /// Graphs are shared by every plan granting the same capability set, so
    /// this names the plan that triggered the build.
    #[must_use]
    pub const fn plan_code(&self) -> &PlanCode {
        &self.plan_code
    }

    /// Returns the scope fingerprint the graph was built for.
    #[must_use]
    pub const fn fingerprint(&self) -> &ScopeFingerprint {
        &self.fingerprint
    }

    /// Returns the handlers reachable from the coordinator.
    pub fn handlers(&self) -> impl Iterator<Item = &HandlerId> {
        self.edges.keys()
    }

    /// Returns true when the handler is reachable in this graph.
    #[must_use]
    pub fn contains_handler(&self, id: &HandlerId) -> bool {
        self.edges.contains_key(id)
    }

    /// Returns the upgrade hint for a registered handler outside the graph.
    ///
    /// Hints reflect the plan table at build time; live callers should ask
    /// [`CapabilityResolver::handler_block`](crate::CapabilityResolver::handler_block).
    #[must_use]
    pub fn upgrade_hint(&self, id: &HandlerId) -> Option<&BlockResponse> {
        self.upgrade_hints.get(id)
    }

    /// Returns the transitions a node may request.
    #[must_use]
    pub fn available_transitions(&self, node: &RouteNode) -> Vec<AvailableTransition> {
        match node {
            RouteNode::Coordinator => self
                .edges
                .values()
                .map(|edge| AvailableTransition {
                    target: RouteNode::Handler(edge.template.target.clone()),
                    description: edge.template.description.clone(),
                    reason_schema: edge.template.reason_schema.clone(),
                    requires_topic_change: false,
                })
                .collect(),
            RouteNode::Handler(id) if self.contains_handler(id) => vec![AvailableTransition {
                target: RouteNode::Coordinator,
                description: RETURN_EDGE_DESCRIPTION.to_string(),
                reason_schema: json!({}),
                requires_topic_change: true,
            }],
            RouteNode::Handler(_) => Vec::new(),
        }
    }

    /// Returns every edge of the graph.
    #[must_use]
    pub fn edges(&self) -> Vec<RouteEdge> {
        let coordinator = self.available_transitions(&RouteNode::Coordinator).into_iter().map(
            |transition| RouteEdge {
                source: RouteNode::Coordinator,
                target: transition.target,
                description: transition.description,
                reason_schema: transition.reason_schema,
                requires_topic_change: false,
            },
        );
        let returns = self.edges.keys().map(|id| RouteEdge {
            source: RouteNode::Handler(id.clone()),
            target: RouteNode::Coordinator,
            description: RETURN_EDGE_DESCRIPTION.to_string(),
            reason_schema: json!({}),
            requires_topic_change: true,
        });
        coordinator.chain(returns).collect()
    }

    /// Returns a serializable summary of the graph.
    #[must_use]
    pub fn summary(&self) -> RoutingGraphSummary {
        RoutingGraphSummary {
            plan_code: self.plan_code.clone(),
            fingerprint: self.fingerprint.clone(),
            edges: self.edges(),
            upgrade_hints: self.upgrade_hints.values().cloned().collect(),
        }
    }

    /// Applies a transition request to the state.
    ///
    /// The state is only modified when the result is [`TransitionResult::Moved`].
    pub fn transition(
        &self,
        state: &mut ConversationState,
        request: &TransitionRequest,
        at: Timestamp,
    ) -> TransitionResult {
        let source = state.active_node();
        let reject = |kind: RejectionKind, detail: String| {
            TransitionResult::Rejected(TransitionRejection {
                source: source.clone(),
                target: request.target.clone(),
                kind,
                detail,
            })
        };
        match &request.target {
            RouteNode::Coordinator => {
                if source.is_coordinator() {
                    return reject(
                        RejectionKind::SelfTransition,
                        "conversation is already owned by the coordinator".to_string(),
                    );
                }
                if !request.topic_change {
                    return reject(
                        RejectionKind::TopicChangeRequired,
                        "returning to the coordinator requires topic_change".to_string(),
                    );
                }
            }
            RouteNode::Handler(target) => {
                let Some(edge) = self.edges.get(target) else {
                    return match self.upgrade_hints.get(target) {
                        Some(hint) if source.is_coordinator() => {
                            TransitionResult::Denied(hint.clone())
                        }
                        Some(_) => reject(
                            RejectionKind::HandlerToHandler,
                            format!("handler {source} cannot hand off to {target}"),
                        ),
                        None => reject(
                            RejectionKind::UnknownTarget,
                            format!("handler {target} is not registered"),
                        ),
                    };
                };
                if source == request.target {
                    return reject(
                        RejectionKind::SelfTransition,
                        format!("conversation is already owned by {target}"),
                    );
                }
                if !source.is_coordinator() {
                    return reject(
                        RejectionKind::HandlerToHandler,
                        format!("handler {source} cannot hand off to {target}"),
                    );
                }
                if let Err(err) = edge.validator.validate(&request.reason) {
                    return reject(RejectionKind::InvalidReason, err.to_string());
                }
            }
        }
        state.active_handler = request.target.handler().cloned();
        state.touch(at);
        TransitionResult::Moved(TransitionEvent {
            conversation_id: state.conversation_id.clone(),
            source,
            target: request.target.clone(),
            reason: request.reason.clone(),
            at,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
