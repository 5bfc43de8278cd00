// crates/handoff-gate-core/src/runtime/routing/tests.rs
// ============================================================================
// Module: Routing Tests
// Description: Unit tests for registry validation, graph building, and transitions.
// Purpose: Validate star topology and scope-gated ownership moves.
// Dependencies: handoff-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Builds graphs for restricted and full scopes and applies every class of
//! transition request, checking that rejected and denied requests leave the
//! state untouched.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test-only assertions use unwrap/expect and debug output for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use super::HandoffRegistry;
use super::RegistryError;
use super::TransitionResult;
use crate::core::ConversationId;
use crate::core::ConversationState;
use crate::core::HandlerDescriptor;
use crate::core::HandlerId;
use crate::core::PlanCode;
use crate::core::PlanDefinition;
use crate::core::PlanTable;
use crate::core::RejectionKind;
use crate::core::RouteNode;
use crate::core::RoutingEdgeTemplate;
use crate::core::Scope;
use crate::core::Timestamp;
use crate::core::TransitionRequest;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const HANDLERS: [&str; 4] = ["expenses", "payroll", "settings", "tax_documents"];

fn descriptor(id: &str) -> HandlerDescriptor {
    HandlerDescriptor {
        id: HandlerId::new(id),
        display_name: id.to_string(),
        icon: String::new(),
        description: format!("{id} handler"),
    }
}

fn reason_schema() -> Value {
    json!({
        "type": "object",
        "required": ["summary"],
        "properties": { "summary": { "type": "string", "minLength": 1 } }
    })
}

fn template(id: &str) -> RoutingEdgeTemplate {
    RoutingEdgeTemplate {
        target: HandlerId::new(id),
        reason_schema: reason_schema(),
        description: format!("Hand off to {id}"),
    }
}

fn registry() -> HandoffRegistry {
    HandoffRegistry::new(
        HANDLERS.iter().map(|id| descriptor(id)).collect(),
        HANDLERS.iter().map(|id| template(id)).collect(),
    )
    .unwrap()
}

fn plan(code: &str, rank: u32, handlers: &[&str]) -> PlanDefinition {
    PlanDefinition {
        code: PlanCode::new(code),
        rank,
        display_name: code.to_string(),
        aliases: Vec::new(),
        handlers: handlers.iter().map(|id| HandlerId::new(*id)).collect(),
        tools: Default::default(),
        description: String::new(),
        limitations: Vec::new(),
        benefits: vec![format!("Everything in {code}")],
    }
}

fn plans() -> PlanTable {
    PlanTable::new(vec![
        plan("free", 0, &["settings"]),
        plan("starter", 1, &["settings", "tax_documents"]),
        plan("business", 2, &HANDLERS),
    ])
    .unwrap()
}

fn scope(handlers: &[&str]) -> Scope {
    Scope::new(
        PlanCode::new("starter"),
        handlers.iter().map(|id| HandlerId::new(*id)).collect(),
        Default::default(),
        "",
        Vec::new(),
    )
}

fn state(active: Option<&str>) -> ConversationState {
    ConversationState {
        conversation_id: ConversationId::new("abc"),
        active_handler: active.map(HandlerId::new),
        scope_fingerprint: scope(&[]).fingerprint().clone(),
        created_at: Timestamp::Logical(0),
        last_accessed_at: Timestamp::Logical(0),
    }
}

fn reason() -> Value {
    json!({ "summary": "user asked about a W-2" })
}

fn rejection_kind(result: TransitionResult) -> RejectionKind {
    match result {
        TransitionResult::Rejected(rejection) => rejection.kind,
        other => panic!("expected rejection, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Registry Validation
// ============================================================================

#[test]
fn registry_rejects_duplicate_handlers() {
    let result = HandoffRegistry::new(vec![descriptor("a"), descriptor("a")], Vec::new());
    assert_eq!(result.err(), Some(RegistryError::DuplicateHandler("a".to_string())));
}

#[test]
fn registry_rejects_dangling_and_duplicate_edges() {
    let dangling = HandoffRegistry::new(vec![descriptor("a")], vec![template("b")]);
    assert_eq!(dangling.err().map(|err| err.code()), Some("unknown_edge_target"));
    let duplicate = HandoffRegistry::new(vec![descriptor("a")], vec![template("a"), template("a")]);
    assert_eq!(duplicate.err(), Some(RegistryError::DuplicateEdge("a".to_string())));
}

#[test]
fn registry_rejects_invalid_reason_schema() {
    let mut bad = template("a");
    bad.reason_schema = json!({ "type": 12 });
    let result = HandoffRegistry::new(vec![descriptor("a")], vec![bad]);
    assert!(matches!(result, Err(RegistryError::InvalidReasonSchema { .. })));
}

#[test]
fn registry_rejects_blank_handler_id() {
    let result = HandoffRegistry::new(vec![descriptor("  ")], Vec::new());
    assert_eq!(result.err(), Some(RegistryError::BlankHandlerId));
}

// ============================================================================
// SECTION: Graph Building
// ============================================================================

#[test]
fn graph_only_contains_scoped_handlers() {
    let graph = registry().build_graph(&scope(&["settings", "tax_documents"]), &plans());
    let handlers: Vec<&str> = graph.handlers().map(HandlerId::as_str).collect();
    assert_eq!(handlers, vec!["settings", "tax_documents"]);
    assert!(!graph.contains_handler(&HandlerId::new("payroll")));
    let hint = graph.upgrade_hint(&HandlerId::new("payroll")).unwrap();
    assert_eq!(hint.plan_required.as_ref().unwrap().as_str(), "business");
    assert!(graph.upgrade_hint(&HandlerId::new("settings")).is_none());
}

#[test]
fn scope_handlers_without_templates_are_unreachable() {
    let registry = HandoffRegistry::new(
        vec![descriptor("settings"), descriptor("payroll")],
        vec![template("payroll")],
    )
    .unwrap();
    let graph = registry.build_graph(&scope(&["settings", "payroll"]), &plans());
    assert!(graph.contains_handler(&HandlerId::new("payroll")));
    assert!(!graph.contains_handler(&HandlerId::new("settings")));
}

#[test]
fn available_transitions_follow_star_topology() {
    let graph = registry().build_graph(&scope(&["settings", "tax_documents"]), &plans());
    let coordinator = graph.available_transitions(&RouteNode::Coordinator);
    assert_eq!(coordinator.len(), 2);
    assert!(coordinator.iter().all(|edge| !edge.requires_topic_change));

    let handler = graph.available_transitions(&RouteNode::Handler(HandlerId::new("settings")));
    assert_eq!(handler.len(), 1);
    assert_eq!(handler[0].target, RouteNode::Coordinator);
    assert!(handler[0].requires_topic_change);

    let outside = graph.available_transitions(&RouteNode::Handler(HandlerId::new("payroll")));
    assert!(outside.is_empty());
    assert_eq!(graph.edges().len(), 4);
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

#[test]
fn handoff_to_scoped_handler_moves_ownership() {
    let graph = registry().build_graph(&scope(&["settings", "tax_documents"]), &plans());
    let mut state = state(None);
    let request = TransitionRequest::handoff(HandlerId::new("tax_documents"), reason());
    match graph.transition(&mut state, &request, Timestamp::Logical(7)) {
        TransitionResult::Moved(event) => {
            assert_eq!(event.source, RouteNode::Coordinator);
            assert_eq!(event.target, RouteNode::Handler(HandlerId::new("tax_documents")));
            assert_eq!(event.at, Timestamp::Logical(7));
        }
        other => panic!("expected move, got {other:?}"),
    }
    assert_eq!(state.active_handler, Some(HandlerId::new("tax_documents")));
    assert_eq!(state.last_accessed_at, Timestamp::Logical(7));
}

#[test]
fn reset_to_coordinator_returns_previous_owner() {
    let mut state = state(Some("payroll"));
    state.touch(Timestamp::Logical(3));
    assert_eq!(state.reset_to_coordinator(), Some(HandlerId::new("payroll")));
    assert_eq!(state.active_node(), RouteNode::Coordinator);
    assert_eq!(state.reset_to_coordinator(), None);
    assert_eq!(state.last_accessed_at, Timestamp::Logical(3));
}

#[test]
fn handoff_outside_scope_is_denied_with_upgrade_hint() {
    let graph = registry().build_graph(&scope(&["settings", "tax_documents"]), &plans());
    let mut state = state(None);
    let request = TransitionRequest::handoff(HandlerId::new("payroll"), reason());
    match graph.transition(&mut state, &request, Timestamp::Logical(1)) {
        TransitionResult::Denied(block) => {
            assert_eq!(block.blocked_id, "payroll");
            assert_eq!(block.plan_required.unwrap().as_str(), "business");
            assert_eq!(block.benefits, vec!["Everything in business".to_string()]);
        }
        other => panic!("expected denial, got {other:?}"),
    }
    assert!(state.active_handler.is_none());
}

#[test]
fn unknown_target_is_rejected() {
    let graph = registry().build_graph(&scope(&["settings"]), &plans());
    let mut state = state(None);
    let request = TransitionRequest::handoff(HandlerId::new("astrology"), reason());
    let kind = rejection_kind(graph.transition(&mut state, &request, Timestamp::Logical(1)));
    assert_eq!(kind, RejectionKind::UnknownTarget);
    assert!(state.active_handler.is_none());
}

#[test]
fn handler_to_handler_is_rejected() {
    let graph = registry().build_graph(&scope(&["settings", "tax_documents"]), &plans());
    let mut state = state(Some("settings"));
    let request = TransitionRequest::handoff(HandlerId::new("tax_documents"), reason());
    let kind = rejection_kind(graph.transition(&mut state, &request, Timestamp::Logical(1)));
    assert_eq!(kind, RejectionKind::HandlerToHandler);
    assert_eq!(state.active_handler, Some(HandlerId::new("settings")));
}

#[test]
fn self_transitions_are_rejected() {
    let graph = registry().build_graph(&scope(&["settings"]), &plans());
    let mut owned = state(Some("settings"));
    let same = TransitionRequest::handoff(HandlerId::new("settings"), reason());
    let kind = rejection_kind(graph.transition(&mut owned, &same, Timestamp::Logical(1)));
    assert_eq!(kind, RejectionKind::SelfTransition);

    let mut idle = state(None);
    let back = TransitionRequest::return_to_coordinator(Value::Null);
    let kind = rejection_kind(graph.transition(&mut idle, &back, Timestamp::Logical(1)));
    assert_eq!(kind, RejectionKind::SelfTransition);
}

#[test]
fn return_requires_topic_change() {
    let graph = registry().build_graph(&scope(&["settings"]), &plans());
    let mut state = state(Some("settings"));
    let mut request = TransitionRequest::return_to_coordinator(Value::Null);
    request.topic_change = false;
    let kind = rejection_kind(graph.transition(&mut state, &request, Timestamp::Logical(1)));
    assert_eq!(kind, RejectionKind::TopicChangeRequired);
    assert_eq!(state.active_handler, Some(HandlerId::new("settings")));

    let request = TransitionRequest::return_to_coordinator(Value::Null);
    let result = graph.transition(&mut state, &request, Timestamp::Logical(2));
    assert!(matches!(result, TransitionResult::Moved(_)));
    assert!(state.active_handler.is_none());
}

#[test]
fn reason_must_match_edge_schema() {
    let graph = registry().build_graph(&scope(&["settings"]), &plans());
    let mut state = state(None);
    let request = TransitionRequest::handoff(HandlerId::new("settings"), json!({ "summary": "" }));
    let kind = rejection_kind(graph.transition(&mut state, &request, Timestamp::Logical(1)));
    assert_eq!(kind, RejectionKind::InvalidReason);
    assert!(state.active_handler.is_none());
}
