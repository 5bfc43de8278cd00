// crates/handoff-gate-core/tests/proptest_scope.rs
// ============================================================================
// Module: Scope and Graph Property-Based Tests
// Description: Property tests for scope resolution and graph construction.
// Purpose: Check subset invariants across arbitrary plan codes and scopes.
// ============================================================================

//! Property-based tests for scope and routing graph invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use handoff_gate_core::CapabilityResolver;
use handoff_gate_core::HandlerId;
use handoff_gate_core::NoopAuditSink;
use handoff_gate_core::PlanCode;
use handoff_gate_core::RouteNode;
use handoff_gate_core::Scope;
use handoff_gate_core::StaticPlanCatalog;
use proptest::prelude::*;

mod common;

use common::HANDLERS;
use common::plans;
use common::registry;

fn resolver() -> CapabilityResolver {
    CapabilityResolver::new(
        Arc::new(StaticPlanCatalog::new(plans())),
        HANDLERS.into_iter().map(HandlerId::new),
        Arc::new(NoopAuditSink),
    )
    .unwrap()
}

fn handler_subset() -> impl Strategy<Value = BTreeSet<HandlerId>> {
    prop::collection::btree_set(
        prop_oneof![
            Just("expenses"),
            Just("payroll"),
            Just("settings"),
            Just("tax_documents"),
            Just("unregistered"),
        ],
        0 ..= 5,
    )
    .prop_map(|ids| ids.into_iter().map(HandlerId::new).collect())
}

proptest! {
    #[test]
    fn resolved_handlers_are_registered(code in ".{0,24}") {
        let registered: BTreeSet<HandlerId> = HANDLERS.into_iter().map(HandlerId::new).collect();
        let resolution = resolver().resolve(Some(&PlanCode::new(code)));
        prop_assert!(resolution.scope.enabled_handlers().is_subset(&registered));
    }

    #[test]
    fn coordinator_edges_stay_within_scope(handlers in handler_subset()) {
        let scope = Scope::new(PlanCode::new("custom"), handlers, BTreeSet::new(), "", Vec::new());
        let graph = registry().build_graph(&scope, &plans());
        for edge in graph.available_transitions(&RouteNode::Coordinator) {
            let RouteNode::Handler(target) = edge.target else {
                panic!("coordinator edge must target a handler");
            };
            prop_assert!(scope.allows_handler(&target));
        }
        for handler in graph.handlers() {
            prop_assert!(scope.allows_handler(handler));
            let returns = graph.available_transitions(&RouteNode::Handler(handler.clone()));
            prop_assert_eq!(returns.len(), 1);
            prop_assert_eq!(&returns[0].target, &RouteNode::Coordinator);
        }
    }

    #[test]
    fn scope_fingerprint_tracks_capabilities(a in handler_subset(), b in handler_subset()) {
        let left = Scope::new(PlanCode::new("x"), a.clone(), BTreeSet::new(), "", Vec::new());
        let right = Scope::new(PlanCode::new("x"), b.clone(), BTreeSet::new(), "", Vec::new());
        prop_assert_eq!(left.fingerprint() == right.fingerprint(), a == b);
    }
}

#[test]
fn lowest_tier_yields_smallest_scope() {
    let resolver = resolver();
    let lowest = resolver.resolve(None).scope;
    for code in ["free", "starter", "business"] {
        let scope = resolver.resolve(Some(&PlanCode::new(code))).scope;
        assert!(lowest.enabled_handlers().is_subset(scope.enabled_handlers()));
    }
}
