// crates/handoff-gate-core/src/runtime/capability/tests.rs
// ============================================================================
// Module: Capability Resolver Tests
// Description: Unit tests for plan lookup, fallbacks, and upgrade hints.
// Purpose: Validate deterministic resolution and catalog failure handling.
// Dependencies: handoff-gate-core
// ============================================================================

//! ## Overview
//! Covers each resolution rule, the registry intersection, and the last-good
//! table behaviour when the catalog fails.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use super::CapabilityResolver;
use super::StaticPlanCatalog;
use crate::core::BlockedKind;
use crate::core::FallbackReason;
use crate::core::HandlerId;
use crate::core::PlanCode;
use crate::core::PlanDefinition;
use crate::core::PlanTable;
use crate::core::ToolId;
use crate::interfaces::CatalogError;
use crate::interfaces::PlanCatalog;
use crate::runtime::audit::InMemoryAuditSink;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn plan(code: &str, rank: u32, handlers: &[&str], tools: &[&str]) -> PlanDefinition {
    PlanDefinition {
        code: PlanCode::new(code),
        rank,
        display_name: code.to_string(),
        aliases: Vec::new(),
        handlers: handlers.iter().map(|id| HandlerId::new(*id)).collect(),
        tools: tools.iter().map(|id| ToolId::new(*id)).collect(),
        description: format!("{code} plan"),
        limitations: Vec::new(),
        benefits: vec![format!("{code} benefits")],
    }
}

fn table() -> PlanTable {
    let mut starter = plan("starter", 1, &["settings", "tax_documents"], &["upload"]);
    starter.aliases.push(PlanCode::new("basic"));
    PlanTable::new(vec![
        plan("free", 0, &["settings"], &[]),
        starter,
        plan(
            "business",
            2,
            &["settings", "tax_documents", "payroll", "expenses", "unregistered"],
            &["upload", "payroll_run"],
        ),
    ])
    .unwrap()
}

fn registry() -> Vec<HandlerId> {
    ["settings", "tax_documents", "payroll", "expenses"].into_iter().map(HandlerId::new).collect()
}

fn resolver_with(catalog: Arc<dyn PlanCatalog>) -> (CapabilityResolver, Arc<InMemoryAuditSink>) {
    let audit = Arc::new(InMemoryAuditSink::new());
    let resolver = CapabilityResolver::new(catalog, registry(), audit.clone()).unwrap();
    (resolver, audit)
}

fn resolver() -> (CapabilityResolver, Arc<InMemoryAuditSink>) {
    resolver_with(Arc::new(StaticPlanCatalog::new(table())))
}

fn handlers(ids: &[&str]) -> BTreeSet<HandlerId> {
    ids.iter().map(|id| HandlerId::new(*id)).collect()
}

// ============================================================================
// SECTION: Resolution Rules
// ============================================================================

#[test]
fn missing_plan_resolves_to_lowest_tier() {
    let (resolver, audit) = resolver();
    let resolution = resolver.resolve(None);
    assert_eq!(resolution.scope.plan_code().as_str(), "free");
    assert_eq!(resolution.fallback.unwrap().reason, FallbackReason::Missing);
    assert_eq!(audit.count("scope_fallback"), 1);
}

#[test]
fn blank_plan_resolves_to_lowest_tier() {
    let (resolver, _) = resolver();
    let resolution = resolver.resolve(Some(&PlanCode::new("   ")));
    assert_eq!(resolution.fallback.unwrap().reason, FallbackReason::Missing);
}

#[test]
fn exact_code_and_alias_resolve_without_fallback() {
    let (resolver, audit) = resolver();
    let exact = resolver.resolve(Some(&PlanCode::new(" Starter ")));
    let alias = resolver.resolve(Some(&PlanCode::new("BASIC")));
    assert!(exact.fallback.is_none());
    assert!(alias.fallback.is_none());
    assert_eq!(exact.scope.enabled_handlers(), &handlers(&["settings", "tax_documents"]));
    assert_eq!(exact.scope.fingerprint(), alias.scope.fingerprint());
    assert_eq!(audit.count("scope_resolved"), 2);
}

#[test]
fn unrecognized_variant_steps_down_one_tier() {
    let (resolver, _) = resolver();
    let resolution = resolver.resolve(Some(&PlanCode::new("business-trial")));
    let fallback = resolution.fallback.unwrap();
    assert_eq!(fallback.reason, FallbackReason::UnrecognizedVariant);
    assert_eq!(fallback.resolved.as_str(), "starter");
    assert_eq!(fallback.requested.unwrap().as_str(), "business-trial");
}

#[test]
fn variant_of_lowest_tier_stays_on_lowest_tier() {
    let (resolver, _) = resolver();
    let resolution = resolver.resolve(Some(&PlanCode::new("free_promo")));
    let fallback = resolution.fallback.unwrap();
    assert_eq!(fallback.reason, FallbackReason::UnrecognizedVariant);
    assert_eq!(fallback.resolved.as_str(), "free");
}

#[test]
fn unknown_code_resolves_to_lowest_tier() {
    let (resolver, _) = resolver();
    let resolution = resolver.resolve(Some(&PlanCode::new("enterprise")));
    let fallback = resolution.fallback.unwrap();
    assert_eq!(fallback.reason, FallbackReason::Unknown);
    assert_eq!(resolution.scope.enabled_handlers(), &handlers(&["settings"]));
}

#[test]
fn resolved_handlers_exclude_unregistered_ids() {
    let (resolver, _) = resolver();
    let resolution = resolver.resolve(Some(&PlanCode::new("business")));
    assert!(!resolution.scope.allows_handler(&HandlerId::new("unregistered")));
    assert_eq!(
        resolution.scope.enabled_handlers(),
        &handlers(&["expenses", "payroll", "settings", "tax_documents"])
    );
}

// ============================================================================
// SECTION: Capability Queries
// ============================================================================

#[test]
fn capability_queries_follow_scope() {
    let (resolver, _) = resolver();
    let scope = resolver.resolve(Some(&PlanCode::new("starter"))).scope;
    assert!(resolver.can_use_handler(&scope, &HandlerId::new("tax_documents")));
    assert!(!resolver.can_use_handler(&scope, &HandlerId::new("payroll")));
    assert!(CapabilityResolver::can_use_tool(&scope, &ToolId::new("upload")));
    assert!(!CapabilityResolver::can_use_tool(&scope, &ToolId::new("payroll_run")));
}

#[test]
fn handler_block_names_minimum_plan() {
    let (resolver, _) = resolver();
    let block = resolver.handler_block(&HandlerId::new("payroll"));
    assert_eq!(block.kind, BlockedKind::Handler);
    assert_eq!(block.blocked_id, "payroll");
    assert_eq!(block.plan_required.unwrap().as_str(), "business");
    assert_eq!(block.benefits, vec!["business benefits".to_string()]);
}

#[test]
fn tool_block_without_granting_plan_has_no_requirement() {
    let (resolver, _) = resolver();
    let block = resolver.tool_block(&ToolId::new("teleport"));
    assert_eq!(block.kind, BlockedKind::Tool);
    assert!(block.plan_required.is_none());
    assert!(block.benefits.is_empty());
}

// ============================================================================
// SECTION: Catalog Failures
// ============================================================================

struct FlakyCatalog {
    table: Arc<PlanTable>,
    failing: AtomicBool,
}

impl PlanCatalog for FlakyCatalog {
    fn snapshot(&self) -> Result<Arc<PlanTable>, CatalogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("offline".to_string()));
        }
        Ok(Arc::clone(&self.table))
    }
}

#[test]
fn catalog_failure_keeps_last_good_table() {
    let catalog = Arc::new(FlakyCatalog {
        table: Arc::new(table()),
        failing: AtomicBool::new(false),
    });
    let (resolver, audit) = resolver_with(catalog.clone());
    catalog.failing.store(true, Ordering::SeqCst);
    let resolution = resolver.resolve(Some(&PlanCode::new("business")));
    assert!(resolution.fallback.is_none());
    assert!(resolution.scope.allows_handler(&HandlerId::new("payroll")));
    assert_eq!(audit.count("catalog_error"), 1);
}

#[test]
fn catalog_failure_at_startup_is_fatal() {
    let catalog = Arc::new(FlakyCatalog {
        table: Arc::new(table()),
        failing: AtomicBool::new(true),
    });
    let audit = Arc::new(InMemoryAuditSink::new());
    let result = CapabilityResolver::new(catalog, registry(), audit);
    assert!(matches!(result, Err(CatalogError::Unavailable(_))));
}
