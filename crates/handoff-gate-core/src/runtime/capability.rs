// crates/handoff-gate-core/src/runtime/capability.rs
// ============================================================================
// Module: Handoff Gate Capability Resolver
// Description: Plan-code to scope resolution with deterministic fallbacks.
// Purpose: Gate handlers and tools by subscription tier.
// Dependencies: crate::{core, interfaces, runtime::audit}
// ============================================================================

//! ## Overview
//! [`CapabilityResolver`] maps a caller's plan code onto a [`Scope`]. Lookup is
//! deterministic over the current [`PlanTable`], which is re-read from a
//! [`PlanCatalog`] on every call so plan edits apply without restarts.
//! Unrecognized codes never fail: they fall back to a lower tier and the
//! fallback is reported in the result and through the audit sink.
//!
//! Security posture: plan codes are untrusted caller input; every fallback lands
//! on a tier no more permissive than the closest known plan.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;

use crate::core::BlockResponse;
use crate::core::BlockedKind;
use crate::core::ConversationId;
use crate::core::HandlerId;
use crate::core::PlanCode;
use crate::core::PlanDefinition;
use crate::core::PlanTable;
use crate::core::RequestId;
use crate::core::Scope;
use crate::core::ScopeFallback;
use crate::core::ScopeResolution;
use crate::core::ToolId;
use crate::interfaces::CatalogError;
use crate::interfaces::PlanCatalog;
use crate::runtime::audit::RoutingAuditEvent;
use crate::runtime::audit::RoutingAuditKind;
use crate::runtime::audit::RoutingAuditSink;

// ============================================================================
// SECTION: Static Catalog
// ============================================================================

/// Plan catalog serving a fixed table.
#[derive(Debug, Clone)]
pub struct StaticPlanCatalog {
    /// Table returned by every snapshot.
    table: Arc<PlanTable>,
}

impl StaticPlanCatalog {
    /// Wraps a plan table.
    #[must_use]
    pub fn new(table: PlanTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }
}

impl PlanCatalog for StaticPlanCatalog {
    fn snapshot(&self) -> Result<Arc<PlanTable>, CatalogError> {
        Ok(Arc::clone(&self.table))
    }
}

// ============================================================================
// SECTION: Block Responses
// ============================================================================

/// Builds the upgrade hint for a handler the caller cannot use.
#[must_use]
pub fn handler_block_for(table: &PlanTable, handler: &HandlerId) -> BlockResponse {
    block_response(handler.as_str(), BlockedKind::Handler, table.minimum_plan_for_handler(handler))
}

/// Builds the upgrade hint for a tool the caller cannot use.
#[must_use]
pub fn tool_block_for(table: &PlanTable, tool: &ToolId) -> BlockResponse {
    block_response(tool.as_str(), BlockedKind::Tool, table.minimum_plan_for_tool(tool))
}

/// Assembles a block response from the minimum granting plan.
fn block_response(
    blocked_id: &str,
    kind: BlockedKind,
    minimum: Option<&PlanDefinition>,
) -> BlockResponse {
    BlockResponse {
        blocked_id: blocked_id.to_string(),
        kind,
        plan_required: minimum.map(|plan| plan.code.clone()),
        benefits: minimum.map(|plan| plan.benefits.clone()).unwrap_or_default(),
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves plan codes into scopes.
///
/// # Invariants
/// - Resolved handler sets are always a subset of the registered handlers.
/// - A catalog failure never changes the table in use; the last good table is kept.
pub struct CapabilityResolver {
    /// Source of the plan table.
    catalog: Arc<dyn PlanCatalog>,
    /// Handlers known to the routing registry.
    registered: BTreeSet<HandlerId>,
    /// Last table successfully read from the catalog.
    last_good: RwLock<Arc<PlanTable>>,
    /// Audit sink for resolution events.
    audit: Arc<dyn RoutingAuditSink>,
}

impl CapabilityResolver {
    /// Creates a resolver, reading the initial table from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the initial snapshot cannot be read.
    pub fn new(
        catalog: Arc<dyn PlanCatalog>,
        registered: impl IntoIterator<Item = HandlerId>,
        audit: Arc<dyn RoutingAuditSink>,
    ) -> Result<Self, CatalogError> {
        let initial = catalog.snapshot()?;
        Ok(Self {
            catalog,
            registered: registered.into_iter().collect(),
            last_good: RwLock::new(initial),
            audit,
        })
    }

    /// Returns the current plan table, falling back to the last good table.
    #[must_use]
    pub fn plan_table(&self) -> Arc<PlanTable> {
        match self.catalog.snapshot() {
            Ok(table) => {
                if let Ok(mut last_good) = self.last_good.write()
                    && !Arc::ptr_eq(&*last_good, &table)
                {
                    *last_good = Arc::clone(&table);
                }
                table
            }
            Err(err) => {
                self.audit.record(&RoutingAuditEvent::global(RoutingAuditKind::CatalogError {
                    error: err.to_string(),
                }));
                self.last_good.read().map_or_else(
                    |poisoned| Arc::clone(&*poisoned.into_inner()),
                    |table| Arc::clone(&*table),
                )
            }
        }
    }

    /// Resolves a plan code into a scope.
    #[must_use]
    pub fn resolve(&self, plan_code: Option<&PlanCode>) -> ScopeResolution {
        self.resolve_for(plan_code, None, None)
    }

    /// Resolves a plan code, attributing audit events to a conversation.
    #[must_use]
    pub fn resolve_for(
        &self,
        plan_code: Option<&PlanCode>,
        conversation_id: Option<&ConversationId>,
        request_id: Option<&RequestId>,
    ) -> ScopeResolution {
        let table = self.plan_table();
        let (plan, reason) = table.lookup(plan_code);
        let handlers: BTreeSet<HandlerId> =
            plan.handlers.intersection(&self.registered).cloned().collect();
        let scope = Arc::new(Scope::new(
            plan.code.clone(),
            handlers,
            plan.tools.clone(),
            plan.description.clone(),
            plan.limitations.clone(),
        ));
        let fallback = reason.map(|reason| ScopeFallback {
            requested: plan_code.cloned(),
            resolved: plan.code.clone(),
            reason,
        });
        let kind = fallback.as_ref().map_or_else(
            || RoutingAuditKind::ScopeResolved {
                plan_code: scope.plan_code().clone(),
                fingerprint: scope.fingerprint().clone(),
            },
            |fallback| RoutingAuditKind::ScopeFallback {
                requested: fallback.requested.clone(),
                resolved: fallback.resolved.clone(),
                reason: fallback.reason,
            },
        );
        self.audit.record(&RoutingAuditEvent::new(
            conversation_id.cloned(),
            request_id.cloned(),
            kind,
        ));
        ScopeResolution {
            scope,
            fallback,
        }
    }

    /// Returns true when the scope grants a registered handler.
    #[must_use]
    pub fn can_use_handler(&self, scope: &Scope, handler: &HandlerId) -> bool {
        self.registered.contains(handler) && scope.allows_handler(handler)
    }

    /// Returns true when the scope grants the tool.
    #[must_use]
    pub fn can_use_tool(scope: &Scope, tool: &ToolId) -> bool {
        scope.allows_tool(tool)
    }

    /// Builds the upgrade hint for a handler using the current plan table.
    #[must_use]
    pub fn handler_block(&self, handler: &HandlerId) -> BlockResponse {
        handler_block_for(&self.plan_table(), handler)
    }

    /// Builds the upgrade hint for a tool using the current plan table.
    #[must_use]
    pub fn tool_block(&self, tool: &ToolId) -> BlockResponse {
        tool_block_for(&self.plan_table(), tool)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
