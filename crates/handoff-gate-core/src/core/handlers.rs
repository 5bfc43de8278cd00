// crates/handoff-gate-core/src/core/handlers.rs
// ============================================================================
// Module: Handoff Gate Handler Descriptors
// Description: Static handler metadata and coordinator edge templates.
// Purpose: Describe routing topology as pure data.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Handlers are described by [`HandlerDescriptor`] and reached from the
//! coordinator through a [`RoutingEdgeTemplate`]. Templates carry a JSON Schema
//! for the handoff reason so that transition requests are validated against the
//! same contract the handler backend sees.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::HandlerId;

// ============================================================================
// SECTION: Handler Descriptors
// ============================================================================

/// Static description of a specialized handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerDescriptor {
    /// Handler identifier.
    pub id: HandlerId,
    /// Display name shown to users.
    pub display_name: String,
    /// Icon identifier for renderers.
    #[serde(default)]
    pub icon: String,
    /// Handler description.
    #[serde(default)]
    pub description: String,
}

/// Template for a coordinator-to-handler edge.
///
/// # Invariants
/// - The source is always the coordinator; handler-to-handler edges do not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEdgeTemplate {
    /// Target handler.
    pub target: HandlerId,
    /// JSON Schema (2020-12) the handoff reason must satisfy.
    pub reason_schema: Value,
    /// Edge description presented to the coordinator.
    pub description: String,
}

// ============================================================================
// SECTION: Route Nodes
// ============================================================================

/// Node of the routing state machine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "handler", rename_all = "snake_case")]
pub enum RouteNode {
    /// The default routing node.
    Coordinator,
    /// A specialized handler.
    Handler(HandlerId),
}

impl RouteNode {
    /// Builds a node from an optional active handler.
    #[must_use]
    pub fn from_active(active: Option<&HandlerId>) -> Self {
        active.map_or(Self::Coordinator, |handler| Self::Handler(handler.clone()))
    }

    /// Returns the handler identifier when the node is a handler.
    #[must_use]
    pub const fn handler(&self) -> Option<&HandlerId> {
        match self {
            Self::Coordinator => None,
            Self::Handler(handler) => Some(handler),
        }
    }

    /// Returns true for the coordinator node.
    #[must_use]
    pub const fn is_coordinator(&self) -> bool {
        matches!(self, Self::Coordinator)
    }
}

impl fmt::Display for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinator => f.write_str("coordinator"),
            Self::Handler(handler) => handler.fmt(f),
        }
    }
}
