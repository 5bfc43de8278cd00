// crates/handoff-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Handoff Gate Audit Logging
// Description: Structured audit events for routing, guardrails, and caching.
// Purpose: Emit redacted audit logs without hard dependencies.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks for routing decisions.
//! Events are JSON lines so deployments can route them to their preferred
//! logging pipeline. Events never carry raw message or reply text; guardrail
//! metadata is whatever the check itself chose to report.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::CheckId;
use crate::core::ConversationId;
use crate::core::FallbackReason;
use crate::core::GuardrailCategory;
use crate::core::GuardrailPhase;
use crate::core::HandlerId;
use crate::core::PlanCode;
use crate::core::RejectionKind;
use crate::core::RequestId;
use crate::core::RouteNode;
use crate::core::ScopeFingerprint;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Routing audit event payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingAuditEvent {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Conversation identifier when the event is conversation-scoped.
    pub conversation_id: Option<ConversationId>,
    /// Request identifier when provided by the caller.
    pub request_id: Option<RequestId>,
    /// Event-specific payload.
    #[serde(flatten)]
    pub kind: RoutingAuditKind,
}

impl RoutingAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(
        conversation_id: Option<ConversationId>,
        request_id: Option<RequestId>,
        kind: RoutingAuditKind,
    ) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            timestamp_ms,
            conversation_id,
            request_id,
            kind,
        }
    }

    /// Creates an event that is not tied to a conversation.
    #[must_use]
    pub fn global(kind: RoutingAuditKind) -> Self {
        Self::new(None, None, kind)
    }

    /// Returns the stable event label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// Event-specific audit payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoutingAuditKind {
    /// A plan code resolved to a scope.
    ScopeResolved {
        /// Plan the scope was built from.
        plan_code: PlanCode,
        /// Capability fingerprint of the scope.
        fingerprint: ScopeFingerprint,
    },
    /// A plan code fell back to another tier.
    ScopeFallback {
        /// Plan code supplied by the caller.
        requested: Option<PlanCode>,
        /// Plan the resolver fell back to.
        resolved: PlanCode,
        /// Fallback reason.
        reason: FallbackReason,
    },
    /// The plan catalog failed; the last good table stayed in use.
    CatalogError {
        /// Catalog error message.
        error: String,
    },
    /// A guardrail check reported a tripwire.
    GuardrailTripped {
        /// Pipeline phase.
        phase: GuardrailPhase,
        /// Check that fired.
        check_id: CheckId,
        /// Check category.
        category: GuardrailCategory,
        /// Verdict confidence.
        confidence: f64,
        /// Check metadata.
        info: Map<String, Value>,
        /// False when the tripwire arrived after aggregation completed.
        applied: bool,
    },
    /// Output tripwires fired under a log-only policy.
    GuardrailFlagged {
        /// Checks that fired.
        check_ids: Vec<CheckId>,
    },
    /// A guardrail check errored or panicked and failed open.
    GuardrailCheckFailed {
        /// Pipeline phase.
        phase: GuardrailPhase,
        /// Check that failed.
        check_id: CheckId,
        /// Failure detail.
        error: String,
    },
    /// A guardrail check exceeded its timeout and failed open.
    GuardrailTimeout {
        /// Pipeline phase.
        phase: GuardrailPhase,
        /// Check that timed out.
        check_id: CheckId,
        /// Milliseconds elapsed before the check was abandoned.
        elapsed_ms: u64,
    },
    /// A routing graph was built for a conversation.
    GraphBuilt {
        /// Fingerprint of the scope the graph was built for.
        fingerprint: ScopeFingerprint,
        /// Handlers reachable from the coordinator.
        handlers: Vec<HandlerId>,
        /// True when a previous graph for the conversation was replaced.
        rebuild: bool,
    },
    /// The active handler was reset to the coordinator.
    StateReset {
        /// Handler that lost ownership.
        handler: HandlerId,
        /// Reset reason label.
        reason: &'static str,
    },
    /// The active handler was reseeded on construction.
    StateReseeded {
        /// Handler restored as owner.
        handler: HandlerId,
        /// Seed source label (`previous_scope` or `store`).
        source: &'static str,
    },
    /// A transition moved conversation ownership.
    Transition {
        /// Previous owner.
        source: RouteNode,
        /// New owner.
        target: RouteNode,
        /// Handoff reason.
        reason: Value,
    },
    /// A transition targeted a handler outside the caller's scope.
    TransitionDenied {
        /// Requested handler.
        target: HandlerId,
        /// Minimum plan granting the handler.
        plan_required: Option<PlanCode>,
    },
    /// A transition request was rejected.
    TransitionRejected {
        /// Requesting node.
        source: RouteNode,
        /// Requested target.
        target: RouteNode,
        /// Rejection classification.
        kind: RejectionKind,
        /// Rejection detail.
        detail: String,
    },
    /// A second transition in the same dispatch was ignored.
    HopLimit {
        /// Node that requested the extra hop.
        node: RouteNode,
        /// Target it requested.
        target: RouteNode,
    },
    /// The handler backend failed or timed out.
    HandlerFailed {
        /// Node being invoked.
        node: RouteNode,
        /// Failure detail.
        error: String,
        /// True when the failure was a timeout.
        timed_out: bool,
    },
    /// The conversation store failed.
    StoreError {
        /// Store operation label.
        operation: &'static str,
        /// Store error message.
        error: String,
    },
    /// A cached conversation entry was evicted.
    CacheEvicted {
        /// Eviction cause label.
        cause: &'static str,
    },
}

impl RoutingAuditKind {
    /// Returns the stable event label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ScopeResolved { .. } => "scope_resolved",
            Self::ScopeFallback { .. } => "scope_fallback",
            Self::CatalogError { .. } => "catalog_error",
            Self::GuardrailTripped { .. } => "guardrail_tripped",
            Self::GuardrailFlagged { .. } => "guardrail_flagged",
            Self::GuardrailCheckFailed { .. } => "guardrail_check_failed",
            Self::GuardrailTimeout { .. } => "guardrail_timeout",
            Self::GraphBuilt { .. } => "graph_built",
            Self::StateReset { .. } => "state_reset",
            Self::StateReseeded { .. } => "state_reseeded",
            Self::Transition { .. } => "transition",
            Self::TransitionDenied { .. } => "transition_denied",
            Self::TransitionRejected { .. } => "transition_rejected",
            Self::HopLimit { .. } => "hop_limit",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::StoreError { .. } => "store_error",
            Self::CacheEvicted { .. } => "cache_evicted",
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for routing events.
pub trait RoutingAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &RoutingAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl RoutingAuditSink for StderrAuditSink {
    fn record(&self, event: &RoutingAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl RoutingAuditSink for FileAuditSink {
    fn record(&self, event: &RoutingAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl RoutingAuditSink for NoopAuditSink {
    fn record(&self, _event: &RoutingAuditEvent) {}
}

/// Audit sink that retains events in memory.
#[derive(Default)]
pub struct InMemoryAuditSink {
    /// Recorded events in arrival order.
    events: Mutex<Vec<RoutingAuditEvent>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<RoutingAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the recorded event labels in arrival order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|events| events.iter().map(RoutingAuditEvent::label).collect())
            .unwrap_or_default()
    }

    /// Returns the number of recorded events with the given label.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|event| event.label() == label).count())
            .unwrap_or(0)
    }
}

impl RoutingAuditSink for InMemoryAuditSink {
    fn record(&self, event: &RoutingAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
