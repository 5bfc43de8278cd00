// crates/handoff-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures for handoff-gate-core integration tests.
// Purpose: Provide a plan table, registry, spy backend, and dispatcher harness.
// Dependencies: handoff-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Builds a small tax-and-payroll product surface with three plan tiers and
//! four handlers, plus a scripted [`SpyBackend`] that records every invocation.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]
#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use handoff_gate_core::CapabilityResolver;
use handoff_gate_core::ConversationId;
use handoff_gate_core::ConversationOrchestrator;
use handoff_gate_core::DispatchRequest;
use handoff_gate_core::Dispatcher;
use handoff_gate_core::DispatcherConfig;
use handoff_gate_core::DispatcherParts;
use handoff_gate_core::GuardrailPipeline;
use handoff_gate_core::HandlerBackend;
use handoff_gate_core::HandlerDescriptor;
use handoff_gate_core::HandlerError;
use handoff_gate_core::HandlerId;
use handoff_gate_core::HandlerInvocation;
use handoff_gate_core::HandlerReply;
use handoff_gate_core::HandoffRegistry;
use handoff_gate_core::InMemoryAuditSink;
use handoff_gate_core::InMemoryConversationStore;
use handoff_gate_core::ManualClock;
use handoff_gate_core::PlanCode;
use handoff_gate_core::PlanDefinition;
use handoff_gate_core::PlanTable;
use handoff_gate_core::RouteNode;
use handoff_gate_core::RoutingEdgeTemplate;
use handoff_gate_core::StaticPlanCatalog;
use handoff_gate_core::TransitionRequest;
use serde_json::json;

// ============================================================================
// SECTION: Product Surface
// ============================================================================

/// Registered handler identifiers.
pub const HANDLERS: [&str; 4] = ["expenses", "payroll", "settings", "tax_documents"];

/// Builds the handoff registry for [`HANDLERS`].
pub fn registry() -> HandoffRegistry {
    HandoffRegistry::new(
        HANDLERS
            .iter()
            .map(|id| HandlerDescriptor {
                id: HandlerId::new(*id),
                display_name: id.replace('_', " "),
                icon: String::new(),
                description: format!("Answers {id} questions"),
            })
            .collect(),
        HANDLERS
            .iter()
            .map(|id| RoutingEdgeTemplate {
                target: HandlerId::new(*id),
                reason_schema: json!({
                    "type": "object",
                    "required": ["summary"],
                    "properties": { "summary": { "type": "string", "minLength": 1 } }
                }),
                description: format!("Transfer to the {id} handler"),
            })
            .collect(),
    )
    .unwrap()
}

/// Builds a plan definition.
pub fn plan(code: &str, rank: u32, handlers: &[&str]) -> PlanDefinition {
    PlanDefinition {
        code: PlanCode::new(code),
        rank,
        display_name: code.to_string(),
        aliases: Vec::new(),
        handlers: handlers.iter().map(|id| HandlerId::new(*id)).collect(),
        tools: Default::default(),
        description: format!("{code} tier"),
        limitations: Vec::new(),
        benefits: vec![format!("All {code} features")],
    }
}

/// Builds the three-tier plan table.
pub fn plans() -> PlanTable {
    PlanTable::new(vec![
        plan("free", 0, &[]),
        plan("starter", 1, &["settings", "tax_documents"]),
        plan("business", 2, &HANDLERS),
    ])
    .unwrap()
}

// ============================================================================
// SECTION: Spy Backend
// ============================================================================

/// Script deciding a backend reply.
pub type Script = dyn Fn(&HandlerInvocation) -> Result<HandlerReply, HandlerError> + Send + Sync;

/// Backend that answers from a script and records every invocation.
pub struct SpyBackend {
    script: Box<Script>,
    invocations: Mutex<Vec<HandlerInvocation>>,
}

impl SpyBackend {
    /// Creates a spy backend.
    pub fn new(
        script: impl Fn(&HandlerInvocation) -> Result<HandlerReply, HandlerError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Coordinator hands off to `target`; handlers echo their own name.
    pub fn handing_off_to(target: &'static str) -> Self {
        Self::new(move |invocation| match &invocation.node {
            RouteNode::Coordinator => Ok(HandlerReply::text("Let me transfer you.").with_transition(
                TransitionRequest::handoff(
                    HandlerId::new(target),
                    json!({ "summary": "user asked a specialist question" }),
                ),
            )),
            RouteNode::Handler(handler) => Ok(HandlerReply::text(format!("{handler} here"))),
        })
    }

    /// Returns the number of invocations.
    pub fn calls(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// Returns the invoked nodes in order.
    pub fn nodes(&self) -> Vec<RouteNode> {
        self.invocations.lock().unwrap().iter().map(|inv| inv.node.clone()).collect()
    }
}

#[async_trait]
impl HandlerBackend for SpyBackend {
    async fn invoke(&self, invocation: HandlerInvocation) -> Result<HandlerReply, HandlerError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        (self.script)(&invocation)
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Fully wired dispatcher with inspectable collaborators.
pub struct TestGate {
    /// Dispatcher under test.
    pub dispatcher: Dispatcher,
    /// Spy backend.
    pub backend: Arc<SpyBackend>,
    /// In-memory store.
    pub store: Arc<InMemoryConversationStore>,
    /// In-memory audit sink.
    pub audit: Arc<InMemoryAuditSink>,
    /// Shared conversation cache.
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// Manual clock.
    pub clock: Arc<ManualClock>,
}

impl TestGate {
    /// Builds a gate around a backend and a pipeline factory.
    pub fn new(
        backend: SpyBackend,
        pipeline: impl FnOnce(Arc<InMemoryAuditSink>) -> GuardrailPipeline,
    ) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(InMemoryConversationStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let resolver = Arc::new(
            CapabilityResolver::new(
                Arc::new(StaticPlanCatalog::new(plans())),
                HANDLERS.into_iter().map(HandlerId::new),
                audit.clone(),
            )
            .unwrap(),
        );
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            Arc::new(registry()),
            Arc::clone(&resolver),
            store.clone(),
            clock.clone(),
            audit.clone(),
        ));
        let dispatcher = Dispatcher::new(
            DispatcherParts {
                resolver,
                pipeline: pipeline(audit.clone()),
                orchestrator: Arc::clone(&orchestrator),
                backend: backend.clone(),
                store: store.clone(),
                clock: clock.clone(),
                audit: audit.clone(),
            },
            DispatcherConfig::default(),
        );
        Self {
            dispatcher,
            backend,
            store,
            audit,
            orchestrator,
            clock,
        }
    }

    /// Builds a gate without guardrails.
    pub fn unguarded(backend: SpyBackend) -> Self {
        Self::new(backend, |audit| GuardrailPipeline::builder().with_audit(audit).build().unwrap())
    }
}

/// Builds a dispatch request.
pub fn message(conversation: &str, plan: &str, text: &str) -> DispatchRequest {
    DispatchRequest {
        conversation_id: ConversationId::new(conversation),
        plan_code: Some(PlanCode::new(plan)),
        message: text.to_string(),
        request_id: None,
    }
}
