// crates/handoff-gate-core/src/runtime/guardrails.rs
// ============================================================================
// Module: Handoff Gate Guardrail Pipeline
// Description: Concurrent input/output safety checks with tripwire semantics.
// Purpose: Screen messages before handler invocation and replies before delivery.
// Dependencies: crate::{core, interfaces, runtime::audit}, tokio
// ============================================================================

//! ## Overview
//! A [`GuardrailPipeline`] is assembled once through
//! [`GuardrailPipelineBuilder`] and shared immutably. Each run fans the enabled
//! checks for a phase out as spawned tasks and fans results back in over a
//! channel. Heuristic checks run first; the classifier tier only runs when no
//! blocking tripwire fired.
//!
//! Checks fail open: an error, panic, or timeout inside one check is audited
//! and treated as a pass for that check only. In the input phase the first
//! tripwire ends aggregation; checks still in flight finish in the background
//! and report to the audit sink only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde_json::Map;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::CheckId;
use crate::core::CheckOutcome;
use crate::core::CheckStatus;
use crate::core::CheckTier;
use crate::core::GuardrailCategory;
use crate::core::GuardrailContext;
use crate::core::GuardrailPhase;
use crate::core::OutputPolicy;
use crate::core::PipelineDecision;
use crate::core::PipelineResult;
use crate::interfaces::GuardrailCheck;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::RoutingAuditEvent;
use crate::runtime::audit::RoutingAuditKind;
use crate::runtime::audit::RoutingAuditSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-check timeout.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(2_000);

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Static registration data for a guardrail check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRegistration {
    /// Check identifier.
    pub id: CheckId,
    /// Phase the check runs in.
    pub phase: GuardrailPhase,
    /// Risk category.
    pub category: GuardrailCategory,
    /// Latency tier.
    pub tier: CheckTier,
    /// Whether the check runs.
    pub enabled: bool,
    /// Per-check timeout.
    pub timeout: Duration,
    /// Output-phase tripwire policy.
    pub output_policy: OutputPolicy,
}

impl CheckRegistration {
    /// Creates an enabled heuristic registration with default timeout and policy.
    #[must_use]
    pub fn new(id: impl Into<CheckId>, phase: GuardrailPhase, category: GuardrailCategory) -> Self {
        Self {
            id: id.into(),
            phase,
            category,
            tier: CheckTier::Heuristic,
            enabled: true,
            timeout: DEFAULT_CHECK_TIMEOUT,
            output_policy: OutputPolicy::LogOnly,
        }
    }

    /// Sets the tier.
    #[must_use]
    pub const fn with_tier(mut self, tier: CheckTier) -> Self {
        self.tier = tier;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the output-phase policy.
    #[must_use]
    pub fn with_output_policy(mut self, policy: OutputPolicy) -> Self {
        self.output_policy = policy;
        self
    }

    /// Sets whether the check runs.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true when a tripwire from this check blocks delivery.
    #[must_use]
    pub const fn blocks(&self) -> bool {
        match self.phase {
            GuardrailPhase::Input => true,
            GuardrailPhase::Output => matches!(self.output_policy, OutputPolicy::Block { .. }),
        }
    }
}

/// Registered check with its implementation.
#[derive(Clone)]
struct RegisteredCheck {
    /// Registration data.
    registration: CheckRegistration,
    /// Check implementation.
    check: Arc<dyn GuardrailCheck>,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Guardrail pipeline construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardrailBuildError {
    /// Two checks share an identifier.
    #[error("duplicate guardrail check id: {0}")]
    DuplicateCheck(String),
    /// A check has a zero timeout.
    #[error("guardrail check {0} must have a non-zero timeout")]
    ZeroTimeout(String),
}

/// Builder assembling an immutable guardrail pipeline.
pub struct GuardrailPipelineBuilder {
    /// Checks in registration order.
    checks: Vec<RegisteredCheck>,
    /// Audit sink for check events.
    audit: Arc<dyn RoutingAuditSink>,
}

impl Default for GuardrailPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardrailPipelineBuilder {
    /// Creates an empty builder with a no-op audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Registers a check.
    #[must_use]
    pub fn register(
        mut self,
        check: Arc<dyn GuardrailCheck>,
        registration: CheckRegistration,
    ) -> Self {
        self.checks.push(RegisteredCheck {
            registration,
            check,
        });
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn RoutingAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailBuildError`] when check ids repeat or a timeout is zero.
    pub fn build(self) -> Result<GuardrailPipeline, GuardrailBuildError> {
        let mut seen = BTreeSet::new();
        for entry in &self.checks {
            let id = entry.registration.id.as_str();
            if !seen.insert(id.to_string()) {
                return Err(GuardrailBuildError::DuplicateCheck(id.to_string()));
            }
            if entry.registration.timeout.is_zero() {
                return Err(GuardrailBuildError::ZeroTimeout(id.to_string()));
            }
        }
        Ok(GuardrailPipeline {
            checks: self.checks.into(),
            audit: self.audit,
        })
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Immutable guardrail pipeline.
///
/// # Invariants
/// - An input-phase tripwire always yields [`PipelineDecision::Blocked`].
/// - Heuristic checks complete (or the phase blocks) before classifier checks start.
#[derive(Clone)]
pub struct GuardrailPipeline {
    /// Registered checks in registration order.
    checks: Arc<[RegisteredCheck]>,
    /// Audit sink for check events.
    audit: Arc<dyn RoutingAuditSink>,
}

impl GuardrailPipeline {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> GuardrailPipelineBuilder {
        GuardrailPipelineBuilder::new()
    }

    /// Returns the registrations for a phase in registration order.
    #[must_use]
    pub fn registrations(&self, phase: GuardrailPhase) -> Vec<&CheckRegistration> {
        self.checks
            .iter()
            .map(|entry| &entry.registration)
            .filter(|registration| registration.phase == phase)
            .collect()
    }

    /// Runs all enabled checks for a phase.
    ///
    /// The context's phase is overwritten with `phase`.
    pub async fn run(
        &self,
        phase: GuardrailPhase,
        payload: &str,
        ctx: &GuardrailContext,
    ) -> PipelineResult {
        let mut ctx = ctx.clone();
        ctx.phase = phase;
        let ctx = Arc::new(ctx);
        let payload: Arc<str> = Arc::from(payload);

        let (heuristic, classifier): (Vec<&RegisteredCheck>, Vec<&RegisteredCheck>) = self
            .checks
            .iter()
            .filter(|entry| entry.registration.phase == phase && entry.registration.enabled)
            .partition(|entry| entry.registration.tier == CheckTier::Heuristic);

        let mut outcomes = Vec::new();
        let mut blocking = None;
        let mut flagged = Vec::new();

        for tier in [heuristic, classifier] {
            if tier.is_empty() {
                continue;
            }
            if blocking.is_some() {
                outcomes.extend(tier.iter().map(|entry| skipped_outcome(&entry.registration)));
                continue;
            }
            let result = self.run_tier(&tier, &payload, &ctx).await;
            outcomes.extend(result.outcomes);
            flagged.extend(result.flagged);
            blocking = result.blocking;
        }

        let decision = match blocking {
            Some(blocked) => PipelineDecision::Blocked {
                check_id: blocked.registration.id.clone(),
                category: blocked.registration.category,
                confidence: blocked.confidence,
                info: blocked.info,
                fallback: match (phase, &blocked.registration.output_policy) {
                    (GuardrailPhase::Output, OutputPolicy::Block { fallback }) => {
                        Some(fallback.clone())
                    }
                    _ => None,
                },
            },
            None if !flagged.is_empty() => {
                self.audit.record(&audit_event(
                    &ctx,
                    RoutingAuditKind::GuardrailFlagged {
                        check_ids: flagged.clone(),
                    },
                ));
                PipelineDecision::Flagged {
                    check_ids: flagged,
                }
            }
            None => PipelineDecision::Pass,
        };
        PipelineResult {
            phase,
            decision,
            outcomes,
        }
    }

    /// Runs one tier concurrently and aggregates its outcomes.
    async fn run_tier(
        &self,
        tier: &[&RegisteredCheck],
        payload: &Arc<str>,
        ctx: &Arc<GuardrailContext>,
    ) -> TierResult {
        let (tx, mut rx) = mpsc::channel(tier.len());
        for entry in tier {
            spawn_check(
                (*entry).clone(),
                Arc::clone(payload),
                Arc::clone(ctx),
                Arc::clone(&self.audit),
                tx.clone(),
            );
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(tier.len());
        let mut blocking: Option<BlockingTrip> = None;
        let mut flagged = Vec::new();
        while let Some(outcome) = rx.recv().await {
            audit_outcome(self.audit.as_ref(), ctx, &outcome, true);
            let Some(entry) = tier.iter().find(|entry| entry.registration.id == outcome.check_id)
            else {
                continue;
            };
            if outcome.status == CheckStatus::Tripped {
                if entry.registration.blocks() {
                    let position = registration_position(tier, &outcome.check_id);
                    let replace = blocking.as_ref().is_none_or(|current| {
                        position < registration_position(tier, &current.registration.id)
                    });
                    if replace {
                        blocking = Some(BlockingTrip {
                            registration: entry.registration.clone(),
                            confidence: outcome.confidence.unwrap_or(1.0),
                            info: outcome.info.clone(),
                        });
                    }
                } else {
                    flagged.push(outcome.check_id.clone());
                }
            }
            outcomes.push(outcome);
            if ctx.phase == GuardrailPhase::Input && blocking.is_some() {
                // Late senders observe the closed channel and audit themselves.
                rx.close();
                while let Ok(late) = rx.try_recv() {
                    audit_outcome(self.audit.as_ref(), ctx, &late, false);
                }
                break;
            }
        }
        TierResult {
            outcomes,
            blocking,
            flagged,
        }
    }
}

/// Blocking tripwire selected during aggregation.
struct BlockingTrip {
    /// Registration of the check that fired.
    registration: CheckRegistration,
    /// Verdict confidence.
    confidence: f64,
    /// Check metadata.
    info: Map<String, serde_json::Value>,
}

/// Aggregated result of one tier.
struct TierResult {
    /// Outcomes received before aggregation ended.
    outcomes: Vec<CheckOutcome>,
    /// Blocking tripwire, if any.
    blocking: Option<BlockingTrip>,
    /// Log-only tripwires.
    flagged: Vec<CheckId>,
}

/// Returns the registration index of a check within a tier.
fn registration_position(tier: &[&RegisteredCheck], id: &CheckId) -> usize {
    tier.iter().position(|entry| &entry.registration.id == id).unwrap_or(usize::MAX)
}

// ============================================================================
// SECTION: Check Tasks
// ============================================================================

/// Spawns a detached task running one check under its timeout.
fn spawn_check(
    entry: RegisteredCheck,
    payload: Arc<str>,
    ctx: Arc<GuardrailContext>,
    audit: Arc<dyn RoutingAuditSink>,
    tx: mpsc::Sender<CheckOutcome>,
) {
    tokio::spawn(async move {
        let started = Instant::now();
        let registration = entry.registration;
        let check = entry.check;
        let task_ctx = Arc::clone(&ctx);
        // The inner task isolates panics so they surface as join errors.
        let mut inner = tokio::spawn(async move { check.run(&payload, &task_ctx).await });
        let result = tokio::time::timeout(registration.timeout, &mut inner).await;
        let (status, verdict, error) = match result {
            Ok(Ok(Ok(verdict))) => {
                let status =
                    if verdict.tripwire { CheckStatus::Tripped } else { CheckStatus::Passed };
                (status, Some(verdict), None)
            }
            Ok(Ok(Err(err))) => (CheckStatus::Failed, None, Some(err.to_string())),
            Ok(Err(join_err)) => {
                let detail = if join_err.is_panic() {
                    "check panicked".to_string()
                } else {
                    join_err.to_string()
                };
                (CheckStatus::Failed, None, Some(detail))
            }
            Err(_) => {
                inner.abort();
                (
                    CheckStatus::TimedOut,
                    None,
                    Some(format!("check exceeded {} ms", duration_millis(registration.timeout))),
                )
            }
        };
        let outcome = CheckOutcome {
            check_id: registration.id.clone(),
            category: registration.category,
            tier: registration.tier,
            status,
            confidence: verdict.as_ref().map(|verdict| verdict.confidence),
            info: verdict.map(|verdict| verdict.info).unwrap_or_default(),
            error,
            elapsed_ms: duration_millis(started.elapsed()),
        };
        if let Err(mpsc::error::SendError(outcome)) = tx.send(outcome).await {
            audit_outcome(audit.as_ref(), &ctx, &outcome, false);
        }
    });
}

/// Builds the outcome for a check skipped by tier short-circuiting.
fn skipped_outcome(registration: &CheckRegistration) -> CheckOutcome {
    CheckOutcome {
        check_id: registration.id.clone(),
        category: registration.category,
        tier: registration.tier,
        status: CheckStatus::Skipped,
        confidence: None,
        info: Map::new(),
        error: None,
        elapsed_ms: 0,
    }
}

/// Records the audit event matching a check outcome.
fn audit_outcome(
    audit: &dyn RoutingAuditSink,
    ctx: &GuardrailContext,
    outcome: &CheckOutcome,
    applied: bool,
) {
    let kind = match outcome.status {
        CheckStatus::Tripped => RoutingAuditKind::GuardrailTripped {
            phase: ctx.phase,
            check_id: outcome.check_id.clone(),
            category: outcome.category,
            confidence: outcome.confidence.unwrap_or(1.0),
            info: outcome.info.clone(),
            applied,
        },
        CheckStatus::Failed => RoutingAuditKind::GuardrailCheckFailed {
            phase: ctx.phase,
            check_id: outcome.check_id.clone(),
            error: outcome.error.clone().unwrap_or_default(),
        },
        CheckStatus::TimedOut => RoutingAuditKind::GuardrailTimeout {
            phase: ctx.phase,
            check_id: outcome.check_id.clone(),
            elapsed_ms: outcome.elapsed_ms,
        },
        CheckStatus::Passed | CheckStatus::Skipped => return,
    };
    audit.record(&audit_event(ctx, kind));
}

/// Builds an audit event attributed to the guardrail context.
fn audit_event(ctx: &GuardrailContext, kind: RoutingAuditKind) -> RoutingAuditEvent {
    RoutingAuditEvent::new(Some(ctx.conversation_id.clone()), ctx.request_id.clone(), kind)
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
