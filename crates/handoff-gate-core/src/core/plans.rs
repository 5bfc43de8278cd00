// crates/handoff-gate-core/src/core/plans.rs
// ============================================================================
// Module: Handoff Gate Plan Table
// Description: Ordered subscription tiers and the capabilities they grant.
// Purpose: Provide deterministic plan lookup with documented fallbacks.
// Dependencies: crate::core::{identifiers, scope}, serde, thiserror
// ============================================================================

//! ## Overview
//! Plans are ordered by `rank`; the lowest rank is the most restrictive tier.
//! [`PlanTable::lookup`] implements the resolution rules:
//! 1. missing or blank codes resolve to the lowest tier;
//! 2. a normalized code equal to a plan code or alias resolves to that plan;
//! 3. an unrecognized variant of a known code (`<code>_<suffix>`) resolves to the
//!    tier directly below the longest matching known plan;
//! 4. anything else resolves to the lowest tier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::HandlerId;
use crate::core::identifiers::PlanCode;
use crate::core::identifiers::ToolId;
use crate::core::scope::FallbackReason;

// ============================================================================
// SECTION: Plan Definition
// ============================================================================

/// Static definition of a subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanDefinition {
    /// Canonical plan code.
    pub code: PlanCode,
    /// Tier rank; lower ranks are more restrictive.
    pub rank: u32,
    /// Display name for upgrade prompts.
    #[serde(default)]
    pub display_name: String,
    /// Alternate codes that resolve to this plan.
    #[serde(default)]
    pub aliases: Vec<PlanCode>,
    /// Handlers granted by the plan.
    #[serde(default)]
    pub handlers: BTreeSet<HandlerId>,
    /// Tools granted by the plan.
    #[serde(default)]
    pub tools: BTreeSet<ToolId>,
    /// Plan description.
    #[serde(default)]
    pub description: String,
    /// Plan limitations surfaced to callers.
    #[serde(default)]
    pub limitations: Vec<String>,
    /// Upgrade benefits surfaced in block responses.
    #[serde(default)]
    pub benefits: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Plan table construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanTableError {
    /// The table defines no plans.
    #[error("plan table must define at least one plan")]
    Empty,
    /// A plan code is blank.
    #[error("plan code must be non-empty")]
    BlankCode,
    /// Two plans (or aliases) normalize to the same code.
    #[error("duplicate plan code: {0}")]
    DuplicateCode(String),
    /// Two plans share a rank.
    #[error("duplicate plan rank: {0}")]
    DuplicateRank(u32),
}

// ============================================================================
// SECTION: Plan Table
// ============================================================================

/// Immutable, rank-ordered set of plans.
///
/// # Invariants
/// - Non-empty; ranks and normalized codes (including aliases) are unique.
/// - `plans` is sorted by ascending rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTable {
    /// Plans sorted by ascending rank.
    plans: Vec<PlanDefinition>,
    /// Normalized code or alias to plan index.
    index: BTreeMap<String, usize>,
}

impl PlanTable {
    /// Builds a plan table.
    ///
    /// # Errors
    ///
    /// Returns [`PlanTableError`] when the plans are empty, blank, or duplicated.
    pub fn new(mut plans: Vec<PlanDefinition>) -> Result<Self, PlanTableError> {
        if plans.is_empty() {
            return Err(PlanTableError::Empty);
        }
        plans.sort_by_key(|plan| plan.rank);
        let mut ranks = BTreeSet::new();
        let mut index = BTreeMap::new();
        for (position, plan) in plans.iter().enumerate() {
            if !ranks.insert(plan.rank) {
                return Err(PlanTableError::DuplicateRank(plan.rank));
            }
            for code in std::iter::once(&plan.code).chain(plan.aliases.iter()) {
                let normalized = code.normalized();
                if normalized.is_empty() {
                    return Err(PlanTableError::BlankCode);
                }
                if index.insert(normalized.clone(), position).is_some() {
                    return Err(PlanTableError::DuplicateCode(normalized));
                }
            }
        }
        Ok(Self {
            plans,
            index,
        })
    }

    /// Returns all plans in ascending rank order.
    #[must_use]
    pub fn plans(&self) -> &[PlanDefinition] {
        &self.plans
    }

    /// Returns the most restrictive plan.
    #[must_use]
    pub fn lowest(&self) -> &PlanDefinition {
        // Construction guarantees at least one plan.
        &self.plans[0]
    }

    /// Returns the plan whose code or alias matches exactly (after normalization).
    #[must_use]
    pub fn find(&self, code: &PlanCode) -> Option<&PlanDefinition> {
        self.index.get(&code.normalized()).map(|position| &self.plans[*position])
    }

    /// Resolves a plan code to a plan, reporting any fallback applied.
    #[must_use]
    pub fn lookup(&self, code: Option<&PlanCode>) -> (&PlanDefinition, Option<FallbackReason>) {
        let Some(code) = code else {
            return (self.lowest(), Some(FallbackReason::Missing));
        };
        let normalized = code.normalized();
        if normalized.is_empty() {
            return (self.lowest(), Some(FallbackReason::Missing));
        }
        if let Some(position) = self.index.get(&normalized) {
            return (&self.plans[*position], None);
        }
        let variant_of = self
            .index
            .iter()
            .filter(|(known, _)| {
                normalized.len() > known.len()
                    && normalized.starts_with(known.as_str())
                    && normalized.as_bytes().get(known.len()) == Some(&b'_')
            })
            .max_by_key(|(known, _)| known.len())
            .map(|(_, position)| *position);
        match variant_of {
            Some(position) => {
                let lower = position.saturating_sub(1);
                (&self.plans[lower], Some(FallbackReason::UnrecognizedVariant))
            }
            None => (self.lowest(), Some(FallbackReason::Unknown)),
        }
    }

    /// Returns the lowest-ranked plan granting the handler.
    #[must_use]
    pub fn minimum_plan_for_handler(&self, handler: &HandlerId) -> Option<&PlanDefinition> {
        self.plans.iter().find(|plan| plan.handlers.contains(handler))
    }

    /// Returns the lowest-ranked plan granting the tool.
    #[must_use]
    pub fn minimum_plan_for_tool(&self, tool: &ToolId) -> Option<&PlanDefinition> {
        self.plans.iter().find(|plan| plan.tools.contains(tool))
    }
}
