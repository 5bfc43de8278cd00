// crates/handoff-gate-config/src/lib.rs
// ============================================================================
// Module: Handoff Gate Config Library
// Description: Canonical config model, validation, and runtime builders.
// Purpose: Single source of truth for handoff-gate.toml semantics.
// Dependencies: handoff-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! `handoff-gate-config` defines the configuration model for Handoff Gate:
//! handlers and their handoff edges, plan tiers, guardrail checks, cache
//! eviction, dispatcher limits, and audit output. Validation is strict and
//! fails closed; builders turn a validated config into runtime components.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::ReloadingPlanCatalog;
pub use config::*;
