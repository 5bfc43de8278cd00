// crates/handoff-gate-cli/src/lib.rs
// ============================================================================
// Module: Handoff Gate CLI Library
// Description: Shared helpers for the Handoff Gate command-line interface.
// Purpose: Provide the message catalog for the CLI binary and tests.
// Dependencies: Standard library.
// ============================================================================

//! ## Overview
//! This library module houses the CLI message catalog. The binary entry point
//! (`src/main.rs`) routes every user-facing string through [`t!`](crate::t) so output
//! stays consistent.
//!
//! Security posture: CLI inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Message catalog helpers.
pub mod i18n;
