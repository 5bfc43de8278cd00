// crates/handoff-gate-config/src/config/tests.rs
// ============================================================================
// Module: Configuration Unit Tests
// Description: Unit tests for path limits and per-section validation.
// Purpose: Exercise private helpers that integration tests cannot reach.
// Dependencies: handoff-gate-config
// ============================================================================

//! ## Overview
//! Validates path length limits, text bounds, and check-type field rules.

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

use std::path::Path;

use super::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a check entry of the given type with every optional field unset.
fn check(check_type: CheckType, phase: GuardrailPhase) -> CheckConfig {
    CheckConfig {
        id: CheckId::new("check"),
        phase,
        check_type,
        category: None,
        enabled: true,
        timeout_ms: None,
        output_policy: OutputPolicy::LogOnly,
        rules: Vec::new(),
        use_default_rules: false,
        threshold: None,
        kinds: Vec::new(),
        confidence: None,
        max_chars: None,
    }
}

// ============================================================================
// SECTION: Path Limits
// ============================================================================

#[test]
fn validate_path_rejects_long_component() {
    let component = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
    let err = validate_path(Path::new(&component)).unwrap_err();
    assert!(err.to_string().contains("component too long"));
}

#[test]
fn validate_path_accepts_component_at_max() {
    let component = "a".repeat(MAX_PATH_COMPONENT_LENGTH);
    assert!(validate_path(Path::new(&component)).is_ok());
}

#[test]
fn validate_path_rejects_total_length() {
    let path = vec!["a".repeat(100); 50].join("/");
    let err = validate_path(Path::new(&path)).unwrap_err();
    assert!(err.to_string().contains("max length"));
}

#[test]
fn resolve_path_prefers_explicit_argument() {
    let resolved = resolve_path(Some(Path::new("custom.toml"))).unwrap();
    assert_eq!(resolved, Path::new("custom.toml"));
}

#[test]
fn validate_path_string_rejects_whitespace() {
    let err = validate_path_string("audit.path", "   ").unwrap_err();
    assert!(err.to_string().contains("non-empty"));
}

// ============================================================================
// SECTION: Texts and Timeouts
// ============================================================================

#[test]
fn validate_text_bounds_length() {
    assert!(validate_text("field", &"x".repeat(MAX_TEXT_LENGTH)).is_ok());
    let err = validate_text("field", &"x".repeat(MAX_TEXT_LENGTH + 1)).unwrap_err();
    assert!(err.to_string().contains("field exceeds max length"));
}

#[test]
fn check_timeout_bounds_are_inclusive() {
    assert!(validate_check_timeout("t", MIN_CHECK_TIMEOUT_MS).is_ok());
    assert!(validate_check_timeout("t", MAX_CHECK_TIMEOUT_MS).is_ok());
    assert!(validate_check_timeout("t", MIN_CHECK_TIMEOUT_MS - 1).is_err());
    assert!(validate_check_timeout("t", MAX_CHECK_TIMEOUT_MS + 1).is_err());
}

// ============================================================================
// SECTION: Check Entries
// ============================================================================

#[test]
fn type_specific_fields_are_rejected_on_other_types() {
    let mut entry = check(CheckType::Pii, GuardrailPhase::Output);
    entry.max_chars = Some(10);
    let err = entry.validate().unwrap_err();
    assert!(err.to_string().contains("max_chars does not apply to pii checks"));

    let mut entry = check(CheckType::Length, GuardrailPhase::Input);
    entry.max_chars = Some(10);
    entry.use_default_rules = true;
    let err = entry.validate().unwrap_err();
    assert!(err.to_string().contains("use_default_rules does not apply to length checks"));
}

#[test]
fn length_check_requires_positive_limit() {
    let mut entry = check(CheckType::Length, GuardrailPhase::Input);
    assert!(entry.validate().is_err());
    entry.max_chars = Some(0);
    assert!(entry.validate().is_err());
    entry.max_chars = Some(4000);
    assert!(entry.validate().is_ok());
}

#[test]
fn input_checks_reject_block_policy() {
    let mut entry = check(CheckType::Pii, GuardrailPhase::Input);
    entry.output_policy = OutputPolicy::Block {
        fallback: "nope".to_string(),
    };
    let err = entry.validate().unwrap_err();
    assert!(err.to_string().contains("only applies to output checks"));
}

#[test]
fn registration_uses_type_defaults() {
    let entry = check(CheckType::Pattern, GuardrailPhase::Input);
    let registration = entry.registration(250);
    assert_eq!(registration.category, GuardrailCategory::PromptInjection);
    assert_eq!(registration.timeout, Duration::from_millis(250));
    assert!(registration.enabled);

    let mut entry = check(CheckType::Pii, GuardrailPhase::Output);
    entry.timeout_ms = Some(40);
    entry.category = Some(GuardrailCategory::Other);
    let registration = entry.registration(250);
    assert_eq!(registration.category, GuardrailCategory::Other);
    assert_eq!(registration.timeout, Duration::from_millis(40));
}

#[test]
fn pattern_check_without_rules_fails_to_build() {
    let entry = check(CheckType::Pattern, GuardrailPhase::Input);
    assert!(entry.build().is_err());
    let mut entry = check(CheckType::Pattern, GuardrailPhase::Input);
    entry.use_default_rules = true;
    assert!(entry.build().is_ok());
}
