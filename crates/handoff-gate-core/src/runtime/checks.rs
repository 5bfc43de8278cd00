// crates/handoff-gate-core/src/runtime/checks.rs
// ============================================================================
// Module: Handoff Gate Built-in Checks
// Description: Pattern, PII, length, and classifier-backed guardrail checks.
// Purpose: Provide ready-made checks for the guardrail pipeline.
// Dependencies: crate::{core, interfaces}, regex, serde_json
// ============================================================================

//! ## Overview
//! Heuristic checks here run locally and cheaply; [`ClassifierCheck`] wraps an
//! external [`SafetyClassifier`] and belongs in the classifier tier. Checks
//! report metadata only (labels, kinds, counts), never the matched text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::CheckVerdict;
use crate::core::GuardrailContext;
use crate::interfaces::CheckError;
use crate::interfaces::GuardrailCheck;
use crate::interfaces::SafetyClassifier;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum compiled size for a single user-supplied pattern.
const MAX_PATTERN_SIZE_BYTES: usize = 1 << 20;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while constructing built-in checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckBuildError {
    /// A pattern failed to compile.
    #[error("pattern {label} is invalid: {error}")]
    InvalidPattern {
        /// Pattern label.
        label: String,
        /// Compiler error.
        error: String,
    },
    /// A confidence or threshold is outside `[0, 1]`.
    #[error("{0} must be within [0, 1]")]
    OutOfRange(String),
    /// A check was configured without anything to detect.
    #[error("{0} requires at least one rule")]
    Empty(String),
}

/// Validates that a value lies within `[0, 1]`.
fn check_unit_range(name: &str, value: f64) -> Result<(), CheckBuildError> {
    if (0.0 ..= 1.0).contains(&value) {
        Ok(())
    } else {
        Err(CheckBuildError::OutOfRange(name.to_string()))
    }
}

// ============================================================================
// SECTION: Pattern Check
// ============================================================================

/// Pattern rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternRule {
    /// Label reported when the rule matches.
    pub label: String,
    /// Regular expression, matched case-insensitively.
    pub pattern: String,
    /// Confidence assigned to a match.
    pub confidence: f64,
}

impl PatternRule {
    /// Builds a pattern rule.
    #[must_use]
    pub fn new(label: impl Into<String>, pattern: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
            confidence,
        }
    }
}

/// Compiled pattern rule.
#[derive(Debug, Clone)]
struct CompiledRule {
    /// Rule label.
    label: String,
    /// Compiled expression.
    regex: Regex,
    /// Match confidence.
    confidence: f64,
}

/// Heuristic check matching case-insensitive regex rules.
///
/// # Invariants
/// - Trips only when a rule with confidence at or above `threshold` matches.
#[derive(Debug, Clone)]
pub struct PatternCheck {
    /// Compiled rules.
    rules: Vec<CompiledRule>,
    /// Minimum confidence for a match to trip.
    threshold: f64,
}

impl PatternCheck {
    /// Compiles a pattern check.
    ///
    /// # Errors
    ///
    /// Returns [`CheckBuildError`] when a rule fails to compile or a
    /// confidence is out of range.
    pub fn new(rules: Vec<PatternRule>, threshold: f64) -> Result<Self, CheckBuildError> {
        if rules.is_empty() {
            return Err(CheckBuildError::Empty("pattern check".to_string()));
        }
        check_unit_range("pattern threshold", threshold)?;
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            check_unit_range(&format!("confidence of pattern {}", rule.label), rule.confidence)?;
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .size_limit(MAX_PATTERN_SIZE_BYTES)
                .build()
                .map_err(|err| CheckBuildError::InvalidPattern {
                    label: rule.label.clone(),
                    error: err.to_string(),
                })?;
            compiled.push(CompiledRule {
                label: rule.label,
                regex,
                confidence: rule.confidence,
            });
        }
        Ok(Self {
            rules: compiled,
            threshold,
        })
    }

    /// Returns the default prompt-injection and jailbreak rules.
    #[must_use]
    pub fn prompt_injection_rules() -> Vec<PatternRule> {
        vec![
            PatternRule::new(
                "ignore_instructions",
                r"\b(ignore|disregard|forget)\b.{0,20}\b(all|any|previous|prior|above)\b.{0,20}\b(instructions|rules|prompts?)\b",
                0.95,
            ),
            PatternRule::new(
                "reveal_system_prompt",
                r"\b(reveal|show|print|repeat)\b.{0,20}\b(system|hidden|initial)\s+(prompt|instructions)\b",
                0.9,
            ),
            PatternRule::new(
                "role_override",
                r"\byou\s+are\s+now\b.{0,30}\b(dan|jailbroken|unrestricted|developer\s+mode)\b",
                0.9,
            ),
            PatternRule::new(
                "pretend_no_rules",
                r"\bpretend\b.{0,30}\bno\s+(rules|restrictions)\b",
                0.7,
            ),
        ]
    }
}

#[async_trait]
impl GuardrailCheck for PatternCheck {
    async fn run(
        &self,
        payload: &str,
        _ctx: &GuardrailContext,
    ) -> Result<CheckVerdict, CheckError> {
        let mut matched = Vec::new();
        let mut confidence: f64 = 0.0;
        for rule in &self.rules {
            if rule.confidence >= self.threshold && rule.regex.is_match(payload) {
                matched.push(Value::String(rule.label.clone()));
                confidence = confidence.max(rule.confidence);
            }
        }
        if matched.is_empty() {
            return Ok(CheckVerdict::pass());
        }
        let mut info = Map::new();
        info.insert("matched".to_string(), Value::Array(matched));
        Ok(CheckVerdict::trip(confidence, info))
    }
}

// ============================================================================
// SECTION: PII Check
// ============================================================================

/// Kind of personally identifiable information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    /// E-mail address.
    Email,
    /// Telephone number.
    Phone,
    /// US social security number.
    Ssn,
    /// Payment card number (Luhn-valid).
    PaymentCard,
}

impl PiiKind {
    /// All supported kinds.
    pub const ALL: [Self; 4] = [Self::Email, Self::Phone, Self::Ssn, Self::PaymentCard];

    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::PaymentCard => "payment_card",
        }
    }

    /// Returns the detection expression for the kind.
    const fn pattern(self) -> &'static str {
        match self {
            Self::Email => r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
            Self::Phone => r"(?:\+?1[-. ]?)?(?:\(\d{3}\)|\b\d{3})[-. ]?\d{3}[-. ]?\d{4}\b",
            Self::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            Self::PaymentCard => r"\b\d(?:[ -]?\d){12,18}\b",
        }
    }
}

/// Heuristic check detecting personally identifiable information.
#[derive(Debug, Clone)]
pub struct PiiCheck {
    /// Enabled detectors.
    detectors: Vec<(PiiKind, Regex)>,
    /// Confidence reported on detection.
    confidence: f64,
}

impl PiiCheck {
    /// Default detection confidence.
    pub const DEFAULT_CONFIDENCE: f64 = 0.9;

    /// Builds a check for the given kinds.
    ///
    /// # Errors
    ///
    /// Returns [`CheckBuildError`] when no kinds are given or the confidence
    /// is out of range.
    pub fn new(kinds: &[PiiKind], confidence: f64) -> Result<Self, CheckBuildError> {
        if kinds.is_empty() {
            return Err(CheckBuildError::Empty("pii check".to_string()));
        }
        check_unit_range("pii confidence", confidence)?;
        let mut detectors = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let regex = Regex::new(kind.pattern()).map_err(|err| CheckBuildError::InvalidPattern {
                label: kind.as_str().to_string(),
                error: err.to_string(),
            })?;
            detectors.push((*kind, regex));
        }
        Ok(Self {
            detectors,
            confidence,
        })
    }

    /// Builds a check detecting every supported kind.
    ///
    /// # Errors
    ///
    /// Returns [`CheckBuildError`] when a detector fails to compile.
    pub fn all() -> Result<Self, CheckBuildError> {
        Self::new(&PiiKind::ALL, Self::DEFAULT_CONFIDENCE)
    }

    /// Returns the kinds detected in the payload.
    #[must_use]
    pub fn detect(&self, payload: &str) -> Vec<PiiKind> {
        self.detectors
            .iter()
            .filter(|(kind, regex)| match kind {
                PiiKind::PaymentCard => regex.find_iter(payload).any(|m| luhn_valid(m.as_str())),
                _ => regex.is_match(payload),
            })
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// Returns true when the digits in `candidate` pass the Luhn checksum.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|ch| ch.to_digit(10)).collect();
    if !(13 ..= 19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(index, digit)| {
            if index % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                *digit
            }
        })
        .sum();
    sum % 10 == 0
}

#[async_trait]
impl GuardrailCheck for PiiCheck {
    async fn run(
        &self,
        payload: &str,
        _ctx: &GuardrailContext,
    ) -> Result<CheckVerdict, CheckError> {
        let kinds = self.detect(payload);
        if kinds.is_empty() {
            return Ok(CheckVerdict::pass());
        }
        let mut info = Map::new();
        info.insert(
            "kinds".to_string(),
            Value::Array(
                kinds.iter().map(|kind| Value::String(kind.as_str().to_string())).collect(),
            ),
        );
        Ok(CheckVerdict::trip(self.confidence, info))
    }
}

// ============================================================================
// SECTION: Length Check
// ============================================================================

/// Heuristic check bounding payload length in characters.
#[derive(Debug, Clone, Copy)]
pub struct LengthCheck {
    /// Maximum allowed characters.
    max_chars: usize,
}

impl LengthCheck {
    /// Builds a length check.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
        }
    }
}

#[async_trait]
impl GuardrailCheck for LengthCheck {
    async fn run(
        &self,
        payload: &str,
        _ctx: &GuardrailContext,
    ) -> Result<CheckVerdict, CheckError> {
        let length = payload.chars().count();
        if length <= self.max_chars {
            return Ok(CheckVerdict::pass());
        }
        let mut info = Map::new();
        info.insert("length".to_string(), json!(length));
        info.insert("limit".to_string(), json!(self.max_chars));
        Ok(CheckVerdict::trip(1.0, info))
    }
}

// ============================================================================
// SECTION: Classifier Check
// ============================================================================

/// Classifier-tier check backed by an external safety classifier.
pub struct ClassifierCheck {
    /// External classifier.
    classifier: Arc<dyn SafetyClassifier>,
    /// Minimum score that trips.
    threshold: f64,
}

impl ClassifierCheck {
    /// Builds a classifier check.
    ///
    /// # Errors
    ///
    /// Returns [`CheckBuildError::OutOfRange`] when the threshold is outside `[0, 1]`.
    pub fn new(
        classifier: Arc<dyn SafetyClassifier>,
        threshold: f64,
    ) -> Result<Self, CheckBuildError> {
        check_unit_range("classifier threshold", threshold)?;
        Ok(Self {
            classifier,
            threshold,
        })
    }
}

#[async_trait]
impl GuardrailCheck for ClassifierCheck {
    async fn run(
        &self,
        payload: &str,
        _ctx: &GuardrailContext,
    ) -> Result<CheckVerdict, CheckError> {
        let score = self.classifier.score(payload).await?;
        if !score.score.is_finite() {
            return Err(CheckError::Failed("classifier returned a non-finite score".to_string()));
        }
        if score.score < self.threshold {
            return Ok(CheckVerdict::pass());
        }
        let mut info = Map::new();
        info.insert("score".to_string(), json!(score.score));
        if let Some(label) = score.label {
            info.insert("label".to_string(), Value::String(label));
        }
        Ok(CheckVerdict::trip(score.score, info))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
