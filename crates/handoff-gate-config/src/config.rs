// crates/handoff-gate-config/src/config.rs
// ============================================================================
// Module: Handoff Gate Configuration
// Description: Configuration loading, validation, and runtime builders.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: handoff-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: [`HandoffGateConfig::validate`]
//! runs every builder once, so a config that loads is a config that builds.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use handoff_gate_core::CheckId;
use handoff_gate_core::CheckRegistration;
use handoff_gate_core::DispatcherConfig;
use handoff_gate_core::EvictionPolicy;
use handoff_gate_core::FileAuditSink;
use handoff_gate_core::GuardrailCategory;
use handoff_gate_core::GuardrailCheck;
use handoff_gate_core::GuardrailPhase;
use handoff_gate_core::GuardrailPipeline;
use handoff_gate_core::HandlerDescriptor;
use handoff_gate_core::HandlerId;
use handoff_gate_core::HandoffRegistry;
use handoff_gate_core::IdleTimeout;
use handoff_gate_core::LengthCheck;
use handoff_gate_core::MaxEntries;
use handoff_gate_core::NoEviction;
use handoff_gate_core::NoopAuditSink;
use handoff_gate_core::OutputPolicy;
use handoff_gate_core::PatternCheck;
use handoff_gate_core::PatternRule;
use handoff_gate_core::PiiCheck;
use handoff_gate_core::PiiKind;
use handoff_gate_core::PlanDefinition;
use handoff_gate_core::PlanTable;
use handoff_gate_core::RoutingAuditSink;
use handoff_gate_core::RoutingEdgeTemplate;
use handoff_gate_core::StderrAuditSink;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "handoff-gate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "HANDOFF_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of registered handlers.
pub(crate) const MAX_HANDLERS: usize = 64;
/// Maximum number of plans.
pub(crate) const MAX_PLANS: usize = 32;
/// Maximum number of guardrail checks.
pub(crate) const MAX_GUARDRAIL_CHECKS: usize = 64;
/// Maximum number of pattern rules per check.
pub(crate) const MAX_PATTERN_RULES: usize = 128;
/// Maximum length of a handler identifier.
pub(crate) const MAX_HANDLER_ID_LENGTH: usize = 64;
/// Maximum length of a user-facing text.
pub(crate) const MAX_TEXT_LENGTH: usize = 2048;
/// Default guardrail check timeout in milliseconds.
pub(crate) const DEFAULT_CHECK_TIMEOUT_MS: u64 = 2_000;
/// Minimum guardrail check timeout in milliseconds.
pub(crate) const MIN_CHECK_TIMEOUT_MS: u64 = 10;
/// Maximum guardrail check timeout in milliseconds.
pub(crate) const MAX_CHECK_TIMEOUT_MS: u64 = 30_000;
/// Default handler backend timeout in milliseconds.
pub(crate) const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 30_000;
/// Minimum handler backend timeout in milliseconds.
pub(crate) const MIN_HANDLER_TIMEOUT_MS: u64 = 100;
/// Maximum handler backend timeout in milliseconds.
pub(crate) const MAX_HANDLER_TIMEOUT_MS: u64 = 600_000;
/// Default maximum inbound message size in bytes.
pub(crate) const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024;
/// Maximum allowed inbound message size in bytes.
pub(crate) const MAX_MESSAGE_BYTES_LIMIT: usize = 1024 * 1024;
/// Default pattern check threshold.
pub(crate) const DEFAULT_PATTERN_THRESHOLD: f64 = 0.5;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Handoff Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffGateConfig {
    /// Specialized handlers and their coordinator edges.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
    /// Subscription plan definitions.
    #[serde(default)]
    pub plans: Vec<PlanDefinition>,
    /// Guardrail pipeline configuration.
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    /// Conversation cache configuration.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Dispatcher limits and texts.
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl HandoffGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let mut config = Self::from_bytes(&bytes)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from raw TOML bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bytes exceed limits, fail to parse, or
    /// fail validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handlers.len() > MAX_HANDLERS {
            return Err(ConfigError::Invalid(format!(
                "handlers exceeds max entries ({MAX_HANDLERS})"
            )));
        }
        for handler in &self.handlers {
            handler.validate()?;
        }
        if self.plans.len() > MAX_PLANS {
            return Err(ConfigError::Invalid(format!("plans exceeds max entries ({MAX_PLANS})")));
        }
        let registered: BTreeSet<&HandlerId> =
            self.handlers.iter().map(|handler| &handler.id).collect();
        for plan in &self.plans {
            if let Some(unknown) = plan.handlers.iter().find(|id| !registered.contains(id)) {
                return Err(ConfigError::Invalid(format!(
                    "plan {} grants unregistered handler {unknown}",
                    plan.code
                )));
            }
        }
        self.plan_table()?;
        self.handoff_registry()?;
        self.guardrails.validate()?;
        self.guardrail_pipeline(Arc::new(NoopAuditSink))?;
        self.orchestrator.validate()?;
        self.dispatcher.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Builds the plan table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when plans are empty or duplicated.
    pub fn plan_table(&self) -> Result<PlanTable, ConfigError> {
        PlanTable::new(self.plans.clone())
            .map_err(|err| ConfigError::Invalid(format!("plans: {err}")))
    }

    /// Builds the handoff registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when handler ids repeat or a reason schema
    /// fails to compile.
    pub fn handoff_registry(&self) -> Result<HandoffRegistry, ConfigError> {
        let descriptors = self.handlers.iter().map(HandlerConfig::descriptor).collect();
        let templates = self.handlers.iter().filter_map(HandlerConfig::edge_template).collect();
        HandoffRegistry::new(descriptors, templates)
            .map_err(|err| ConfigError::Invalid(format!("handlers: {err}")))
    }

    /// Builds the guardrail pipeline, recording check events on `audit`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a check fails to build.
    pub fn guardrail_pipeline(
        &self,
        audit: Arc<dyn RoutingAuditSink>,
    ) -> Result<GuardrailPipeline, ConfigError> {
        let default_timeout = self.guardrails.default_timeout_ms;
        let mut builder = GuardrailPipeline::builder().with_audit(audit);
        for check in &self.guardrails.checks {
            builder = builder.register(check.build()?, check.registration(default_timeout));
        }
        builder.build().map_err(|err| ConfigError::Invalid(format!("guardrails: {err}")))
    }

    /// Builds the configured cache eviction policy.
    #[must_use]
    pub fn eviction_policy(&self) -> Arc<dyn EvictionPolicy> {
        match self.orchestrator.eviction {
            EvictionMode::None => Arc::new(NoEviction),
            EvictionMode::MaxEntries => Arc::new(MaxEntries(self.orchestrator.max_entries)),
            EvictionMode::IdleTimeout => Arc::new(IdleTimeout(self.orchestrator.idle_timeout_ms)),
        }
    }

    /// Builds the dispatcher configuration.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let settings = &self.dispatcher;
        DispatcherConfig {
            handler_timeout: Duration::from_millis(settings.handler_timeout_ms),
            max_message_bytes: settings.max_message_bytes,
            unavailable_message: settings.unavailable_message.clone(),
            input_rejected_message: settings.input_rejected_message.clone(),
            output_blocked_message: settings.output_blocked_message.clone(),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn audit_sink(&self) -> Result<Arc<dyn RoutingAuditSink>, ConfigError> {
        match self.audit.sink {
            AuditSinkType::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkType::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkType::File => {
                let path = self.audit.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file audit sink requires path".to_string())
                })?;
                let sink = FileAuditSink::new(path).map_err(|err| {
                    ConfigError::Io(format!("audit log {}: {err}", path.display()))
                })?;
                Ok(Arc::new(sink))
            }
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handler registration entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
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
    /// Coordinator edge; handlers without one are never reachable by handoff.
    #[serde(default)]
    pub edge: Option<EdgeConfig>,
}

impl HandlerConfig {
    /// Validates handler metadata.
    fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid("handler id must be non-empty".to_string()));
        }
        if id.len() > MAX_HANDLER_ID_LENGTH {
            return Err(ConfigError::Invalid(format!("handler id {id} exceeds max length")));
        }
        if !id.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_') {
            return Err(ConfigError::Invalid(format!(
                "handler id {id} must use lowercase letters, digits, and underscores"
            )));
        }
        validate_text(&format!("handlers.{id}.display_name"), &self.display_name)?;
        if let Some(edge) = &self.edge {
            validate_text(&format!("handlers.{id}.edge.description"), &edge.description)?;
            if !edge.reason_schema.is_object() {
                return Err(ConfigError::Invalid(format!(
                    "handlers.{id}.edge.reason_schema must be a table"
                )));
            }
        }
        Ok(())
    }

    /// Returns the handler descriptor.
    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            icon: self.icon.clone(),
            description: self.description.clone(),
        }
    }

    /// Returns the coordinator edge template, if any.
    fn edge_template(&self) -> Option<RoutingEdgeTemplate> {
        self.edge.as_ref().map(|edge| RoutingEdgeTemplate {
            target: self.id.clone(),
            reason_schema: edge.reason_schema.clone(),
            description: edge.description.clone(),
        })
    }
}

/// Coordinator-to-handler edge configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeConfig {
    /// JSON Schema (2020-12) the handoff reason must satisfy.
    #[serde(default = "default_reason_schema")]
    pub reason_schema: Value,
    /// Edge description presented to the coordinator.
    pub description: String,
}

// ============================================================================
// SECTION: Guardrails
// ============================================================================

/// Guardrail pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailsConfig {
    /// Timeout applied to checks without their own.
    #[serde(default = "default_check_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Checks in registration order.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_check_timeout_ms(),
            checks: Vec::new(),
        }
    }
}

impl GuardrailsConfig {
    /// Validates guardrail limits.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_check_timeout("guardrails.default_timeout_ms", self.default_timeout_ms)?;
        if self.checks.len() > MAX_GUARDRAIL_CHECKS {
            return Err(ConfigError::Invalid(format!(
                "guardrails.checks exceeds max entries ({MAX_GUARDRAIL_CHECKS})"
            )));
        }
        for check in &self.checks {
            check.validate()?;
        }
        Ok(())
    }
}

/// Built-in check type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Regex rule check ([`PatternCheck`]).
    Pattern,
    /// PII detector ([`PiiCheck`]).
    Pii,
    /// Character limit ([`LengthCheck`]).
    Length,
}

impl CheckType {
    /// Returns the category used when none is configured.
    const fn default_category(self) -> GuardrailCategory {
        match self {
            Self::Pattern => GuardrailCategory::PromptInjection,
            Self::Pii => GuardrailCategory::Pii,
            Self::Length => GuardrailCategory::Length,
        }
    }

    /// Returns the config label.
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Pii => "pii",
            Self::Length => "length",
        }
    }
}

/// Guardrail check entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    /// Check identifier.
    pub id: CheckId,
    /// Phase the check runs in.
    pub phase: GuardrailPhase,
    /// Built-in check type.
    #[serde(rename = "type")]
    pub check_type: CheckType,
    /// Risk category; defaults per type.
    #[serde(default)]
    pub category: Option<GuardrailCategory>,
    /// Whether the check runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-check timeout; defaults to `guardrails.default_timeout_ms`.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Output-phase tripwire policy.
    #[serde(default)]
    pub output_policy: OutputPolicy,
    /// Pattern rules (`pattern` only).
    #[serde(default)]
    pub rules: Vec<PatternRule>,
    /// Includes the built-in prompt-injection rules (`pattern` only).
    #[serde(default)]
    pub use_default_rules: bool,
    /// Minimum rule confidence that trips (`pattern` only).
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Detected kinds; empty means every kind (`pii` only).
    #[serde(default)]
    pub kinds: Vec<PiiKind>,
    /// Detection confidence (`pii` only).
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Character limit (`length` only).
    #[serde(default)]
    pub max_chars: Option<usize>,
}

impl CheckConfig {
    /// Validates type-specific fields.
    fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid("guardrail check id must be non-empty".to_string()));
        }
        if let Some(timeout_ms) = self.timeout_ms {
            validate_check_timeout(&format!("guardrails.checks.{id}.timeout_ms"), timeout_ms)?;
        }
        if self.phase == GuardrailPhase::Input && self.output_policy != OutputPolicy::LogOnly {
            return Err(ConfigError::Invalid(format!(
                "guardrail check {id}: output_policy only applies to output checks"
            )));
        }
        if let OutputPolicy::Block {
            fallback,
        } = &self.output_policy
        {
            validate_text(&format!("guardrails.checks.{id}.output_policy.fallback"), fallback)?;
        }
        let kind = self.check_type;
        self.reject_field(kind != CheckType::Pattern, !self.rules.is_empty(), "rules")?;
        self.reject_field(kind != CheckType::Pattern, self.use_default_rules, "use_default_rules")?;
        self.reject_field(kind != CheckType::Pattern, self.threshold.is_some(), "threshold")?;
        self.reject_field(kind != CheckType::Pii, !self.kinds.is_empty(), "kinds")?;
        self.reject_field(kind != CheckType::Pii, self.confidence.is_some(), "confidence")?;
        self.reject_field(kind != CheckType::Length, self.max_chars.is_some(), "max_chars")?;
        if self.rules.len() > MAX_PATTERN_RULES {
            return Err(ConfigError::Invalid(format!(
                "guardrail check {id}: rules exceeds max entries ({MAX_PATTERN_RULES})"
            )));
        }
        if kind == CheckType::Length && self.max_chars.unwrap_or(0) == 0 {
            return Err(ConfigError::Invalid(format!(
                "guardrail check {id}: length checks require max_chars greater than zero"
            )));
        }
        Ok(())
    }

    /// Rejects a field set on a check type that ignores it.
    fn reject_field(&self, ignored: bool, present: bool, field: &str) -> Result<(), ConfigError> {
        if ignored && present {
            return Err(ConfigError::Invalid(format!(
                "guardrail check {}: {field} does not apply to {} checks",
                self.id,
                self.check_type.as_str()
            )));
        }
        Ok(())
    }

    /// Builds the check implementation.
    fn build(&self) -> Result<Arc<dyn GuardrailCheck>, ConfigError> {
        let invalid = |err: handoff_gate_core::CheckBuildError| {
            ConfigError::Invalid(format!("guardrail check {}: {err}", self.id))
        };
        match self.check_type {
            CheckType::Pattern => {
                let mut rules = Vec::new();
                if self.use_default_rules {
                    rules.extend(PatternCheck::prompt_injection_rules());
                }
                rules.extend(self.rules.iter().cloned());
                let threshold = self.threshold.unwrap_or(DEFAULT_PATTERN_THRESHOLD);
                Ok(Arc::new(PatternCheck::new(rules, threshold).map_err(invalid)?))
            }
            CheckType::Pii => {
                let kinds: &[PiiKind] =
                    if self.kinds.is_empty() { &PiiKind::ALL } else { &self.kinds };
                let confidence = self.confidence.unwrap_or(PiiCheck::DEFAULT_CONFIDENCE);
                Ok(Arc::new(PiiCheck::new(kinds, confidence).map_err(invalid)?))
            }
            CheckType::Length => {
                let max_chars = self.max_chars.ok_or_else(|| {
                    ConfigError::Invalid(format!("guardrail check {}: missing max_chars", self.id))
                })?;
                Ok(Arc::new(LengthCheck::new(max_chars)))
            }
        }
    }

    /// Returns the pipeline registration.
    fn registration(&self, default_timeout_ms: u64) -> CheckRegistration {
        let category = self.category.unwrap_or_else(|| self.check_type.default_category());
        let timeout = Duration::from_millis(self.timeout_ms.unwrap_or(default_timeout_ms));
        CheckRegistration::new(self.id.clone(), self.phase, category)
            .with_enabled(self.enabled)
            .with_timeout(timeout)
            .with_output_policy(self.output_policy.clone())
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Conversation cache configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Eviction policy.
    #[serde(default)]
    pub eviction: EvictionMode,
    /// Maximum cached conversations (`max_entries` only).
    #[serde(default)]
    pub max_entries: usize,
    /// Idle time before eviction in milliseconds (`idle_timeout` only).
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

impl OrchestratorConfig {
    /// Validates eviction parameters.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.eviction {
            EvictionMode::None => Ok(()),
            EvictionMode::MaxEntries if self.max_entries == 0 => Err(ConfigError::Invalid(
                "orchestrator.max_entries must be greater than zero".to_string(),
            )),
            EvictionMode::IdleTimeout if self.idle_timeout_ms == 0 => Err(ConfigError::Invalid(
                "orchestrator.idle_timeout_ms must be greater than zero".to_string(),
            )),
            EvictionMode::MaxEntries | EvictionMode::IdleTimeout => Ok(()),
        }
    }
}

/// Cache eviction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Never evict.
    #[default]
    None,
    /// Evict least recently used entries beyond a size bound.
    MaxEntries,
    /// Evict entries idle longer than a timeout.
    IdleTimeout,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Dispatcher limits and user-facing texts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherSettings {
    /// Handler backend timeout in milliseconds.
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Reply when the backend fails or times out.
    #[serde(default = "default_unavailable_message")]
    pub unavailable_message: String,
    /// Reply when an input guardrail rejects the message.
    #[serde(default = "default_input_rejected_message")]
    pub input_rejected_message: String,
    /// Reply when an output guardrail blocks without its own fallback.
    #[serde(default = "default_output_blocked_message")]
    pub output_blocked_message: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
            unavailable_message: default_unavailable_message(),
            input_rejected_message: default_input_rejected_message(),
            output_blocked_message: default_output_blocked_message(),
        }
    }
}

impl DispatcherSettings {
    /// Validates dispatcher limits.
    fn validate(&self) -> Result<(), ConfigError> {
        let timeout_bounds = MIN_HANDLER_TIMEOUT_MS ..= MAX_HANDLER_TIMEOUT_MS;
        if !timeout_bounds.contains(&self.handler_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "dispatcher.handler_timeout_ms must be between {MIN_HANDLER_TIMEOUT_MS} and \
                 {MAX_HANDLER_TIMEOUT_MS}"
            )));
        }
        if self.max_message_bytes == 0 || self.max_message_bytes > MAX_MESSAGE_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "dispatcher.max_message_bytes must be between 1 and {MAX_MESSAGE_BYTES_LIMIT}"
            )));
        }
        validate_text("dispatcher.unavailable_message", &self.unavailable_message)?;
        validate_text("dispatcher.input_rejected_message", &self.input_rejected_message)?;
        validate_text("dispatcher.output_blocked_message", &self.output_blocked_message)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// JSON lines file path (`file` only).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit sink settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::Stderr | AuditSinkType::None, Some(_)) => {
                Err(ConfigError::Invalid("audit.path only applies to the file sink".to_string()))
            }
            (AuditSinkType::Stderr | AuditSinkType::None, None) => Ok(()),
        }
    }
}

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the environment path is too long.
pub fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let resolved = resolve_path(path)?;
    validate_path(&resolved)?;
    Ok(resolved)
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a non-empty, bounded user-facing text.
fn validate_text(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_TEXT_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Validates a guardrail timeout against bounds.
fn validate_check_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if !(MIN_CHECK_TIMEOUT_MS ..= MAX_CHECK_TIMEOUT_MS).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {MIN_CHECK_TIMEOUT_MS} and {MAX_CHECK_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Default reason schema accepting any object.
fn default_reason_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// Default check enablement.
const fn default_enabled() -> bool {
    true
}

/// Default guardrail check timeout.
const fn default_check_timeout_ms() -> u64 {
    DEFAULT_CHECK_TIMEOUT_MS
}

/// Default handler backend timeout.
const fn default_handler_timeout_ms() -> u64 {
    DEFAULT_HANDLER_TIMEOUT_MS
}

/// Default inbound message limit.
const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Default backend-unavailable reply.
fn default_unavailable_message() -> String {
    DispatcherConfig::default().unavailable_message
}

/// Default input-rejected reply.
fn default_input_rejected_message() -> String {
    DispatcherConfig::default().input_rejected_message
}

/// Default output-blocked reply.
fn default_output_blocked_message() -> String {
    DispatcherConfig::default().output_blocked_message
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
