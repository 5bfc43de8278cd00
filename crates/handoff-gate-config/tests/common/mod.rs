// crates/handoff-gate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for handoff-gate-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use handoff_gate_config::ConfigError;
use handoff_gate_config::HandoffGateConfig;

/// Test result alias used by config suites.
pub type TestResult = Result<(), String>;

/// Complete config exercising every section.
pub const SAMPLE_CONFIG: &str = r#"
[[handlers]]
id = "settings"
display_name = "Settings"
description = "Account and workspace settings"

[handlers.edge]
description = "Hand off account and settings questions"

[handlers.edge.reason_schema]
type = "object"
required = ["summary"]

[handlers.edge.reason_schema.properties.summary]
type = "string"
minLength = 1

[[handlers]]
id = "tax_documents"
display_name = "Tax Documents"

[handlers.edge]
description = "Hand off tax form questions"

[[plans]]
code = "free"
rank = 0
display_name = "Free"

[[plans]]
code = "starter"
rank = 10
display_name = "Starter"
aliases = ["starter-annual"]
handlers = ["settings", "tax_documents"]
benefits = ["Tax document assistant"]

[[plans]]
code = "business"
rank = 20
display_name = "Business"
handlers = ["settings", "tax_documents"]
tools = ["export_ledger"]

[guardrails]
default_timeout_ms = 500

[[guardrails.checks]]
id = "prompt_injection"
phase = "input"
type = "pattern"
use_default_rules = true

[[guardrails.checks]]
id = "input_length"
phase = "input"
type = "length"
max_chars = 4000

[[guardrails.checks]]
id = "output_pii"
phase = "output"
type = "pii"

[orchestrator]
eviction = "max_entries"
max_entries = 1000

[dispatcher]
handler_timeout_ms = 20000

[audit]
sink = "none"
"#;

/// Parses a TOML string into a `HandoffGateConfig` without validation.
pub fn config_from_toml(toml_str: &str) -> Result<HandoffGateConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns the sample config without validation.
pub fn sample_config() -> Result<HandoffGateConfig, toml::de::Error> {
    config_from_toml(SAMPLE_CONFIG)
}

/// Writes `contents` to `name` inside `dir`, returning the path.
pub fn write_config(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, String> {
    let path = dir.join(name);
    fs::write(&path, contents).map_err(|err| err.to_string())?;
    Ok(path)
}

/// Sets the file modification time to `secs` after the Unix epoch.
pub fn set_modified(path: &Path, secs: u64) -> Result<(), String> {
    let file = File::options().write(true).open(path).map_err(|err| err.to_string())?;
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .map_err(|err| err.to_string())
}

/// Asserts that a validation result failed with a message containing `needle`.
pub fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}
