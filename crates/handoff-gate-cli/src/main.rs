// crates/handoff-gate-cli/src/main.rs
// ============================================================================
// Module: Handoff Gate CLI Entry Point
// Description: Command dispatcher for config, scope, graph, and guardrail checks.
// Purpose: Inspect a Handoff Gate deployment offline from its config file.
// Dependencies: clap, handoff-gate-config, handoff-gate-core, serde_jcs, tokio.
// ============================================================================

//! ## Overview
//! The Handoff Gate CLI loads `handoff-gate.toml` and answers the questions an
//! operator asks before shipping a config: does it validate, what scope does a
//! plan code resolve to, which handoff edges does that scope produce, and what
//! do the guardrails decide for a given message. Structured results go to
//! stdout as canonical JSON; diagnostics go to stderr.
//! Security posture: inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use handoff_gate_cli::t;
use handoff_gate_config::HandoffGateConfig;
use handoff_gate_core::CapabilityResolver;
use handoff_gate_core::ConversationId;
use handoff_gate_core::GuardrailContext;
use handoff_gate_core::GuardrailPhase;
use handoff_gate_core::HandoffRegistry;
use handoff_gate_core::PipelineDecision;
use handoff_gate_core::PlanCode;
use handoff_gate_core::RouteNode;
use handoff_gate_core::RoutingAuditSink;
use handoff_gate_core::StaticPlanCatalog;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Exit code returned when a guardrail blocks the message.
const EXIT_BLOCKED: u8 = 2;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "handoff-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file path (overrides `HANDOFF_GATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the scope a plan code resolves to.
    Scope(PlanArgs),
    /// Print the routing graph built for a plan code.
    Graph(PlanArgs),
    /// Run the configured guardrails against a message.
    Guard(GuardCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a Handoff Gate configuration file.
    Validate,
}

/// Arguments selecting a plan.
#[derive(Args, Debug)]
struct PlanArgs {
    /// Plan code as supplied by the billing system; omitted means missing.
    #[arg(long, value_name = "CODE")]
    plan: Option<String>,
}

/// Arguments for the guard command.
#[derive(Args, Debug)]
struct GuardCommand {
    /// Pipeline phase to run.
    #[arg(long, value_enum)]
    phase: PhaseArg,
    /// Message or reply text to screen.
    #[arg(long, value_name = "TEXT")]
    message: String,
    /// Plan code recorded in the check context.
    #[arg(long, value_name = "CODE")]
    plan: Option<String>,
    /// Conversation identifier recorded in audit events.
    #[arg(long, value_name = "ID", default_value = "cli")]
    conversation: String,
}

/// Guardrail phase argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum PhaseArg {
    /// Screen an inbound user message.
    Input,
    /// Screen an outbound handler reply.
    Output,
}

impl From<PhaseArg> for GuardrailPhase {
    fn from(value: PhaseArg) -> Self {
        match value {
            PhaseArg::Input => Self::Input,
            PhaseArg::Output => Self::Output,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    let config = load_config(cli.config)?;
    match command {
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(&config),
        Commands::Scope(args) => command_scope(&config, &args),
        Commands::Graph(args) => command_graph(&config, &args),
        Commands::Guard(command) => command_guard(&config, &command).await,
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the config validation command.
fn command_config_validate(config: &HandoffGateConfig) -> CliResult<ExitCode> {
    let message = t!(
        "config.validate.ok",
        handlers = config.handlers.len(),
        plans = config.plans.len(),
        checks = config.guardrails.checks.len()
    );
    write_stdout_line(&message).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the scope resolution for a plan code.
fn command_scope(config: &HandoffGateConfig, args: &PlanArgs) -> CliResult<ExitCode> {
    let (resolver, _registry) = build_resolver(config)?;
    let plan = args.plan.as_deref().map(PlanCode::new);
    let resolution = resolver.resolve(plan.as_ref());
    if let Some(fallback) = &resolution.fallback {
        let requested = fallback.requested.as_ref().map_or("<none>", PlanCode::as_str);
        let message = t!(
            "scope.fallback",
            requested = requested,
            resolved = fallback.resolved,
            reason = fallback.reason.as_str()
        );
        write_stderr_line(&message).map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    write_json(&resolution)?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the routing graph for a plan code.
fn command_graph(config: &HandoffGateConfig, args: &PlanArgs) -> CliResult<ExitCode> {
    let (resolver, registry) = build_resolver(config)?;
    let plan = args.plan.as_deref().map(PlanCode::new);
    let resolution = resolver.resolve(plan.as_ref());
    let graph = registry.build_graph(&resolution.scope, &resolver.plan_table());
    write_json(&graph.summary())?;
    Ok(ExitCode::SUCCESS)
}

/// Runs one guardrail phase against a message.
async fn command_guard(config: &HandoffGateConfig, command: &GuardCommand) -> CliResult<ExitCode> {
    let limit = config.dispatcher.max_message_bytes;
    if command.message.len() > limit {
        return Err(CliError::new(t!(
            "guard.message_too_large",
            size = command.message.len(),
            limit = limit
        )));
    }
    let audit = build_audit(config)?;
    let (resolver, _registry) = build_resolver(config)?;
    let pipeline = config.guardrail_pipeline(audit).map_err(|err| {
        CliError::new(t!("config.build_failed", component = "guardrail pipeline", error = err))
    })?;
    let phase = GuardrailPhase::from(command.phase);
    let plan = command.plan.as_deref().map(PlanCode::new);
    let resolution = resolver.resolve(plan.as_ref());
    let ctx = GuardrailContext {
        conversation_id: ConversationId::new(command.conversation.clone()),
        request_id: None,
        phase,
        plan_code: resolution.scope.plan_code().clone(),
        node: match phase {
            GuardrailPhase::Input => None,
            GuardrailPhase::Output => Some(RouteNode::Coordinator),
        },
    };
    let result = pipeline.run(phase, &command.message, &ctx).await;
    write_json(&result)?;
    if let PipelineDecision::Blocked {
        check_id, ..
    } = &result.decision
    {
        write_stderr_line(&t!("guard.blocked", check = check_id))
            .map_err(|err| CliError::new(output_error("stderr", &err)))?;
        return Ok(ExitCode::from(EXIT_BLOCKED));
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Loads and validates the config.
fn load_config(path: Option<PathBuf>) -> CliResult<HandoffGateConfig> {
    HandoffGateConfig::load(path.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))
}

/// Builds the configured audit sink.
fn build_audit(config: &HandoffGateConfig) -> CliResult<Arc<dyn RoutingAuditSink>> {
    config.audit_sink().map_err(|err| {
        CliError::new(t!("config.build_failed", component = "audit sink", error = err))
    })
}

/// Builds the capability resolver and handoff registry.
fn build_resolver(config: &HandoffGateConfig) -> CliResult<(CapabilityResolver, HandoffRegistry)> {
    let audit = build_audit(config)?;
    let registry = config.handoff_registry().map_err(|err| {
        CliError::new(t!("config.build_failed", component = "handoff registry", error = err))
    })?;
    let table = config.plan_table().map_err(|err| {
        CliError::new(t!("config.build_failed", component = "plan table", error = err))
    })?;
    let resolver = CapabilityResolver::new(
        Arc::new(StaticPlanCatalog::new(table)),
        registry.handler_ids().cloned(),
        audit,
    )
    .map_err(|err| {
        CliError::new(t!("config.build_failed", component = "capability resolver", error = err))
    })?;
    Ok((resolver, registry))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes canonical JSON followed by a newline to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(t!("output.json_failed", error = err)))?;
    bytes.push(b'\n');
    let mut stdout = std::io::stdout();
    stdout.write_all(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
