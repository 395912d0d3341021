// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! schema-shift CLI
//!
//! Checks, plans and applies compatibility-mode migrations against a
//! registry snapshot directory or a Confluent-compatible REST registry.
//!
//! # Usage
//!
//! ```bash
//! # Risk of one transition
//! schema-shift transition BACKWARD FULL_TRANSITIVE
//!
//! # Full 7x7 risk table
//! schema-shift matrix
//!
//! # Validate every subject against a target mode (CSV for spreadsheets)
//! schema-shift --registry-dir ./registry validate --mode FULL --format csv
//!
//! # Plan, then apply, a selective migration
//! schema-shift --config shift.toml plan
//! schema-shift --config shift.toml migrate --dry-run
//! schema-shift --config shift.toml migrate
//!
//! # Against a live registry
//! schema-shift --registry-url http://localhost:8081 validate --mode FULL
//!
//! # Compare the [[federation]] registries of a config file
//! schema-shift --config shift.toml federation modes
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use schema_shift::config::RegistryConfig;
use schema_shift::report::{
    render_health, render_matrix, render_mode_comparison, render_outcome, render_plan, render_summary,
    to_csv,
};
use schema_shift::{
    transition_matrix, BackendKind, BulkValidator, CancelToken, CompatibilityMode, ConfluentRegistry,
    FilePersistence, InMemoryRegistry, MigrationService, RegistryClient, RegistryFederation,
    SetModeStatus, ShiftConfig, ShiftError, Strategy,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Service = MigrationService<dyn RegistryClient>;
type CmdResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Schema registry compatibility-mode migration tool
#[derive(Parser, Debug)]
#[command(name = "schema-shift")]
#[command(about = "Classify, validate and plan schema registry compatibility-mode changes")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Registry snapshot directory (overrides the configuration file)
    #[arg(long, global = true, conflicts_with = "registry_url")]
    registry_dir: Option<PathBuf>,

    /// Confluent-compatible registry URL (overrides the configuration file)
    #[arg(long, global = true)]
    registry_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single mode transition
    Transition {
        from: String,
        to: String,
        #[arg(long)]
        json: bool,
    },

    /// Print the risk of every mode transition
    Matrix {
        #[arg(long)]
        json: bool,
    },

    /// Validate subject histories against a target mode
    Validate {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Build a migration plan without applying it
    Plan {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Build and apply a migration plan
    Migrate {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        strategy: Option<String>,
        /// Print the plan and stop
        #[arg(long)]
        dry_run: bool,
    },

    /// Compare and manage the registries listed under [[federation]]
    Federation {
        #[command(subcommand)]
        action: FederationAction,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "schema-shift.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file path
        #[arg(short = 'f', long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum FederationAction {
    /// Global modes and overrides side by side
    Modes {
        #[arg(long)]
        json: bool,
    },

    /// Latest version of a subject in every registry
    Find {
        subject: String,
        #[arg(long)]
        json: bool,
    },

    /// Reachability of every registry
    Health {
        #[arg(long)]
        json: bool,
    },

    /// Set a mode on several registries without validating history
    SetMode {
        /// Mode to set
        #[arg(short, long)]
        mode: String,

        /// Override every subject with this prefix instead of the global mode
        #[arg(short, long)]
        prefix: Option<String>,

        /// Registry names (default: all)
        #[arg(long = "registry")]
        registries: Vec<String>,

        /// Confirm the unvalidated switch
        #[arg(long)]
        yes: bool,
    },
}

#[derive(clap::Args, Debug)]
struct TargetArgs {
    /// Target compatibility mode
    #[arg(short, long)]
    mode: Option<String>,

    /// Only subjects starting with this prefix
    #[arg(short, long)]
    prefix: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> CmdResult {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ShiftConfig::from_file(path)?,
        None => ShiftConfig::default(),
    };
    if let Some(dir) = &args.registry_dir {
        config.registry.backend = BackendKind::Memory;
        config.registry.directory = dir.clone();
    }
    if let Some(url) = &args.registry_url {
        if !config.registry.is_rest() {
            config.registry.backend = BackendKind::Confluent;
        }
        config.registry.url = Some(url.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    // Initialize logging
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Ctrl-C stops bulk validation between subjects.
    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight subjects");
            watcher.cancel();
        }
    });

    // Registry clients block, so commands run off the async runtime.
    tokio::task::spawn_blocking(move || run(args.command, &config, &cancel)).await?
}

fn run(command: Commands, config: &ShiftConfig, cancel: &CancelToken) -> CmdResult {
    match command {
        Commands::Transition { from, to, json } => cmd_transition(&from, &to, json),
        Commands::Matrix { json } => cmd_matrix(json),
        Commands::Validate { target, format } => cmd_validate(config, target, format, cancel),
        Commands::Plan {
            target,
            strategy,
            json,
        } => cmd_plan(config, target, strategy, json, cancel),
        Commands::Migrate {
            target,
            strategy,
            dry_run,
        } => cmd_migrate(config, target, strategy, dry_run, cancel),
        Commands::Federation { action } => cmd_federation(config, action),
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::CheckConfig { file } => cmd_check_config(file),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_transition(from: &str, to: &str, json: bool) -> CmdResult {
    let from: CompatibilityMode = from.parse()?;
    let to: CompatibilityMode = to.parse()?;
    let classification = schema_shift::classify_transition(from, to);

    if json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
    } else {
        println!("{} -> {}: {}", from, to, classification.risk_level);
        println!("  {}", classification.rationale);
        if classification.requires_history_validation {
            println!("  existing history must be validated before switching");
        }
    }
    Ok(())
}

fn cmd_matrix(json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(&transition_matrix())?);
    } else {
        print!("{}", render_matrix());
    }
    Ok(())
}

fn cmd_validate(
    config: &ShiftConfig,
    target: TargetArgs,
    format: OutputFormat,
    cancel: &CancelToken,
) -> CmdResult {
    let (_, service) = open_service(config)?;
    let mode = target_mode(config, &target)?;
    let report = service.validate_all(prefix(config, &target).as_deref(), mode, cancel)?;

    match format {
        OutputFormat::Text => print!("{}", render_summary(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Csv => print!("{}", to_csv(&report.verdicts)),
    }

    if report.summary().incompatible > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_plan(
    config: &ShiftConfig,
    target: TargetArgs,
    strategy: Option<String>,
    json: bool,
    cancel: &CancelToken,
) -> CmdResult {
    let (_, service) = open_service(config)?;
    let mode = target_mode(config, &target)?;
    let strategy = strategy_of(config, strategy.as_deref())?;

    let report = service.validate_all(prefix(config, &target).as_deref(), mode, cancel)?;
    let plan = service.build_plan_from_report(&report, strategy)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}

fn cmd_migrate(
    config: &ShiftConfig,
    target: TargetArgs,
    strategy: Option<String>,
    dry_run: bool,
    cancel: &CancelToken,
) -> CmdResult {
    let (backend, service) = open_service(config)?;
    let mode = target_mode(config, &target)?;
    let strategy = strategy_of(config, strategy.as_deref())?;

    let report = service.validate_all(prefix(config, &target).as_deref(), mode, cancel)?;
    if report.cancelled {
        eprintln!("Validation cancelled; nothing was changed.");
        std::process::exit(1);
    }

    let plan = service.build_plan_from_report(&report, strategy)?;
    print!("{}", render_plan(&plan));

    if dry_run {
        println!("Dry run; nothing was changed.");
        return Ok(());
    }
    if plan.is_blocked() {
        std::process::exit(1);
    }

    let outcome = service.apply_plan(&plan);
    print!("{}", render_outcome(&outcome));
    if !outcome.is_success() {
        std::process::exit(1);
    }
    backend.persist()?;

    let confirmed = service.confirm(&plan, &CancelToken::new());
    print!("{}", render_summary(&confirmed));
    Ok(())
}

fn cmd_federation(config: &ShiftConfig, action: FederationAction) -> CmdResult {
    config.validate()?;
    if config.federation.is_empty() {
        eprintln!("No [[federation]] registries configured.");
        std::process::exit(1);
    }

    let mut federation = RegistryFederation::new();
    let mut backends = Vec::with_capacity(config.federation.len());
    for member in &config.federation {
        let backend = Backend::open(&member.registry)?;
        federation.add(member.name.clone(), Arc::clone(&backend.client));
        backends.push(backend);
    }

    match action {
        FederationAction::Modes { json } => {
            let comparison = federation.compare_modes();
            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                print!("{}", render_mode_comparison(&comparison));
            }
        }
        FederationAction::Find { subject, json } => {
            let found = federation.find_subject(&subject);
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else if found.is_empty() {
                println!("{} not found in any registry", subject);
            } else {
                for (registry, schema) in &found {
                    println!(
                        "{:<20} v{} {} {} ({} fields)",
                        registry,
                        schema.version,
                        schema.format,
                        schema.record_name,
                        schema.fields.len()
                    );
                }
            }
        }
        FederationAction::Health { json } => {
            let health = federation.health_check();
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                print!("{}", render_health(&health));
            }
            if health.values().any(|h| !h.healthy) {
                std::process::exit(1);
            }
        }
        FederationAction::SetMode {
            mode,
            prefix,
            registries,
            yes,
        } => {
            let mode: CompatibilityMode = mode.parse()?;
            if !yes {
                eprintln!("set-mode skips history validation; pass --yes to proceed.");
                std::process::exit(1);
            }
            let names: Vec<&str> = if registries.is_empty() {
                federation.names()
            } else {
                registries.iter().map(String::as_str).collect()
            };

            let results = federation.set_mode_all(&names, mode, prefix.as_deref());
            println!("{}", serde_json::to_string_pretty(&results)?);
            for backend in &backends {
                backend.persist()?;
            }
            let failed = results
                .values()
                .flat_map(|r| r.values())
                .any(|s| matches!(s, SetModeStatus::Failed { .. }));
            if failed {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> CmdResult {
    let toml_str = toml::to_string_pretty(&ShiftConfig::default())?;

    // Add comments
    let content = format!(
        r#"# schema-shift configuration
# Generated by schema-shift gen-config
#
# Modes: NONE, BACKWARD, BACKWARD_TRANSITIVE, FORWARD, FORWARD_TRANSITIVE,
#        FULL, FULL_TRANSITIVE
# Strategies: selective, global
# Backends: memory (file snapshot in registry.directory),
#           confluent, karapace, redpanda (REST API at registry.url)

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_check_config(config_path: PathBuf) -> CmdResult {
    match ShiftConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Backend:     {}", config.registry.backend);
            match &config.registry.url {
                Some(url) if config.registry.is_rest() => println!("Registry:    {}", url),
                _ => println!("Registry:    {}", config.registry.directory.display()),
            }
            println!("Default:     {}", config.registry.default_mode);
            println!("Target:      {}", config.migration.target_mode);
            println!("Strategy:    {}", config.migration.strategy);
            println!("Workers:     {}", config.migration.workers);
            if let Some(prefix) = config.subject_prefix() {
                println!("Prefix:      {}", prefix);
            }
            for member in &config.federation {
                println!("Federation:  {} ({})", member.name, member.registry.backend);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An opened registry, with its snapshot store when it is file-backed.
struct Backend {
    client: Arc<dyn RegistryClient>,
    snapshot: Option<(FilePersistence, Arc<InMemoryRegistry>)>,
}

impl Backend {
    fn open(config: &RegistryConfig) -> Result<Self, ShiftError> {
        if config.is_rest() {
            let url = config.url.as_deref().unwrap_or_default();
            let mut client = ConfluentRegistry::connect(config.backend, url, config.timeout())?;
            if let Some(user) = &config.username {
                client = client.with_basic_auth(user.clone(), config.password.clone());
            }
            return Ok(Backend {
                client: Arc::new(client),
                snapshot: None,
            });
        }

        let persistence = FilePersistence::new(&config.directory)?;
        let registry = Arc::new(persistence.load(config.default_mode()?)?);
        Ok(Backend {
            client: registry.clone(),
            snapshot: Some((persistence, registry)),
        })
    }

    /// Write a file-backed registry back to disk; REST registries keep
    /// their own state.
    fn persist(&self) -> Result<(), ShiftError> {
        if let Some((persistence, registry)) = &self.snapshot {
            persistence.save(registry)?;
            info!(directory = %persistence.directory().display(), "registry snapshot updated");
        }
        Ok(())
    }
}

fn open_service(config: &ShiftConfig) -> Result<(Backend, Service), ShiftError> {
    config.validate()?;
    let backend = Backend::open(&config.registry)?;
    let service = MigrationService::new(
        Arc::clone(&backend.client),
        BulkValidator::new(config.migration.workers),
    );
    Ok((backend, service))
}

fn target_mode(config: &ShiftConfig, target: &TargetArgs) -> Result<CompatibilityMode, ShiftError> {
    match &target.mode {
        Some(mode) => Ok(mode.parse()?),
        None => Ok(config.target_mode()?),
    }
}

fn strategy_of(config: &ShiftConfig, strategy: Option<&str>) -> Result<Strategy, ShiftError> {
    match strategy {
        Some(s) => Ok(s.parse()?),
        None => Ok(config.strategy()?),
    }
}

fn prefix(config: &ShiftConfig, target: &TargetArgs) -> Option<String> {
    target
        .prefix
        .clone()
        .or_else(|| config.subject_prefix().map(str::to_string))
}
