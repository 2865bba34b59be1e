//! sitesched CLI - Construction Schedule Generation Engine
//!
//! Command-line interface for scheduling, checking, and expanding projects.

mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use sitesched_core::{
    CancellationToken, EngineConfig, OptimizationObjective, Project, ProjectTemplate, Scheduler,
};
use sitesched_solver::SiteScheduler;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::render::ExitCode;

#[derive(Parser)]
#[command(name = "sitesched")]
#[command(author, version, about = "Construction schedule generation engine", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a project
    Schedule {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail when any resource requirement could not be honoured
        #[arg(long)]
        strict: bool,
    },

    /// Report structural conflicts and resource shortages without scheduling
    Check {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Explain why a task starts when it does
    Explain {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        engine: EngineArgs,

        /// Task to explain
        #[arg(value_name = "TASK")]
        task: String,
    },

    /// Expand a project template into a project file
    Expand {
        /// Template file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Project file (JSON)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Treat FILE as a project template and expand it first
    #[arg(long)]
    template: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "SITESCHED_CONFIG")]
    config: Option<PathBuf>,

    /// Optimization objective (none, minimize-duration, minimize-peak-usage)
    #[arg(long)]
    objective: Option<String>,

    /// Maximum optimizer iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Skip resource leveling
    #[arg(long)]
    no_leveling: bool,

    /// Stop optimizing after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code.into(),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::Failure.into()
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Schedule {
            input,
            engine,
            format,
            output,
            strict,
        } => cmd_schedule(&input, &engine, format, output.as_deref(), strict),
        Commands::Check {
            input,
            engine,
            format,
        } => cmd_check(&input, &engine, format),
        Commands::Explain {
            input,
            engine,
            task,
        } => cmd_explain(&input, &engine, task),
        Commands::Expand { file, output } => cmd_expand(&file, output.as_deref()),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_schedule(
    input: &InputArgs,
    engine: &EngineArgs,
    format: OutputFormat,
    output: Option<&Path>,
    strict: bool,
) -> Result<ExitCode> {
    let project = load_project(input)?;
    let scheduler = build_scheduler(engine)?;

    let outcome = scheduler
        .run(&project)
        .with_context(|| format!("failed to schedule '{}'", project.name))?;

    for shortage in &outcome.diagnostics.shortages {
        eprintln!("warning: {}", shortage);
    }

    let rendered = match format {
        OutputFormat::Text => render::schedule_text(&outcome),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&outcome).context("failed to serialize schedule")?
        }
    };
    write_output(output, &rendered)?;

    if strict && outcome.diagnostics.has_shortages() {
        let err = outcome
            .into_strict()
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        eprintln!("error: {}", err);
        return Ok(ExitCode::Failure);
    }
    Ok(ExitCode::Success)
}

fn cmd_check(input: &InputArgs, engine: &EngineArgs, format: OutputFormat) -> Result<ExitCode> {
    let project = load_project(input)?;
    let scheduler = build_scheduler(engine)?;
    let result = scheduler.is_feasible(&project);

    let rendered = match format {
        OutputFormat::Text => render::feasibility_text(&project.name, &result),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result).context("failed to serialize check result")?
        }
    };
    write_output(None, &rendered)?;

    Ok(ExitCode::from_error_count(result.conflicts.len()))
}

fn cmd_explain(input: &InputArgs, engine: &EngineArgs, task: String) -> Result<ExitCode> {
    let project = load_project(input)?;
    let scheduler = build_scheduler(engine)?;
    let explanation = scheduler.explain(&project, &task);
    write_output(None, &render::explanation_text(&explanation))?;
    Ok(ExitCode::Success)
}

fn cmd_expand(file: &Path, output: Option<&Path>) -> Result<ExitCode> {
    let template: ProjectTemplate = read_json(file)?;
    let project = template
        .instantiate()
        .with_context(|| format!("failed to expand template '{}'", template.name))?;
    info!(tasks = project.tasks.len(), "template expanded");

    let rendered = serde_json::to_string_pretty(&project).context("failed to serialize project")?;
    write_output(output, &rendered)?;
    Ok(ExitCode::Success)
}

// ============================================================================
// Helpers
// ============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_project(input: &InputArgs) -> Result<Project> {
    if input.template {
        let template: ProjectTemplate = read_json(&input.file)?;
        return template
            .instantiate()
            .with_context(|| format!("failed to expand template '{}'", template.name));
    }
    read_json(&input.file)
}

/// Config file first, then command-line overrides
fn load_config(engine: &EngineArgs) -> Result<EngineConfig> {
    let mut config = match &engine.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EngineConfig::from_toml_str(&content)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(objective) = &engine.objective {
        config.optimization_objective = objective.parse::<OptimizationObjective>()?;
    }
    if let Some(iterations) = engine.max_iterations {
        config.max_optimizer_iterations = iterations;
    }
    if engine.no_leveling {
        config.resource_leveling = false;
    }
    config.validate()?;
    debug!(?config, "engine configuration");
    Ok(config)
}

fn build_scheduler(engine: &EngineArgs) -> Result<SiteScheduler> {
    let scheduler = SiteScheduler::with_config(load_config(engine)?);
    Ok(match engine.timeout_ms {
        Some(ms) => scheduler.with_cancellation(CancellationToken::with_timeout(
            Duration::from_millis(ms),
        )),
        None => scheduler,
    })
}

fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => fs::write(path, format!("{}\n", content))
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}
