// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fanout main entry point - CLI, commands, and REPL.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use fanout::agent::LoopConfig;
use fanout::config::{self, CliOptions, ResolvedConfig};
use fanout::orchestrator::{Orchestrator, OrchestratorConfig};
use fanout::providers::create_provider_from_config;
use fanout::telemetry::{init_telemetry, TelemetryConfig};

/// Crate version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fanout - ask every MCP tool server at once.
#[derive(Parser)]
#[command(name = "fanout")]
#[command(author, version, about = "Fan one query out to every MCP tool server", long_about = None)]
struct Cli {
    /// Server targets: script paths (.py/.js), npm packages, or URLs
    targets: Vec<String>,

    /// Model to use
    #[arg(short, long, env = "FANOUT_MODEL")]
    model: Option<String>,

    /// Base URL for the Anthropic API
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    base_url: Option<String>,

    /// Token budget per model call
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Maximum nesting of follow-up model calls
    #[arg(long)]
    max_tool_depth: Option<usize>,

    /// Run a single prompt and exit
    #[arg(short = 'P', long)]
    prompt: Option<String>,

    /// Output format for non-interactive mode
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    output_format: OutputFormat,

    /// Show debug output and a metrics report on exit
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show trace output (full payloads)
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for non-interactive mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the trip-planning REST service
    Trip {
        /// Listen address (host:port)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Initialize a new configuration file
    Init,

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig::from_flags(cli.verbose, cli.trace))?;

    let mut cli_options = CliOptions {
        model: cli.model,
        base_url: cli.base_url,
        max_tokens: cli.max_tokens,
        max_tool_depth: cli.max_tool_depth,
        servers: cli.targets,
        trip_bind: None,
    };

    if let Some(command) = cli.command {
        if let Commands::Trip { ref bind } = command {
            cli_options.trip_bind = bind.clone();
        }
        return handle_command(command, cli_options).await;
    }

    let workspace_root = std::env::current_dir()?;
    let config = config::load_config(&workspace_root, cli_options)?;

    let outcome = run(&config, cli.prompt.as_deref(), cli.output_format).await;

    #[cfg(feature = "telemetry")]
    if cli.verbose {
        eprintln!("{}", fanout::telemetry::GLOBAL_METRICS.snapshot().format_report().dimmed());
    }

    outcome
}

async fn handle_command(command: Commands, cli_options: CliOptions) -> anyhow::Result<()> {
    let workspace_root = std::env::current_dir()?;
    match command {
        Commands::Trip { .. } => {
            let config = config::load_config(&workspace_root, cli_options)?;
            println!("{} Trip planner on {}", "→".cyan(), config.trip.bind.bright_white());
            fanout::trip::serve(config.trip).await?;
        }
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                let config = config::load_config(&workspace_root, cli_options)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Commands::Init => {
            let path = config::init_config(&workspace_root, None)?;
            println!("Created config file: {}", path.display());
        }
        Commands::Version => {
            println!("fanout {}", VERSION);
        }
    }
    Ok(())
}

/// Connect, answer the one-shot prompt or run the REPL, then close every session.
async fn run(config: &ResolvedConfig, prompt: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    if config.servers.is_empty() {
        bail!("No tool servers configured. Pass targets (e.g. `fanout weather.py maps.js`) or add `servers` to .fanout.json");
    }

    let provider = create_provider_from_config(config).context("Failed to create provider")?;
    let mut orchestrator = Orchestrator::new(
        provider,
        LoopConfig {
            max_tool_depth: config.max_tool_depth,
            system_prompt: config.system_prompt.clone(),
            annotate_tool_calls: true,
        },
        OrchestratorConfig {
            branch_timeout: (config.branch_timeout_sec > 0).then(|| Duration::from_secs(config.branch_timeout_sec)),
            synthesize_single: config.synthesize_single,
        },
    );

    for (label, e) in orchestrator.connect_all(&config.servers).await {
        eprintln!("{} {}: {}", "✗".red(), label.bright_white(), e);
    }
    if orchestrator.is_empty() {
        bail!("No tool server could be connected");
    }
    eprintln!(
        "{} Connected to {}",
        "✓".green(),
        orchestrator.labels().join(", ").bright_white()
    );

    let outcome = match prompt {
        Some(prompt) => handle_prompt(&mut orchestrator, prompt, format).await,
        None => run_repl(&mut orchestrator).await,
    };

    for (label, e) in orchestrator.shutdown().await {
        eprintln!("{} Failed to close {}: {}", "!".yellow(), label, e);
    }

    outcome
}

async fn handle_prompt(orchestrator: &mut Orchestrator, prompt: &str, format: OutputFormat) -> anyhow::Result<()> {
    let Some(result) = interruptible(orchestrator.query(prompt), tokio::signal::ctrl_c()).await else {
        bail!("Interrupted");
    };

    match format {
        OutputFormat::Text => {
            println!("{}", result?);
        }
        OutputFormat::Json => {
            let response = match result {
                Ok(answer) => serde_json::json!({"success": true, "response": answer}),
                Err(e) => serde_json::json!({"success": false, "response": "", "error": e.to_string()}),
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}

async fn run_repl(orchestrator: &mut Orchestrator) -> anyhow::Result<()> {
    println!("{}", "Type your queries, 'refresh' to clear history, or 'quit' to exit.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{} ", "Query:".cyan().bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }
        if query.eq_ignore_ascii_case("refresh") {
            orchestrator.reset();
            println!("{}", "History cleared.".dimmed());
            continue;
        }

        // Dropping the query on Ctrl-C leaves every history as it was.
        let Some(outcome) = interruptible(orchestrator.query(query), tokio::signal::ctrl_c()).await else {
            eprintln!("\n{}", "Interrupted.".yellow());
            break;
        };
        match outcome {
            Ok(answer) => println!("\n{}", answer),
            Err(e) => eprintln!("\n{} {}", "Error:".red().bold(), e),
        }
    }

    Ok(())
}

/// Run `work` unless `interrupt` completes first.
async fn interruptible<T>(work: impl Future<Output = T>, interrupt: impl Future) -> Option<T> {
    tokio::select! {
        output = work => Some(output),
        _ = interrupt => None,
    }
}
