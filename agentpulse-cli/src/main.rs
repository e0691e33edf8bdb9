use agentpulse_core::{CliErrorDisplay, PulseConfig, PulseError};
use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{
    handle_config_command, handle_costs_command, handle_rules_command, handle_run_command,
    handle_watch_command, ConfigCommand, CostsArgs, RulesCommand, RunArgs, WatchArgs,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "agentpulse")]
#[command(version = VERSION)]
#[command(about = "AgentPulse - live telemetry, alerting and anomaly detection for AI agents")]
#[command(long_about = r#"
AgentPulse consumes a stream of agent events (registrations, LLM calls, tool calls,
status changes) as JSON lines and turns them into per-agent metrics, alert
transitions and anomaly reports.

Use 'agentpulse run' to replay a recorded event file, or 'agentpulse watch' to
follow a live stream on stdin.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true, help = "Read configuration from this file")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Replay an event file through the monitor on a simulated clock")]
    Run(RunArgs),

    #[command(about = "Follow a live event stream and print alerts as they happen")]
    Watch(WatchArgs),

    #[command(about = "List and validate alert rules")]
    Rules {
        #[command(subcommand)]
        action: Option<RulesCommand>,
    },

    #[command(about = "Summarize and forecast cost for an event file")]
    Costs(CostsArgs),

    #[command(about = "Inspect the effective configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommand>,
    },

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.verbose, &config);

    match run(cli, config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(e: &anyhow::Error) {
    match e.downcast_ref::<PulseError>() {
        Some(pulse) => eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(pulse)),
        None => eprintln!("{}: {:#}", "Error".red().bold(), e),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PulseConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(PulseError::ConfigFileNotFound(path.display().to_string()).into());
            }
            PulseConfig::load_from_paths(vec![path.clone()])
                .with_context(|| format!("Failed to load config from '{}'", path.display()))
        }
        None => PulseConfig::load().context("Failed to load configuration"),
    }
}

// Logs go to stderr so stdout stays clean for JSON output.
fn init_logging(verbose: bool, config: &PulseConfig) {
    let level = if verbose { "debug" } else { config.log_level() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = config.logging.json_format;

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli, config: PulseConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => handle_run_command(&config, args).await,
        Commands::Watch(args) => handle_watch_command(&config, args).await,
        Commands::Rules { action } => handle_rules_command(&config, action).await,
        Commands::Costs(args) => handle_costs_command(&config, args).await,
        Commands::Config { action } => handle_config_command(&config, action).await,
        Commands::Version { detailed } => cmd_version(detailed),
    }
}

fn cmd_version(detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "AgentPulse Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Event Types:".bold());
        println!("    register, llm_call, tool_call, status, activity, trace");
        println!();
        println!("  {}", "Notification Channels:".bold());
        println!("    slack, pagerduty, webhook");
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("agentpulse {}", VERSION);
    }

    Ok(())
}
