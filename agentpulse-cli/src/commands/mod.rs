pub mod config;
pub mod costs;
pub mod rules;
pub mod run;
pub mod watch;

pub use config::{handle_config_command, ConfigCommand};
pub use costs::{handle_costs_command, CostsArgs};
pub use rules::{handle_rules_command, RulesCommand};
pub use run::{handle_run_command, RunArgs};
pub use watch::{handle_watch_command, WatchArgs};

use agentpulse_core::ingest::{read_events, ReadReport};
use agentpulse_core::{
    AgentStatus, AlertEngine, AlertSeed, NotificationDispatcher, PulseConfig, Severity,
};
use anyhow::Context;
use colored::{ColoredString, Colorize};
use std::io::BufReader;
use std::path::Path;

/// Reads JSON-lines events from a file, or from stdin when `path` is `-`.
pub(crate) fn load_events(path: &str) -> anyhow::Result<ReadReport> {
    let report = if path == "-" {
        read_events(std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open events file '{}'", path))?;
        read_events(BufReader::new(file))?
    };

    if !report.rejected.is_empty() {
        eprintln!(
            "  {} {} event(s) skipped",
            "!".yellow(),
            report.rejected.len()
        );
        for (line, err) in report.rejected.iter().take(5) {
            eprintln!("    line {}: {}", line, err);
        }
    }
    Ok(report)
}

pub(crate) fn load_seed(path: &Path) -> anyhow::Result<AlertSeed> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file '{}'", path.display()))?;
    Ok(AlertSeed::from_yaml(&text)?)
}

/// Builds the alert engine: stock rules unless disabled, then the optional seed file.
pub(crate) fn build_engine(
    config: &PulseConfig,
    rules: Option<&Path>,
    no_default_rules: bool,
) -> anyhow::Result<AlertEngine> {
    let limit = config.engine.alert_history_limit;
    let mut engine = if no_default_rules {
        AlertEngine::new(limit)
    } else {
        AlertEngine::with_default_rules(limit)
    };

    if let Some(path) = rules {
        let seed = load_seed(path)?;
        engine.apply_seed(seed, chrono::Utc::now())?;
    }
    Ok(engine)
}

pub(crate) fn build_dispatcher(config: &PulseConfig) -> anyhow::Result<NotificationDispatcher> {
    Ok(NotificationDispatcher::with_defaults(
        config.notifications.clone(),
    )?)
}

pub(crate) fn colorize_severity(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "critical".red().bold(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".blue(),
    }
}

pub(crate) fn colorize_status(status: AgentStatus) -> ColoredString {
    match status {
        AgentStatus::Running => "running".green(),
        AgentStatus::Idle => "idle".cyan(),
        AgentStatus::Error => "error".red(),
        AgentStatus::Stopped => "stopped".dimmed(),
    }
}

pub(crate) fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

pub(crate) fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", head)
    } else {
        s.to_string()
    }
}
