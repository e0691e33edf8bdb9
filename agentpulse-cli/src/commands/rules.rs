use agentpulse_core::{AlertEngine, AlertRule, PulseConfig};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::path::PathBuf;

use super::{build_engine, colorize_severity, load_seed, truncate_string};

#[derive(Subcommand)]
pub enum RulesCommand {
    #[command(about = "List the alert rules a run would evaluate")]
    List {
        #[arg(short, long, help = "YAML file with extra alert rules and channels")]
        rules: Option<PathBuf>,

        #[arg(long, help = "Do not include the built-in alert rules")]
        no_default_rules: bool,

        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Check a YAML rules file without running anything")]
    Validate {
        #[arg(help = "Path to the rules file")]
        file: PathBuf,
    },
}

pub async fn handle_rules_command(
    config: &PulseConfig,
    cmd: Option<RulesCommand>,
) -> anyhow::Result<()> {
    match cmd.unwrap_or(RulesCommand::List {
        rules: None,
        no_default_rules: false,
        format: "text".to_string(),
    }) {
        RulesCommand::List {
            rules,
            no_default_rules,
            format,
        } => {
            let engine = build_engine(config, rules.as_deref(), no_default_rules)?;
            cmd_rules_list(&engine, &format)
        }
        RulesCommand::Validate { file } => cmd_rules_validate(config, &file),
    }
}

fn cmd_rules_list(engine: &AlertEngine, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let output = serde_json::json!({
            "rules": engine.rules(),
            "channels": engine.channels(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Alert Rules".cyan().bold());
    println!();

    if engine.rules().is_empty() {
        println!("{}", "No alert rules configured.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::White),
            Cell::new("Name").fg(Color::White),
            Cell::new("Condition").fg(Color::White),
            Cell::new("For").fg(Color::White),
            Cell::new("Severity").fg(Color::White),
            Cell::new("Channels").fg(Color::White),
            Cell::new("Enabled").fg(Color::White),
        ]);

    for rule in engine.rules() {
        table.add_row(vec![
            Cell::new(truncate_string(&rule.id, 14)),
            Cell::new(&rule.name),
            Cell::new(describe_condition(rule)),
            Cell::new(format!("{}s", rule.duration_secs)),
            Cell::new(colorize_severity(rule.severity).to_string()),
            Cell::new(rule.channels.len().to_string()),
            if rule.enabled {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no").fg(Color::DarkGrey)
            },
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "  {} rules, {} channels",
        engine.rules().len(),
        engine.channels().len()
    );
    Ok(())
}

fn describe_condition(rule: &AlertRule) -> String {
    format!("{} {} {}", rule.metric, rule.condition.symbol(), rule.threshold)
}

fn cmd_rules_validate(config: &PulseConfig, file: &std::path::Path) -> anyhow::Result<()> {
    let seed = load_seed(file)?;
    let (channels, rules) = (seed.channels.len(), seed.rules.len());

    let mut engine = AlertEngine::new(config.engine.alert_history_limit);
    engine.apply_seed(seed, chrono::Utc::now())?;

    println!(
        "{} {} ({} rules, {} channels)",
        "✓".green().bold(),
        file.display(),
        rules,
        channels
    );
    Ok(())
}
