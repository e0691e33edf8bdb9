use agentpulse_core::{get_config_dir, PulseConfig};
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Show the effective configuration")]
    Show {
        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Show where configuration is read from")]
    Path,
}

pub async fn handle_config_command(
    config: &PulseConfig,
    cmd: Option<ConfigCommand>,
) -> anyhow::Result<()> {
    match cmd.unwrap_or(ConfigCommand::Show {
        format: "text".to_string(),
    }) {
        ConfigCommand::Show { format } => cmd_config_show(config, &format),
        ConfigCommand::Path => cmd_config_path(),
    }
}

fn cmd_config_show(config: &PulseConfig, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{}", "AgentPulse Configuration".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!();

    println!("  {}", "Logging".yellow().bold());
    println!("    Level:                 {}", config.logging.level);
    println!("    JSON:                  {}", config.logging.json_format);
    println!();

    let engine = &config.engine;
    println!("  {}", "Engine".yellow().bold());
    println!("    Tick Interval:         {} ms", engine.tick_interval_ms);
    println!("    Latency Window:        {} samples", engine.latency_window);
    println!("    Trend Capacity:        {} points", engine.trend_capacity);
    println!("    Liveness Timeout:      {} s", engine.liveness_timeout_secs);
    println!("    Activity Capacity:     {}", engine.activity_capacity);
    println!("    Alert History:         {}", engine.alert_history_limit);
    println!("    Anomaly History:       {}", engine.anomaly_history_limit);
    println!();

    let anomaly = &config.anomaly;
    let metrics: Vec<&str> = anomaly.metrics.iter().map(|m| m.as_str()).collect();
    println!("  {}", "Anomaly Detection".yellow().bold());
    println!("    Enabled:               {}", anomaly.enabled);
    println!("    Z-Score Threshold:     {}", anomaly.z_score_threshold);
    println!("    Window Size:           {}", anomaly.window_size);
    println!("    Metrics:               {}", metrics.join(", "));
    println!();

    let notifications = &config.notifications;
    println!("  {}", "Notifications".yellow().bold());
    println!("    Timeout:               {} s", notifications.timeout_secs);
    println!("    Retries:               {}", notifications.retry_count);
    println!("    Retry Delay:           {} ms", notifications.retry_delay_ms);
    println!("    PagerDuty URL:         {}", notifications.pagerduty_url);

    if !config.pricing.is_empty() {
        println!();
        println!("  {}", "Pricing Overrides".yellow().bold());
        for pricing in &config.pricing {
            println!(
                "    {:<22} ${}/1K in, ${}/1K out",
                pricing.model, pricing.input_price_per_1k, pricing.output_price_per_1k
            );
        }
    }

    Ok(())
}

fn cmd_config_path() -> anyhow::Result<()> {
    match get_config_dir() {
        Some(dir) => println!("{}", dir.join("config.toml").display()),
        None => println!("{}", "Could not determine config directory".yellow()),
    }
    if let Ok(cwd) = std::env::current_dir() {
        println!("{}", cwd.join("agentpulse.toml").display());
    }
    Ok(())
}
