use agentpulse_core::{
    AlertEvent, AnomalyEvent, MetricsSnapshot, Monitor, PulseConfig, TickReport,
};
use chrono::{Duration, Utc};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::path::PathBuf;

use super::{
    build_dispatcher, build_engine, colorize_severity, colorize_status, format_tokens,
    load_events, truncate_string,
};

#[derive(Args)]
pub struct RunArgs {
    #[arg(short, long, default_value = "-", help = "JSON-lines event file, or - for stdin")]
    pub events: String,

    #[arg(short, long, help = "YAML file with extra alert rules and channels")]
    pub rules: Option<PathBuf>,

    #[arg(long, help = "Do not load the built-in alert rules")]
    pub no_default_rules: bool,

    #[arg(
        long,
        default_value_t = 0,
        help = "Events ingested between ticks (0 ingests everything before the first tick)"
    )]
    pub events_per_tick: usize,

    #[arg(long, default_value_t = 0, help = "Extra ticks to run after the input is exhausted")]
    pub ticks: u32,

    #[arg(long, help = "Simulated tick interval in milliseconds (defaults to the configured interval)")]
    pub interval_ms: Option<u64>,

    #[arg(long, help = "Send alert notifications to configured channels")]
    pub notify: bool,

    #[arg(long, help = "Print Prometheus metrics after the run")]
    pub prometheus: bool,

    #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
    pub format: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOutput<'a> {
    ticks: u64,
    events_accepted: usize,
    events_rejected: usize,
    alerts: &'a [AlertEvent],
    anomalies: &'a [AnomalyEvent],
    snapshot: &'a MetricsSnapshot,
}

/// Replays an event stream against a simulated clock: each tick advances time by the
/// interval, so dwell times and trends behave as they would live.
pub async fn handle_run_command(config: &PulseConfig, args: RunArgs) -> anyhow::Result<()> {
    let report = load_events(&args.events)?;
    let engine = build_engine(config, args.rules.as_deref(), args.no_default_rules)?;
    let dispatcher = if args.notify {
        build_dispatcher(config)?
    } else {
        agentpulse_core::NotificationDispatcher::new()
    };
    let monitor = Monitor::with_parts(config, engine, dispatcher)?;

    let interval = Duration::milliseconds(
        args.interval_ms.unwrap_or(config.engine.tick_interval_ms) as i64,
    );
    let chunk = if args.events_per_tick == 0 {
        report.events.len().max(1)
    } else {
        args.events_per_tick
    };

    let mut now = Utc::now();
    let mut accepted = 0;
    let mut rejected = report.rejected.len();
    let mut alerts = Vec::new();
    let mut anomalies = Vec::new();
    let text = args.format != "json";

    let record = |tick: TickReport, alerts: &mut Vec<AlertEvent>, anomalies: &mut Vec<AnomalyEvent>| {
        if text {
            print_tick_events(&tick);
        }
        alerts.extend(tick.alerts);
        anomalies.extend(tick.anomalies);
        tick.snapshot
    };

    let mut snapshot = monitor.snapshot().await;
    let mut events = report.events.into_iter().peekable();
    while events.peek().is_some() {
        let batch: Vec<_> = events.by_ref().take(chunk).collect();
        let outcome = monitor.ingest_batch(batch, now).await;
        accepted += outcome.accepted;
        rejected += outcome.rejected.len();
        for (_, err) in &outcome.rejected {
            tracing::warn!(code = err.error_code(), "Event rejected: {}", err);
        }

        snapshot = record(monitor.tick_at(now).await, &mut alerts, &mut anomalies);
        now += interval;
    }

    for _ in 0..args.ticks {
        snapshot = record(monitor.tick_at(now).await, &mut alerts, &mut anomalies);
        now += interval;
    }

    if !text {
        let output = RunOutput {
            ticks: snapshot.tick,
            events_accepted: accepted,
            events_rejected: rejected,
            alerts: &alerts,
            anomalies: &anomalies,
            snapshot: &snapshot,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&snapshot, accepted, rejected, alerts.len(), anomalies.len());
    }

    if args.prometheus {
        println!();
        print!("{}", monitor.telemetry().encode()?);
    }

    Ok(())
}

fn print_tick_events(tick: &TickReport) {
    for alert in &tick.alerts {
        let label = if alert.is_firing() {
            "FIRING".red().bold()
        } else {
            "RESOLVED".green().bold()
        };
        println!(
            "  [tick {:>4}] {} {} {}",
            tick.snapshot.tick,
            label,
            colorize_severity(alert.severity),
            alert.message
        );
    }
    for anomaly in &tick.anomalies {
        println!(
            "  [tick {:>4}] {} {} {}",
            tick.snapshot.tick,
            "ANOMALY".magenta().bold(),
            anomaly.severity,
            anomaly.message
        );
    }
}

fn print_summary(
    snapshot: &MetricsSnapshot,
    accepted: usize,
    rejected: usize,
    alert_count: usize,
    anomaly_count: usize,
) {
    println!();
    println!("{}", "AgentPulse Run Summary".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!();

    if snapshot.agents.is_empty() {
        println!("{}", "No agents observed.".yellow());
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Agent").fg(Color::White),
                Cell::new("Model").fg(Color::White),
                Cell::new("Status").fg(Color::White),
                Cell::new("Requests").fg(Color::White),
                Cell::new("Success").fg(Color::White),
                Cell::new("p50/p95/p99 ms").fg(Color::White),
                Cell::new("Tokens").fg(Color::White),
                Cell::new("Cost").fg(Color::White),
            ]);

        for agent in &snapshot.agents {
            let m = &agent.metrics;
            table.add_row(vec![
                Cell::new(truncate_string(&agent.name, 24)),
                Cell::new(truncate_string(&agent.model, 20)),
                Cell::new(colorize_status(agent.status).to_string()),
                Cell::new(m.total_requests.to_string()),
                Cell::new(format!("{:.1}%", m.success_rate)),
                Cell::new(format!("{}/{}/{}", m.p50_latency, m.p95_latency, m.p99_latency)),
                Cell::new(format_tokens(m.total_tokens())),
                Cell::new(format!("${:.4}", m.total_cost)).fg(Color::Yellow),
            ]);
        }
        println!("{table}");
    }

    let overall = &snapshot.overall;
    println!();
    println!("  {}", "Overall".yellow().bold());
    println!("    Ticks:          {}", snapshot.tick);
    println!("    Events:         {} accepted, {} rejected", accepted, rejected);
    println!("    Active Agents:  {}", overall.active_agents);
    println!("    Requests:       {}", overall.total_requests);
    println!("    Success Rate:   {:.1}%", overall.success_rate);
    println!("    Error Rate:     {:.2}%", overall.error_rate);
    println!("    Avg Latency:    {} ms", overall.avg_latency);
    println!("    Throughput:     {:.1} req/tick", overall.throughput);
    println!(
        "    {}     {}",
        "Total Cost:".bold(),
        format!("${:.4}", overall.total_cost).yellow()
    );
    println!("    Alerts:         {}", alert_count);
    println!("    Anomalies:      {}", anomaly_count);
}
