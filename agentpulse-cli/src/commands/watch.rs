use agentpulse_core::ingest::parse_and_validate;
use agentpulse_core::{Monitor, MonitorEvent, MonitorScheduler, PulseConfig};
use anyhow::Context;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::{build_dispatcher, build_engine, colorize_severity};

#[derive(Args)]
pub struct WatchArgs {
    #[arg(short, long, default_value = "-", help = "JSON-lines event source, or - for stdin")]
    pub events: String,

    #[arg(short, long, help = "YAML file with extra alert rules and channels")]
    pub rules: Option<PathBuf>,

    #[arg(long, help = "Do not load the built-in alert rules")]
    pub no_default_rules: bool,

    #[arg(long, help = "Tick interval in milliseconds (defaults to the configured interval)")]
    pub interval_ms: Option<u64>,

    #[arg(long, help = "Stop after this many seconds instead of waiting for Ctrl-C")]
    pub duration_secs: Option<u64>,

    #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
    pub format: String,
}

/// Live mode: ingests events as they arrive, ticks on the wall clock and prints alerts and
/// anomalies as they happen.
pub async fn handle_watch_command(config: &PulseConfig, args: WatchArgs) -> anyhow::Result<()> {
    let engine = build_engine(config, args.rules.as_deref(), args.no_default_rules)?;
    let monitor = Arc::new(Monitor::with_parts(config, engine, build_dispatcher(config)?)?);
    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.tick_interval());

    let reader: Box<dyn AsyncRead + Unpin + Send> = if args.events == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(&args.events)
                .await
                .with_context(|| format!("Failed to open events file '{}'", args.events))?,
        )
    };
    let ingest_task = tokio::spawn(ingest_lines(Arc::clone(&monitor), reader));

    let json = args.format == "json";
    let mut events = monitor.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let scheduler = MonitorScheduler::new(Arc::clone(&monitor), interval);
    scheduler.start().await;
    if !json {
        eprintln!(
            "{} every {} ms, press Ctrl-C to stop",
            "Watching".cyan().bold(),
            interval.as_millis()
        );
    }

    match args.duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    scheduler.stop().await?;
    ingest_task.abort();
    printer.abort();

    if !json {
        let snapshot = monitor.snapshot().await;
        eprintln!(
            "{} after {} ticks, {} agents, {} requests",
            "Stopped".cyan().bold(),
            snapshot.tick,
            snapshot.agents.len(),
            snapshot.overall.total_requests
        );
    }
    Ok(())
}

async fn ingest_lines(monitor: Arc<Monitor>, reader: Box<dyn AsyncRead + Unpin + Send>) {
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read event stream");
                break;
            }
        };
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let result = match parse_and_validate(trimmed) {
            Ok(event) => monitor.ingest(event).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::info_span!("ingest", line = line_no).in_scope(|| e.log());
        }
    }
    tracing::debug!(lines = line_no, "Event stream closed");
}

fn print_event(event: &MonitorEvent, json: bool) {
    if json {
        let value = match event {
            MonitorEvent::MetricsSnapshotReady(_) => return,
            MonitorEvent::AlertFired(alert) | MonitorEvent::AlertResolved(alert) => {
                serde_json::json!({ "type": "alert", "event": alert })
            }
            MonitorEvent::AnomalyDetected(anomaly) => {
                serde_json::json!({ "type": "anomaly", "event": anomaly })
            }
        };
        println!("{}", value);
        return;
    }

    match event {
        MonitorEvent::MetricsSnapshotReady(snapshot) => {
            tracing::debug!(
                tick = snapshot.tick,
                success_rate = snapshot.overall.success_rate,
                "Snapshot ready"
            );
        }
        MonitorEvent::AlertFired(alert) => println!(
            "{} {} {} {}",
            alert.started_at.format("%H:%M:%S").to_string().dimmed(),
            "FIRING".red().bold(),
            colorize_severity(alert.severity),
            alert.message
        ),
        MonitorEvent::AlertResolved(alert) => println!(
            "{} {} {}",
            alert
                .resolved_at
                .unwrap_or(alert.started_at)
                .format("%H:%M:%S")
                .to_string()
                .dimmed(),
            "RESOLVED".green().bold(),
            alert.message
        ),
        MonitorEvent::AnomalyDetected(anomaly) => println!(
            "{} {} {} {}",
            anomaly.timestamp.format("%H:%M:%S").to_string().dimmed(),
            "ANOMALY".magenta().bold(),
            anomaly.severity,
            anomaly.message
        ),
    }
}
