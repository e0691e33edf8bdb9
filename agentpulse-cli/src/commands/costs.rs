use agentpulse_core::metrics::cost::{self, AgentCost, CostForecast, CostSummary, ModelCost};
use agentpulse_core::{AlertEngine, Monitor, NotificationDispatcher, PricingTable, PulseConfig};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::time::Duration;

use super::{format_tokens, load_events, truncate_string};

#[derive(Args)]
pub struct CostsArgs {
    #[arg(short, long, default_value = "-", help = "JSON-lines event file, or - for stdin")]
    pub events: String,

    #[arg(
        long,
        default_value_t = 3600,
        help = "Wall-clock span the events cover, used for projections"
    )]
    pub span_secs: u64,

    #[arg(long, help = "Show per-model breakdown")]
    pub by_model: bool,

    #[arg(long, help = "Show per-agent breakdown")]
    pub by_agent: bool,

    #[arg(long, help = "Show the seven-day forecast")]
    pub forecast: bool,

    #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
    pub format: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CostsOutput {
    summary: CostSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    by_model: Option<Vec<ModelCost>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    by_agent: Option<Vec<AgentCost>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forecast: Option<CostForecast>,
}

pub async fn handle_costs_command(config: &PulseConfig, args: CostsArgs) -> anyhow::Result<()> {
    let report = load_events(&args.events)?;
    let monitor = Monitor::with_parts(config, AlertEngine::default(), NotificationDispatcher::new())?;
    let outcome = monitor
        .ingest_batch(report.events, chrono::Utc::now())
        .await;
    if !outcome.rejected.is_empty() {
        tracing::warn!(rejected = outcome.rejected.len(), "Some events were rejected");
    }

    let snapshot = monitor.tick().await.snapshot;
    let span = Duration::from_secs(args.span_secs.max(1));
    let pricing = PricingTable::with_overrides(&config.pricing);

    let output = CostsOutput {
        summary: cost::summarize(&snapshot, span),
        by_model: args.by_model.then(|| cost::by_model(&snapshot, &pricing)),
        by_agent: args.by_agent.then(|| cost::by_agent(&snapshot)),
        forecast: args.forecast.then(|| cost::forecast(&snapshot, span)),
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_summary(&output.summary);
    if let Some(models) = &output.by_model {
        print_by_model(models);
    }
    if let Some(agents) = &output.by_agent {
        print_by_agent(agents);
    }
    if let Some(forecast) = &output.forecast {
        print_forecast(forecast);
    }
    Ok(())
}

fn print_summary(summary: &CostSummary) {
    println!("{}", "Cost Summary".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!();
    println!(
        "  {}        {}",
        "Total Cost:".bold(),
        format!("${:.4}", summary.total_cost).yellow()
    );
    println!("  Requests:          {}", summary.total_requests);
    println!("  Tokens:            {}", format_tokens(summary.total_tokens));
    println!("  Per Request:       ${:.6}", summary.cost_per_request);
    println!("  Per 1K Tokens:     ${:.6}", summary.cost_per_token);
    println!("  Projected Daily:   ${:.2}", summary.projected_daily);
    println!("  Projected Monthly: ${:.2}", summary.projected_monthly);
}

fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(label).fg(Color::White))
        .collect()
}

fn new_table(labels: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header(labels));
    table
}

fn print_by_model(models: &[ModelCost]) {
    println!();
    println!("{}", "By Model".cyan().bold());
    if models.is_empty() {
        println!("{}", "No model usage recorded.".yellow());
        return;
    }

    let mut table = new_table(&["Model", "Requests", "Input", "Output", "Cost", "Share", "Rates /1K"]);
    for model in models {
        table.add_row(vec![
            Cell::new(truncate_string(&model.model, 24)),
            Cell::new(model.requests.to_string()),
            Cell::new(format_tokens(model.tokens_input)),
            Cell::new(format_tokens(model.tokens_output)),
            Cell::new(format!("${:.4}", model.cost)).fg(Color::Yellow),
            Cell::new(format!("{:.1}%", model.percentage)),
            Cell::new(format!(
                "${} / ${}",
                model.input_price_per_1k, model.output_price_per_1k
            )),
        ]);
    }
    println!("{table}");
}

fn print_by_agent(agents: &[AgentCost]) {
    println!();
    println!("{}", "By Agent".cyan().bold());
    if agents.is_empty() {
        println!("{}", "No agents recorded.".yellow());
        return;
    }

    let mut table = new_table(&["Agent", "Model", "Requests", "Success", "Cost", "Per Request", "Share"]);
    for agent in agents {
        table.add_row(vec![
            Cell::new(truncate_string(&agent.agent_name, 24)),
            Cell::new(truncate_string(&agent.model, 20)),
            Cell::new(agent.requests.to_string()),
            Cell::new(format!("{:.1}%", agent.success_rate)),
            Cell::new(format!("${:.4}", agent.cost)).fg(Color::Yellow),
            Cell::new(format!("${:.6}", agent.cost_per_request)),
            Cell::new(format!("{:.1}%", agent.percentage)),
        ]);
    }
    println!("{table}");
}

fn print_forecast(forecast: &CostForecast) {
    println!();
    println!("{}", "Forecast".cyan().bold());

    let mut table = new_table(&["Day", "Optimistic", "Projected", "Pessimistic"]);
    for day in &forecast.forecast {
        table.add_row(vec![
            Cell::new(&day.day),
            Cell::new(format!("${:.2}", day.optimistic)).fg(Color::Green),
            Cell::new(format!("${:.2}", day.projected)).fg(Color::Yellow),
            Cell::new(format!("${:.2}", day.pessimistic)).fg(Color::Red),
        ]);
    }
    println!("{table}");
}
