//! Cost views derived from a snapshot: totals, per-model and per-agent breakdowns, and a
//! linear seven-day forecast.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::{CostPoint, MetricsSnapshot, PricingTable};

const SECONDS_PER_DAY: f64 = 86_400.0;
const FORECAST_DAYS: u32 = 7;
const OPTIMISTIC_FACTOR: f64 = 0.85;
const PESSIMISTIC_FACTOR: f64 = 1.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub cost_per_request: f64,
    /// Cost per 1K tokens.
    pub cost_per_token: f64,
    pub projected_daily: f64,
    pub projected_monthly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    pub model: String,
    pub cost: f64,
    pub requests: u64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub percentage: f64,
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCost {
    pub agent_id: String,
    pub agent_name: String,
    pub model: String,
    pub cost: f64,
    pub requests: u64,
    pub success_rate: f64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_per_request: f64,
    /// Output tokens per input token.
    pub token_efficiency: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub day: String,
    pub projected: f64,
    pub optimistic: f64,
    pub pessimistic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostForecast {
    pub current_trend: Vec<CostPoint>,
    pub forecast: Vec<ForecastDay>,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn total_cost(snapshot: &MetricsSnapshot) -> f64 {
    snapshot.agents.iter().map(|a| a.metrics.total_cost).sum()
}

fn uptime_secs(uptime: Duration) -> f64 {
    uptime.as_secs_f64().max(1.0)
}

/// Totals and projections; projections extrapolate the cost rate seen over `uptime`.
pub fn summarize(snapshot: &MetricsSnapshot, uptime: Duration) -> CostSummary {
    let total_cost = total_cost(snapshot);
    let total_requests: u64 = snapshot.agents.iter().map(|a| a.metrics.total_requests).sum();
    let total_tokens: u64 = snapshot.agents.iter().map(|a| a.metrics.total_tokens()).sum();
    let per_second = total_cost / uptime_secs(uptime);

    CostSummary {
        total_cost,
        total_requests,
        total_tokens,
        cost_per_request: ratio(total_cost, total_requests as f64),
        cost_per_token: ratio(total_cost, total_tokens as f64) * 1000.0,
        projected_daily: per_second * SECONDS_PER_DAY,
        projected_monthly: per_second * SECONDS_PER_DAY * 30.0,
    }
}

/// Groups agents by model, ordered by model name.
pub fn by_model(snapshot: &MetricsSnapshot, pricing: &PricingTable) -> Vec<ModelCost> {
    let total = total_cost(snapshot);
    let mut groups: BTreeMap<&str, (f64, u64, u64, u64)> = BTreeMap::new();

    for agent in &snapshot.agents {
        let entry = groups.entry(agent.model.as_str()).or_default();
        entry.0 += agent.metrics.total_cost;
        entry.1 += agent.metrics.total_requests;
        entry.2 += agent.metrics.total_tokens_input;
        entry.3 += agent.metrics.total_tokens_output;
    }

    groups
        .into_iter()
        .map(|(model, (cost, requests, tokens_input, tokens_output))| {
            let rates = pricing.get(model);
            ModelCost {
                model: model.to_string(),
                cost,
                requests,
                tokens_input,
                tokens_output,
                percentage: ratio(cost, total) * 100.0,
                input_price_per_1k: rates.map(|r| r.input_price_per_1k).unwrap_or(0.0),
                output_price_per_1k: rates.map(|r| r.output_price_per_1k).unwrap_or(0.0),
            }
        })
        .collect()
}

pub fn by_agent(snapshot: &MetricsSnapshot) -> Vec<AgentCost> {
    let total = total_cost(snapshot);
    snapshot
        .agents
        .iter()
        .map(|agent| {
            let m = &agent.metrics;
            AgentCost {
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                model: agent.model.clone(),
                cost: m.total_cost,
                requests: m.total_requests,
                success_rate: m.success_rate,
                tokens_input: m.total_tokens_input,
                tokens_output: m.total_tokens_output,
                cost_per_request: ratio(m.total_cost, m.total_requests as f64),
                token_efficiency: ratio(m.total_tokens_output as f64, m.total_tokens_input as f64),
                percentage: ratio(m.total_cost, total) * 100.0,
            }
        })
        .collect()
}

pub fn forecast(snapshot: &MetricsSnapshot, uptime: Duration) -> CostForecast {
    let total = total_cost(snapshot);
    let per_second = total / uptime_secs(uptime);

    let forecast = (1..=FORECAST_DAYS)
        .map(|day| {
            let projected = total + per_second * SECONDS_PER_DAY * day as f64;
            ForecastDay {
                day: format!("Day {}", day),
                projected,
                optimistic: projected * OPTIMISTIC_FACTOR,
                pessimistic: projected * PESSIMISTIC_FACTOR,
            }
        })
        .collect();

    CostForecast {
        current_trend: snapshot.cost_trend.clone(),
        forecast,
    }
}
