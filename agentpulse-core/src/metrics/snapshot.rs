use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::aggregator::MetricsAggregator;
use super::round_to;
use super::window::RollingSeries;
use crate::models::{
    Agent, CostPoint, ErrorTypeCount, LatencyPoint, MetricsSnapshot, OverallMetrics, TokenPoint,
};

pub const DEFAULT_TREND_CAPACITY: usize = 60;
pub const DEFAULT_LIVENESS_TIMEOUT_SECS: i64 = 300;
const TREND_LABEL_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub trend_capacity: usize,
    pub liveness_timeout: Duration,
    /// Number of recent activities copied into each snapshot.
    pub activity_limit: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            trend_capacity: DEFAULT_TREND_CAPACITY,
            liveness_timeout: Duration::seconds(DEFAULT_LIVENESS_TIMEOUT_SECS),
            activity_limit: 20,
        }
    }
}

impl SnapshotConfig {
    pub fn with_trend_capacity(mut self, points: usize) -> Self {
        self.trend_capacity = points;
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }
}

/// Composes aggregator state into immutable snapshots and keeps the per-tick trend series.
pub struct SnapshotBuilder {
    tick_count: u64,
    latency_trend: RollingSeries<LatencyPoint>,
    token_trend: RollingSeries<TokenPoint>,
    cost_trend: RollingSeries<CostPoint>,
    config: SnapshotConfig,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(SnapshotConfig::default())
    }
}

impl SnapshotBuilder {
    pub fn new(config: SnapshotConfig) -> Self {
        Self {
            tick_count: 0,
            latency_trend: RollingSeries::new(config.trend_capacity),
            token_trend: RollingSeries::new(config.trend_capacity),
            cost_trend: RollingSeries::new(config.trend_capacity),
            config,
        }
    }

    /// Advances the tick cursor: stops stale agents, appends one point to each trend series
    /// and drains the aggregator's per-tick totals. Returns the new tick count.
    pub fn tick(&mut self, aggregator: &mut MetricsAggregator, now: DateTime<Utc>) -> u64 {
        self.tick_count += 1;
        aggregator.mark_stale(now, self.config.liveness_timeout);

        let label = now.format(TREND_LABEL_FORMAT).to_string();

        let agent_count = aggregator.agent_count();
        let (p50, p95, p99) = {
            let agents: Vec<&Agent> = aggregator.agents().collect();
            if agents.is_empty() {
                (0, 0, 0)
            } else {
                let n = agents.len() as f64;
                let mean = |f: fn(&Agent) -> u64| {
                    (agents.iter().map(|a| f(a) as f64).sum::<f64>() / n).round() as u64
                };
                (
                    mean(|a| a.metrics.p50_latency),
                    mean(|a| a.metrics.p95_latency),
                    mean(|a| a.metrics.p99_latency),
                )
            }
        };
        self.latency_trend.push(LatencyPoint {
            time: label.clone(),
            p50,
            p95,
            p99,
        });

        let totals = aggregator.take_tick_totals();
        self.token_trend.push(TokenPoint {
            time: label.clone(),
            input: totals.tokens_input,
            output: totals.tokens_output,
        });
        self.cost_trend.push(CostPoint {
            time: label,
            cost: round_to(totals.cost, 4),
        });

        debug!(tick = self.tick_count, agents = agent_count, "Snapshot tick");
        self.tick_count
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn snapshot(&self, aggregator: &MetricsAggregator, now: DateTime<Utc>) -> MetricsSnapshot {
        let agents: Vec<Agent> = aggregator.agents().cloned().collect();
        let overall = overall_metrics(&agents, self.tick_count);

        let counts = aggregator.error_counts();
        let total_errors: u64 = counts.iter().map(|(_, c)| c).sum();
        let errors_by_type = counts
            .into_iter()
            .map(|(category, count)| ErrorTypeCount {
                category,
                count,
                percentage: if total_errors > 0 {
                    round_to(count as f64 / total_errors as f64 * 100.0, 1)
                } else {
                    0.0
                },
            })
            .collect();

        MetricsSnapshot {
            timestamp: now,
            tick: self.tick_count,
            agents,
            overall,
            latency_trend: self.latency_trend.to_vec(),
            token_trend: self.token_trend.to_vec(),
            cost_trend: self.cost_trend.to_vec(),
            errors_by_type,
            task_queue: aggregator.task_queue(),
            recent_activities: aggregator.recent_activities(self.config.activity_limit),
        }
    }
}

/// Blends per-agent figures with a simple mean across agents, regardless of each agent's
/// request volume.
pub fn overall_metrics(agents: &[Agent], tick_count: u64) -> OverallMetrics {
    let n = agents.len();
    let total_requests: u64 = agents.iter().map(|a| a.metrics.total_requests).sum();
    let failed_requests: u64 = agents.iter().map(|a| a.metrics.failed_requests).sum();

    let (success_rate, avg_latency) = if n == 0 {
        (100.0, 0)
    } else {
        let sr = agents.iter().map(|a| a.metrics.success_rate).sum::<f64>() / n as f64;
        let lat = agents.iter().map(|a| a.metrics.avg_latency as f64).sum::<f64>() / n as f64;
        (round_to(sr, 1), lat.round() as u64)
    };

    OverallMetrics {
        active_agents: agents.iter().filter(|a| a.status.is_active()).count(),
        total_requests,
        failed_requests,
        success_rate,
        avg_latency,
        total_cost: round_to(agents.iter().map(|a| a.metrics.total_cost).sum(), 4),
        total_tokens_input: agents.iter().map(|a| a.metrics.total_tokens_input).sum(),
        total_tokens_output: agents.iter().map(|a| a.metrics.total_tokens_output).sum(),
        throughput: round_to(total_requests as f64 / tick_count.max(1) as f64, 1),
        error_rate: round_to(
            failed_requests as f64 / total_requests.max(1) as f64 * 100.0,
            2,
        ),
    }
}
