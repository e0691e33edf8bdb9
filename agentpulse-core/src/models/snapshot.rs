use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::events::Activity;

/// System-wide metrics that alert rules and the anomaly detector read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    SuccessRate,
    AvgLatency,
    ErrorRate,
    TotalCost,
    TokenUsage,
    Throughput,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::SuccessRate,
        MetricKind::AvgLatency,
        MetricKind::ErrorRate,
        MetricKind::TotalCost,
        MetricKind::TokenUsage,
        MetricKind::Throughput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::SuccessRate => "successRate",
            MetricKind::AvgLatency => "avgLatency",
            MetricKind::ErrorRate => "errorRate",
            MetricKind::TotalCost => "totalCost",
            MetricKind::TokenUsage => "tokenUsage",
            MetricKind::Throughput => "throughput",
        }
    }

    /// Reads this metric from the overall aggregate.
    pub fn value_in(&self, overall: &OverallMetrics) -> f64 {
        match self {
            MetricKind::SuccessRate => overall.success_rate,
            MetricKind::AvgLatency => overall.avg_latency as f64,
            MetricKind::ErrorRate => overall.error_rate,
            MetricKind::TotalCost => overall.total_cost,
            MetricKind::TokenUsage => {
                (overall.total_tokens_input + overall.total_tokens_output) as f64
            }
            MetricKind::Throughput => overall.throughput,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown metric '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    Hallucination,
    Timeout,
    #[serde(rename = "Tool Error")]
    ToolError,
    #[serde(rename = "Context Overflow")]
    ContextOverflow,
    #[serde(rename = "Rate Limit")]
    RateLimit,
    Authentication,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::Hallucination,
        ErrorCategory::Timeout,
        ErrorCategory::ToolError,
        ErrorCategory::ContextOverflow,
        ErrorCategory::RateLimit,
        ErrorCategory::Authentication,
    ];

    /// Buckets free-form error text by case-insensitive keyword. Unrecognised text counts as
    /// a tool error.
    pub fn classify(error: &str) -> Self {
        let lower = error.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["hallucin"]) {
            ErrorCategory::Hallucination
        } else if has(&["timeout", "timed out"]) {
            ErrorCategory::Timeout
        } else if has(&["tool", "function"]) {
            ErrorCategory::ToolError
        } else if has(&["context", "token limit", "overflow"]) {
            ErrorCategory::ContextOverflow
        } else if has(&["rate limit", "throttl"]) {
            ErrorCategory::RateLimit
        } else if has(&["auth", "permission", "forbidden"]) {
            ErrorCategory::Authentication
        } else {
            ErrorCategory::ToolError
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Hallucination => "Hallucination",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::ToolError => "Tool Error",
            ErrorCategory::ContextOverflow => "Context Overflow",
            ErrorCategory::RateLimit => "Rate Limit",
            ErrorCategory::Authentication => "Authentication",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallMetrics {
    pub active_agents: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_latency: u64,
    pub total_cost: f64,
    pub total_tokens_input: u64,
    pub total_tokens_output: u64,
    /// Cumulative requests divided by elapsed ticks, not an instantaneous rate.
    pub throughput: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    pub time: String,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPoint {
    pub time: String,
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPoint {
    pub time: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTypeCount {
    pub category: ErrorCategory,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskQueue {
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Immutable point-in-time view, produced once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub tick: u64,
    pub agents: Vec<Agent>,
    pub overall: OverallMetrics,
    pub latency_trend: Vec<LatencyPoint>,
    pub token_trend: Vec<TokenPoint>,
    pub cost_trend: Vec<CostPoint>,
    pub errors_by_type: Vec<ErrorTypeCount>,
    pub task_queue: TaskQueue,
    pub recent_activities: Vec<Activity>,
}

impl MetricsSnapshot {
    pub fn metric(&self, metric: MetricKind) -> f64 {
        metric.value_in(&self.overall)
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }
}
