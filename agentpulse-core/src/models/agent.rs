use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Error,
    Stopped,
}

impl AgentStatus {
    /// Agents counted towards the active-agent total.
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Running | AgentStatus::Idle)
    }

    /// Numeric encoding used by the status gauge.
    pub fn gauge_value(&self) -> i64 {
        match self {
            AgentStatus::Running => 1,
            AgentStatus::Idle => 0,
            AgentStatus::Error => -1,
            AgentStatus::Stopped => -2,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters and derived latency figures for one agent.
///
/// `success_rate` is a percentage with one decimal, latencies are whole milliseconds and
/// `total_cost` carries four decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_tokens_input: u64,
    pub total_tokens_output: u64,
    pub total_cost: f64,
    pub success_rate: f64,
    pub avg_latency: u64,
    pub p50_latency: u64,
    pub p95_latency: u64,
    pub p99_latency: u64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            failed_requests: 0,
            total_tokens_input: 0,
            total_tokens_output: 0,
            total_cost: 0.0,
            success_rate: 100.0,
            avg_latency: 0,
            p50_latency: 0,
            p95_latency: 0,
            p99_latency: 0,
        }
    }
}

impl AgentMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens_input + self.total_tokens_output
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    pub metrics: AgentMetrics,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: String, name: String, model: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            model,
            description: None,
            status: AgentStatus::Idle,
            current_task: None,
            metrics: AgentMetrics::default(),
            last_seen: now,
            created_at: now,
        }
    }
}
