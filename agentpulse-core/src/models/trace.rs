//! Execution traces: an agent run broken into timed steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
}

impl TraceStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TraceStatus::Running)
    }
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceStatus::Running => write!(f, "running"),
            TraceStatus::Completed => write!(f, "completed"),
            TraceStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepKind {
    LlmCall,
    ToolCall,
    Retrieval,
    Processing,
}

/// A step as sent by the producer; optional counters default to zero when retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStepObserved {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TraceStepKind,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds, absent while the step is running.
    #[serde(default)]
    pub duration: Option<u64>,
    pub status: TraceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_input: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_output: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceObserved {
    pub agent_id: String,
    pub trace_id: String,
    /// Falls back to the ingestion time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    #[serde(default)]
    pub steps: Vec<TraceStepObserved>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TraceStepKind,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<u64>,
    pub status: TraceStatus,
    pub input: String,
    pub output: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost: f64,
    pub model: Option<String>,
    pub error: Option<String>,
}

impl From<TraceStepObserved> for TraceStep {
    fn from(step: TraceStepObserved) -> Self {
        Self {
            id: step.id,
            kind: step.kind,
            name: step.name,
            start_time: step.start_time,
            end_time: step.end_time,
            duration: step.duration,
            status: step.status,
            input: step.input.unwrap_or_default(),
            output: step.output.unwrap_or_default(),
            tokens_input: step.tokens_input.unwrap_or(0),
            tokens_output: step.tokens_output.unwrap_or(0),
            cost: step.cost.unwrap_or(0.0),
            model: step.model,
            error: step.error.filter(|e| !e.is_empty()),
        }
    }
}

/// A trace as retained in an agent's recent-trace buffer.
///
/// `end_time` and `total_duration` stay empty while the trace is running. Totals not supplied
/// by the producer are summed from the steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    pub total_duration: Option<u64>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn from_observed(observed: TraceObserved, agent_name: String, now: DateTime<Utc>) -> Self {
        let timestamp = observed.timestamp.unwrap_or(now);
        let steps = observed.steps;
        let finished = observed.status.is_finished();

        let start_time = steps.first().map_or(timestamp, |s| s.start_time);
        let end_time = if finished {
            match steps.last() {
                Some(last) => last.end_time,
                None => Some(timestamp),
            }
        } else {
            None
        };
        let total_duration =
            finished.then(|| steps.iter().map(|s| s.duration.unwrap_or(0)).sum());
        let total_tokens = observed.total_tokens.unwrap_or_else(|| {
            steps
                .iter()
                .map(|s| s.tokens_input.unwrap_or(0) + s.tokens_output.unwrap_or(0))
                .sum()
        });
        let total_cost = observed
            .total_cost
            .unwrap_or_else(|| steps.iter().map(|s| s.cost.unwrap_or(0.0)).sum());

        Self {
            id: observed.trace_id,
            agent_id: observed.agent_id,
            agent_name,
            start_time,
            end_time,
            status: observed.status,
            total_duration,
            total_tokens,
            total_cost,
            steps: steps.into_iter().map(TraceStep::from).collect(),
        }
    }
}
