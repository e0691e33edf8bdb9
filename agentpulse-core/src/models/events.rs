//! Inbound event shapes consumed by the aggregator.
//!
//! Events arrive as JSON objects tagged by `type`; see [`crate::ingest`] for decoding and
//! boundary validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentStatus;
use super::trace::TraceObserved;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    pub agent_id: String,
    pub name: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmCallObserved {
    pub agent_id: String,
    pub model: String,
    #[serde(default)]
    pub tokens_input: u64,
    #[serde(default)]
    pub tokens_output: u64,
    pub latency_ms: u64,
    pub success: bool,
    /// Explicit cost; estimated from the pricing table when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallObserved {
    pub agent_id: String,
    pub tool_name: String,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusChanged {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    TaskStart,
    TaskComplete,
    TaskFail,
    LlmCall,
    ToolCall,
    Error,
    StatusChange,
    Message,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActivityKind::TaskStart => "task_start",
            ActivityKind::TaskComplete => "task_complete",
            ActivityKind::TaskFail => "task_fail",
            ActivityKind::LlmCall => "llm_call",
            ActivityKind::ToolCall => "tool_call",
            ActivityKind::Error => "error",
            ActivityKind::StatusChange => "status_change",
            ActivityKind::Message => "message",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityObserved {
    pub agent_id: String,
    pub kind: ActivityKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// An activity as retained in an agent's recent-activity buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One latency observation with its accounting side effects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub latency_ms: u64,
    pub success: bool,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost: f64,
}

impl Sample {
    pub fn new(latency_ms: u64, success: bool) -> Self {
        Self {
            latency_ms,
            success,
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = input;
        self.tokens_output = output;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    Register(AgentRegistration),
    LlmCall(LlmCallObserved),
    ToolCall(ToolCallObserved),
    Status(AgentStatusChanged),
    Activity(ActivityObserved),
    Trace(TraceObserved),
}

impl IngestEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            IngestEvent::Register(e) => &e.agent_id,
            IngestEvent::LlmCall(e) => &e.agent_id,
            IngestEvent::ToolCall(e) => &e.agent_id,
            IngestEvent::Status(e) => &e.agent_id,
            IngestEvent::Activity(e) => &e.agent_id,
            IngestEvent::Trace(e) => &e.agent_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestEvent::Register(_) => "register",
            IngestEvent::LlmCall(_) => "llm_call",
            IngestEvent::ToolCall(_) => "tool_call",
            IngestEvent::Status(_) => "status",
            IngestEvent::Activity(_) => "activity",
            IngestEvent::Trace(_) => "trace",
        }
    }
}
