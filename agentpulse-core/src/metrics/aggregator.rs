use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::round_to;
use super::window::{LatencyPercentiles, LatencyWindow, DEFAULT_LATENCY_WINDOW};
use crate::error::{PulseError, PulseResult};
use crate::models::{
    Activity, ActivityKind, ActivityObserved, Agent, AgentRegistration, AgentStatus,
    AgentStatusChanged, ErrorCategory, IngestEvent, LlmCallObserved, PricingTable, Sample,
    TaskQueue, ToolCallObserved, Trace, TraceObserved,
};

pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;
/// Recent traces kept per agent.
pub const DEFAULT_TRACE_CAPACITY: usize = 50;
const UNKNOWN_MODEL: &str = "unknown";

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub latency_window: usize,
    pub activity_capacity: usize,
    pub trace_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            latency_window: DEFAULT_LATENCY_WINDOW,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
        }
    }
}

impl AggregatorConfig {
    pub fn with_latency_window(mut self, samples: usize) -> Self {
        self.latency_window = samples;
        self
    }

    pub fn with_activity_capacity(mut self, capacity: usize) -> Self {
        self.activity_capacity = capacity;
        self
    }

    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }
}

/// Tokens and cost observed since the last call to [`MetricsAggregator::take_tick_totals`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickTotals {
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost: f64,
}

struct AgentState {
    agent: Agent,
    window: LatencyWindow,
    /// Unrounded running cost; `agent.metrics.total_cost` is derived from it.
    cost: f64,
    /// Most recent first.
    traces: VecDeque<Trace>,
}

impl AgentState {
    fn new(agent: Agent, window_capacity: usize) -> Self {
        Self {
            agent,
            window: LatencyWindow::new(window_capacity),
            cost: 0.0,
            traces: VecDeque::new(),
        }
    }

    fn apply(&mut self, latency_ms: Option<u64>, sample: &Sample) {
        let metrics = &mut self.agent.metrics;
        metrics.total_requests += 1;
        if !sample.success {
            metrics.failed_requests += 1;
        }
        metrics.total_tokens_input += sample.tokens_input;
        metrics.total_tokens_output += sample.tokens_output;

        self.cost += sample.cost;
        metrics.total_cost = round_to(self.cost, 4);

        if let Some(latency) = latency_ms {
            self.window.push(latency);
            let p = self.window.percentiles();
            metrics.avg_latency = p.avg;
            metrics.p50_latency = p.p50;
            metrics.p95_latency = p.p95;
            metrics.p99_latency = p.p99;
        }

        metrics.success_rate = success_rate(metrics.total_requests, metrics.failed_requests);
    }
}

/// `(requests - failed) / requests * 100` to one decimal, 100 when nothing was requested.
pub fn success_rate(total_requests: u64, failed_requests: u64) -> f64 {
    if total_requests == 0 {
        return 100.0;
    }
    let ok = total_requests.saturating_sub(failed_requests) as f64;
    round_to(ok / total_requests as f64 * 100.0, 1)
}

/// Owns every agent's rolling latency window and counters.
///
/// State is partitioned by agent id; nothing in one agent's entry references another's.
pub struct MetricsAggregator {
    agents: BTreeMap<String, AgentState>,
    error_counts: [u64; ErrorCategory::ALL.len()],
    task_queue: TaskQueue,
    activities: VecDeque<Activity>,
    tick_totals: TickTotals,
    pricing: PricingTable,
    config: AggregatorConfig,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default(), PricingTable::default())
    }
}

impl MetricsAggregator {
    pub fn new(config: AggregatorConfig, pricing: PricingTable) -> Self {
        Self {
            agents: BTreeMap::new(),
            error_counts: [0; ErrorCategory::ALL.len()],
            task_queue: TaskQueue::default(),
            activities: VecDeque::new(),
            tick_totals: TickTotals::default(),
            pricing,
            config,
        }
    }

    fn state_or_insert(&mut self, agent_id: &str, model: &str, now: DateTime<Utc>) -> &mut AgentState {
        let capacity = self.config.latency_window;
        self.agents.entry(agent_id.to_string()).or_insert_with(|| {
            debug!(agent_id = %agent_id, "First observation of agent");
            AgentState::new(
                Agent::new(agent_id.to_string(), agent_id.to_string(), model.to_string(), now),
                capacity,
            )
        })
    }

    fn state_mut(&mut self, agent_id: &str) -> PulseResult<&mut AgentState> {
        self.agents
            .get_mut(agent_id)
            .ok_or_else(|| PulseError::AgentNotFound(agent_id.to_string()))
    }

    /// Registers a new agent (queued for work) or refreshes an existing one's identity.
    pub fn register_agent(&mut self, registration: AgentRegistration, now: DateTime<Utc>) -> &Agent {
        let capacity = self.config.latency_window;
        let AgentRegistration {
            agent_id,
            name,
            model,
            description,
        } = registration;

        if !self.agents.contains_key(&agent_id) {
            self.task_queue.queued += 1;
            info!(agent_id = %agent_id, name = %name, model = %model, "Agent registered");
        }

        let state = self.agents.entry(agent_id.clone()).or_insert_with(|| {
            AgentState::new(
                Agent::new(agent_id.clone(), name.clone(), model.clone(), now),
                capacity,
            )
        });
        state.agent.name = name;
        state.agent.model = model;
        state.agent.description = description;
        state.agent.last_seen = now;
        &state.agent
    }

    /// Records one latency observation with its token and cost accounting.
    pub fn record_sample(&mut self, agent_id: &str, sample: Sample, now: DateTime<Utc>) {
        let state = self.state_or_insert(agent_id, UNKNOWN_MODEL, now);
        state.agent.last_seen = now;
        state.apply(Some(sample.latency_ms), &sample);
        self.add_tick_totals(&sample);
        trace!(
            agent_id = %agent_id,
            latency_ms = sample.latency_ms,
            success = sample.success,
            "Sample recorded"
        );
    }

    pub fn get_percentiles(&self, agent_id: &str) -> Option<LatencyPercentiles> {
        self.agents.get(agent_id).map(|s| s.window.percentiles())
    }

    /// Applies an LLM call, estimating its cost from the pricing table when none was given.
    /// Returns the cost charged to the agent.
    pub fn process_llm_call(&mut self, call: LlmCallObserved, now: DateTime<Utc>) -> f64 {
        let cost = call.cost.unwrap_or_else(|| {
            self.pricing
                .estimate(&call.model, call.tokens_input, call.tokens_output)
        });
        let sample = Sample::new(call.latency_ms, call.success)
            .with_tokens(call.tokens_input, call.tokens_output)
            .with_cost(cost);

        let state = self.state_or_insert(&call.agent_id, &call.model, now);
        state.agent.last_seen = now;
        state.apply(Some(call.latency_ms), &sample);
        self.add_tick_totals(&sample);

        if !call.success {
            if let Some(error) = call.error.as_deref() {
                self.record_error(error);
            }
        }
        cost
    }

    /// Applies a tool call. A zero latency counts the request without touching the window.
    pub fn process_tool_call(&mut self, call: ToolCallObserved, now: DateTime<Utc>) {
        let sample = Sample::new(call.latency_ms, call.success);
        let latency = (call.latency_ms > 0).then_some(call.latency_ms);

        let state = self.state_or_insert(&call.agent_id, UNKNOWN_MODEL, now);
        state.agent.last_seen = now;
        state.apply(latency, &sample);
        if matches!(state.agent.status, AgentStatus::Idle | AgentStatus::Stopped) {
            state.agent.status = AgentStatus::Running;
            state.agent.current_task = Some(format!("Tool: {}", call.tool_name));
        }

        if !call.success {
            if let Some(error) = call.error.as_deref() {
                self.record_error(error);
            }
        }
    }

    pub fn update_status(&mut self, change: AgentStatusChanged, now: DateTime<Utc>) -> PulseResult<()> {
        let state = self.state_mut(&change.agent_id)?;
        if state.agent.status != change.status {
            debug!(
                agent_id = %change.agent_id,
                from = %state.agent.status,
                to = %change.status,
                "Agent status changed"
            );
        }
        state.agent.status = change.status;
        state.agent.current_task = change.current_task;
        state.agent.last_seen = now;
        Ok(())
    }

    /// Applies an activity to the task queue counters and keeps it in the recent buffer.
    pub fn process_activity(&mut self, observed: ActivityObserved, now: DateTime<Utc>) -> PulseResult<Activity> {
        let state = self.state_mut(&observed.agent_id)?;
        state.agent.last_seen = now;
        let agent_name = state.agent.name.clone();

        let queue = &mut self.task_queue;
        match observed.kind {
            ActivityKind::TaskStart => {
                queue.running += 1;
                queue.queued = queue.queued.saturating_sub(1);
            }
            ActivityKind::TaskComplete => {
                queue.completed += 1;
                queue.running = queue.running.saturating_sub(1);
            }
            ActivityKind::TaskFail => {
                queue.failed += 1;
                queue.running = queue.running.saturating_sub(1);
            }
            _ => {}
        }

        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            agent_id: observed.agent_id,
            agent_name,
            kind: observed.kind,
            description: observed.description,
            timestamp: now,
            metadata: observed.metadata,
        };

        self.activities.push_front(activity.clone());
        self.activities.truncate(self.config.activity_capacity);
        Ok(activity)
    }

    /// Retains a trace in the agent's bounded trace buffer. Traces do not feed the request
    /// counters; the matching LLM and tool calls arrive as their own events.
    pub fn process_trace(&mut self, observed: TraceObserved, now: DateTime<Utc>) -> PulseResult<Trace> {
        let capacity = self.config.trace_capacity;
        let state = self.state_mut(&observed.agent_id)?;
        state.agent.last_seen = now;

        let trace = Trace::from_observed(observed, state.agent.name.clone(), now);
        debug!(
            agent_id = %trace.agent_id,
            trace_id = %trace.id,
            status = %trace.status,
            steps = trace.steps.len(),
            "Trace recorded"
        );
        state.traces.push_front(trace.clone());
        state.traces.truncate(capacity);
        Ok(trace)
    }

    /// Most recent first; `None` for an unknown agent.
    pub fn recent_traces(&self, agent_id: &str, limit: usize) -> Option<Vec<Trace>> {
        self.agents
            .get(agent_id)
            .map(|s| s.traces.iter().take(limit).cloned().collect())
    }

    /// Routes a validated ingest event to the matching operation.
    pub fn apply(&mut self, event: IngestEvent, now: DateTime<Utc>) -> PulseResult<()> {
        match event {
            IngestEvent::Register(registration) => {
                self.register_agent(registration, now);
            }
            IngestEvent::LlmCall(call) => {
                self.process_llm_call(call, now);
            }
            IngestEvent::ToolCall(call) => self.process_tool_call(call, now),
            IngestEvent::Status(change) => self.update_status(change, now)?,
            IngestEvent::Activity(activity) => {
                self.process_activity(activity, now)?;
            }
            IngestEvent::Trace(trace) => {
                self.process_trace(trace, now)?;
            }
        }
        Ok(())
    }

    pub fn record_error(&mut self, error: &str) -> ErrorCategory {
        let category = ErrorCategory::classify(error);
        self.error_counts[category.index()] += 1;
        category
    }

    /// Stops agents not seen within `timeout` of `now`. Returns the ids that changed.
    pub fn mark_stale(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut stopped = Vec::new();
        for (id, state) in self.agents.iter_mut() {
            if state.agent.status != AgentStatus::Stopped && now - state.agent.last_seen > timeout {
                state.agent.status = AgentStatus::Stopped;
                state.agent.current_task = None;
                stopped.push(id.clone());
            }
        }
        if !stopped.is_empty() {
            info!(count = stopped.len(), "Marked idle agents as stopped");
        }
        stopped
    }

    fn add_tick_totals(&mut self, sample: &Sample) {
        self.tick_totals.tokens_input += sample.tokens_input;
        self.tick_totals.tokens_output += sample.tokens_output;
        self.tick_totals.cost += sample.cost;
    }

    /// Returns and resets the per-tick token and cost accumulators.
    pub fn take_tick_totals(&mut self) -> TickTotals {
        std::mem::take(&mut self.tick_totals)
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.get(agent_id).map(|s| &s.agent)
    }

    /// Agents in ascending id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values().map(|s| &s.agent)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn error_counts(&self) -> Vec<(ErrorCategory, u64)> {
        ErrorCategory::ALL
            .iter()
            .map(|c| (*c, self.error_counts[c.index()]))
            .collect()
    }

    pub fn task_queue(&self) -> TaskQueue {
        self.task_queue
    }

    /// Most recent first.
    pub fn recent_activities(&self, limit: usize) -> Vec<Activity> {
        self.activities.iter().take(limit).cloned().collect()
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }
}
