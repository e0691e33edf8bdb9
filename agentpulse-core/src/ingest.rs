//! Decoding and boundary validation for inbound telemetry events.
//!
//! Events arrive one JSON object per line, tagged by `type`. Validation rejects malformed
//! events before they reach the aggregator, so aggregate state is never partially updated.

use std::io::BufRead;

use crate::error::{PulseError, PulseResult};
use crate::models::IngestEvent;

/// Decodes a single JSON event.
pub fn parse_event(line: &str) -> PulseResult<IngestEvent> {
    serde_json::from_str(line.trim()).map_err(|e| PulseError::EventDecodeError(e.to_string()))
}

fn require_non_empty(field: &str, value: &str) -> PulseResult<()> {
    if value.trim().is_empty() {
        return Err(PulseError::invalid_event(format!("{} must not be empty", field)));
    }
    Ok(())
}

pub fn validate(event: &IngestEvent) -> PulseResult<()> {
    require_non_empty("agentId", event.agent_id())?;
    match event {
        IngestEvent::Register(reg) => {
            require_non_empty("name", &reg.name)?;
            require_non_empty("model", &reg.model)?;
        }
        IngestEvent::LlmCall(call) => {
            require_non_empty("model", &call.model)?;
            if let Some(cost) = call.cost {
                if !cost.is_finite() || cost < 0.0 {
                    return Err(PulseError::invalid_event(format!(
                        "cost must be a non-negative number, got {}",
                        cost
                    )));
                }
            }
        }
        IngestEvent::ToolCall(call) => require_non_empty("toolName", &call.tool_name)?,
        IngestEvent::Activity(activity) => require_non_empty("description", &activity.description)?,
        IngestEvent::Status(_) => {}
        IngestEvent::Trace(trace) => {
            require_non_empty("traceId", &trace.trace_id)?;
            let costs = trace
                .total_cost
                .into_iter()
                .chain(trace.steps.iter().filter_map(|s| s.cost));
            for cost in costs {
                if !cost.is_finite() || cost < 0.0 {
                    return Err(PulseError::invalid_event(format!(
                        "trace cost must be a non-negative number, got {}",
                        cost
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Decodes and validates one line.
pub fn parse_and_validate(line: &str) -> PulseResult<IngestEvent> {
    let event = parse_event(line)?;
    validate(&event)?;
    Ok(event)
}

/// Outcome of reading an event stream.
#[derive(Debug, Default)]
pub struct ReadReport {
    pub events: Vec<IngestEvent>,
    /// 1-based line numbers paired with the reason each line was skipped.
    pub rejected: Vec<(usize, PulseError)>,
}

/// Reads a JSON-lines stream, skipping blank lines and `#` comments. Bad lines are
/// collected in the report rather than aborting the read.
pub fn read_events<R: BufRead>(reader: R) -> PulseResult<ReadReport> {
    let mut report = ReadReport::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_and_validate(trimmed) {
            Ok(event) => report.events.push(event),
            Err(e) => {
                tracing::info_span!("ingest", line = idx + 1).in_scope(|| e.log());
                report.rejected.push((idx + 1, e));
            }
        }
    }
    Ok(report)
}
