use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PulseError, PulseResult};
use crate::models::{
    AlertEvent, AlertRule, ChannelDraft, ChannelUpdate, Condition, MetricKind, MetricsSnapshot,
    NotificationChannel, RuleDraft, RuleUpdate, Severity,
};

pub const DEFAULT_ALERT_HISTORY_LIMIT: usize = 200;

/// Longest dwell time a rule may ask for (30 days).
pub const MAX_RULE_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Converts a dwell time in seconds, `None` when it does not fit a `Duration`.
fn dwell_time(duration_secs: u64) -> Option<Duration> {
    i64::try_from(duration_secs).ok().and_then(Duration::try_seconds)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RuleState {
    /// Condition has held since `since`, dwell time not yet met.
    Pending { since: DateTime<Utc> },
    Firing {
        since: DateTime<Utc>,
        fired_at: DateTime<Utc>,
    },
}

/// Externally visible phase of a rule. `Pending` is never surfaced as an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePhase {
    Normal,
    Pending,
    Firing,
}

/// A firing or resolution together with the enabled channels it should be delivered to.
#[derive(Debug, Clone)]
pub struct AlertTransition {
    pub event: AlertEvent,
    pub channels: Vec<NotificationChannel>,
}

/// Channels and rules loaded from a YAML seed file. Seeded channels carry their own ids so
/// seeded rules can reference them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSeed {
    #[serde(default)]
    pub channels: Vec<SeedChannel>,
    #[serde(default)]
    pub rules: Vec<RuleDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedChannel {
    pub id: String,
    #[serde(flatten)]
    pub channel: ChannelDraft,
}

impl AlertSeed {
    pub fn from_yaml(text: &str) -> PulseResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Evaluates threshold rules against snapshots with dwell-time debouncing.
///
/// Rule state lives in a side table keyed by rule id; a rule absent from the table is in the
/// normal phase.
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    channels: Vec<NotificationChannel>,
    states: HashMap<String, RuleState>,
    history: VecDeque<AlertEvent>,
    history_limit: usize,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_HISTORY_LIMIT)
    }
}

impl AlertEngine {
    pub fn new(history_limit: usize) -> Self {
        Self {
            rules: Vec::new(),
            channels: Vec::new(),
            states: HashMap::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    /// Engine seeded with the stock success-rate, latency, error-rate and cost rules.
    pub fn with_default_rules(history_limit: usize) -> Self {
        let mut engine = Self::new(history_limit);
        let now = Utc::now();
        let defaults = [
            ("rule-1", "Low Success Rate", MetricKind::SuccessRate, Condition::Below, 90.0, 10, Severity::Critical),
            ("rule-2", "High Latency", MetricKind::AvgLatency, Condition::Above, 1000.0, 15, Severity::Warning),
            ("rule-3", "High Error Rate", MetricKind::ErrorRate, Condition::Above, 10.0, 10, Severity::Critical),
            ("rule-4", "Cost Spike", MetricKind::TotalCost, Condition::Above, 100.0, 30, Severity::Warning),
        ];
        for (id, name, metric, condition, threshold, duration, severity) in defaults {
            engine.rules.push(AlertRule::from_draft(
                id.to_string(),
                RuleDraft::new(name, metric, condition, threshold, duration, severity),
                now,
            ));
        }
        engine
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Runs every enabled rule against `snapshot` as of `now` and returns the transitions
    /// that produced events. Pending entries and exits are silent.
    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot, now: DateTime<Utc>) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            let value = snapshot.metric(rule.metric);
            if !value.is_finite() {
                warn!(rule_id = %rule.id, metric = %rule.metric, "Skipping rule, metric is not finite");
                continue;
            }
            let Some(dwell) = dwell_time(rule.duration_secs) else {
                warn!(rule_id = %rule.id, duration_secs = rule.duration_secs, "Skipping rule, duration out of range");
                continue;
            };
            let breached = rule.condition.is_breached(value, rule.threshold);

            let event = match (breached, self.states.get(&rule.id).copied()) {
                (true, None) => {
                    if dwell <= Duration::zero() {
                        self.states.insert(rule.id.clone(), RuleState::Firing { since: now, fired_at: now });
                        Some(AlertEvent::firing(rule, value, now))
                    } else {
                        debug!(rule_id = %rule.id, value, "Rule pending");
                        self.states.insert(rule.id.clone(), RuleState::Pending { since: now });
                        None
                    }
                }
                (true, Some(RuleState::Pending { since })) => {
                    if now - since >= dwell {
                        self.states.insert(rule.id.clone(), RuleState::Firing { since, fired_at: now });
                        Some(AlertEvent::firing(rule, value, now))
                    } else {
                        None
                    }
                }
                (true, Some(RuleState::Firing { .. })) => None,
                (false, Some(RuleState::Pending { .. })) => {
                    debug!(rule_id = %rule.id, value, "Rule cleared before dwell time");
                    self.states.remove(&rule.id);
                    None
                }
                (false, Some(RuleState::Firing { fired_at, .. })) => {
                    self.states.remove(&rule.id);
                    Some(AlertEvent::resolved(rule, value, fired_at, now))
                }
                (false, None) => None,
            };

            if let Some(event) = event {
                if event.is_firing() {
                    warn!(rule_id = %rule.id, severity = %rule.severity, value, "{}", event.message);
                } else {
                    info!(rule_id = %rule.id, value, "{}", event.message);
                }
                let channels = rule
                    .channels
                    .iter()
                    .filter_map(|id| self.channels.iter().find(|c| &c.id == id))
                    .filter(|c| c.enabled)
                    .cloned()
                    .collect();
                transitions.push(AlertTransition { event, channels });
            }
        }

        for transition in &transitions {
            self.history.push_front(transition.event.clone());
        }
        self.history.truncate(self.history_limit);

        transitions
    }

    pub fn rule_phase(&self, rule_id: &str) -> RulePhase {
        match self.states.get(rule_id) {
            None => RulePhase::Normal,
            Some(RuleState::Pending { .. }) => RulePhase::Pending,
            Some(RuleState::Firing { .. }) => RulePhase::Firing,
        }
    }

    pub fn firing_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, RuleState::Firing { .. }))
            .count()
    }

    /// Most recent first.
    pub fn history(&self, limit: usize) -> Vec<AlertEvent> {
        self.history.iter().take(limit).cloned().collect()
    }

    // ------------------------------------------------------------------
    // Rule CRUD
    // ------------------------------------------------------------------

    fn validate_rule(
        &self,
        name: &str,
        threshold: f64,
        duration_secs: u64,
        channels: &[String],
    ) -> PulseResult<()> {
        if name.trim().is_empty() {
            return Err(PulseError::invalid_rule("name must not be empty"));
        }
        if !threshold.is_finite() {
            return Err(PulseError::invalid_rule(format!(
                "threshold for '{}' must be a finite number",
                name
            )));
        }
        if duration_secs > MAX_RULE_DURATION_SECS {
            return Err(PulseError::invalid_rule(format!(
                "duration for '{}' must be at most {} seconds, got {}",
                name, MAX_RULE_DURATION_SECS, duration_secs
            )));
        }
        if let Some(missing) = channels.iter().find(|id| self.channel(id).is_none()) {
            return Err(PulseError::ChannelNotFound(missing.clone()));
        }
        Ok(())
    }

    pub fn create_rule(&mut self, draft: RuleDraft, now: DateTime<Utc>) -> PulseResult<AlertRule> {
        self.validate_rule(&draft.name, draft.threshold, draft.duration_secs, &draft.channels)?;
        let rule = AlertRule::from_draft(format!("rule-{}", Uuid::new_v4()), draft, now);
        info!(rule_id = %rule.id, name = %rule.name, metric = %rule.metric, "Alert rule created");
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// Applies a partial update. Disabling a rule or changing what it compares clears its
    /// pending or firing state without emitting an event.
    pub fn update_rule(&mut self, rule_id: &str, update: RuleUpdate, now: DateTime<Utc>) -> PulseResult<AlertRule> {
        let current = self
            .rule(rule_id)
            .ok_or_else(|| PulseError::RuleNotFound(rule_id.to_string()))?;

        let name = update.name.clone().unwrap_or_else(|| current.name.clone());
        let threshold = update.threshold.unwrap_or(current.threshold);
        let duration_secs = update.duration_secs.unwrap_or(current.duration_secs);
        let channels = update
            .channels
            .clone()
            .unwrap_or_else(|| current.channels.clone());
        self.validate_rule(&name, threshold, duration_secs, &channels)?;

        let rearm = update.changes_condition() || update.enabled == Some(false);
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| PulseError::RuleNotFound(rule_id.to_string()))?;

        rule.name = name;
        rule.threshold = threshold;
        rule.channels = channels;
        if let Some(metric) = update.metric {
            rule.metric = metric;
        }
        if let Some(condition) = update.condition {
            rule.condition = condition;
        }
        rule.duration_secs = duration_secs;
        if let Some(severity) = update.severity {
            rule.severity = severity;
        }
        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        rule.updated_at = now;
        let updated = rule.clone();

        if rearm && self.states.remove(rule_id).is_some() {
            debug!(rule_id = %rule_id, "Cleared rule state after update");
        }
        Ok(updated)
    }

    pub fn set_rule_enabled(&mut self, rule_id: &str, enabled: bool, now: DateTime<Utc>) -> PulseResult<AlertRule> {
        self.update_rule(
            rule_id,
            RuleUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
            now,
        )
    }

    pub fn delete_rule(&mut self, rule_id: &str) -> PulseResult<AlertRule> {
        let idx = self
            .rules
            .iter()
            .position(|r| r.id == rule_id)
            .ok_or_else(|| PulseError::RuleNotFound(rule_id.to_string()))?;
        self.states.remove(rule_id);
        let rule = self.rules.remove(idx);
        info!(rule_id = %rule.id, "Alert rule deleted");
        Ok(rule)
    }

    pub fn rule(&self, rule_id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    // ------------------------------------------------------------------
    // Channel CRUD
    // ------------------------------------------------------------------

    fn insert_channel(&mut self, id: String, draft: ChannelDraft, now: DateTime<Utc>) -> PulseResult<NotificationChannel> {
        if draft.name.trim().is_empty() {
            return Err(PulseError::InvalidChannel("name must not be empty".to_string()));
        }
        if self.channel(&id).is_some() {
            return Err(PulseError::InvalidChannel(format!("duplicate channel id '{}'", id)));
        }
        let channel = NotificationChannel {
            id,
            name: draft.name,
            channel_type: draft.channel_type,
            config: draft.config,
            enabled: draft.enabled,
            created_at: now,
        };
        info!(channel_id = %channel.id, channel_type = %channel.channel_type, "Notification channel created");
        self.channels.push(channel.clone());
        Ok(channel)
    }

    pub fn create_channel(&mut self, draft: ChannelDraft, now: DateTime<Utc>) -> PulseResult<NotificationChannel> {
        self.insert_channel(format!("ch-{}", Uuid::new_v4()), draft, now)
    }

    pub fn update_channel(&mut self, channel_id: &str, update: ChannelUpdate) -> PulseResult<NotificationChannel> {
        if matches!(update.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(PulseError::InvalidChannel("name must not be empty".to_string()));
        }
        let channel = self
            .channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| PulseError::ChannelNotFound(channel_id.to_string()))?;
        if let Some(name) = update.name {
            channel.name = name;
        }
        if let Some(config) = update.config {
            channel.config = config;
        }
        if let Some(enabled) = update.enabled {
            channel.enabled = enabled;
        }
        Ok(channel.clone())
    }

    /// Removes the channel and detaches it from every rule that referenced it.
    pub fn delete_channel(&mut self, channel_id: &str) -> PulseResult<NotificationChannel> {
        let idx = self
            .channels
            .iter()
            .position(|c| c.id == channel_id)
            .ok_or_else(|| PulseError::ChannelNotFound(channel_id.to_string()))?;
        for rule in self.rules.iter_mut() {
            rule.channels.retain(|id| id != channel_id);
        }
        Ok(self.channels.remove(idx))
    }

    pub fn channel(&self, channel_id: &str) -> Option<&NotificationChannel> {
        self.channels.iter().find(|c| c.id == channel_id)
    }

    pub fn channels(&self) -> &[NotificationChannel] {
        &self.channels
    }

    /// Admits seeded channels then rules. Stops at the first invalid entry; entries admitted
    /// before it remain.
    pub fn apply_seed(&mut self, seed: AlertSeed, now: DateTime<Utc>) -> PulseResult<usize> {
        let mut admitted = 0;
        for SeedChannel { id, channel } in seed.channels {
            self.insert_channel(id, channel, now)?;
            admitted += 1;
        }
        for rule in seed.rules {
            self.create_rule(rule, now)?;
            admitted += 1;
        }
        Ok(admitted)
    }
}
