use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::snapshot::MetricKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Above,
    Below,
}

impl Condition {
    /// Strict comparison; a value equal to the threshold never breaches.
    pub fn is_breached(&self, value: f64, threshold: f64) -> bool {
        match self {
            Condition::Above => value > threshold,
            Condition::Below => value < threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Condition::Above => ">",
            Condition::Below => "<",
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Condition::Above => "exceeded",
            Condition::Below => "dropped below",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Above => write!(f, "above"),
            Condition::Below => write!(f, "below"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric: MetricKind,
    pub condition: Condition,
    pub threshold: f64,
    /// Seconds the condition must hold continuously before the rule fires.
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    pub severity: Severity,
    pub enabled: bool,
    pub channels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn from_draft(id: String, draft: RuleDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            metric: draft.metric,
            condition: draft.condition,
            threshold: draft.threshold,
            duration_secs: draft.duration_secs,
            severity: draft.severity,
            enabled: draft.enabled,
            channels: draft.channels,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub name: String,
    pub metric: MetricKind,
    pub condition: Condition,
    pub threshold: f64,
    #[serde(rename = "duration", default)]
    pub duration_secs: u64,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl RuleDraft {
    pub fn new(
        name: impl Into<String>,
        metric: MetricKind,
        condition: Condition,
        threshold: f64,
        duration_secs: u64,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            metric,
            condition,
            threshold,
            duration_secs,
            severity,
            enabled: true,
            channels: Vec::new(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub metric: Option<MetricKind>,
    pub condition: Option<Condition>,
    pub threshold: Option<f64>,
    #[serde(rename = "duration")]
    pub duration_secs: Option<u64>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub channels: Option<Vec<String>>,
}

impl RuleUpdate {
    /// True when the update changes what the rule compares, which re-arms its state.
    pub fn changes_condition(&self) -> bool {
        self.metric.is_some()
            || self.condition.is_some()
            || self.threshold.is_some()
            || self.duration_secs.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub metric: MetricKind,
    pub value: f64,
    pub threshold: f64,
    pub condition: Condition,
    pub severity: Severity,
    pub status: AlertStatus,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub message: String,
}

impl AlertEvent {
    pub fn firing(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("alert-{}", Uuid::new_v4()),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            metric: rule.metric,
            value,
            threshold: rule.threshold,
            condition: rule.condition,
            severity: rule.severity,
            status: AlertStatus::Firing,
            started_at: now,
            resolved_at: None,
            message: format!(
                "{}: {} {} threshold ({:.2} {} {})",
                rule.name,
                rule.metric,
                rule.condition.verb(),
                value,
                rule.condition.symbol(),
                rule.threshold
            ),
        }
    }

    pub fn resolved(
        rule: &AlertRule,
        value: f64,
        fired_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("alert-{}", Uuid::new_v4()),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            metric: rule.metric,
            value,
            threshold: rule.threshold,
            condition: rule.condition,
            severity: rule.severity,
            status: AlertStatus::Resolved,
            started_at: fired_at,
            resolved_at: Some(now),
            message: format!(
                "{}: resolved - {} back to normal ({:.2})",
                rule.name, rule.metric, value
            ),
        }
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Slack,
    Pagerduty,
    Webhook,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Slack => write!(f, "slack"),
            ChannelType::Pagerduty => write!(f, "pagerduty"),
            ChannelType::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// Sender-specific settings such as `webhookUrl`, `routingKey`, `url` or `authHeader`.
    pub config: HashMap<String, String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationChannel {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ChannelDraft {
    pub fn new(name: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            name: name.into(),
            channel_type,
            config: HashMap::new(),
            enabled: true,
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub config: Option<HashMap<String, String>>,
    pub enabled: Option<bool>,
}

fn default_true() -> bool {
    true
}
