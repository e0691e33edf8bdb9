//! Alert delivery to Slack, PagerDuty and generic webhooks.
//!
//! Delivery is decoupled from rule evaluation: [`NotificationDispatcher::dispatch`] spawns one
//! task per channel and only logs failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{retry_async_with_config, PulseError, PulseResult, RetryConfig};
use crate::models::{AlertEvent, ChannelType, NotificationChannel, Severity};

pub const DEFAULT_PAGERDUTY_URL: &str = "https://events.pagerduty.com/v2/enqueue";
const SOURCE: &str = "agentpulse";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_pagerduty_url")]
    pub pagerduty_url: String,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_pagerduty_url() -> String {
    DEFAULT_PAGERDUTY_URL.to_string()
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            pagerduty_url: default_pagerduty_url(),
        }
    }
}

impl NotifierConfig {
    fn retry_policy(&self) -> RetryConfig {
        RetryConfig::for_notification(self.retry_count, self.retry_delay_ms)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    async fn send(&self, event: &AlertEvent, channel: &NotificationChannel) -> PulseResult<()>;
}

/// Shared JSON POST with retry. Non-success responses surface as `NotificationRejected` so
/// server errors and rate limits are retried and client errors are not.
#[derive(Clone)]
struct JsonPoster {
    client: reqwest::Client,
    config: NotifierConfig,
}

impl JsonPoster {
    fn new(config: NotifierConfig) -> PulseResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PulseError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn post(
        &self,
        service: &str,
        url: &str,
        body: &serde_json::Value,
        authorization: Option<&str>,
    ) -> PulseResult<()> {
        let timeout_secs = self.config.timeout_secs;
        retry_async_with_config(
            || async move {
                let mut request = self.client.post(url).json(body);
                if let Some(value) = authorization {
                    request = request.header(reqwest::header::AUTHORIZATION, value);
                }
                let response = request.send().await.map_err(|e| {
                    if e.is_timeout() {
                        PulseError::NotificationTimeout(timeout_secs)
                    } else {
                        PulseError::from(e)
                    }
                })?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(PulseError::NotificationRejected {
                        service: service.to_string(),
                        status: status.as_u16(),
                    })
                }
            },
            self.config.retry_policy(),
        )
        .await
    }
}

fn required_setting<'a>(channel: &'a NotificationChannel, key: &str) -> PulseResult<&'a str> {
    channel
        .setting(key)
        .ok_or_else(|| PulseError::channel_config(&channel.id, format!("missing '{}'", key)))
}

// ============================================================================
// Slack
// ============================================================================

#[derive(Debug, Serialize)]
struct SlackField {
    title: &'static str,
    value: String,
    short: bool,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: &'static str,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    footer: &'static str,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    attachments: Vec<SlackAttachment>,
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#ef4444",
        Severity::Warning => "#f59e0b",
        Severity::Info => "#3b82f6",
    }
}

pub struct SlackNotifier {
    poster: JsonPoster,
}

impl SlackNotifier {
    pub fn new(config: NotifierConfig) -> PulseResult<Self> {
        Ok(Self {
            poster: JsonPoster::new(config)?,
        })
    }

    fn build_payload(event: &AlertEvent) -> SlackPayload {
        let label = if event.is_firing() { "FIRING" } else { "RESOLVED" };
        let at = event.resolved_at.unwrap_or(event.started_at);
        SlackPayload {
            attachments: vec![SlackAttachment {
                color: severity_color(event.severity),
                title: format!("[{}] {}", label, event.rule_name),
                text: event.message.clone(),
                fields: vec![
                    SlackField {
                        title: "Metric",
                        value: event.metric.to_string(),
                        short: true,
                    },
                    SlackField {
                        title: "Current Value",
                        value: format!("{:.2}", event.value),
                        short: true,
                    },
                    SlackField {
                        title: "Threshold",
                        value: format!("{} {}", event.condition.symbol(), event.threshold),
                        short: true,
                    },
                    SlackField {
                        title: "Severity",
                        value: event.severity.to_string(),
                        short: true,
                    },
                ],
                footer: SOURCE,
                ts: at.timestamp(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Slack
    }

    async fn send(&self, event: &AlertEvent, channel: &NotificationChannel) -> PulseResult<()> {
        let url = required_setting(channel, "webhookUrl")?;
        let body = serde_json::to_value(Self::build_payload(event))?;
        self.poster.post("slack", url, &body, None).await
    }
}

// ============================================================================
// PagerDuty
// ============================================================================

#[derive(Debug, Serialize)]
struct PagerDutyDetails {
    value: f64,
    threshold: f64,
    condition: String,
    rule_id: String,
}

#[derive(Debug, Serialize)]
struct PagerDutyPayload {
    summary: String,
    severity: &'static str,
    source: &'static str,
    component: String,
    custom_details: PagerDutyDetails,
}

#[derive(Debug, Serialize)]
struct PagerDutyEvent<'a> {
    routing_key: &'a str,
    event_action: &'static str,
    dedup_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<PagerDutyPayload>,
}

/// PagerDuty only accepts critical, error, warning and info.
fn pagerduty_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

pub struct PagerDutyNotifier {
    poster: JsonPoster,
}

impl PagerDutyNotifier {
    pub fn new(config: NotifierConfig) -> PulseResult<Self> {
        Ok(Self {
            poster: JsonPoster::new(config)?,
        })
    }

    fn build_event<'a>(event: &AlertEvent, routing_key: &'a str) -> PagerDutyEvent<'a> {
        let payload = event.is_firing().then(|| PagerDutyPayload {
            summary: event.message.clone(),
            severity: pagerduty_severity(event.severity),
            source: SOURCE,
            component: event.metric.to_string(),
            custom_details: PagerDutyDetails {
                value: event.value,
                threshold: event.threshold,
                condition: event.condition.to_string(),
                rule_id: event.rule_id.clone(),
            },
        });

        PagerDutyEvent {
            routing_key,
            event_action: if event.is_firing() { "trigger" } else { "resolve" },
            dedup_key: format!("agent-monitor-{}", event.rule_id),
            payload,
        }
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Pagerduty
    }

    async fn send(&self, event: &AlertEvent, channel: &NotificationChannel) -> PulseResult<()> {
        let routing_key = required_setting(channel, "routingKey")?;
        let body = serde_json::to_value(Self::build_event(event, routing_key))?;
        let url = self.poster.config.pagerduty_url.clone();
        self.poster.post("pagerduty", &url, &body, None).await
    }
}

// ============================================================================
// Webhook
// ============================================================================

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    event: &'a AlertEvent,
    timestamp: String,
}

pub struct WebhookNotifier {
    poster: JsonPoster,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> PulseResult<Self> {
        Ok(Self {
            poster: JsonPoster::new(config)?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn send(&self, event: &AlertEvent, channel: &NotificationChannel) -> PulseResult<()> {
        let url = required_setting(channel, "url")?;
        let payload = WebhookPayload {
            kind: "alert",
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let body = serde_json::to_value(&payload)?;
        self.poster
            .post("webhook", url, &body, channel.setting("authHeader"))
            .await
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes alert events to the sender registered for each channel's type.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifiers: HashMap<ChannelType, Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the Slack, PagerDuty and webhook senders registered.
    pub fn with_defaults(config: NotifierConfig) -> PulseResult<Self> {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(SlackNotifier::new(config.clone())?));
        dispatcher.register(Arc::new(PagerDutyNotifier::new(config.clone())?));
        dispatcher.register(Arc::new(WebhookNotifier::new(config)?));
        Ok(dispatcher)
    }

    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.channel_type(), notifier);
    }

    pub fn is_registered(&self, channel_type: ChannelType) -> bool {
        self.notifiers.contains_key(&channel_type)
    }

    /// Sends to one channel and waits for the outcome.
    pub async fn deliver(&self, event: &AlertEvent, channel: &NotificationChannel) -> PulseResult<()> {
        let notifier = self
            .notifiers
            .get(&channel.channel_type)
            .ok_or_else(|| PulseError::NotifierNotRegistered(channel.channel_type.to_string()))?;
        notifier.send(event, channel).await
    }

    /// Spawns one delivery task per enabled channel and returns immediately. A failing
    /// channel never affects the others. Returns the number of tasks spawned.
    pub fn dispatch(&self, event: &AlertEvent, channels: &[NotificationChannel]) -> usize {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(alert_id = %event.id, "No async runtime available, skipping notification dispatch");
                return 0;
            }
        };

        let mut spawned = 0;
        for channel in channels.iter().filter(|c| c.enabled) {
            let Some(notifier) = self.notifiers.get(&channel.channel_type).cloned() else {
                warn!(channel_id = %channel.id, channel_type = %channel.channel_type, "No notifier registered for channel type");
                continue;
            };
            let event = event.clone();
            let channel = channel.clone();
            handle.spawn(async move {
                match notifier.send(&event, &channel).await {
                    Ok(()) => debug!(alert_id = %event.id, channel_id = %channel.id, "Notification delivered"),
                    Err(e) => tracing::info_span!(
                        "notification",
                        alert_id = %event.id,
                        channel_id = %channel.id
                    )
                    .in_scope(|| e.log()),
                }
            });
            spawned += 1;
        }
        spawned
    }
}
