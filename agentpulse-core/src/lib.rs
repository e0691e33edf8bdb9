#![allow(clippy::manual_range_contains, clippy::derivable_impls, clippy::len_zero)]

pub mod alerts;
pub mod anomaly;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod monitor;

pub use alerts::{
    AlertEngine, AlertSeed, AlertTransition, NotificationDispatcher, Notifier, NotifierConfig,
    PagerDutyNotifier, RulePhase, SlackNotifier, WebhookNotifier,
};
pub use anomaly::AnomalyDetector;
pub use config::{get_config_dir, ConfigLoadError, EngineConfig, LoggingConfig, PulseConfig};
pub use error::{
    retry_async, retry_async_with_config, CliErrorDisplay, PulseError, PulseResult, RetryConfig,
};
pub use metrics::{
    LatencyPercentiles, LatencyWindow, MetricsAggregator, MonitorTelemetry, SnapshotBuilder,
};
pub use models::{
    Agent, AgentMetrics, AgentStatus, AlertEvent, AlertRule, AlertStatus, AnomalyConfig,
    AnomalyEvent, AnomalySeverity, ChannelDraft, ChannelType, Condition, IngestEvent, MetricKind,
    MetricsSnapshot, NotificationChannel, OverallMetrics, PricingTable, RuleDraft, RuleUpdate,
    Sample, Severity,
};
pub use monitor::{BatchReport, Monitor, MonitorEvent, MonitorScheduler, TickReport};
