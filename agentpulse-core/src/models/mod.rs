mod agent;
mod alert;
mod anomaly;
mod events;
mod pricing;
mod snapshot;
mod trace;

pub use agent::{Agent, AgentMetrics, AgentStatus};
pub use alert::{
    AlertEvent, AlertRule, AlertStatus, ChannelDraft, ChannelType, ChannelUpdate, Condition,
    NotificationChannel, RuleDraft, RuleUpdate, Severity,
};
pub use anomaly::{
    AnomalyConfig, AnomalyConfigUpdate, AnomalyEvent, AnomalySeverity, ExpectedRange,
    DEFAULT_WINDOW_SIZE, DEFAULT_Z_SCORE_THRESHOLD,
};
pub use events::{
    Activity, ActivityKind, ActivityObserved, AgentRegistration, AgentStatusChanged, IngestEvent,
    LlmCallObserved, Sample, ToolCallObserved,
};
pub use pricing::{ModelPricing, PricingTable};
pub use snapshot::{
    CostPoint, ErrorCategory, ErrorTypeCount, LatencyPoint, MetricKind, MetricsSnapshot,
    OverallMetrics, TaskQueue, TokenPoint,
};
pub use trace::{Trace, TraceObserved, TraceStatus, TraceStep, TraceStepKind, TraceStepObserved};
