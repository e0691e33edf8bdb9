mod engine;
pub mod notifiers;

pub use engine::{
    AlertEngine, AlertSeed, AlertTransition, RulePhase, SeedChannel, DEFAULT_ALERT_HISTORY_LIMIT,
};
pub use notifiers::{
    NotificationDispatcher, Notifier, NotifierConfig, PagerDutyNotifier, SlackNotifier,
    WebhookNotifier, DEFAULT_PAGERDUTY_URL,
};
