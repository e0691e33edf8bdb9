//! Error types for the AgentPulse core library.
//!
//! Every fallible operation in the crate returns [`PulseResult`]. Variants carry a stable
//! code so log lines and CLI output can be correlated.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Config | Config file, environment and validation errors |
//! | E2001-E2099 | Ingest | Malformed events and unknown agent references |
//! | E3001-E3099 | Rules | Alert rule and notification channel admission errors |
//! | E4001-E4099 | Notification | Channel delivery and transport errors |
//! | E5001-E5099 | Anomaly | Anomaly detector configuration errors |
//! | E6001-E6099 | Metrics | Telemetry encoding and scheduler errors |
//! | E9001-E9099 | General | Internal, IO and serialization errors |

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry policy for notification delivery, built from the configured retry count and
    /// base delay.
    pub fn for_notification(retry_count: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_attempts: retry_count + 1,
            initial_delay: Duration::from_millis(retry_delay_ms),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // up to 25% on top of the capped delay
            capped_delay * (1.0 + rand_jitter() * 0.25)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Returns a value between 0.0 and 1.0 derived from the clock's sub-second nanos.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// The main error type for the AgentPulse core library.
#[derive(Debug, Error)]
pub enum PulseError {
    // ========================================================================
    // Configuration Errors (E1001-E1099)
    // ========================================================================
    /// Configuration file parse error
    #[error("[E1001] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E1002] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    /// Configuration file not found
    #[error("[E1003] Configuration file not found: {0}")]
    ConfigFileNotFound(String),

    // ========================================================================
    // Ingest Errors (E2001-E2099)
    // ========================================================================
    /// An event is missing a required field or carries an out-of-range value
    #[error("[E2001] Invalid event: {0}")]
    InvalidEvent(String),

    /// An update referenced an agent that was never registered or observed
    #[error("[E2002] Agent not found: {0}")]
    AgentNotFound(String),

    /// A raw line could not be decoded into an event
    #[error("[E2003] Failed to decode event: {0}")]
    EventDecodeError(String),

    // ========================================================================
    // Rule and Channel Errors (E3001-E3099)
    // ========================================================================
    #[error("[E3001] Alert rule not found: {0}")]
    RuleNotFound(String),

    #[error("[E3002] Invalid alert rule: {0}")]
    InvalidRule(String),

    #[error("[E3003] Notification channel not found: {0}")]
    ChannelNotFound(String),

    #[error("[E3004] Invalid notification channel: {0}")]
    InvalidChannel(String),

    // ========================================================================
    // Notification Errors (E4001-E4099)
    // ========================================================================
    /// Channel is missing a setting its sender needs
    #[error("[E4001] Channel '{channel}' is misconfigured: {message}")]
    ChannelConfigError { channel: String, message: String },

    /// The receiving endpoint answered with a non-success status
    #[error("[E4002] Notification rejected by {service}: HTTP {status}")]
    NotificationRejected { service: String, status: u16 },

    /// The receiving endpoint could not be reached
    #[error("[E4003] Notification endpoint unavailable: {0}")]
    NotificationUnavailable(String),

    /// Delivery timed out
    #[error("[E4004] Notification timed out after {0} seconds")]
    NotificationTimeout(u64),

    #[error("[E4005] Notification delivery failed: {0}")]
    NotificationFailed(String),

    #[error("[E4006] No notifier registered for channel type '{0}'")]
    NotifierNotRegistered(String),

    // ========================================================================
    // Anomaly Errors (E5001-E5099)
    // ========================================================================
    #[error("[E5001] Invalid anomaly configuration: {0}")]
    InvalidAnomalyConfig(String),

    // ========================================================================
    // Metrics Errors (E6001-E6099)
    // ========================================================================
    #[error("[E6001] Failed to encode telemetry: {0}")]
    TelemetryEncodeError(String),

    #[error("[E6002] Monitor scheduler is not running")]
    SchedulerNotRunning,

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    #[error("[E9002] IO error: {0}")]
    IoError(String),

    #[error("[E9003] Serialization error: {0}")]
    SerializationError(String),
}

pub type PulseResult<T> = Result<T, PulseError>;

impl From<reqwest::Error> for PulseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PulseError::NotificationTimeout(30)
        } else if err.is_connect() {
            PulseError::NotificationUnavailable(err.to_string())
        } else if let Some(status) = err.status() {
            PulseError::NotificationRejected {
                service: err
                    .url()
                    .and_then(|u| u.host_str().map(|h| h.to_string()))
                    .unwrap_or_else(|| "unknown".to_string()),
                status: status.as_u16(),
            }
        } else {
            PulseError::NotificationFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PulseError {
    fn from(err: serde_yaml::Error) -> Self {
        PulseError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for PulseError {
    fn from(err: std::io::Error) -> Self {
        PulseError::IoError(err.to_string())
    }
}

impl From<std::fmt::Error> for PulseError {
    fn from(err: std::fmt::Error) -> Self {
        PulseError::TelemetryEncodeError(err.to_string())
    }
}

impl From<config::ConfigError> for PulseError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => PulseError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::FileParse { uri, cause } => PulseError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => PulseError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => PulseError::ConfigParseError(err.to_string()),
        }
    }
}

impl PulseError {
    pub fn invalid_event(message: impl Into<String>) -> Self {
        PulseError::InvalidEvent(message.into())
    }

    pub fn invalid_rule(message: impl Into<String>) -> Self {
        PulseError::InvalidRule(message.into())
    }

    pub fn channel_config(channel: impl Into<String>, message: impl Into<String>) -> Self {
        PulseError::ChannelConfigError {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error was raised at the ingestion boundary.
    pub fn is_ingest_error(&self) -> bool {
        matches!(
            self,
            PulseError::InvalidEvent(_)
                | PulseError::AgentNotFound(_)
                | PulseError::EventDecodeError(_)
        )
    }

    /// Returns true if this error was raised while admitting a rule, channel or anomaly config.
    pub fn is_admission_error(&self) -> bool {
        matches!(
            self,
            PulseError::RuleNotFound(_)
                | PulseError::InvalidRule(_)
                | PulseError::ChannelNotFound(_)
                | PulseError::InvalidChannel(_)
                | PulseError::InvalidAnomalyConfig(_)
        )
    }

    pub fn is_notification_error(&self) -> bool {
        matches!(
            self,
            PulseError::ChannelConfigError { .. }
                | PulseError::NotificationRejected { .. }
                | PulseError::NotificationUnavailable(_)
                | PulseError::NotificationTimeout(_)
                | PulseError::NotificationFailed(_)
                | PulseError::NotifierNotRegistered(_)
        )
    }

    /// Returns true if this error is transient and the operation might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            PulseError::NotificationUnavailable(_) | PulseError::NotificationTimeout(_) => true,
            PulseError::NotificationRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns a suggested retry delay in seconds if the error is transient.
    pub fn suggested_retry_delay(&self) -> Option<u64> {
        match self {
            PulseError::NotificationRejected { status: 429, .. } => Some(30),
            PulseError::NotificationRejected { .. } => Some(5),
            PulseError::NotificationUnavailable(_) => Some(5),
            PulseError::NotificationTimeout(_) => Some(10),
            _ => None,
        }
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            PulseError::ConfigParseError(_) => "E1001",
            PulseError::InvalidConfigValue { .. } => "E1002",
            PulseError::ConfigFileNotFound(_) => "E1003",
            PulseError::InvalidEvent(_) => "E2001",
            PulseError::AgentNotFound(_) => "E2002",
            PulseError::EventDecodeError(_) => "E2003",
            PulseError::RuleNotFound(_) => "E3001",
            PulseError::InvalidRule(_) => "E3002",
            PulseError::ChannelNotFound(_) => "E3003",
            PulseError::InvalidChannel(_) => "E3004",
            PulseError::ChannelConfigError { .. } => "E4001",
            PulseError::NotificationRejected { .. } => "E4002",
            PulseError::NotificationUnavailable(_) => "E4003",
            PulseError::NotificationTimeout(_) => "E4004",
            PulseError::NotificationFailed(_) => "E4005",
            PulseError::NotifierNotRegistered(_) => "E4006",
            PulseError::InvalidAnomalyConfig(_) => "E5001",
            PulseError::TelemetryEncodeError(_) => "E6001",
            PulseError::SchedulerNotRunning => "E6002",
            PulseError::Internal(_) => "E9001",
            PulseError::IoError(_) => "E9002",
            PulseError::SerializationError(_) => "E9003",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            PulseError::ConfigFileNotFound(_) => {
                Some("Create agentpulse.toml in the working directory or the config directory")
            }
            PulseError::AgentNotFound(_) => {
                Some("Send a register event for the agent before status or activity updates")
            }
            PulseError::EventDecodeError(_) => {
                Some("Each line must be one JSON object with a \"type\" field")
            }
            PulseError::ChannelNotFound(_) => {
                Some("Create the channel before referencing it from a rule")
            }
            PulseError::ChannelConfigError { .. } => {
                Some("Check the channel's config map (webhookUrl, routingKey or url)")
            }
            PulseError::NotificationRejected { status: 429, .. } => {
                Some("The receiver is rate limiting; lower the alert volume or wait")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level. Rejected events log at warn since
    /// the rest of the stream is still processed.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else if self.is_ingest_error() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Skipping event: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// Retry utilities
// ============================================================================

/// Execute an async operation, retrying transient failures with the default policy.
pub async fn retry_async<F, Fut, T>(operation: F) -> PulseResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = PulseResult<T>>,
{
    retry_async_with_config(operation, RetryConfig::default()).await
}

/// Execute an async operation with custom retry configuration.
///
/// Non-transient errors are returned immediately without further attempts.
pub async fn retry_async_with_config<F, Fut, T>(
    operation: F,
    config: RetryConfig,
) -> PulseResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = PulseResult<T>>,
{
    let mut last_error = None;
    let attempts = config.max_attempts.max(1);

    for attempt in 0..attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        "Operation succeeded on attempt {} after {} retries",
                        attempt + 1,
                        attempt
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_transient() || attempt == attempts - 1 {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| PulseError::Internal("Retry loop exhausted without error".to_string())))
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with suggestions.
pub struct CliErrorDisplay<'a> {
    error: &'a PulseError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a PulseError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        if let Some(delay) = self.error.suggested_retry_delay() {
            writeln!(f)?;
            writeln!(
                f,
                "  This error may be temporary. Try again in {} seconds.",
                delay
            )?;
        }

        Ok(())
    }
}
