use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PulseError, PulseResult};
use crate::models::{
    AnomalyConfig, AnomalyConfigUpdate, AnomalyEvent, AnomalySeverity, ExpectedRange, MetricKind,
    MetricsSnapshot,
};

/// Samples a metric's window must hold before it is scored.
pub const MIN_SAMPLES: usize = 15;
pub const DEFAULT_ANOMALY_HISTORY_LIMIT: usize = 200;
const MIN_STD_DEV: f64 = 0.001;
const EXPECTED_RANGE_SIGMAS: f64 = 2.0;

/// Population mean and standard deviation.
fn mean_and_std_dev(values: &VecDeque<f64>) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Rolling z-score detector over the overall metrics of successive snapshots.
pub struct AnomalyDetector {
    config: AnomalyConfig,
    windows: HashMap<MetricKind, VecDeque<f64>>,
    history: VecDeque<AnomalyEvent>,
    history_limit: usize,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            config: AnomalyConfig::default(),
            windows: HashMap::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_ANOMALY_HISTORY_LIMIT,
        }
    }
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig, history_limit: usize) -> PulseResult<Self> {
        validate_config(&config)?;
        Ok(Self {
            config,
            windows: HashMap::new(),
            history: VecDeque::new(),
            history_limit,
        })
    }

    /// Feeds each configured metric's current value through [`Self::observe`]. Does nothing
    /// while detection is disabled.
    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot, now: DateTime<Utc>) -> Vec<AnomalyEvent> {
        if !self.config.enabled {
            return Vec::new();
        }
        let metrics = self.config.metrics.clone();
        metrics
            .into_iter()
            .filter_map(|metric| self.observe(metric, snapshot.metric(metric), now))
            .collect()
    }

    /// Appends `value` to the metric's window and scores it against the window contents,
    /// including the value itself.
    pub fn observe(&mut self, metric: MetricKind, value: f64, now: DateTime<Utc>) -> Option<AnomalyEvent> {
        if !value.is_finite() {
            debug!(metric = %metric, "Ignoring non-finite sample");
            return None;
        }

        let window_size = self.config.window_size;
        let window = self.windows.entry(metric).or_default();
        window.push_back(value);
        while window.len() > window_size {
            window.pop_front();
        }
        if window.len() < MIN_SAMPLES {
            return None;
        }

        let (mean, std_dev) = mean_and_std_dev(window);
        if std_dev < MIN_STD_DEV {
            return None;
        }

        let z_score = (value - mean).abs() / std_dev;
        if z_score <= self.config.z_score_threshold {
            return None;
        }

        let expected_range = ExpectedRange {
            min: mean - EXPECTED_RANGE_SIGMAS * std_dev,
            max: mean + EXPECTED_RANGE_SIGMAS * std_dev,
        };
        let severity = AnomalySeverity::from_z_score(z_score);
        let event = AnomalyEvent {
            id: format!("anomaly-{}", Uuid::new_v4()),
            metric,
            value,
            expected_range,
            mean,
            std_dev,
            z_score,
            severity,
            message: format!(
                "Anomaly in {}: {:.2} (expected {:.2} ~ {:.2}, z={:.1})",
                metric, value, expected_range.min, expected_range.max, z_score
            ),
            timestamp: now,
        };
        info!(metric = %metric, severity = %severity, z_score, "{}", event.message);

        self.history.push_front(event.clone());
        self.history.truncate(self.history_limit);
        Some(event)
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Applies a partial config change. Shrinking the window takes effect on each metric's
    /// next append.
    pub fn update_config(&mut self, update: AnomalyConfigUpdate) -> PulseResult<&AnomalyConfig> {
        let mut next = self.config.clone();
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        if let Some(threshold) = update.z_score_threshold {
            next.z_score_threshold = threshold;
        }
        if let Some(window_size) = update.window_size {
            next.window_size = window_size;
        }
        if let Some(metrics) = update.metrics {
            next.metrics = metrics;
        }
        validate_config(&next)?;
        debug!(?next, "Anomaly config updated");
        self.config = next;
        Ok(&self.config)
    }

    /// Most recent first.
    pub fn history(&self, limit: usize) -> Vec<AnomalyEvent> {
        self.history.iter().take(limit).cloned().collect()
    }

    pub fn window_len(&self, metric: MetricKind) -> usize {
        self.windows.get(&metric).map(|w| w.len()).unwrap_or(0)
    }
}

pub fn validate_config(config: &AnomalyConfig) -> PulseResult<()> {
    if !config.z_score_threshold.is_finite() || config.z_score_threshold <= 0.0 {
        return Err(PulseError::InvalidAnomalyConfig(format!(
            "z-score threshold must be a positive number, got {}",
            config.z_score_threshold
        )));
    }
    if config.window_size < MIN_SAMPLES {
        return Err(PulseError::InvalidAnomalyConfig(format!(
            "window size must be at least {}, got {}",
            MIN_SAMPLES, config.window_size
        )));
    }
    if config.metrics.is_empty() {
        return Err(PulseError::InvalidAnomalyConfig(
            "at least one metric must be monitored".to_string(),
        ));
    }
    Ok(())
}
