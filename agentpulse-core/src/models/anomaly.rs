use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::MetricKind;

pub const DEFAULT_Z_SCORE_THRESHOLD: f64 = 2.5;
pub const DEFAULT_WINDOW_SIZE: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnomalyConfig {
    pub enabled: bool,
    #[serde(alias = "z_score_threshold")]
    pub z_score_threshold: f64,
    #[serde(alias = "window_size")]
    pub window_size: usize,
    pub metrics: Vec<MetricKind>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            z_score_threshold: DEFAULT_Z_SCORE_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            metrics: vec![
                MetricKind::SuccessRate,
                MetricKind::AvgLatency,
                MetricKind::ErrorRate,
                MetricKind::Throughput,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyConfigUpdate {
    pub enabled: Option<bool>,
    pub z_score_threshold: Option<f64>,
    pub window_size: Option<usize>,
    pub metrics: Option<Vec<MetricKind>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    pub fn from_z_score(z: f64) -> Self {
        if z > 4.0 {
            AnomalySeverity::High
        } else if z > 3.0 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }
}

impl std::fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalySeverity::Low => write!(f, "low"),
            AnomalySeverity::Medium => write!(f, "medium"),
            AnomalySeverity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    pub id: String,
    pub metric: MetricKind,
    pub value: f64,
    pub expected_range: ExpectedRange,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub severity: AnomalySeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
