mod detector;

pub use detector::{validate_config, AnomalyDetector, DEFAULT_ANOMALY_HISTORY_LIMIT, MIN_SAMPLES};
