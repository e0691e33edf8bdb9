mod aggregator;
pub mod cost;
mod snapshot;
mod telemetry;
mod window;

pub use aggregator::{
    success_rate, AggregatorConfig, MetricsAggregator, TickTotals, DEFAULT_ACTIVITY_CAPACITY,
};
pub use cost::{AgentCost, CostForecast, CostSummary, ForecastDay, ModelCost};
pub use snapshot::{
    overall_metrics, SnapshotBuilder, SnapshotConfig, DEFAULT_LIVENESS_TIMEOUT_SECS,
    DEFAULT_TREND_CAPACITY,
};
pub use telemetry::MonitorTelemetry;
pub use window::{
    percentile, LatencyPercentiles, LatencyWindow, RollingSeries, DEFAULT_LATENCY_WINDOW,
};

/// Rounds half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
