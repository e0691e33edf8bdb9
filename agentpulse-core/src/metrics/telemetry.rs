//! Prometheus exposition of the monitor's own state.
//!
//! Each [`MonitorTelemetry`] owns its registry, so several monitors in one process never
//! share counters.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

use crate::error::{PulseError, PulseResult};
use crate::models::{MetricKind, MetricsSnapshot, Severity};

const METRIC_PREFIX: &str = "monitoring";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SeverityLabels {
    severity: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct MetricLabels {
    metric: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct AgentLabels {
    agent_id: String,
}

pub struct MonitorTelemetry {
    registry: Registry,
    success_rate: Gauge<f64, AtomicU64>,
    error_rate: Gauge<f64, AtomicU64>,
    throughput: Gauge<f64, AtomicU64>,
    active_agents: Gauge,
    alerts_firing: Gauge,
    agent_status: Family<AgentLabels, Gauge>,
    alerts_total: Family<SeverityLabels, Counter>,
    anomalies_total: Family<MetricLabels, Counter>,
}

impl Default for MonitorTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorTelemetry {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix(METRIC_PREFIX);

        let success_rate = Gauge::<f64, AtomicU64>::default();
        let error_rate = Gauge::<f64, AtomicU64>::default();
        let throughput = Gauge::<f64, AtomicU64>::default();
        let active_agents = Gauge::default();
        let alerts_firing = Gauge::default();
        let agent_status = Family::<AgentLabels, Gauge>::default();
        let alerts_total = Family::<SeverityLabels, Counter>::default();
        let anomalies_total = Family::<MetricLabels, Counter>::default();

        registry.register(
            "success_rate",
            "Blended success rate across agents (percent)",
            success_rate.clone(),
        );
        registry.register(
            "error_rate",
            "Failed requests over total requests (percent)",
            error_rate.clone(),
        );
        registry.register(
            "throughput",
            "Cumulative requests per tick",
            throughput.clone(),
        );
        registry.register(
            "active_agents",
            "Agents currently running or idle",
            active_agents.clone(),
        );
        registry.register(
            "alerts_firing",
            "Alert rules currently firing",
            alerts_firing.clone(),
        );
        registry.register(
            "agent_status",
            "Agent status (running=1, idle=0, error=-1, stopped=-2)",
            agent_status.clone(),
        );
        registry.register(
            "alerts",
            "Alerts fired, by severity",
            alerts_total.clone(),
        );
        registry.register(
            "anomalies",
            "Anomalies detected, by metric",
            anomalies_total.clone(),
        );

        Self {
            registry,
            success_rate,
            error_rate,
            throughput,
            active_agents,
            alerts_firing,
            agent_status,
            alerts_total,
            anomalies_total,
        }
    }

    pub fn observe_snapshot(&self, snapshot: &MetricsSnapshot) {
        let overall = &snapshot.overall;
        self.success_rate.set(overall.success_rate);
        self.error_rate.set(overall.error_rate);
        self.throughput.set(overall.throughput);
        self.active_agents.set(overall.active_agents as i64);

        for agent in &snapshot.agents {
            self.agent_status
                .get_or_create(&AgentLabels {
                    agent_id: agent.id.clone(),
                })
                .set(agent.status.gauge_value());
        }
    }

    pub fn record_alert_fired(&self, severity: Severity) {
        self.alerts_total
            .get_or_create(&SeverityLabels {
                severity: severity.to_string(),
            })
            .inc();
    }

    pub fn record_anomaly(&self, metric: MetricKind) {
        self.anomalies_total
            .get_or_create(&MetricLabels {
                metric: metric.to_string(),
            })
            .inc();
    }

    pub fn set_alerts_firing(&self, count: usize) {
        self.alerts_firing.set(count as i64);
    }

    pub fn alerts_fired(&self, severity: Severity) -> u64 {
        self.alerts_total
            .get_or_create(&SeverityLabels {
                severity: severity.to_string(),
            })
            .get()
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> PulseResult<String> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)
            .map_err(|e| PulseError::TelemetryEncodeError(e.to_string()))?;
        Ok(buffer)
    }
}
