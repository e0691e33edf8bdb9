//! The tick pipeline tying aggregation, alerting and anomaly detection together.
//!
//! A [`Monitor`] owns all core state behind one async mutex, so ingestion and ticks from any
//! number of tasks are serialized and no two ticks overlap. [`MonitorScheduler`] drives ticks
//! on a fixed interval.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertEngine, AlertSeed, NotificationDispatcher};
use crate::anomaly::AnomalyDetector;
use crate::config::PulseConfig;
use crate::error::{PulseError, PulseResult};
use crate::ingest;
use crate::metrics::{
    cost, AggregatorConfig, AgentCost, CostForecast, CostSummary, LatencyPercentiles,
    MetricsAggregator, ModelCost, MonitorTelemetry, SnapshotBuilder, SnapshotConfig,
};
use crate::models::{
    AlertEvent, AlertRule, AnomalyConfig, AnomalyConfigUpdate, AnomalyEvent, ChannelDraft,
    ChannelUpdate, IngestEvent, MetricsSnapshot, NotificationChannel, PricingTable, RuleDraft,
    RuleUpdate, Trace,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outbound notifications for subscribers such as dashboards or exporters.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    MetricsSnapshotReady(Arc<MetricsSnapshot>),
    AlertFired(AlertEvent),
    AlertResolved(AlertEvent),
    AnomalyDetected(AnomalyEvent),
}

/// Everything one tick produced.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: Arc<MetricsSnapshot>,
    pub alerts: Vec<AlertEvent>,
    pub anomalies: Vec<AnomalyEvent>,
    /// Delivery tasks spawned for this tick's alert transitions.
    pub notifications: usize,
}

/// Outcome of a batch ingest. Invalid events are skipped and the rest are applied.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: Vec<(usize, PulseError)>,
}

struct MonitorState {
    aggregator: MetricsAggregator,
    builder: SnapshotBuilder,
    engine: AlertEngine,
    detector: AnomalyDetector,
}

pub struct Monitor {
    state: Mutex<MonitorState>,
    latest: RwLock<Option<Arc<MetricsSnapshot>>>,
    events: broadcast::Sender<MonitorEvent>,
    dispatcher: NotificationDispatcher,
    telemetry: MonitorTelemetry,
    started: Instant,
}

impl Monitor {
    /// Monitor seeded with the stock alert rules.
    pub fn new(config: &PulseConfig) -> PulseResult<Self> {
        let engine = AlertEngine::with_default_rules(config.engine.alert_history_limit);
        let dispatcher = NotificationDispatcher::with_defaults(config.notifications.clone())?;
        Self::with_parts(config, engine, dispatcher)
    }

    pub fn with_parts(
        config: &PulseConfig,
        engine: AlertEngine,
        dispatcher: NotificationDispatcher,
    ) -> PulseResult<Self> {
        let aggregator = MetricsAggregator::new(
            AggregatorConfig::default()
                .with_latency_window(config.engine.latency_window)
                .with_activity_capacity(config.engine.activity_capacity),
            PricingTable::with_overrides(&config.pricing),
        );
        let liveness_secs = config.engine.liveness_timeout_secs;
        let liveness_timeout = i64::try_from(liveness_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| PulseError::InvalidConfigValue {
                key: "engine.liveness_timeout_secs".to_string(),
                message: format!("{} seconds is out of range", liveness_secs),
            })?;
        let builder = SnapshotBuilder::new(
            SnapshotConfig::default()
                .with_trend_capacity(config.engine.trend_capacity)
                .with_liveness_timeout(liveness_timeout),
        );
        let detector =
            AnomalyDetector::new(config.anomaly.clone(), config.engine.anomaly_history_limit)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            state: Mutex::new(MonitorState {
                aggregator,
                builder,
                engine,
                detector,
            }),
            latest: RwLock::new(None),
            events,
            dispatcher,
            telemetry: MonitorTelemetry::new(),
            started: Instant::now(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn telemetry(&self) -> &MonitorTelemetry {
        &self.telemetry
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    pub async fn ingest(&self, event: IngestEvent) -> PulseResult<()> {
        self.ingest_at(event, Utc::now()).await
    }

    /// Validates then applies one event. A rejected event leaves state untouched.
    pub async fn ingest_at(&self, event: IngestEvent, now: DateTime<Utc>) -> PulseResult<()> {
        ingest::validate(&event)?;
        self.state.lock().await.aggregator.apply(event, now)
    }

    /// Applies every valid event under a single lock acquisition.
    pub async fn ingest_batch(&self, events: Vec<IngestEvent>, now: DateTime<Utc>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut state = self.state.lock().await;
        for (idx, event) in events.into_iter().enumerate() {
            match ingest::validate(&event).and_then(|_| state.aggregator.apply(event, now)) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    debug!(index = idx, code = e.error_code(), "Batch event rejected: {}", e);
                    report.rejected.push((idx, e));
                }
            }
        }
        report
    }

    pub async fn percentiles(&self, agent_id: &str) -> Option<LatencyPercentiles> {
        self.state.lock().await.aggregator.get_percentiles(agent_id)
    }

    /// Most recent first; `None` for an unknown agent.
    pub async fn recent_traces(&self, agent_id: &str, limit: usize) -> Option<Vec<Trace>> {
        self.state.lock().await.aggregator.recent_traces(agent_id, limit)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Runs one full tick as of `now`: advance trends, compose the snapshot, evaluate alert
    /// rules, then anomaly detection. Telemetry and subscribers are updated afterwards and
    /// alert deliveries are spawned without waiting on them.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let (snapshot, transitions, anomalies, firing) = {
            let mut guard = self.state.lock().await;
            let MonitorState {
                aggregator,
                builder,
                engine,
                detector,
            } = &mut *guard;

            builder.tick(aggregator, now);
            let snapshot = Arc::new(builder.snapshot(aggregator, now));
            let transitions = engine.evaluate(&snapshot, now);
            let anomalies = detector.evaluate(&snapshot, now);
            (snapshot, transitions, anomalies, engine.firing_count())
        };

        self.telemetry.observe_snapshot(&snapshot);
        self.telemetry.set_alerts_firing(firing);
        *self.latest.write().await = Some(Arc::clone(&snapshot));
        let _ = self
            .events
            .send(MonitorEvent::MetricsSnapshotReady(Arc::clone(&snapshot)));

        let mut notifications = 0;
        let mut alerts = Vec::with_capacity(transitions.len());
        for transition in transitions {
            notifications += self
                .dispatcher
                .dispatch(&transition.event, &transition.channels);
            let event = if transition.event.is_firing() {
                self.telemetry.record_alert_fired(transition.event.severity);
                MonitorEvent::AlertFired(transition.event.clone())
            } else {
                MonitorEvent::AlertResolved(transition.event.clone())
            };
            let _ = self.events.send(event);
            alerts.push(transition.event);
        }

        for anomaly in &anomalies {
            self.telemetry.record_anomaly(anomaly.metric);
            let _ = self.events.send(MonitorEvent::AnomalyDetected(anomaly.clone()));
        }

        debug!(
            tick = snapshot.tick,
            alerts = alerts.len(),
            anomalies = anomalies.len(),
            "Tick complete"
        );

        TickReport {
            snapshot,
            alerts,
            anomalies,
            notifications,
        }
    }

    /// The snapshot from the most recent tick, or a fresh one if no tick has run yet.
    pub async fn snapshot(&self) -> Arc<MetricsSnapshot> {
        if let Some(snapshot) = self.latest.read().await.as_ref() {
            return Arc::clone(snapshot);
        }
        let state = self.state.lock().await;
        Arc::new(state.builder.snapshot(&state.aggregator, Utc::now()))
    }

    // ------------------------------------------------------------------
    // Cost views
    // ------------------------------------------------------------------

    pub async fn cost_summary(&self) -> CostSummary {
        cost::summarize(&*self.snapshot().await, self.uptime())
    }

    pub async fn cost_by_model(&self) -> Vec<ModelCost> {
        let snapshot = self.snapshot().await;
        let state = self.state.lock().await;
        cost::by_model(&snapshot, state.aggregator.pricing())
    }

    pub async fn cost_by_agent(&self) -> Vec<AgentCost> {
        cost::by_agent(&*self.snapshot().await)
    }

    pub async fn cost_forecast(&self) -> CostForecast {
        cost::forecast(&*self.snapshot().await, self.uptime())
    }

    // ------------------------------------------------------------------
    // Rules and channels
    // ------------------------------------------------------------------

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.state.lock().await.engine.rules().to_vec()
    }

    pub async fn create_rule(&self, draft: RuleDraft) -> PulseResult<AlertRule> {
        self.state.lock().await.engine.create_rule(draft, Utc::now())
    }

    pub async fn update_rule(&self, rule_id: &str, update: RuleUpdate) -> PulseResult<AlertRule> {
        self.state
            .lock()
            .await
            .engine
            .update_rule(rule_id, update, Utc::now())
    }

    pub async fn delete_rule(&self, rule_id: &str) -> PulseResult<AlertRule> {
        self.state.lock().await.engine.delete_rule(rule_id)
    }

    pub async fn channels(&self) -> Vec<NotificationChannel> {
        self.state.lock().await.engine.channels().to_vec()
    }

    pub async fn create_channel(&self, draft: ChannelDraft) -> PulseResult<NotificationChannel> {
        self.state.lock().await.engine.create_channel(draft, Utc::now())
    }

    pub async fn update_channel(
        &self,
        channel_id: &str,
        update: ChannelUpdate,
    ) -> PulseResult<NotificationChannel> {
        self.state
            .lock()
            .await
            .engine
            .update_channel(channel_id, update)
    }

    pub async fn delete_channel(&self, channel_id: &str) -> PulseResult<NotificationChannel> {
        self.state.lock().await.engine.delete_channel(channel_id)
    }

    pub async fn apply_seed(&self, seed: AlertSeed) -> PulseResult<usize> {
        self.state.lock().await.engine.apply_seed(seed, Utc::now())
    }

    pub async fn alert_history(&self, limit: usize) -> Vec<AlertEvent> {
        self.state.lock().await.engine.history(limit)
    }

    // ------------------------------------------------------------------
    // Anomaly detection
    // ------------------------------------------------------------------

    pub async fn anomaly_config(&self) -> AnomalyConfig {
        self.state.lock().await.detector.config().clone()
    }

    pub async fn update_anomaly_config(&self, update: AnomalyConfigUpdate) -> PulseResult<AnomalyConfig> {
        let mut state = self.state.lock().await;
        state.detector.update_config(update).cloned()
    }

    pub async fn anomaly_history(&self, limit: usize) -> Vec<AnomalyEvent> {
        self.state.lock().await.detector.history(limit)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs [`Monitor::tick`] on a fixed interval in a background task.
pub struct MonitorScheduler {
    monitor: Arc<Monitor>,
    interval: Duration,
    is_running: Arc<AtomicBool>,
    task_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl MonitorScheduler {
    pub fn new(monitor: Arc<Monitor>, interval: Duration) -> Self {
        Self {
            monitor,
            interval,
            is_running: Arc::new(AtomicBool::new(false)),
            task_handle: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn start(&self) {
        if self.is_running.load(Ordering::SeqCst) {
            warn!("Monitor scheduler is already running");
            return;
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting monitor scheduler"
        );

        let is_running = Arc::clone(&self.is_running);
        let monitor = Arc::clone(&self.monitor);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // first tick completes immediately; wait a full interval before evaluating
            interval_timer.tick().await;

            while is_running.load(Ordering::SeqCst) {
                interval_timer.tick().await;

                if !is_running.load(Ordering::SeqCst) {
                    break;
                }

                monitor.tick().await;
            }

            info!("Monitor scheduler task stopped");
        });

        *self.task_handle.write().await = Some(handle);
    }

    pub async fn stop(&self) -> PulseResult<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PulseError::SchedulerNotRunning);
        }

        info!("Stopping monitor scheduler...");
        self.is_running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.task_handle.write().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Error waiting for monitor scheduler task to stop");
            }
        }

        info!("Monitor scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}
