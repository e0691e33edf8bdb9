use agentpulse_core::models::{AgentRegistration, LlmCallObserved};
use agentpulse_core::{
    AlertEngine, AlertSeed, AlertStatus, Condition, IngestEvent, MetricKind, MetricsAggregator,
    MetricsSnapshot, Monitor, NotificationDispatcher, PulseConfig, PulseError, RuleDraft,
    RulePhase, RuleUpdate, Severity, SnapshotBuilder,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

fn snapshot_with(metric: MetricKind, value: f64) -> MetricsSnapshot {
    let aggregator = MetricsAggregator::default();
    let mut snapshot = SnapshotBuilder::default().snapshot(&aggregator, t0());
    match metric {
        MetricKind::SuccessRate => snapshot.overall.success_rate = value,
        MetricKind::AvgLatency => snapshot.overall.avg_latency = value as u64,
        MetricKind::ErrorRate => snapshot.overall.error_rate = value,
        MetricKind::TotalCost => snapshot.overall.total_cost = value,
        MetricKind::Throughput => snapshot.overall.throughput = value,
        MetricKind::TokenUsage => snapshot.overall.total_tokens_input = value as u64,
    }
    snapshot
}

fn success_rate(value: f64) -> MetricsSnapshot {
    snapshot_with(MetricKind::SuccessRate, value)
}

fn engine_with_rule(duration_secs: u64) -> (AlertEngine, String) {
    let mut engine = AlertEngine::new(50);
    let rule = engine
        .create_rule(
            RuleDraft::new(
                "Low Success Rate",
                MetricKind::SuccessRate,
                Condition::Below,
                90.0,
                duration_secs,
                Severity::Critical,
            ),
            t0(),
        )
        .unwrap();
    (engine, rule.id)
}

mod dwell_time {
    use super::*;

    #[test]
    fn test_sustained_breach_fires_after_dwell_then_resolves() {
        let (mut engine, rule_id) = engine_with_rule(10);

        assert!(engine.evaluate(&success_rate(80.0), at(0)).is_empty());
        assert_eq!(engine.rule_phase(&rule_id), RulePhase::Pending);
        assert!(engine.evaluate(&success_rate(80.0), at(5)).is_empty());

        let fired = engine.evaluate(&success_rate(80.0), at(10));
        assert_eq!(fired.len(), 1);
        let event = &fired[0].event;
        assert_eq!(event.status, AlertStatus::Firing);
        assert_eq!(event.value, 80.0);
        assert_eq!(event.started_at, at(10));
        assert_eq!(engine.rule_phase(&rule_id), RulePhase::Firing);

        assert!(engine.evaluate(&success_rate(75.0), at(11)).is_empty());

        let resolved = engine.evaluate(&success_rate(95.0), at(12));
        assert_eq!(resolved.len(), 1);
        let event = &resolved[0].event;
        assert_eq!(event.status, AlertStatus::Resolved);
        assert_eq!(event.started_at, at(10));
        assert_eq!(event.resolved_at, Some(at(12)));
        assert_eq!(engine.rule_phase(&rule_id), RulePhase::Normal);
    }

    #[test]
    fn test_short_dip_never_fires() {
        let (mut engine, rule_id) = engine_with_rule(10);

        assert!(engine.evaluate(&success_rate(80.0), at(0)).is_empty());
        assert!(engine.evaluate(&success_rate(95.0), at(5)).is_empty());
        assert_eq!(engine.rule_phase(&rule_id), RulePhase::Normal);
        assert!(engine.evaluate(&success_rate(95.0), at(20)).is_empty());
        assert!(engine.history(10).is_empty());
    }

    #[test]
    fn test_dwell_restarts_after_recovery() {
        let (mut engine, _) = engine_with_rule(10);

        engine.evaluate(&success_rate(80.0), at(0));
        engine.evaluate(&success_rate(95.0), at(5));
        engine.evaluate(&success_rate(80.0), at(6));

        assert!(engine.evaluate(&success_rate(80.0), at(15)).is_empty());
        assert_eq!(engine.evaluate(&success_rate(80.0), at(16)).len(), 1);
    }

    #[test]
    fn test_value_equal_to_threshold_does_not_breach() {
        let (mut engine, rule_id) = engine_with_rule(0);

        assert!(engine.evaluate(&success_rate(90.0), at(0)).is_empty());
        assert_eq!(engine.rule_phase(&rule_id), RulePhase::Normal);
    }

    #[test]
    fn test_firing_is_emitted_once_per_episode() {
        let (mut engine, _) = engine_with_rule(0);

        let mut fired = 0;
        for secs in 0..30 {
            fired += engine.evaluate(&success_rate(50.0), at(secs)).len();
        }
        assert_eq!(fired, 1);
        assert_eq!(engine.firing_count(), 1);
    }
}

mod rule_management {
    use super::*;

    #[test]
    fn test_default_rules_cover_the_stock_set() {
        let engine = AlertEngine::with_default_rules(10);
        let names: Vec<&str> = engine.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Low Success Rate", "High Latency", "High Error Rate", "Cost Spike"]
        );
        assert!(engine.rules().iter().all(|r| r.enabled));
    }

    #[test]
    fn test_threshold_change_rearms_firing_rule() {
        let (mut engine, rule_id) = engine_with_rule(0);
        assert_eq!(engine.evaluate(&success_rate(50.0), at(0)).len(), 1);

        engine
            .update_rule(
                &rule_id,
                RuleUpdate {
                    threshold: Some(40.0),
                    ..Default::default()
                },
                at(1),
            )
            .unwrap();
        assert_eq!(engine.rule_phase(&rule_id), RulePhase::Normal);
        assert!(engine.evaluate(&success_rate(50.0), at(2)).is_empty());
    }

    #[test]
    fn test_rule_with_unknown_channel_is_rejected() {
        let mut engine = AlertEngine::new(10);
        let draft = RuleDraft::new(
            "Latency",
            MetricKind::AvgLatency,
            Condition::Above,
            500.0,
            5,
            Severity::Warning,
        )
        .with_channels(vec!["ch-missing".to_string()]);

        let err = engine.create_rule(draft, t0()).unwrap_err();
        assert!(matches!(err, PulseError::ChannelNotFound(_)));
        assert!(engine.rules().is_empty());
    }

    #[test]
    fn test_seed_routes_alerts_to_enabled_channels() {
        let yaml = r#"
channels:
  - id: ops-webhook
    name: Ops webhook
    type: webhook
    config:
      url: http://localhost:9/alerts
  - id: muted
    name: Muted slack
    type: slack
    enabled: false
    config:
      webhookUrl: http://localhost:9/slack
rules:
  - name: Error burst
    metric: errorRate
    condition: above
    threshold: 5
    duration: 0
    severity: critical
    channels: [ops-webhook, muted]
"#;
        let mut engine = AlertEngine::new(10);
        let admitted = engine
            .apply_seed(AlertSeed::from_yaml(yaml).unwrap(), t0())
            .unwrap();
        assert_eq!(admitted, 3);

        let transitions = engine.evaluate(&snapshot_with(MetricKind::ErrorRate, 12.0), at(0));
        assert_eq!(transitions.len(), 1);
        let channel_ids: Vec<&str> = transitions[0]
            .channels
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(channel_ids, vec!["ops-webhook"]);
    }

    #[test]
    fn test_deleting_channel_detaches_it_from_rules() {
        let yaml = r#"
channels:
  - id: hook
    name: Hook
    type: webhook
    config: { url: "http://localhost:9" }
rules:
  - name: Cost
    metric: totalCost
    condition: above
    threshold: 1
    duration: 0
    severity: warning
    channels: [hook]
"#;
        let mut engine = AlertEngine::new(10);
        engine
            .apply_seed(AlertSeed::from_yaml(yaml).unwrap(), t0())
            .unwrap();

        engine.delete_channel("hook").unwrap();
        assert!(engine.rules()[0].channels.is_empty());
        assert!(matches!(
            engine.delete_channel("hook"),
            Err(PulseError::ChannelNotFound(_))
        ));
    }
}

mod monitor_alerts {
    use super::*;

    fn llm(agent: &str, success: bool) -> IngestEvent {
        IngestEvent::LlmCall(LlmCallObserved {
            agent_id: agent.to_string(),
            model: "GPT-4o".to_string(),
            tokens_input: 100,
            tokens_output: 50,
            latency_ms: 200,
            success,
            cost: Some(0.001),
            error: (!success).then(|| "upstream timeout".to_string()),
        })
    }

    fn monitor() -> Monitor {
        let (engine, _) = engine_with_rule(10);
        Monitor::with_parts(&PulseConfig::default(), engine, NotificationDispatcher::new()).unwrap()
    }

    #[tokio::test]
    async fn test_monitor_fires_and_resolves_on_simulated_clock() {
        let monitor = monitor();
        monitor
            .ingest_at(
                IngestEvent::Register(AgentRegistration {
                    agent_id: "planner".to_string(),
                    name: "Planner".to_string(),
                    model: "GPT-4o".to_string(),
                    description: None,
                }),
                at(0),
            )
            .await
            .unwrap();
        monitor
            .ingest_batch(vec![llm("planner", false), llm("planner", true)], at(0))
            .await;

        assert!(monitor.tick_at(at(0)).await.alerts.is_empty());
        assert!(monitor.tick_at(at(5)).await.alerts.is_empty());

        let fired = monitor.tick_at(at(10)).await;
        assert_eq!(fired.alerts.len(), 1);
        assert!(fired.alerts[0].is_firing());
        assert_eq!(fired.snapshot.overall.success_rate, 50.0);

        let recovery: Vec<IngestEvent> = (0..18).map(|_| llm("planner", true)).collect();
        monitor.ingest_batch(recovery, at(11)).await;

        let resolved = monitor.tick_at(at(12)).await;
        assert_eq!(resolved.alerts.len(), 1);
        assert!(!resolved.alerts[0].is_firing());
        assert_eq!(resolved.snapshot.overall.success_rate, 95.0);

        let history = monitor.alert_history(10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, AlertStatus::Resolved);
    }
}
