use agentpulse_core::ingest::read_events;
use agentpulse_core::models::{
    ActivityKind, ActivityObserved, AgentRegistration, AgentStatusChanged, AnomalyConfigUpdate,
    LlmCallObserved, ToolCallObserved,
};
use agentpulse_core::{
    AgentStatus, AlertEngine, AnomalySeverity, IngestEvent, MetricKind, Monitor, MonitorEvent,
    NotificationDispatcher, PulseConfig, PulseError,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::io::Cursor;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

fn monitor_with(config: &PulseConfig) -> Monitor {
    Monitor::with_parts(config, AlertEngine::default(), NotificationDispatcher::new()).unwrap()
}

fn monitor() -> Monitor {
    monitor_with(&PulseConfig::default())
}

fn register(agent: &str) -> IngestEvent {
    IngestEvent::Register(AgentRegistration {
        agent_id: agent.to_string(),
        name: format!("{} agent", agent),
        model: "Claude Sonnet".to_string(),
        description: None,
    })
}

fn llm(agent: &str, latency_ms: u64, success: bool, cost: Option<f64>) -> IngestEvent {
    IngestEvent::LlmCall(LlmCallObserved {
        agent_id: agent.to_string(),
        model: "Claude Sonnet".to_string(),
        tokens_input: 400,
        tokens_output: 100,
        latency_ms,
        success,
        cost,
        error: (!success).then(|| "rate limit exceeded".to_string()),
    })
}

mod aggregation {
    use super::*;

    #[tokio::test]
    async fn test_percentiles_are_ordered_and_stable() {
        let monitor = monitor();
        let events: Vec<IngestEvent> = (0..200u64)
            .map(|i| llm("a1", (i * 37) % 200 + 1, true, Some(0.0)))
            .collect();
        let report = monitor.ingest_batch(events, t0()).await;
        assert_eq!(report.accepted, 200);

        let first = monitor.percentiles("a1").await.unwrap();
        assert_eq!(first.p50, 100);
        assert_eq!(first.p95, 190);
        assert_eq!(first.p99, 198);
        assert!(first.p50 <= first.p95 && first.p95 <= first.p99);

        let second = monitor.percentiles("a1").await.unwrap();
        assert_eq!(first, second);
        assert!(monitor.percentiles("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_never_exceeds_total() {
        let monitor = monitor();
        let mut events = vec![register("a1")];
        for i in 0..30 {
            events.push(llm("a1", 50, i % 3 != 0, Some(0.01)));
            events.push(IngestEvent::ToolCall(ToolCallObserved {
                agent_id: "a1".to_string(),
                tool_name: "search".to_string(),
                latency_ms: if i % 2 == 0 { 0 } else { 25 },
                success: i % 4 != 0,
                error: None,
            }));
        }
        monitor.ingest_batch(events, t0()).await;

        let snapshot = monitor.tick_at(t0()).await.snapshot;
        let agent = snapshot.agent("a1").unwrap();
        assert_eq!(agent.metrics.total_requests, 60);
        assert!(agent.metrics.failed_requests <= agent.metrics.total_requests);
        assert_eq!(agent.metrics.failed_requests, 10 + 8);
        assert_eq!(agent.status, AgentStatus::Running);
    }

    #[tokio::test]
    async fn test_cost_accumulates_without_drift() {
        let monitor = monitor();
        let events: Vec<IngestEvent> = (0..10_000)
            .map(|_| llm("a1", 10, true, Some(0.0001)))
            .collect();
        monitor.ingest_batch(events, t0()).await;

        let snapshot = monitor.tick_at(t0()).await.snapshot;
        assert_eq!(snapshot.agent("a1").unwrap().metrics.total_cost, 1.0);
        assert_eq!(snapshot.overall.total_cost, 1.0);
    }

    #[tokio::test]
    async fn test_status_for_unknown_agent_is_rejected() {
        let monitor = monitor();
        let err = monitor
            .ingest_at(
                IngestEvent::Status(AgentStatusChanged {
                    agent_id: "ghost".to_string(),
                    status: AgentStatus::Running,
                    current_task: None,
                }),
                t0(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::AgentNotFound(_)));
        assert!(monitor.snapshot().await.agents.is_empty());
    }

    #[tokio::test]
    async fn test_activities_drive_task_queue() {
        let monitor = monitor();
        monitor.ingest_at(register("a1"), t0()).await.unwrap();
        for kind in [ActivityKind::TaskStart, ActivityKind::TaskComplete] {
            monitor
                .ingest_at(
                    IngestEvent::Activity(ActivityObserved {
                        agent_id: "a1".to_string(),
                        kind,
                        description: format!("{}", kind),
                        metadata: None,
                    }),
                    t0(),
                )
                .await
                .unwrap();
        }

        let snapshot = monitor.tick_at(t0()).await.snapshot;
        assert_eq!(snapshot.task_queue.queued, 0);
        assert_eq!(snapshot.task_queue.running, 0);
        assert_eq!(snapshot.task_queue.completed, 1);
        assert_eq!(snapshot.recent_activities.len(), 2);
        assert_eq!(snapshot.recent_activities[0].kind, ActivityKind::TaskComplete);
        assert_eq!(snapshot.recent_activities[0].agent_name, "a1 agent");
    }
}

mod snapshots {
    use super::*;

    #[tokio::test]
    async fn test_trend_series_stay_bounded() {
        let monitor = monitor();
        let mut last = None;
        for secs in 0..150 {
            monitor
                .ingest_at(llm("a1", 100, true, Some(0.001)), at(secs))
                .await
                .unwrap();
            last = Some(monitor.tick_at(at(secs)).await.snapshot);
        }

        let snapshot = last.unwrap();
        assert_eq!(snapshot.tick, 150);
        assert_eq!(snapshot.latency_trend.len(), 60);
        assert_eq!(snapshot.token_trend.len(), 60);
        assert_eq!(snapshot.cost_trend.len(), 60);
        assert_eq!(snapshot.cost_trend.last().unwrap().cost, 0.001);
        assert_eq!(snapshot.latency_trend.last().unwrap().time, "09:32:29");
        assert_eq!(snapshot.overall.throughput, 1.0);
    }

    #[tokio::test]
    async fn test_silent_agents_are_stopped() {
        let monitor = monitor();
        monitor
            .ingest_at(llm("a1", 100, true, None), t0())
            .await
            .unwrap();

        let live = monitor.tick_at(at(300)).await.snapshot;
        assert_eq!(live.overall.active_agents, 1);

        let stale = monitor.tick_at(at(301)).await.snapshot;
        assert_eq!(stale.agent("a1").unwrap().status, AgentStatus::Stopped);
        assert_eq!(stale.overall.active_agents, 0);
    }

    #[tokio::test]
    async fn test_estimated_cost_uses_pricing_table() {
        let monitor = monitor();
        monitor
            .ingest_at(llm("a1", 100, true, None), t0())
            .await
            .unwrap();

        let snapshot = monitor.tick_at(t0()).await.snapshot;
        // 400 input at $0.003/1K plus 100 output at $0.015/1K
        assert_eq!(snapshot.overall.total_cost, 0.0027);
    }

    #[tokio::test]
    async fn test_cost_views_split_spend() {
        let monitor = monitor();
        let mut events: Vec<IngestEvent> = (0..3).map(|_| llm("a1", 100, true, Some(0.01))).collect();
        events.push(llm("a2", 100, true, Some(0.01)));
        monitor.ingest_batch(events, t0()).await;
        monitor.tick_at(t0()).await;

        let summary = monitor.cost_summary().await;
        assert!((summary.total_cost - 0.04).abs() < 1e-9);
        assert_eq!(summary.total_requests, 4);

        let by_agent = monitor.cost_by_agent().await;
        assert_eq!(by_agent.len(), 2);
        assert_eq!(by_agent[0].agent_id, "a1");
        assert!((by_agent[0].percentage - 75.0).abs() < 1e-6);

        let by_model = monitor.cost_by_model().await;
        assert_eq!(by_model.len(), 1);
        assert_eq!(by_model[0].model, "Claude Sonnet");
        assert_eq!(by_model[0].requests, 4);

        let forecast = monitor.cost_forecast().await;
        assert_eq!(forecast.forecast.len(), 7);
        assert!(forecast.forecast[0].optimistic <= forecast.forecast[0].pessimistic);
    }

    #[tokio::test]
    async fn test_subscribers_see_snapshot_per_tick() {
        let monitor = monitor();
        let mut rx = monitor.subscribe();

        monitor.tick_at(t0()).await;
        monitor.tick_at(at(1)).await;

        for expected in 1..=2 {
            match rx.recv().await.unwrap() {
                MonitorEvent::MetricsSnapshotReady(snapshot) => assert_eq!(snapshot.tick, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }
}

mod anomalies {
    use super::*;

    fn latency_config() -> PulseConfig {
        let mut config = PulseConfig::default();
        config.engine.latency_window = 1;
        config.anomaly.window_size = 20;
        config.anomaly.metrics = vec![MetricKind::AvgLatency];
        config
    }

    #[tokio::test]
    async fn test_latency_spike_is_reported() {
        let monitor = monitor_with(&latency_config());
        for secs in 0..20 {
            monitor
                .ingest_at(llm("a1", 100, true, Some(0.0)), at(secs))
                .await
                .unwrap();
            assert!(monitor.tick_at(at(secs)).await.anomalies.is_empty());
        }

        monitor
            .ingest_at(llm("a1", 5000, true, Some(0.0)), at(20))
            .await
            .unwrap();
        let report = monitor.tick_at(at(20)).await;

        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.metric, MetricKind::AvgLatency);
        assert_eq!(anomaly.value, 5000.0);
        assert_eq!(anomaly.severity, AnomalySeverity::High);
        assert!((anomaly.z_score - 19f64.sqrt()).abs() < 1e-9);
        assert_eq!(monitor.anomaly_history(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_report_before_minimum_samples() {
        let monitor = monitor_with(&latency_config());
        for secs in 0..10 {
            monitor
                .ingest_at(llm("a1", 100, true, Some(0.0)), at(secs))
                .await
                .unwrap();
            monitor.tick_at(at(secs)).await;
        }

        monitor
            .ingest_at(llm("a1", 9000, true, Some(0.0)), at(10))
            .await
            .unwrap();
        assert!(monitor.tick_at(at(10)).await.anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_disabling_detection_suppresses_reports() {
        let monitor = monitor_with(&latency_config());
        let config = monitor
            .update_anomaly_config(AnomalyConfigUpdate {
                enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!config.enabled);

        for secs in 0..20 {
            monitor
                .ingest_at(llm("a1", 100, true, Some(0.0)), at(secs))
                .await
                .unwrap();
            monitor.tick_at(at(secs)).await;
        }
        monitor
            .ingest_at(llm("a1", 5000, true, Some(0.0)), at(20))
            .await
            .unwrap();
        assert!(monitor.tick_at(at(20)).await.anomalies.is_empty());
    }

    #[tokio::test]
    async fn test_window_below_minimum_is_rejected() {
        let monitor = monitor();
        let err = monitor
            .update_anomaly_config(AnomalyConfigUpdate {
                window_size: Some(10),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::InvalidAnomalyConfig(_)));
        assert_eq!(monitor.anomaly_config().await.window_size, 60);
    }
}

mod event_streams {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_stream_feeds_monitor() {
        let input = r#"
# recorded session
{"type":"register","agentId":"coder","name":"Coder","model":"GPT-4o"}
{"type":"llm_call","agentId":"coder","model":"GPT-4o","tokensInput":1000,"tokensOutput":500,"latencyMs":900,"success":true}
{"type":"llm_call","agentId":"coder","model":"GPT-4o","latencyMs":1200,"success":false,"error":"context length exceeded"}
{"type":"llm_call","agentId":"","model":"GPT-4o","latencyMs":10,"success":true}
not json
"#;
        let report = read_events(Cursor::new(input)).unwrap();
        assert_eq!(report.events.len(), 3);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.rejected[0].0, 6);

        let monitor = monitor();
        let batch = monitor.ingest_batch(report.events, t0()).await;
        assert_eq!(batch.accepted, 3);

        let snapshot = monitor.tick_at(t0()).await.snapshot;
        let coder = snapshot.agent("coder").unwrap();
        assert_eq!(coder.name, "Coder");
        assert_eq!(coder.metrics.total_requests, 2);
        assert_eq!(coder.metrics.success_rate, 50.0);
        assert_eq!(coder.metrics.total_tokens_input, 1000);
    }

    #[tokio::test]
    async fn test_traces_are_kept_newest_first() {
        let input = r#"
{"type":"register","agentId":"planner","name":"Planner","model":"Claude Sonnet"}
{"type":"trace","agentId":"planner","traceId":"run-1","status":"completed","steps":[{"id":"s1","type":"llm_call","name":"plan","startTime":"2026-03-01T09:29:00Z","endTime":"2026-03-01T09:29:02Z","duration":2000,"status":"completed","tokensInput":300,"tokensOutput":120,"cost":0.004},{"id":"s2","type":"tool_call","name":"search","startTime":"2026-03-01T09:29:02Z","endTime":"2026-03-01T09:29:03Z","duration":1000,"status":"completed"}]}
{"type":"trace","agentId":"planner","traceId":"run-2","status":"running","steps":[]}
{"type":"trace","agentId":"planner","traceId":"","status":"running"}
{"type":"trace","agentId":"stranger","traceId":"run-3","status":"failed"}
"#;
        let report = read_events(Cursor::new(input)).unwrap();
        assert_eq!(report.events.len(), 4);
        assert_eq!(report.rejected.len(), 1);

        let monitor = monitor();
        let batch = monitor.ingest_batch(report.events, t0()).await;
        assert_eq!(batch.accepted, 3);
        assert!(matches!(batch.rejected[0].1, PulseError::AgentNotFound(_)));

        let traces = monitor.recent_traces("planner", 10).await.unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].id, "run-2");
        assert_eq!(traces[0].start_time, t0());
        assert_eq!(traces[0].end_time, None);

        let done = &traces[1];
        assert_eq!(done.agent_name, "Planner");
        assert_eq!(done.total_duration, Some(3000));
        assert_eq!(done.total_tokens, 420);
        assert_eq!(done.end_time, Some(at(-57)));
        assert!(monitor.recent_traces("stranger", 10).await.is_none());
    }
}
