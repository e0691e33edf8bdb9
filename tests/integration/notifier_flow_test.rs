use agentpulse_core::models::ChannelType;
use agentpulse_core::{
    AlertEvent, AlertRule, Condition, MetricKind, NotificationChannel, NotificationDispatcher,
    Notifier, NotifierConfig, PagerDutyNotifier, PulseError, RuleDraft, Severity, SlackNotifier,
    WebhookNotifier,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> NotifierConfig {
    NotifierConfig {
        timeout_secs: 5,
        retry_count: 1,
        retry_delay_ms: 10,
        ..Default::default()
    }
}

fn rule() -> AlertRule {
    AlertRule::from_draft(
        "rule-1".to_string(),
        RuleDraft::new(
            "Low Success Rate",
            MetricKind::SuccessRate,
            Condition::Below,
            90.0,
            10,
            Severity::Critical,
        ),
        Utc::now(),
    )
}

fn firing() -> AlertEvent {
    AlertEvent::firing(&rule(), 72.5, Utc::now())
}

fn resolved() -> AlertEvent {
    let now = Utc::now();
    AlertEvent::resolved(&rule(), 95.0, now - chrono::Duration::seconds(30), now)
}

fn channel(channel_type: ChannelType, settings: &[(&str, &str)]) -> NotificationChannel {
    NotificationChannel {
        id: format!("ch-{}", channel_type),
        name: format!("{} test", channel_type),
        channel_type,
        config: settings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        enabled: true,
        created_at: Utc::now(),
    }
}

async fn received_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    serde_json::from_slice(&requests[0].body).unwrap()
}

mod slack_delivery {
    use super::*;

    #[tokio::test]
    async fn test_firing_alert_posts_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/alerts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(fast_config()).unwrap();
        let url = format!("{}/hooks/alerts", server.uri());
        let channel = channel(ChannelType::Slack, &[("webhookUrl", &url)]);

        notifier.send(&firing(), &channel).await.unwrap();

        let body = received_body(&server).await;
        let attachment = &body["attachments"][0];
        assert_eq!(attachment["title"], "[FIRING] Low Success Rate");
        assert_eq!(attachment["color"], "#ef4444");
        assert_eq!(attachment["fields"][1]["value"], "72.50");
        assert_eq!(attachment["fields"][2]["value"], "< 90");
    }

    #[tokio::test]
    async fn test_resolved_alert_is_labelled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let notifier = SlackNotifier::new(fast_config()).unwrap();
        let channel = channel(ChannelType::Slack, &[("webhookUrl", &server.uri())]);
        notifier.send(&resolved(), &channel).await.unwrap();

        let body = received_body(&server).await;
        assert_eq!(body["attachments"][0]["title"], "[RESOLVED] Low Success Rate");
    }

    #[tokio::test]
    async fn test_missing_webhook_url_is_config_error() {
        let notifier = SlackNotifier::new(fast_config()).unwrap();
        let channel = channel(ChannelType::Slack, &[]);

        let err = notifier.send(&firing(), &channel).await.unwrap_err();
        assert!(matches!(err, PulseError::ChannelConfigError { .. }));
    }
}

mod pagerduty_delivery {
    use super::*;

    fn config_for(server: &MockServer) -> NotifierConfig {
        NotifierConfig {
            pagerduty_url: format!("{}/v2/enqueue", server.uri()),
            ..fast_config()
        }
    }

    #[tokio::test]
    async fn test_trigger_carries_payload_and_dedup_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .and(body_partial_json(serde_json::json!({
                "routing_key": "rk-123",
                "event_action": "trigger",
                "dedup_key": "agent-monitor-rule-1"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = PagerDutyNotifier::new(config_for(&server)).unwrap();
        let channel = channel(ChannelType::Pagerduty, &[("routingKey", "rk-123")]);
        notifier.send(&firing(), &channel).await.unwrap();

        let body = received_body(&server).await;
        assert_eq!(body["payload"]["severity"], "critical");
        assert_eq!(body["payload"]["source"], "agentpulse");
        assert_eq!(body["payload"]["custom_details"]["rule_id"], "rule-1");
    }

    #[tokio::test]
    async fn test_resolve_omits_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let notifier = PagerDutyNotifier::new(config_for(&server)).unwrap();
        let channel = channel(ChannelType::Pagerduty, &[("routingKey", "rk-123")]);
        notifier.send(&resolved(), &channel).await.unwrap();

        let body = received_body(&server).await;
        assert_eq!(body["event_action"], "resolve");
        assert_eq!(body["dedup_key"], "agent-monitor-rule-1");
        assert!(body.get("payload").is_none());
    }
}

mod webhook_delivery {
    use super::*;

    #[tokio::test]
    async fn test_webhook_sends_auth_header_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(fast_config()).unwrap();
        let url = format!("{}/alerts", server.uri());
        let channel = channel(
            ChannelType::Webhook,
            &[("url", &url), ("authHeader", "Bearer s3cret")],
        );
        notifier.send(&firing(), &channel).await.unwrap();

        let body = received_body(&server).await;
        assert_eq!(body["type"], "alert");
        assert_eq!(body["event"]["ruleId"], "rule-1");
        assert_eq!(body["event"]["status"], "firing");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(fast_config()).unwrap();
        let channel = channel(ChannelType::Webhook, &[("url", &server.uri())]);

        let err = notifier.send(&firing(), &channel).await.unwrap_err();
        assert!(matches!(
            err,
            PulseError::NotificationRejected { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(fast_config()).unwrap();
        let channel = channel(ChannelType::Webhook, &[("url", &server.uri())]);

        let err = notifier.send(&firing(), &channel).await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(err.error_code(), "E4002");
    }
}

mod dispatcher_delivery {
    use super::*;

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&healthy)
            .await;

        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;

        let dispatcher = NotificationDispatcher::with_defaults(fast_config()).unwrap();
        let mut disabled = channel(ChannelType::Webhook, &[("url", &healthy.uri())]);
        disabled.enabled = false;
        let channels = vec![
            channel(ChannelType::Webhook, &[("url", &broken.uri())]),
            channel(ChannelType::Slack, &[("webhookUrl", &healthy.uri())]),
            disabled,
        ];

        let spawned = dispatcher.dispatch(&firing(), &channels);
        assert_eq!(spawned, 2);

        for _ in 0..50 {
            if !healthy.received_requests().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(healthy.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deliver_without_registered_sender() {
        let dispatcher = NotificationDispatcher::new();
        let channel = channel(ChannelType::Slack, &[("webhookUrl", "http://localhost")]);

        let err = dispatcher.deliver(&firing(), &channel).await.unwrap_err();
        assert!(matches!(err, PulseError::NotifierNotRegistered(_)));
    }
}
