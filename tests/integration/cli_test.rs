use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

fn get_agentpulse_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_agentpulse"))
}

fn run_agentpulse(args: &[&str]) -> Output {
    Command::new(get_agentpulse_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute agentpulse command")
}

fn run_agentpulse_with_env(args: &[&str], env_vars: Vec<(&str, &str)>) -> Output {
    let mut cmd = Command::new(get_agentpulse_binary());
    cmd.args(args).env_remove("RUST_LOG");
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute agentpulse command")
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn fixture(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create fixture");
    file.write_all(content.as_bytes())
        .expect("Failed to write fixture");
    file
}

fn path_of(file: &NamedTempFile) -> &str {
    file.path().to_str().expect("fixture path is not UTF-8")
}

const EVENTS: &str = r#"{"type":"register","agentId":"triage","name":"Triage Bot","model":"GPT-4o"}
{"type":"llm_call","agentId":"triage","model":"GPT-4o","tokensInput":1000,"tokensOutput":1000,"latencyMs":400,"success":true}
{"type":"llm_call","agentId":"triage","model":"GPT-4o","tokensInput":500,"tokensOutput":0,"latencyMs":1500,"success":false,"error":"rate limit exceeded"}
{"type":"tool_call","agentId":"triage","toolName":"search","latencyMs":80,"success":true}
"#;

const ERROR_RULES: &str = r#"
rules:
  - name: Any Errors
    metric: errorRate
    condition: above
    threshold: 10
    duration: 0
    severity: critical
"#;

fn parse_json(output: &Output) -> serde_json::Value {
    serde_json::from_str(&output_to_string(output)).unwrap_or_else(|e| {
        panic!(
            "stdout should be JSON ({}): {}",
            e,
            output_to_string(output)
        )
    })
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_agentpulse(&["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("agentpulse"), "output should contain 'agentpulse'");
        assert!(stdout.contains("0.1.0"), "output should contain version number");
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_agentpulse(&["version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version --detailed should succeed");
        assert!(stdout.contains("Version"), "output should contain 'Version'");
        assert!(stdout.contains("Apache-2.0"), "output should contain license type");
        assert!(
            stdout.contains("pagerduty"),
            "output should list notification channels"
        );
    }
}

mod help_command_tests {
    use super::*;

    #[test]
    fn test_help_command() {
        let output = run_agentpulse(&["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "--help should succeed");
        assert!(stdout.contains("AgentPulse"), "help should mention AgentPulse");
        for command in ["run", "watch", "rules", "costs", "config"] {
            assert!(stdout.contains(command), "help should mention {}", command);
        }
    }

    #[test]
    fn test_run_help() {
        let output = run_agentpulse(&["run", "--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "run --help should succeed");
        assert!(stdout.contains("--events-per-tick"), "should list run options");
    }
}

mod run_command_tests {
    use super::*;

    #[test]
    fn test_run_json_summary() {
        let events = fixture(".jsonl", EVENTS);
        let output = run_agentpulse(&["run", "--events", path_of(&events), "--format", "json"]);

        assert!(
            output.status.success(),
            "run should succeed: {}",
            stderr_to_string(&output)
        );
        let json = parse_json(&output);
        assert_eq!(json["ticks"], 1);
        assert_eq!(json["eventsAccepted"], 4);
        assert_eq!(json["eventsRejected"], 0);

        let agent = &json["snapshot"]["agents"][0];
        assert_eq!(agent["name"], "Triage Bot");
        assert_eq!(agent["metrics"]["totalRequests"], 3);
        assert_eq!(agent["metrics"]["failedRequests"], 1);
        assert_eq!(agent["metrics"]["successRate"], 66.7);
    }

    #[test]
    fn test_run_fires_seeded_rule() {
        let events = fixture(".jsonl", EVENTS);
        let rules = fixture(".yaml", ERROR_RULES);
        let output = run_agentpulse(&[
            "run",
            "--events",
            path_of(&events),
            "--rules",
            path_of(&rules),
            "--no-default-rules",
            "--format",
            "json",
        ]);

        assert!(output.status.success(), "run should succeed");
        let json = parse_json(&output);
        let alerts = json["alerts"].as_array().expect("alerts array");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["ruleName"], "Any Errors");
        assert_eq!(alerts[0]["status"], "firing");
    }

    #[test]
    fn test_run_text_reports_firing_alert() {
        let events = fixture(".jsonl", EVENTS);
        let rules = fixture(".yaml", ERROR_RULES);
        let output = run_agentpulse_with_env(
            &[
                "run",
                "--events",
                path_of(&events),
                "--rules",
                path_of(&rules),
                "--no-default-rules",
            ],
            vec![("NO_COLOR", "1")],
        );

        let stdout = output_to_string(&output);
        assert!(output.status.success(), "run should succeed");
        assert!(stdout.contains("FIRING"), "should print the firing alert");
        assert!(stdout.contains("AgentPulse Run Summary"));
        assert!(stdout.contains("Triage Bot"));
    }

    #[test]
    fn test_run_skips_malformed_lines() {
        let events = fixture(".jsonl", &format!("{}not json\n", EVENTS));
        let output = run_agentpulse(&["run", "--events", path_of(&events), "--format", "json"]);

        assert!(output.status.success(), "bad lines should not abort the run");
        let json = parse_json(&output);
        assert_eq!(json["eventsAccepted"], 4);
        assert_eq!(json["eventsRejected"], 1);
        assert!(stderr_to_string(&output).contains("line 5"));
    }

    #[test]
    fn test_run_extra_ticks_and_prometheus() {
        let events = fixture(".jsonl", EVENTS);
        let output = run_agentpulse(&[
            "run",
            "--events",
            path_of(&events),
            "--ticks",
            "3",
            "--prometheus",
        ]);

        let stdout = output_to_string(&output);
        assert!(output.status.success(), "run should succeed");
        assert!(stdout.contains("Ticks:          4"));
        assert!(stdout.contains("monitoring_success_rate"));
    }

    #[test]
    fn test_run_missing_events_file() {
        let output = run_agentpulse(&["run", "--events", "/nonexistent/events.jsonl"]);

        assert!(!output.status.success(), "missing file should fail");
        assert!(stderr_to_string(&output).contains("Failed to open events file"));
    }
}

mod rules_command_tests {
    use super::*;

    #[test]
    fn test_rules_list_defaults_json() {
        let output = run_agentpulse(&["rules", "list", "--format", "json"]);

        assert!(output.status.success(), "rules list should succeed");
        let json = parse_json(&output);
        let rules = json["rules"].as_array().expect("rules array");
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[0]["id"], "rule-1");
        assert_eq!(rules[0]["name"], "Low Success Rate");
    }

    #[test]
    fn test_rules_validate_good_file() {
        let rules = fixture(".yaml", ERROR_RULES);
        let output = run_agentpulse(&["rules", "validate", path_of(&rules)]);

        assert!(output.status.success(), "valid rules should pass");
        assert!(output_to_string(&output).contains("1 rules"));
    }

    #[test]
    fn test_rules_validate_unknown_channel() {
        let rules = fixture(
            ".yaml",
            r#"
rules:
  - name: Routed
    metric: avgLatency
    condition: above
    threshold: 500
    severity: warning
    channels: [nowhere]
"#,
        );
        let output = run_agentpulse(&["rules", "validate", path_of(&rules)]);

        assert!(!output.status.success(), "unknown channel should fail");
        assert!(stderr_to_string(&output).contains("E3"));
    }
}

mod costs_command_tests {
    use super::*;

    #[test]
    fn test_costs_json_breakdown() {
        let events = fixture(".jsonl", EVENTS);
        let output = run_agentpulse(&[
            "costs",
            "--events",
            path_of(&events),
            "--by-model",
            "--by-agent",
            "--forecast",
            "--format",
            "json",
        ]);

        assert!(output.status.success(), "costs should succeed");
        let json = parse_json(&output);
        // 1000 in + 1000 out plus 500 in, all at GPT-4o rates
        assert_eq!(json["summary"]["totalCost"], 0.0225);
        assert_eq!(json["summary"]["totalRequests"], 3);
        assert_eq!(json["byModel"][0]["model"], "GPT-4o");
        assert_eq!(json["byAgent"][0]["agentId"], "triage");
        assert_eq!(json["forecast"]["forecast"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_costs_summary_only_by_default() {
        let events = fixture(".jsonl", EVENTS);
        let output = run_agentpulse(&["costs", "--events", path_of(&events), "--format", "json"]);

        let json = parse_json(&output);
        assert!(json.get("byModel").is_none());
        assert!(json.get("forecast").is_none());
    }
}

mod config_command_tests {
    use super::*;

    #[test]
    fn test_config_show_reads_file() {
        let config = fixture(
            ".toml",
            r#"
[engine]
tick_interval_ms = 250

[anomaly]
z_score_threshold = 3.5
"#,
        );
        let output = run_agentpulse(&[
            "--config",
            path_of(&config),
            "config",
            "show",
            "--format",
            "json",
        ]);

        assert!(
            output.status.success(),
            "config show should succeed: {}",
            stderr_to_string(&output)
        );
        let json = parse_json(&output);
        assert_eq!(json["engine"]["tick_interval_ms"], 250);
        assert_eq!(json["anomaly"]["zScoreThreshold"], 3.5);
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let config = fixture(".toml", "[engine]\ntrend_capacity = 0\n");
        let output = run_agentpulse(&["--config", path_of(&config), "version"]);

        assert!(!output.status.success(), "invalid config should fail");
        assert!(stderr_to_string(&output).contains("trend_capacity"));
    }

    #[test]
    fn test_missing_config_file() {
        let output = run_agentpulse(&["--config", "/nonexistent/agentpulse.toml", "version"]);

        assert!(!output.status.success(), "missing config should fail");
        let stderr = stderr_to_string(&output);
        assert!(stderr.contains("E1003"), "unexpected stderr: {}", stderr);
        assert!(stderr.contains("/nonexistent/agentpulse.toml"));
    }
}

mod invalid_command_tests {
    use super::*;

    #[test]
    fn test_invalid_command() {
        let output = run_agentpulse(&["nonexistent-command"]);

        assert!(!output.status.success(), "invalid command should fail");
    }

    #[test]
    fn test_invalid_rules_subcommand() {
        let output = run_agentpulse(&["rules", "explode"]);

        assert!(!output.status.success(), "invalid subcommand should fail");
    }
}
