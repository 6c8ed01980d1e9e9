use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use clap::Parser;
use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::sync::Notify;
use tower::ServiceExt;

use crate::agents::*;
use crate::cli::*;
use crate::config::*;
use crate::driver::*;
use crate::error::*;
use crate::message::*;
use crate::presets::*;
use crate::relay::*;
use crate::server::*;
use crate::session::*;
use crate::telemetry::*;

fn test_connection() -> LlmConnection {
    LlmConnection {
        model: "gpt-4o".to_string(),
        api_key: "sk-test-123".to_string(),
        endpoint: "https://example.openai.azure.com/".to_string(),
        api_version: "2024-02-15-preview".to_string(),
        api_type: "azure".to_string(),
    }
}

fn test_agent_set(preset: &str) -> AgentSet {
    build_agent_set(preset, Arc::new(test_connection())).expect("preset should exist")
}

fn transcript(lines: &[&str]) -> Arc<dyn ConversationDriver> {
    Arc::new(TranscriptDriver::from_lines(
        lines.iter().map(|line| line.to_string()).collect(),
        Duration::ZERO,
    ))
}

fn contents(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|message| format!("{}: {}", message.sender, message.content))
        .collect()
}

async fn wait_until_finished(session: &Arc<Session>) -> Vec<RelayEvent> {
    tokio::time::timeout(
        Duration::from_secs(5),
        Relay::new(Arc::clone(session))
            .into_stream(RelayMode::Notify, Duration::from_millis(5))
            .collect::<Vec<_>>(),
    )
    .await
    .expect("session should finish in time")
}

struct FailingDriver;

#[async_trait]
impl ConversationDriver for FailingDriver {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn run(&self, _plan: &ConversationPlan, log: &SessionWriter) -> Result<()> {
        log.append(Message::new("SolutionArchitect", "drafting components"));
        Err(anyhow::anyhow!("model endpoint unreachable"))
    }
}

/// Holds the session open until released.
struct GatedDriver {
    release: Arc<Notify>,
}

#[async_trait]
impl ConversationDriver for GatedDriver {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn run(&self, _plan: &ConversationPlan, log: &SessionWriter) -> Result<()> {
        log.append(Message::new("SolutionArchitect", "thinking"));
        self.release.notified().await;
        log.append(Message::new("Client", "TERMINATE"));
        Ok(())
    }
}

fn test_state(driver: Arc<dyn ConversationDriver>) -> Arc<ServerState> {
    Arc::new(ServerState {
        app_name: "agentlab-test".to_string(),
        default_preset: DEFAULT_PRESET.to_string(),
        connection: Arc::new(test_connection()),
        driver,
        sessions: Arc::new(SessionManager::new()),
        telemetry: TelemetrySink::disabled(),
        relay_mode: RelayMode::Notify,
        poll_interval: Duration::from_millis(5),
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("body should finish in time")
    .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

#[test]
fn runtime_config_defaults_without_profile_file() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("missing.toml");
    let cli = Cli::try_parse_from([
        "agentlab",
        "--config-path",
        config_path.to_str().expect("utf-8 path"),
        "doctor",
    ])
    .expect("cli should parse");
    let profiles = load_profiles(&cli.config_path).expect("missing file is empty");
    let cfg = resolve_runtime_config(&cli, &profiles).expect("default profile resolves");

    assert_eq!(cfg.profile, "default");
    assert_eq!(cfg.preset, DEFAULT_PRESET);
    assert_eq!(cfg.relay_mode, RelayMode::Notify);
    assert_eq!(cfg.poll_interval_ms, 500);
}

#[test]
fn runtime_config_merges_profile_and_cli_overrides() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[profiles.demo]
preset = "tutorial-lab"
transcript_path = "demos/architecture.jsonl"
transcript_delay_ms = 0
relay_mode = "poll"
poll_interval_ms = 1
telemetry_enabled = true
"#,
    )
    .expect("write config");

    let cli = Cli::try_parse_from([
        "agentlab",
        "--config-path",
        config_path.to_str().expect("utf-8 path"),
        "--profile",
        "demo",
        "--preset",
        "data-analyst",
        "serve",
    ])
    .expect("cli should parse");
    let profiles = load_profiles(&cli.config_path).expect("profiles should load");
    let cfg = resolve_runtime_config(&cli, &profiles).expect("demo profile resolves");

    assert_eq!(cfg.preset, "data-analyst");
    assert_eq!(cfg.driver, DriverKind::Transcript);
    assert_eq!(cfg.transcript_path.as_deref(), Some("demos/architecture.jsonl"));
    assert_eq!(cfg.transcript_delay_ms, 0);
    assert_eq!(cfg.relay_mode, RelayMode::Poll);
    assert_eq!(cfg.poll_interval_ms, 10);
    assert!(cfg.telemetry_enabled);
}

#[test]
fn unknown_profile_lists_available_names() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "[profiles.alpha]\n[profiles.beta]\n").expect("write config");

    let cli = Cli::try_parse_from([
        "agentlab",
        "--config-path",
        config_path.to_str().expect("utf-8 path"),
        "--profile",
        "gamma",
        "doctor",
    ])
    .expect("cli should parse");
    let profiles = load_profiles(&cli.config_path).expect("profiles should load");
    let err = resolve_runtime_config(&cli, &profiles).expect_err("gamma is undefined");

    assert!(err.to_string().contains("alpha, beta"));
    assert_eq!(categorize_error(&err), ErrorCategory::Input);
}

#[test]
fn profile_file_rejects_unknown_fields() {
    let dir = tempdir().expect("tempdir");
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "[profiles.demo]\nprovider = \"gemini\"\n").expect("write config");

    let err = load_profiles(config_path.to_str().expect("utf-8 path"))
        .expect_err("unknown field should fail");
    assert!(format!("{err:#}").contains("invalid profile configuration"));
}

#[test]
fn every_preset_builds_a_proxy_first_agent_set() {
    for name in preset_names() {
        let set = test_agent_set(name);
        assert_eq!(set.proxy().role, AgentRole::UserProxy);
        assert!(!set.assistants().is_empty(), "{name} has assistants");
        assert!(
            set.assistants()
                .iter()
                .all(|agent| agent.role == AgentRole::Assistant && agent.sampling.is_some())
        );
        assert!(set.max_round > 0);
        assert_eq!(set.speaker_selection, "auto");
        assert!(!set.default_task.is_empty());
    }
}

#[test]
fn architecture_preset_matches_its_roles() {
    let set = test_agent_set("architecture-design");
    let names: Vec<&str> = set.agents.iter().map(|agent| agent.name.as_str()).collect();
    assert_eq!(
        names,
        ["Client", "SolutionArchitect", "TechnicalArchitect", "ImplementationPlanner"]
    );
    assert_eq!(set.max_round, 15);

    let client = set.proxy();
    assert_eq!(client.human_input_mode, HumanInputMode::Terminate);
    assert_eq!(client.max_consecutive_auto_reply, Some(10));
    assert!(client.is_termination_message("Looks complete. TERMINATE"));
    assert!(client.is_termination_message("TERMINATE  \n"));
    assert!(!client.is_termination_message("TERMINATE the old design first"));
    assert_eq!(
        client.code_execution.as_ref().map(|exec| exec.use_docker),
        Some(false)
    );

    let temperatures: Vec<f32> = set
        .assistants()
        .iter()
        .filter_map(|agent| agent.sampling.map(|s| s.temperature))
        .collect();
    assert_eq!(temperatures, [0.3, 0.2, 0.1]);
}

#[test]
fn proxy_settings_follow_each_preset() {
    let tutorial = test_agent_set("tutorial-lab");
    let user = tutorial.proxy();
    assert_eq!(user.human_input_mode, HumanInputMode::Terminate);
    assert_eq!(user.termination_suffix, None);
    assert!(!user.is_termination_message("All chapters saved. TERMINATE"));
    assert_eq!(
        user.code_execution.as_ref().map(|exec| exec.work_dir.as_str()),
        Some("notebook")
    );

    for name in ["product-brainstorm", "risk-intelligence", "contract-analysis"] {
        let set = test_agent_set(name);
        let proxy = set.proxy();
        assert_eq!(proxy.human_input_mode, HumanInputMode::Always, "{name}");
        assert!(proxy.system_message.is_empty(), "{name}");
        assert_eq!(proxy.max_consecutive_auto_reply, None, "{name}");
        assert_eq!(proxy.termination_suffix, None, "{name}");
        assert!(proxy.code_execution.is_none(), "{name}");
    }
}

#[test]
fn unknown_preset_is_an_input_error() {
    let err = build_agent_set("does-not-exist", Arc::new(test_connection()))
        .expect_err("unknown preset");
    assert!(err.to_string().contains("architecture-design"));
    let err = anyhow::Error::new(err);
    assert_eq!(categorize_error(&err), ErrorCategory::Input);
}

#[test]
fn conversation_plan_never_carries_the_credential() {
    let set = test_agent_set("architecture-design");
    let plan = ConversationPlan::new(uuid::Uuid::new_v4(), &set, "Design it");
    let json = serde_json::to_string(&plan).expect("serialize plan");
    assert!(!json.contains("sk-test-123"));
    assert!(json.contains("\"base_url\""));
    assert!(json.contains("\"human_input_mode\":\"TERMINATE\""));
}

#[tokio::test]
async fn launch_seeds_log_and_replays_transcript() {
    let manager = SessionManager::new();
    let set = test_agent_set("architecture-design");
    let driver = transcript(&[
        r#"{"name":"Client","content":"Design a platform"}"#,
        "",
        "this is not json",
        r#"{"name":"SolutionArchitect","content":"Components: ingest, store, analyze"}"#,
        r#"{"content":"missing sender"}"#,
        r#"{"name":"Client","content":"TERMINATE"}"#,
    ]);

    let session = launch_conversation(
        &manager,
        driver,
        &set,
        "  Design a platform  ",
        &TelemetrySink::disabled(),
    )
    .expect("session should start");
    assert_eq!(session.task, "Design a platform");

    let events = wait_until_finished(&session).await;
    assert_eq!(events.last(), Some(&RelayEvent::Complete));

    let (messages, active) = session.snapshot();
    assert!(!active);
    assert!(session.failure().is_none());
    assert_eq!(
        contents(&messages),
        [
            "System: Conversation started",
            "Client: Design a platform",
            "Client: Design a platform",
            "SolutionArchitect: Components: ingest, store, analyze",
            "Client: TERMINATE",
        ]
    );
}

#[tokio::test]
async fn driver_failure_becomes_visible_error_line() {
    let manager = SessionManager::new();
    let set = test_agent_set("data-analyst");

    let session = launch_conversation(
        &manager,
        Arc::new(FailingDriver),
        &set,
        "Plot a chart",
        &TelemetrySink::disabled(),
    )
    .expect("session should start");
    wait_until_finished(&session).await;

    let (messages, active) = session.snapshot();
    assert!(!active);
    let last = messages.last().expect("error line");
    assert!(last.is_error());
    assert_eq!(last.sender, SYSTEM_SENDER);
    assert!(last.content.contains("model endpoint unreachable"));
    assert_eq!(
        session.failure().as_deref(),
        Some("model endpoint unreachable")
    );

    // A finished session does not block the next start.
    let next = launch_conversation(
        &manager,
        transcript(&[]),
        &set,
        "Try again",
        &TelemetrySink::disabled(),
    )
    .expect("second session should start");
    assert_ne!(next.id, session.id);
    wait_until_finished(&next).await;
}

#[tokio::test]
async fn second_start_is_rejected_while_active() {
    let manager = SessionManager::new();
    let set = test_agent_set("architecture-design");
    let release = Arc::new(Notify::new());
    let driver: Arc<dyn ConversationDriver> = Arc::new(GatedDriver {
        release: Arc::clone(&release),
    });

    let first = launch_conversation(
        &manager,
        Arc::clone(&driver),
        &set,
        "first",
        &TelemetrySink::disabled(),
    )
    .expect("first session should start");
    let err = launch_conversation(&manager, driver, &set, "second", &TelemetrySink::disabled())
        .expect_err("second start must be rejected");
    assert!(matches!(err, SessionError::AlreadyActive(id) if id == first.id));

    release.notify_one();
    wait_until_finished(&first).await;
    assert_eq!(
        contents(&first.snapshot().0).last().map(String::as_str),
        Some("Client: TERMINATE")
    );
}

#[tokio::test]
async fn run_relayed_hands_every_message_over_in_order() {
    let set = test_agent_set("product-brainstorm");
    let mut seen = Vec::new();
    let session = run_relayed(
        transcript(&[
            r#"{"name":"CreativeAgent","content":"Idea one"}"#,
            r#"{"name":"BusinessAnalyst","content":"Pursue idea one"}"#,
        ]),
        &set,
        "Ideas for clinics",
        RelayMode::Poll,
        Duration::from_millis(5),
        &TelemetrySink::disabled(),
        |message| seen.push(format!("{}: {}", message.sender, message.content)),
    )
    .await
    .expect("run should succeed");

    assert_eq!(seen.len(), session.len());
    assert_eq!(
        seen,
        [
            "System: Conversation started",
            "Founder: Ideas for clinics",
            "CreativeAgent: Idea one",
            "BusinessAnalyst: Pursue idea one",
        ]
    );
}

#[tokio::test]
async fn run_relayed_reports_driver_failure() {
    let set = test_agent_set("risk-intelligence");
    let mut seen = Vec::new();
    let err = run_relayed(
        Arc::new(FailingDriver),
        &set,
        "Assess it",
        RelayMode::Notify,
        Duration::from_millis(5),
        &TelemetrySink::disabled(),
        |message| seen.push(message.clone()),
    )
    .await
    .expect_err("failure should surface");

    assert!(format!("{err:#}").contains("model endpoint unreachable"));
    assert!(seen.last().is_some_and(Message::is_error));
}

#[test]
fn command_driver_parses_shell_style_command_lines() {
    let driver = CommandDriver::from_command_line("python3 bridge.py --preset 'architecture design'")
        .expect("command should parse");
    assert_eq!(driver.program(), "python3");

    assert!(CommandDriver::from_command_line("   ").is_err());
    assert!(CommandDriver::from_command_line("python3 'unterminated").is_err());
}

#[test]
fn build_driver_requires_its_source() {
    let dir = tempdir().expect("tempdir");
    let cli = Cli::try_parse_from([
        "agentlab",
        "--config-path",
        dir.path().join("none.toml").to_str().expect("utf-8 path"),
        "--driver",
        "command",
        "doctor",
    ])
    .expect("cli should parse");
    let mut cfg =
        resolve_runtime_config(&cli, &ProfilesFile::default()).expect("config should resolve");
    cfg.driver_command = None;

    let err = build_driver(&cfg, &test_connection())
        .err()
        .expect("missing command should fail");
    assert_eq!(categorize_error(&err), ErrorCategory::Driver);

    let transcript_path = dir.path().join("run.jsonl");
    std::fs::write(&transcript_path, "{\"name\":\"A\",\"content\":\"b\"}\n").expect("write");
    cfg.driver = DriverKind::Transcript;
    cfg.transcript_path = Some(transcript_path.to_string_lossy().to_string());
    let driver = build_driver(&cfg, &test_connection()).expect("transcript driver builds");
    assert_eq!(driver.name(), "transcript");
}

#[cfg(unix)]
#[tokio::test]
async fn command_driver_streams_stdout_lines_into_the_log() {
    let script = r#"read -r plan
case "$plan" in *sk-test-123*) exit 3 ;; esac
case "$plan" in *SolutionArchitect*) ;; *) exit 4 ;; esac
printf '%s\n' '{"name":"SolutionArchitect","content":"step one"}' 'not json' '' '{"sender":"Client","content":"TERMINATE"}'
printf '{"name":"Env","content":"%s"}\n' "$AZURE_OPENAI_MODEL"
echo "diagnostics only" >&2
"#;
    let driver = CommandDriver::new("sh", vec!["-c".to_string(), script.to_string()])
        .with_connection(test_connection());

    let manager = SessionManager::new();
    let set = test_agent_set("architecture-design");
    let session = launch_conversation(
        &manager,
        Arc::new(driver),
        &set,
        "Design it",
        &TelemetrySink::disabled(),
    )
    .expect("session should start");
    wait_until_finished(&session).await;

    assert!(session.failure().is_none(), "{:?}", session.failure());
    assert_eq!(
        contents(&session.snapshot().0)[2..],
        [
            "SolutionArchitect: step one",
            "Client: TERMINATE",
            "Env: gpt-4o",
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn command_driver_skips_non_utf8_lines_and_keeps_reading() {
    let driver = CommandDriver::new(
        "sh",
        vec![
            "-c".to_string(),
            r#"printf '%s\n' '{"name":"ClauseExtractor","content":"one"}'
printf '\377\376 garbage\n'
printf '%s\n' '{"name":"RiskAssessor","content":"two"}'"#
                .to_string(),
        ],
    );

    let manager = SessionManager::new();
    let set = test_agent_set("contract-analysis");
    let session = launch_conversation(
        &manager,
        Arc::new(driver),
        &set,
        "Review the contract",
        &TelemetrySink::disabled(),
    )
    .expect("session should start");
    wait_until_finished(&session).await;

    assert!(session.failure().is_none(), "{:?}", session.failure());
    assert_eq!(
        contents(&session.snapshot().0),
        [
            "System: Conversation started",
            "LegalCounsel: Review the contract",
            "ClauseExtractor: one",
            "RiskAssessor: two",
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn command_driver_nonzero_exit_fails_the_session() {
    let driver = CommandDriver::new(
        "sh",
        vec![
            "-c".to_string(),
            r#"printf '%s\n' '{"name":"Client","content":"partial"}'; exit 2"#.to_string(),
        ],
    );

    let manager = SessionManager::new();
    let set = test_agent_set("contract-analysis");
    let session = launch_conversation(
        &manager,
        Arc::new(driver),
        &set,
        "Review the contract",
        &TelemetrySink::disabled(),
    )
    .expect("session should start");
    wait_until_finished(&session).await;

    let (messages, active) = session.snapshot();
    assert!(!active);
    assert!(contents(&messages).contains(&"Client: partial".to_string()));
    let last = messages.last().expect("error line");
    assert!(last.is_error());
    assert!(last.content.contains("exited with"));
}

#[tokio::test]
async fn health_and_index_routes_respond() {
    let app = build_server_router(test_state(transcript(&[])));

    let response = app.clone().oneshot(get("/healthz")).await.expect("healthz");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["preset"], DEFAULT_PRESET);
    assert!(body["active_session"].is_null());

    let response = app.oneshot(get("/")).await.expect("index");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("/stream_messages"));
}

#[tokio::test]
async fn get_messages_before_any_session_is_empty_and_inactive() {
    let app = build_server_router(test_state(transcript(&[])));
    let response = app.oneshot(get("/get_messages")).await.expect("get_messages");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "messages": [], "is_active": false })
    );
}

#[tokio::test]
async fn stream_without_session_is_not_found() {
    let app = build_server_router(test_state(transcript(&[])));
    let response = app
        .oneshot(get("/stream_messages"))
        .await
        .expect("stream_messages");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_rejects_missing_task_and_unknown_preset() {
    let app = build_server_router(test_state(transcript(&[])));

    let response = app
        .clone()
        .oneshot(post_json("/start_conversation", json!({})))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "task is required");

    let response = app
        .clone()
        .oneshot(post_json("/start_conversation", json!({ "task": "   " })))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/start_conversation",
            json!({ "task": "Design it", "preset": "nope" }),
        ))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_json(response).await["error"]
            .as_str()
            .is_some_and(|error| error.contains("unknown preset 'nope'"))
    );
}

#[tokio::test]
async fn malformed_start_bodies_get_json_bad_request() {
    let app = build_server_router(test_state(transcript(&[])));

    let response = app
        .clone()
        .oneshot(post_json("/start_conversation", json!({ "task": 42 })))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_json(response).await["error"]
            .as_str()
            .is_some_and(|error| error.starts_with("invalid request body"))
    );

    let request = Request::builder()
        .method("POST")
        .uri("/start_conversation")
        .body(Body::from(r#"{"task":"Design it"}"#))
        .expect("request should build");
    let response = app.clone().oneshot(request).await.expect("start");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    // Nothing was started by the rejected bodies.
    let response = app.oneshot(get("/get_messages")).await.expect("get_messages");
    assert_eq!(
        body_json(response).await,
        json!({ "messages": [], "is_active": false })
    );
}

#[tokio::test]
async fn start_then_stream_relays_whole_log_and_completes() {
    let state = test_state(transcript(&[
        r#"{"name":"SolutionArchitect","content":"Use event ingestion"}"#,
        r#"{"name":"TechnicalArchitect","content":"Encrypt at rest"}"#,
        r#"{"name":"Client","content":"TERMINATE"}"#,
    ]));
    let app = build_server_router(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(post_json(
            "/start_conversation",
            json!({ "task": "Design a HIPAA platform" }),
        ))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started = body_json(response).await;
    assert_eq!(started["status"], "started");
    assert_eq!(started["message"], "Conversation started");
    assert!(started["session_id"].is_string());

    let response = app
        .clone()
        .oneshot(get("/stream_messages"))
        .await
        .expect("stream");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;

    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("event json"))
        .collect();
    assert_eq!(events.last(), Some(&json!({ "complete": true })));
    assert_eq!(
        events.iter().filter(|event| event.get("complete").is_some()).count(),
        1
    );

    let streamed: Vec<Value> = events
        .iter()
        .filter_map(|event| event["messages"].as_array())
        .flatten()
        .cloned()
        .collect();
    let response = app.oneshot(get("/get_messages")).await.expect("get_messages");
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["is_active"], false);
    assert_eq!(snapshot["messages"].as_array(), Some(&streamed));
    assert_eq!(streamed.len(), 5);
    assert_eq!(streamed[1]["sender"], "Client");
    assert_eq!(streamed[1]["content"], "Design a HIPAA platform");
}

#[tokio::test]
async fn start_while_active_conflicts() {
    let release = Arc::new(Notify::new());
    let state = test_state(Arc::new(GatedDriver {
        release: Arc::clone(&release),
    }));
    let app = build_server_router(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(post_json("/start_conversation", json!({ "task": "first" })))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(post_json("/start_conversation", json!({ "task": "second" })))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.clone().oneshot(get("/healthz")).await.expect("healthz");
    assert!(body_json(response).await["active_session"].is_string());

    let response = app.oneshot(get("/get_messages")).await.expect("get_messages");
    assert_eq!(body_json(response).await["is_active"], true);

    release.notify_one();
    let session = state.sessions.current().expect("session exists");
    wait_until_finished(&session).await;
    assert!(state.sessions.active().is_none());
}

#[test]
fn telemetry_sink_writes_and_summarizes_session_events() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("events.jsonl");
    let sink = TelemetrySink::with_path(true, path.clone(), "serve".to_string());

    sink.emit("server.started", json!({ "port": 5000 }));
    sink.emit("session.started", json!({ "session_id": "s1" }));
    sink.emit("relay.batch", json!({ "session_id": "s1", "messages": 3 }));
    sink.emit("relay.batch", json!({ "session_id": "s1", "messages": 2 }));
    sink.emit("session.rejected", json!({ "session_id": "s1" }));
    sink.emit("session.completed", json!({ "session_id": "s1" }));
    sink.emit("session.started", json!({ "session_id": "s2" }));
    sink.emit("session.failed", json!({ "session_id": "s2" }));

    let mut lines: Vec<String> = std::fs::read_to_string(&path)
        .expect("telemetry file")
        .lines()
        .map(str::to_string)
        .collect();
    lines.push("garbage".to_string());

    let summary = summarize_telemetry_lines(lines, 100);
    assert_eq!(summary.parsed_events, 8);
    assert_eq!(summary.parse_errors, 1);
    assert_eq!(summary.sessions_started, 2);
    assert_eq!(summary.sessions_completed, 1);
    assert_eq!(summary.sessions_failed, 1);
    assert_eq!(summary.sessions_rejected, 1);
    assert_eq!(summary.relay_batches, 2);
    assert_eq!(summary.relayed_messages, 5);
    assert_eq!(summary.unique_sessions.len(), 2);
    assert_eq!(summary.unique_runs.len(), 1);
    assert_eq!(summary.command_counts.get("serve"), Some(&8));
}

#[test]
fn disabled_telemetry_writes_nothing() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("events.jsonl");
    let sink = TelemetrySink::with_path(false, path.clone(), "run".to_string());
    sink.emit("session.started", json!({ "session_id": "s1" }));
    assert!(!path.exists());
}

#[test]
fn errors_are_categorized_with_hints() {
    let config = anyhow::Error::new(ConfigError::MissingVariables(vec![ENV_MODEL.to_string()]));
    assert_eq!(categorize_error(&config), ErrorCategory::Config);
    let rendered = format_cli_error(&config, false);
    assert!(rendered.starts_with("[CONFIG] missing required environment variables: AZURE_OPENAI_MODEL"));
    assert!(rendered.contains("Hint: Export AZURE_OPENAI_MODEL"));

    let busy = anyhow::Error::new(SessionError::AlreadyActive(uuid::Uuid::new_v4()));
    assert_eq!(categorize_error(&busy), ErrorCategory::Session);

    let empty = anyhow::Error::new(SessionError::EmptyTask);
    assert_eq!(categorize_error(&empty), ErrorCategory::Input);

    let driver = anyhow::anyhow!("driver command 'python3' exited with exit status: 1");
    assert_eq!(categorize_error(&driver), ErrorCategory::Driver);

    let other = anyhow::anyhow!("disk full");
    assert_eq!(categorize_error(&other), ErrorCategory::Internal);
}

#[test]
fn secrets_and_endpoints_are_redacted() {
    assert_eq!(
        redact_sensitive_text("key=sk-abc and sk-abc", &["sk-abc", "  "]),
        "key=[REDACTED] and [REDACTED]"
    );
    assert_eq!(
        redact_endpoint("https://myres.openai.azure.com/openai/deployments?x=1"),
        "https://myres.openai.azure.com/[REDACTED]"
    );
    assert_eq!(
        redact_endpoint("https://myres.openai.azure.com"),
        "https://myres.openai.azure.com"
    );
    assert_eq!(redact_endpoint("not a url"), "[REDACTED]");
}
