use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::agents::build_agent_set;
use crate::cli::{RelayMode, driver_label, relay_mode_label};
use crate::config::{LlmConnection, RuntimeConfig};
use crate::driver::{ConversationDriver, build_driver, launch_conversation};
use crate::message::Message;
use crate::relay::{Relay, RelayEvent};
use crate::session::{SessionError, SessionManager};
use crate::telemetry::TelemetrySink;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct ServerState {
    pub app_name: String,
    pub default_preset: String,
    pub connection: Arc<LlmConnection>,
    pub driver: Arc<dyn ConversationDriver>,
    pub sessions: Arc<SessionManager>,
    pub telemetry: TelemetrySink,
    pub relay_mode: RelayMode,
    pub poll_interval: Duration,
}

#[derive(Debug, Serialize)]
pub struct ServerHealthResponse {
    pub status: &'static str,
    pub app_name: String,
    pub preset: String,
    pub active_session: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    #[serde(default)]
    pub task: String,
    pub preset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartConversationResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
    pub is_active: bool,
}

pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub fn session_error_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::EmptyTask | SessionError::UnknownPreset { .. } => StatusCode::BAD_REQUEST,
        SessionError::AlreadyActive(_) => StatusCode::CONFLICT,
        SessionError::NoSession => StatusCode::NOT_FOUND,
    }
}

fn session_api_error(err: SessionError) -> ApiError {
    api_error(session_error_status(&err), err.to_string())
}

pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn handle_server_health(
    State(state): State<Arc<ServerState>>,
) -> Json<ServerHealthResponse> {
    Json(ServerHealthResponse {
        status: "ok",
        app_name: state.app_name.clone(),
        preset: state.default_preset.clone(),
        active_session: state.sessions.active().map(|session| session.id),
    })
}

pub async fn handle_start_conversation(
    State(state): State<Arc<ServerState>>,
    payload: std::result::Result<Json<StartConversationRequest>, JsonRejection>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected start request body");
        api_error(
            StatusCode::BAD_REQUEST,
            format!("invalid request body: {}", rejection.body_text()),
        )
    })?;
    let preset = request
        .preset
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&state.default_preset);
    let agent_set =
        build_agent_set(preset, Arc::clone(&state.connection)).map_err(session_api_error)?;

    let session = launch_conversation(
        &state.sessions,
        Arc::clone(&state.driver),
        &agent_set,
        &request.task,
        &state.telemetry,
    )
    .map_err(|err| {
        if let SessionError::AlreadyActive(active) = &err {
            tracing::warn!(active_session = %active, "rejected start while a conversation is running");
            state.telemetry.emit(
                "session.rejected",
                json!({ "session_id": active.to_string() }),
            );
        }
        session_api_error(err)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartConversationResponse {
            status: "started",
            message: "Conversation started",
            session_id: session.id,
        }),
    ))
}

pub async fn handle_get_messages(State(state): State<Arc<ServerState>>) -> Json<MessagesResponse> {
    let (messages, is_active) = state
        .sessions
        .current()
        .map(|session| session.snapshot())
        .unwrap_or_default();
    tracing::debug!(count = messages.len(), is_active, "serving message snapshot");
    Json(MessagesResponse {
        messages,
        is_active,
    })
}

pub async fn handle_stream_messages(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    let session = state
        .sessions
        .current()
        .ok_or_else(|| session_api_error(SessionError::NoSession))?;
    let session_id = session.id;
    let telemetry = state.telemetry.clone();
    tracing::info!(session_id = %session_id, mode = relay_mode_label(state.relay_mode), "stream subscriber attached");

    let events = Relay::new(session)
        .into_stream(state.relay_mode, state.poll_interval)
        .map(move |event| {
            if let RelayEvent::Batch(batch) = &event {
                telemetry.emit(
                    "relay.batch",
                    json!({
                        "session_id": session_id.to_string(),
                        "messages": batch.messages.len(),
                        "is_active": batch.is_active,
                    }),
                );
            }
            Ok(Event::default().data(event.payload().to_string()))
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub fn build_server_router(state: Arc<ServerState>) -> AxumRouter {
    AxumRouter::new()
        .route("/", get(handle_index))
        .route("/healthz", get(handle_server_health))
        .route("/start_conversation", post(handle_start_conversation))
        .route("/get_messages", get(handle_get_messages))
        .route("/stream_messages", get(handle_stream_messages))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn build_server_state(
    cfg: &RuntimeConfig,
    connection: LlmConnection,
    telemetry: &TelemetrySink,
) -> Result<ServerState> {
    // Fail on an unknown default preset before accepting requests.
    build_agent_set(&cfg.preset, Arc::new(connection.clone()))?;
    let driver = build_driver(cfg, &connection)?;
    Ok(ServerState {
        app_name: cfg.app_name.clone(),
        default_preset: cfg.preset.clone(),
        connection: Arc::new(connection),
        driver,
        sessions: Arc::new(SessionManager::new()),
        telemetry: telemetry.clone(),
        relay_mode: cfg.relay_mode,
        poll_interval: Duration::from_millis(cfg.poll_interval_ms),
    })
}

pub async fn run_server(
    cfg: RuntimeConfig,
    connection: LlmConnection,
    host: String,
    port: u16,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server bind address '{}:{}'", host, port))?;
    let state = Arc::new(build_server_state(&cfg, connection, telemetry)?);

    telemetry.emit(
        "server.started",
        json!({
            "host": host,
            "port": port,
            "profile": cfg.profile,
            "preset": cfg.preset,
            "driver": driver_label(cfg.driver),
            "relay_mode": relay_mode_label(cfg.relay_mode),
        }),
    );
    tracing::info!(
        %addr,
        preset = %cfg.preset,
        driver = driver_label(cfg.driver),
        relay_mode = relay_mode_label(cfg.relay_mode),
        "relay server starting"
    );

    println!(
        "Server listening on http://{} (start: POST /start_conversation, poll: /get_messages, stream: /stream_messages)",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server listener")?;
    axum::serve(listener, build_server_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { println!("\nReceived Ctrl+C, shutting down gracefully..."); }
        _ = terminate => { println!("\nReceived SIGTERM, shutting down gracefully..."); }
    }
}
