use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::agents::{AgentSet, AgentSpec};
use crate::cli::{DriverKind, RelayMode};
use crate::config::{LlmConnection, RuntimeConfig};
use crate::message::{Message, parse_driver_line, preview};
use crate::relay::{Relay, RelayEvent};
use crate::session::{Session, SessionError, SessionManager, SessionWriter};
use crate::telemetry::TelemetrySink;

/// Everything the external conversation engine needs for one run.
/// Serialized as JSON onto the command driver's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationPlan {
    pub session_id: Uuid,
    pub preset: String,
    pub task: String,
    pub max_round: u32,
    pub speaker_selection: String,
    pub agents: Vec<AgentSpec>,
    pub llm: LlmConnection,
}

impl ConversationPlan {
    pub fn new(session_id: Uuid, agent_set: &AgentSet, task: &str) -> Self {
        Self {
            session_id,
            preset: agent_set.preset.clone(),
            task: task.to_string(),
            max_round: agent_set.max_round,
            speaker_selection: agent_set.speaker_selection.clone(),
            agents: agent_set.agents.clone(),
            llm: agent_set.llm.as_ref().clone(),
        }
    }
}

/// Runs one conversation to completion, appending every turn to `log`.
///
/// Implementations must not end the session themselves; [`run_session`]
/// does that once `run` returns.
#[async_trait]
pub trait ConversationDriver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, plan: &ConversationPlan, log: &SessionWriter) -> Result<()>;
}

/// Spawns the external engine as a child process. The plan goes in as one JSON
/// line on stdin; turns come back as JSON lines on stdout.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    program: String,
    args: Vec<String>,
    connection: Option<LlmConnection>,
}

impl CommandDriver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            connection: None,
        }
    }

    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = shlex::split(command_line)
            .ok_or_else(|| anyhow::anyhow!("driver command has unbalanced quotes: {command_line}"))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("driver command is empty"))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Exports the connection to the child through its environment.
    pub fn with_connection(mut self, connection: LlmConnection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ConversationDriver for CommandDriver {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn run(&self, plan: &ConversationPlan, log: &SessionWriter) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(connection) = &self.connection {
            for (key, value) in connection.env_pairs() {
                command.env(key, value);
            }
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn driver command '{}'", self.program))?;
        tracing::info!(program = %self.program, pid = ?child.id(), session_id = %plan.session_id, "driver process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("driver stdout was not captured"))?;
        let stderr = child.stderr.take();

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload =
                serde_json::to_vec(plan).context("failed to serialize conversation plan")?;
            payload.push(b'\n');
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::warn!(program = %self.program, "driver closed stdin before reading the plan");
                }
                Err(err) => {
                    return Err(err).context("failed to write conversation plan to driver stdin");
                }
            }
        }

        let stderr_task = stderr.map(|stderr| {
            let program = self.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(program = %program, line = %preview(&line), "driver stderr");
                }
            })
        });

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut forwarded = 0usize;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .context("failed to read driver output")?;
            if read == 0 {
                break;
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        line = %preview(&String::from_utf8_lossy(&buf)),
                        "skipping non-UTF-8 driver line"
                    );
                    continue;
                }
            };
            if let Some(message) = parse_driver_line(line) {
                tracing::debug!(sender = %message.sender, content = %preview(&message.content), "driver message");
                log.append(message);
                forwarded += 1;
            }
        }

        let status = child
            .wait()
            .await
            .context("failed to wait for driver process")?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if !status.success() {
            return Err(anyhow::anyhow!(
                "driver command '{}' exited with {}",
                self.program,
                status
            ));
        }

        tracing::info!(program = %self.program, messages = forwarded, "driver process finished");
        Ok(())
    }
}

/// Replays a recorded JSON-lines transcript with a fixed delay per line.
#[derive(Debug, Clone)]
pub struct TranscriptDriver {
    lines: Vec<String>,
    delay: Duration,
}

impl TranscriptDriver {
    pub fn from_lines(lines: Vec<String>, delay: Duration) -> Self {
        Self { lines, delay }
    }

    pub fn from_path(path: &Path, delay: Duration) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read transcript file '{}'", path.display()))?;
        let lines = content.lines().map(str::to_string).collect();
        Ok(Self::from_lines(lines, delay))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait]
impl ConversationDriver for TranscriptDriver {
    fn name(&self) -> &'static str {
        "transcript"
    }

    async fn run(&self, plan: &ConversationPlan, log: &SessionWriter) -> Result<()> {
        tracing::info!(session_id = %plan.session_id, lines = self.len(), "replaying transcript");
        for line in &self.lines {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(message) = parse_driver_line(line) {
                log.append(message);
            }
        }
        Ok(())
    }
}

pub fn build_driver(
    cfg: &RuntimeConfig,
    connection: &LlmConnection,
) -> Result<Arc<dyn ConversationDriver>> {
    match cfg.driver {
        DriverKind::Command => {
            let command_line = cfg.driver_command.as_deref().ok_or_else(|| {
                anyhow::anyhow!(
                    "driver 'command' has no command line; set --driver-command or AGENTLAB_DRIVER_COMMAND"
                )
            })?;
            let driver =
                CommandDriver::from_command_line(command_line)?.with_connection(connection.clone());
            Ok(Arc::new(driver))
        }
        DriverKind::Transcript => {
            let path = cfg.transcript_path.as_deref().ok_or_else(|| {
                anyhow::anyhow!(
                    "driver 'transcript' has no file; set --transcript-path or AGENTLAB_TRANSCRIPT_PATH"
                )
            })?;
            let driver = TranscriptDriver::from_path(
                Path::new(path),
                Duration::from_millis(cfg.transcript_delay_ms),
            )?;
            if driver.is_empty() {
                tracing::warn!(path = %path, "transcript file has no lines; conversations will only show the seed messages");
            } else {
                tracing::debug!(path = %path, lines = driver.len(), "transcript loaded");
            }
            Ok(Arc::new(driver))
        }
    }
}

/// Runs `driver` and closes the session. A driver error becomes one visible
/// `System` error line instead of a stalled or crashed session.
pub async fn run_session(
    driver: Arc<dyn ConversationDriver>,
    plan: ConversationPlan,
    writer: SessionWriter,
    telemetry: TelemetrySink,
) {
    let session_id = plan.session_id;
    match driver.run(&plan, &writer).await {
        Ok(()) => {
            writer.finish();
            let total = writer.session().len();
            tracing::info!(session_id = %session_id, driver = driver.name(), messages = total, "conversation completed");
            telemetry.emit(
                "session.completed",
                json!({
                    "session_id": session_id.to_string(),
                    "preset": plan.preset,
                    "messages": total,
                }),
            );
        }
        Err(err) => {
            tracing::error!(session_id = %session_id, driver = driver.name(), error = %format!("{err:#}"), "conversation failed");
            writer.fail(&err);
            telemetry.emit(
                "session.failed",
                json!({
                    "session_id": session_id.to_string(),
                    "preset": plan.preset,
                    "error": format!("{err:#}"),
                }),
            );
        }
    }
}

/// Starts a session, seeds it with the opening lines and spawns the driver.
///
/// The seeded log reads `System: Conversation started`, then the task as
/// spoken by the proxy agent.
pub fn launch_conversation(
    manager: &SessionManager,
    driver: Arc<dyn ConversationDriver>,
    agent_set: &AgentSet,
    task: &str,
    telemetry: &TelemetrySink,
) -> Result<Arc<Session>, SessionError> {
    let (session, writer) = manager.start(task, &agent_set.preset)?;
    writer.append(Message::system("Conversation started"));
    writer.append(Message::new(agent_set.proxy().name.clone(), session.task.clone()));

    let plan = ConversationPlan::new(session.id, agent_set, &session.task);
    tracing::info!(
        session_id = %session.id,
        preset = %agent_set.preset,
        agents = agent_set.agents.len(),
        max_round = agent_set.max_round,
        driver = driver.name(),
        "starting conversation"
    );
    telemetry.emit(
        "session.started",
        json!({
            "session_id": session.id.to_string(),
            "preset": agent_set.preset,
            "driver": driver.name(),
            "started_at": session.started_at.to_rfc3339(),
        }),
    );

    tokio::spawn(run_session(driver, plan, writer, telemetry.clone()));
    Ok(session)
}

/// Runs one conversation outside the server and hands every relayed message
/// to `on_message` in log order. Fails when the session ends with an error.
pub async fn run_relayed(
    driver: Arc<dyn ConversationDriver>,
    agent_set: &AgentSet,
    task: &str,
    relay_mode: RelayMode,
    poll_interval: Duration,
    telemetry: &TelemetrySink,
    mut on_message: impl FnMut(&Message),
) -> Result<Arc<Session>> {
    let manager = SessionManager::new();
    let session = launch_conversation(&manager, driver, agent_set, task, telemetry)?;

    let mut events =
        std::pin::pin!(Relay::new(Arc::clone(&session)).into_stream(relay_mode, poll_interval));
    while let Some(event) = events.next().await {
        if let RelayEvent::Batch(batch) = event {
            batch.messages.iter().for_each(&mut on_message);
        }
    }

    match session.failure() {
        Some(failure) => Err(anyhow::anyhow!("conversation failed: {failure}")),
        None => Ok(session),
    }
}
