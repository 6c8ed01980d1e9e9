use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

use crate::message::Message;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("task is required")]
    EmptyTask,
    #[error("a conversation is already running (session {0})")]
    AlreadyActive(Uuid),
    #[error("no conversation has been started")]
    NoSession,
    #[error("unknown preset '{name}'. Available presets: {available}")]
    UnknownPreset { name: String, available: String },
}

/// Published on every log change. `len` always trails the log itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogState {
    pub len: usize,
    pub active: bool,
}

/// What a reader sees when it looks at the log from a cursor.
#[derive(Debug, Clone)]
pub struct LogView {
    pub active: bool,
    pub len: usize,
    pub tail: Vec<Message>,
}

/// One conversation run: an append-only log plus its `active` flag.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub task: String,
    pub preset: String,
    pub started_at: DateTime<Utc>,
    log: RwLock<Vec<Message>>,
    failure: RwLock<Option<String>>,
    state: watch::Sender<LogState>,
}

impl Session {
    /// Opens a fresh active session and hands back its only writer.
    pub fn open(task: impl Into<String>, preset: impl Into<String>) -> (Arc<Self>, SessionWriter) {
        let (state, _) = watch::channel(LogState {
            len: 0,
            active: true,
        });
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            task: task.into(),
            preset: preset.into(),
            started_at: Utc::now(),
            log: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
            state,
        });
        let writer = SessionWriter {
            session: Arc::clone(&session),
        };
        (session, writer)
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.read().clone()
    }

    /// Full copy of the log with the flag read before it.
    pub fn snapshot(&self) -> (Vec<Message>, bool) {
        let view = self.view_from(0);
        (view.tail, view.active)
    }

    /// Messages at positions `cursor..`.
    ///
    /// The flag is read before the log. The writer appends before it
    /// deactivates, so an inactive view always contains every message.
    pub fn view_from(&self, cursor: usize) -> LogView {
        let active = self.state.borrow().active;
        let log = self.log.read();
        let tail = log.get(cursor..).map(<[Message]>::to_vec).unwrap_or_default();
        LogView {
            active,
            len: log.len(),
            tail,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LogState> {
        self.state.subscribe()
    }
}

/// Sole write handle of a session log. Dropping it while the session is
/// still active records an error so readers never wait on a dead driver.
#[derive(Debug)]
pub struct SessionWriter {
    session: Arc<Session>,
}

impl SessionWriter {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn append(&self, message: Message) {
        if !self.session.is_active() {
            tracing::warn!(session_id = %self.session.id, sender = %message.sender, "append after session end ignored");
            return;
        }
        let len = {
            let mut log = self.session.log.write();
            log.push(message);
            log.len()
        };
        self.session.state.send_modify(|state| state.len = len);
    }

    pub fn finish(&self) {
        self.session.state.send_if_modified(|state| {
            let was_active = state.active;
            state.active = false;
            was_active
        });
    }

    /// Appends the visible error line, then ends the session.
    pub fn fail(&self, err: &anyhow::Error) {
        let rendered = format!("{err:#}");
        *self.session.failure.write() = Some(rendered.clone());
        self.append(Message::error(&rendered));
        self.finish();
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        if self.session.is_active() {
            self.fail(&anyhow::anyhow!("conversation driver stopped before completing"));
        }
    }
}

/// Owns the current session. Starting is rejected while one is running.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Mutex<Option<Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &self,
        task: &str,
        preset: &str,
    ) -> Result<(Arc<Session>, SessionWriter), SessionError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(SessionError::EmptyTask);
        }

        let mut current = self.current.lock();
        if let Some(existing) = current.as_ref()
            && existing.is_active()
        {
            return Err(SessionError::AlreadyActive(existing.id));
        }

        let (session, writer) = Session::open(task, preset);
        if let Some(previous) = current.replace(Arc::clone(&session)) {
            tracing::debug!(previous = %previous.id, next = %session.id, "replacing finished session");
        }
        Ok((session, writer))
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.lock().clone()
    }

    pub fn active(&self) -> Option<Arc<Session>> {
        self.current().filter(|session| session.is_active())
    }
}
