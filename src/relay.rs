//! Forwards the unseen suffix of a session log to one subscriber.
//!
//! A relay owns a cursor into the log. Every step it compares the cursor with
//! the log length and, when the log grew, publishes `log[cursor..]` as a single
//! batch. Once the session is inactive and the cursor has caught up, it
//! publishes a terminal completion event and stops. Every subscriber gets its
//! own relay, so subscribers never steal messages from each other.
//!
//! Two wake-up strategies drive the steps: [`RelayMode::Notify`] waits on the
//! session's change channel, [`RelayMode::Poll`] checks on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::MissedTickBehavior;

use crate::cli::RelayMode;
use crate::message::Message;
use crate::session::Session;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageBatch {
    pub messages: Vec<Message>,
    pub is_active: bool,
}

/// A single publication: either new messages or the end of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Batch(MessageBatch),
    Complete,
}

impl RelayEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, RelayEvent::Complete)
    }

    /// Wire payload sent to browser subscribers.
    pub fn payload(&self) -> Value {
        match self {
            RelayEvent::Batch(batch) => json!({
                "messages": batch.messages,
                "is_active": batch.is_active,
            }),
            RelayEvent::Complete => json!({ "complete": true }),
        }
    }
}

#[derive(Debug)]
pub struct Relay {
    session: Arc<Session>,
    cursor: usize,
    finished: bool,
}

impl Relay {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cursor: 0,
            finished: false,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// One relay step. Returns `None` when there is nothing to publish.
    pub fn tick(&mut self) -> Option<RelayEvent> {
        if self.finished {
            return None;
        }

        let view = self.session.view_from(self.cursor);
        if !view.tail.is_empty() {
            self.cursor = view.len;
            tracing::debug!(
                session_id = %self.session.id,
                forwarded = view.tail.len(),
                cursor = self.cursor,
                "relaying new messages"
            );
            return Some(RelayEvent::Batch(MessageBatch {
                messages: view.tail,
                is_active: view.active,
            }));
        }

        if !view.active {
            self.finished = true;
            tracing::info!(
                session_id = %self.session.id,
                total = self.cursor,
                "conversation complete, relay stopping"
            );
            return Some(RelayEvent::Complete);
        }

        None
    }

    /// Drives [`Relay::tick`] until completion. The stream ends right after
    /// yielding [`RelayEvent::Complete`].
    pub fn into_stream(
        self,
        mode: RelayMode,
        poll_interval: Duration,
    ) -> impl Stream<Item = RelayEvent> + Send + 'static {
        async_stream::stream! {
            let mut relay = self;
            let mut changes = relay.session.subscribe();
            let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if let Some(event) = relay.tick() {
                    let complete = event.is_complete();
                    yield event;
                    if complete {
                        break;
                    }
                    // The session may have ended with this batch; check again
                    // before waiting on a change that will never come.
                    continue;
                }

                match mode {
                    RelayMode::Poll => {
                        ticker.tick().await;
                    }
                    RelayMode::Notify => {
                        if changes.changed().await.is_err() {
                            ticker.tick().await;
                        }
                    }
                }
            }
        }
    }
}
