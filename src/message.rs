use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SYSTEM_SENDER: &str = "System";

/// One conversation turn as shown to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub content: String,
}

impl Message {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, content)
    }

    /// Synthetic message appended when a session fails.
    pub fn error(err: &impl fmt::Display) -> Self {
        Self::system(format!("Error: {err}"))
    }

    pub fn is_error(&self) -> bool {
        self.sender == SYSTEM_SENDER && self.content.starts_with("Error:")
    }

    /// Maps a raw driver entry to a message.
    ///
    /// Entries need string `name` (or `sender`) and `content` fields. Anything
    /// else returns `None` and is left to the caller to report.
    pub fn from_driver_entry(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;
        let sender = object
            .get("name")
            .or_else(|| object.get("sender"))
            .and_then(Value::as_str)?;
        let content = object.get("content").and_then(Value::as_str)?;
        Some(Self::new(sender, content))
    }
}

/// Parses one line of driver output. Blank lines are ignored silently;
/// malformed lines are logged and skipped.
pub fn parse_driver_line(line: &str) -> Option<Message> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let entry = match serde_json::from_str::<Value>(trimmed) {
        Ok(entry) => entry,
        Err(err) => {
            tracing::warn!(error = %err, line = %preview(trimmed), "skipping non-JSON driver line");
            return None;
        }
    };

    let message = Message::from_driver_entry(&entry);
    if message.is_none() {
        tracing::warn!(
            kind = value_kind(&entry),
            line = %preview(trimmed),
            "skipping driver entry with unexpected shape"
        );
    }
    message
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn preview(text: &str) -> String {
    const LIMIT: usize = 100;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
