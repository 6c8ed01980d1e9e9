use crate::config::{ConfigError, ENV_API_KEY};
use crate::session::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Session,
    Driver,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::Session => "SESSION",
            ErrorCategory::Driver => "DRIVER",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Config => {
                "Export AZURE_OPENAI_MODEL, AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_VERSION (or add them to .env), then run agentlab doctor."
            }
            ErrorCategory::Session => {
                "Wait for the running conversation to finish before starting another one."
            }
            ErrorCategory::Driver => {
                "Check --driver-command / --transcript-path and retry with RUST_LOG=debug for driver output."
            }
            ErrorCategory::Input => "Run agentlab --help and correct command arguments.",
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    if err.downcast_ref::<ConfigError>().is_some() {
        return ErrorCategory::Config;
    }
    if let Some(session_err) = err.downcast_ref::<SessionError>() {
        return match session_err {
            SessionError::EmptyTask | SessionError::UnknownPreset { .. } => ErrorCategory::Input,
            SessionError::AlreadyActive(_) | SessionError::NoSession => ErrorCategory::Session,
        };
    }

    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("environment variable") || msg.contains("azure_openai") {
        return ErrorCategory::Config;
    }

    if msg.contains("profile")
        || msg.contains("preset")
        || msg.contains("invalid value")
        || msg.contains("unknown argument")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("driver") || msg.contains("transcript") {
        return ErrorCategory::Driver;
    }

    if msg.contains("session") || msg.contains("conversation") {
        return ErrorCategory::Session;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let category = categorize_error(err);
    let rendered_error = render_error_message(err, show_sensitive_config);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        rendered_error,
        category.hint()
    )
}

pub fn render_error_message(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let text = format!("{err:#}");
    if show_sensitive_config {
        text
    } else {
        let secret = std::env::var(ENV_API_KEY).unwrap_or_default();
        redact_sensitive_text(&text, &[secret.as_str()])
    }
}

/// Masks every occurrence of the given secrets. Empty secrets are ignored.
pub fn redact_sensitive_text(text: &str, secrets: &[&str]) -> String {
    let mut out = text.to_string();
    for secret in secrets.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        out = out.replace(secret, "[REDACTED]");
    }
    out
}

/// Keeps scheme and host of an endpoint URL, hides path and query.
pub fn redact_endpoint(value: &str) -> String {
    let Some((scheme, rest)) = value.split_once("://") else {
        return "[REDACTED]".to_string();
    };
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    if host.is_empty() {
        return format!("{scheme}://[REDACTED]");
    }
    if rest.len() > host.len() {
        format!("{scheme}://{host}/[REDACTED]")
    } else {
        format!("{scheme}://{host}")
    }
}
