use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::*;
use crate::presets::DEFAULT_PRESET;

pub const ENV_MODEL: &str = "AZURE_OPENAI_MODEL";
pub const ENV_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";

pub const REQUIRED_ENV_VARS: [&str; 4] = [ENV_MODEL, ENV_API_KEY, ENV_ENDPOINT, ENV_API_VERSION];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

/// Hosted-model connection shared by every agent of a session.
///
/// The credential is never serialized; drivers receive it through their
/// environment instead.
#[derive(Clone, Serialize)]
pub struct LlmConnection {
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(rename = "base_url")]
    pub endpoint: String,
    pub api_version: String,
    pub api_type: String,
}

impl fmt::Debug for LlmConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConnection")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("api_type", &self.api_type)
            .finish()
    }
}

impl LlmConnection {
    /// Environment pairs handed to a driver process.
    pub fn env_pairs(&self) -> [(&'static str, &str); 4] {
        [
            (ENV_MODEL, self.model.as_str()),
            (ENV_API_KEY, self.api_key.as_str()),
            (ENV_ENDPOINT, self.endpoint.as_str()),
            (ENV_API_VERSION, self.api_version.as_str()),
        ]
    }
}

pub fn load_llm_connection() -> Result<LlmConnection, ConfigError> {
    load_llm_connection_from(|key| std::env::var(key).ok())
}

/// Reads the connection through `lookup`. Blank values count as missing and
/// every missing name is reported at once.
pub fn load_llm_connection_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LlmConnection, ConfigError> {
    let mut values = HashMap::<&str, String>::new();
    let mut missing = Vec::<String>::new();
    for key in REQUIRED_ENV_VARS {
        match lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            Some(value) => {
                values.insert(key, value);
            }
            None => missing.push(key.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(ConfigError::MissingVariables(missing));
    }

    let mut take = |key: &str| values.remove(key).unwrap_or_default();
    Ok(LlmConnection {
        model: take(ENV_MODEL),
        api_key: take(ENV_API_KEY),
        endpoint: take(ENV_ENDPOINT),
        api_version: take(ENV_API_VERSION),
        api_type: "azure".to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub app_name: String,
    pub preset: String,
    pub driver: DriverKind,
    pub driver_command: Option<String>,
    pub transcript_path: Option<String>,
    pub transcript_delay_ms: u64,
    pub relay_mode: RelayMode,
    pub poll_interval_ms: u64,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
    pub show_sensitive_config: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub app_name: Option<String>,
    pub preset: Option<String>,
    pub driver: Option<DriverKind>,
    pub driver_command: Option<String>,
    pub transcript_path: Option<String>,
    pub transcript_delay_ms: Option<u64>,
    pub relay_mode: Option<RelayMode>,
    pub poll_interval_ms: Option<u64>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check driver/relay values and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    let transcript_path = cli
        .transcript_path
        .clone()
        .or(profile.transcript_path)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let driver_command = cli
        .driver_command
        .clone()
        .or(profile.driver_command)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    // A lone transcript path implies the transcript driver.
    let driver = cli.driver.or(profile.driver).unwrap_or(
        if transcript_path.is_some() && driver_command.is_none() {
            DriverKind::Transcript
        } else {
            DriverKind::Command
        },
    );

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        app_name: cli
            .app_name
            .clone()
            .or(profile.app_name)
            .unwrap_or_else(|| "agentlab".to_string()),
        preset: cli
            .preset
            .clone()
            .or(profile.preset)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PRESET.to_string()),
        driver,
        driver_command,
        transcript_path,
        transcript_delay_ms: cli
            .transcript_delay_ms
            .or(profile.transcript_delay_ms)
            .unwrap_or(250),
        relay_mode: cli
            .relay_mode
            .or(profile.relay_mode)
            .unwrap_or(RelayMode::Notify),
        poll_interval_ms: cli
            .poll_interval_ms
            .or(profile.poll_interval_ms)
            .unwrap_or(500)
            .max(10),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(false),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".agentlab/telemetry/events.jsonl".to_string()),
        show_sensitive_config: cli.show_sensitive_config,
    })
}

pub fn display_endpoint(cfg: &RuntimeConfig, connection: &LlmConnection) -> String {
    if cfg.show_sensitive_config {
        connection.endpoint.clone()
    } else {
        format!(
            "{} (set --show-sensitive-config to reveal)",
            crate::error::redact_endpoint(&connection.endpoint)
        )
    }
}
