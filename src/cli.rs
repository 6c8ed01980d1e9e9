use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Command,
    Transcript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    Notify,
    Poll,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum PresetCommands {
    #[command(about = "List built-in agent presets")]
    List,
    #[command(about = "Show the agents, sampling parameters and default task of a preset")]
    Show {
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  agentlab presets list\n\
  agentlab presets show --name tutorial-lab\n\
  agentlab --preset architecture-design run \"Design a HIPAA compliant analytics platform\"\n\
  agentlab --driver transcript --transcript-path demos/architecture.jsonl serve --port 5000\n\
  agentlab --driver-command \"python bridge.py\" --relay-mode poll serve\n\
  agentlab doctor\n\
  agentlab telemetry report --limit 2000\n\
\n\
Connection settings are read from AZURE_OPENAI_MODEL, AZURE_OPENAI_API_KEY,\n\
AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_VERSION (a local .env file is honored).";

#[derive(Debug, Parser)]
#[command(name = "agentlab")]
#[command(about = "Preset multi-agent conversations with a live relay to terminal or browser")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "AGENTLAB_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "AGENTLAB_CONFIG", default_value = ".agentlab/config.toml")]
    pub config_path: String,

    #[arg(long, env = "AGENTLAB_PRESET")]
    pub preset: Option<String>,

    #[arg(long, env = "AGENTLAB_DRIVER", value_enum)]
    pub driver: Option<DriverKind>,

    #[arg(long, env = "AGENTLAB_DRIVER_COMMAND")]
    pub driver_command: Option<String>,

    #[arg(long, env = "AGENTLAB_TRANSCRIPT_PATH")]
    pub transcript_path: Option<String>,

    #[arg(long, env = "AGENTLAB_TRANSCRIPT_DELAY_MS")]
    pub transcript_delay_ms: Option<u64>,

    #[arg(long, env = "AGENTLAB_RELAY_MODE", value_enum)]
    pub relay_mode: Option<RelayMode>,

    #[arg(long, env = "AGENTLAB_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, env = "AGENTLAB_APP_NAME")]
    pub app_name: Option<String>,

    #[arg(long, env = "AGENTLAB_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "AGENTLAB_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "AGENTLAB_SHOW_SENSITIVE_CONFIG", default_value_t = false)]
    pub show_sensitive_config: bool,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run the browser relay server (start, poll and stream endpoints)")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
    #[command(about = "Run one conversation and print messages as they are relayed")]
    Run {
        /// Seed task; the preset's default task is used when omitted.
        task: Vec<String>,
    },
    #[command(about = "Inspect built-in agent presets")]
    Presets {
        #[command(subcommand)]
        command: PresetCommands,
    },
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Check connection environment and driver configuration")]
    Doctor,
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
}

pub fn driver_label(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::Command => "command",
        DriverKind::Transcript => "transcript",
    }
}

pub fn relay_mode_label(mode: RelayMode) -> &'static str {
    match mode {
        RelayMode::Notify => "notify",
        RelayMode::Poll => "poll",
    }
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Serve { .. } => "serve".to_string(),
        Commands::Run { .. } => "run".to_string(),
        Commands::Presets { command } => match command {
            PresetCommands::List => "presets.list".to_string(),
            PresetCommands::Show { .. } => "presets.show".to_string(),
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Doctor => "doctor".to_string(),
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
    }
}
