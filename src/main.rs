use std::sync::Arc;
use std::time::Duration;

use agentlab::agents::{build_agent_set, run_presets_list, run_presets_show};
use agentlab::cli::*;
use agentlab::config::{load_llm_connection, load_profiles, resolve_runtime_config};
use agentlab::doctor::run_doctor;
use agentlab::driver::{build_driver, run_relayed};
use agentlab::error::{categorize_error, format_cli_error, render_error_message};
use agentlab::profiles::{run_profiles_list, run_profiles_show};
use agentlab::server::run_server;
use agentlab::telemetry::{TelemetrySink, run_telemetry_report};
use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        eprintln!("warning: failed to load .env: {err}");
    }

    let cli = Cli::parse();
    let show_sensitive = cli.show_sensitive_config;
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive));
        tracing::error!(
            category = %categorize_error(&err).code(),
            error = %render_error_message(&err, show_sensitive),
            "command failed"
        );
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;
    let telemetry = TelemetrySink::new(&cfg, command_label(&cli.command));
    tracing::debug!(
        profile = %cfg.profile,
        preset = %cfg.preset,
        driver = driver_label(cfg.driver),
        "resolved runtime config"
    );

    match cli.command {
        Commands::Serve { host, port } => {
            let connection = load_llm_connection()?;
            run_server(cfg, connection, host, port, &telemetry).await?;
        }
        Commands::Run { task } => {
            let connection = Arc::new(load_llm_connection()?);
            let agent_set = build_agent_set(&cfg.preset, Arc::clone(&connection))?;
            let driver = build_driver(&cfg, &connection)?;
            let task = task.join(" ");
            let task = if task.trim().is_empty() {
                agent_set.default_task.clone()
            } else {
                task
            };

            let session = run_relayed(
                driver,
                &agent_set,
                &task,
                cfg.relay_mode,
                Duration::from_millis(cfg.poll_interval_ms),
                &telemetry,
                |message| println!("{}: {}\n", message.sender, message.content),
            )
            .await?;
            telemetry.emit(
                "command.completed",
                json!({ "session_id": session.id.to_string(), "messages": session.len() }),
            );
        }
        Commands::Presets { command } => match command {
            PresetCommands::List => run_presets_list(&cfg.preset)?,
            PresetCommands::Show { name } => run_presets_show(&cfg.preset, name)?,
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg)?,
            ProfileCommands::Show => run_profiles_show(&cfg)?,
        },
        Commands::Doctor => run_doctor(&cfg)?,
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => {
                run_telemetry_report(&cfg, path, limit)?;
            }
        },
    }

    Ok(())
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
