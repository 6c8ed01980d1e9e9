use std::path::Path;

use anyhow::Result;

use crate::cli::{DriverKind, driver_label, relay_mode_label};
use crate::config::{REQUIRED_ENV_VARS, RuntimeConfig, display_endpoint, load_llm_connection};
use crate::driver::build_driver;
use crate::presets::{find_preset, preset_names};

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}

/// Reports configuration problems without failing fast; returns an error
/// only after every check has printed.
pub fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    let mut problems = Vec::<String>::new();

    println!("Connection environment check:");
    for key in REQUIRED_ENV_VARS {
        let ok = env_present(key);
        let status = if ok { "set" } else { "missing" };
        println!("- {key}: {status}");
        if !ok {
            problems.push(format!("{key} is not set"));
        }
    }

    let connection = match load_llm_connection() {
        Ok(connection) => {
            println!(
                "Connection: model={} api_version={} endpoint={}",
                connection.model,
                connection.api_version,
                display_endpoint(cfg, &connection)
            );
            Some(connection)
        }
        Err(_) => None,
    };

    match find_preset(&cfg.preset) {
        Some(preset) => println!(
            "Preset: {} ({} agents, max_round={})",
            preset.name,
            preset.assistants.len() + 1,
            preset.max_round
        ),
        None => {
            println!("Preset: {} (unknown)", cfg.preset);
            problems.push(format!(
                "preset '{}' is not built in; choose one of: {}",
                cfg.preset,
                preset_names().join(", ")
            ));
        }
    }

    println!(
        "Driver: {} command={} transcript={} delay_ms={}",
        driver_label(cfg.driver),
        cfg.driver_command.as_deref().unwrap_or("<not configured>"),
        cfg.transcript_path.as_deref().unwrap_or("<not configured>"),
        cfg.transcript_delay_ms
    );
    match cfg.driver {
        DriverKind::Command => {
            if cfg.driver_command.is_none() {
                problems.push("driver 'command' has no --driver-command configured".to_string());
            }
        }
        DriverKind::Transcript => match cfg.transcript_path.as_deref() {
            Some(path) if !Path::new(path).is_file() => {
                problems.push(format!("transcript file '{path}' does not exist"));
            }
            Some(_) => {}
            None => {
                problems.push("driver 'transcript' has no --transcript-path configured".to_string())
            }
        },
    }
    if let Some(connection) = &connection
        && problems.is_empty()
        && let Err(err) = build_driver(cfg, connection)
    {
        problems.push(format!("{err:#}"));
    }

    println!(
        "Relay: mode={} poll_interval_ms={}",
        relay_mode_label(cfg.relay_mode),
        cfg.poll_interval_ms
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    if problems.is_empty() {
        println!("All checks passed.");
        return Ok(());
    }

    println!("Problems:");
    for problem in &problems {
        println!("- {problem}");
    }
    Err(anyhow::anyhow!(
        "doctor found {} configuration problem(s): {}",
        problems.len(),
        problems.join("; ")
    ))
}
