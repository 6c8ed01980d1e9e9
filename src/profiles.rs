use anyhow::Result;

use crate::cli::{driver_label, relay_mode_label};
use crate::config::{ProfilesFile, RuntimeConfig};

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!("App: {}", cfg.app_name);
    println!("Preset: {}", cfg.preset);
    println!("Driver: {}", driver_label(cfg.driver));
    println!(
        "Driver command: {}",
        cfg.driver_command.as_deref().unwrap_or("<not configured>")
    );
    println!(
        "Transcript path: {}",
        cfg.transcript_path.as_deref().unwrap_or("<not configured>")
    );
    println!("Transcript delay (ms): {}", cfg.transcript_delay_ms);
    println!("Relay mode: {}", relay_mode_label(cfg.relay_mode));
    println!("Poll interval (ms): {}", cfg.poll_interval_ms);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
