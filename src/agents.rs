use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::config::LlmConnection;
use crate::presets::{PRESETS, Preset, find_preset, preset_names};
use crate::session::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    UserProxy,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HumanInputMode {
    Always,
    Terminate,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeExecution {
    pub work_dir: String,
    pub use_docker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSpec {
    pub name: String,
    pub role: AgentRole,
    pub system_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingParams>,
    pub human_input_mode: HumanInputMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_auto_reply: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_execution: Option<CodeExecution>,
}

impl AgentSpec {
    /// True when `content` ends the conversation for this agent.
    pub fn is_termination_message(&self, content: &str) -> bool {
        self.termination_suffix
            .as_deref()
            .is_some_and(|suffix| is_termination_message(content, suffix))
    }
}

pub fn is_termination_message(content: &str, suffix: &str) -> bool {
    content.trim_end().ends_with(suffix)
}

/// The fixed participant list of one conversation. The first agent is always
/// the user proxy; every assistant shares the same connection bundle.
#[derive(Debug, Clone)]
pub struct AgentSet {
    pub preset: String,
    pub agents: Vec<AgentSpec>,
    pub max_round: u32,
    pub speaker_selection: String,
    pub default_task: String,
    pub llm: Arc<LlmConnection>,
}

impl AgentSet {
    pub fn from_preset(preset: &Preset, llm: Arc<LlmConnection>) -> Self {
        let proxy = &preset.proxy;
        let mut agents = Vec::with_capacity(preset.assistants.len() + 1);
        agents.push(AgentSpec {
            name: proxy.name.to_string(),
            role: AgentRole::UserProxy,
            system_message: proxy.system_message.to_string(),
            sampling: None,
            human_input_mode: proxy.human_input_mode,
            max_consecutive_auto_reply: proxy.max_consecutive_auto_reply,
            termination_suffix: proxy.terminates_on.map(str::to_string),
            code_execution: proxy.work_dir.map(|dir| CodeExecution {
                work_dir: dir.to_string(),
                use_docker: false,
            }),
        });
        agents.extend(preset.assistants.iter().map(|template| AgentSpec {
            name: template.name.to_string(),
            role: AgentRole::Assistant,
            system_message: template.system_message.to_string(),
            sampling: Some(template.sampling),
            human_input_mode: HumanInputMode::Never,
            max_consecutive_auto_reply: template.max_consecutive_auto_reply,
            termination_suffix: None,
            code_execution: None,
        }));

        Self {
            preset: preset.name.to_string(),
            agents,
            max_round: preset.max_round,
            speaker_selection: "auto".to_string(),
            default_task: preset.default_task.to_string(),
            llm,
        }
    }

    pub fn proxy(&self) -> &AgentSpec {
        &self.agents[0]
    }

    pub fn assistants(&self) -> &[AgentSpec] {
        &self.agents[1..]
    }
}

pub fn build_agent_set(name: &str, llm: Arc<LlmConnection>) -> Result<AgentSet, SessionError> {
    let preset = find_preset(name).ok_or_else(|| SessionError::UnknownPreset {
        name: name.trim().to_string(),
        available: preset_names().join(", "),
    })?;
    Ok(AgentSet::from_preset(preset, llm))
}

pub fn run_presets_list(active_preset: &str) -> Result<()> {
    println!("Available presets (active='{}'):", active_preset);
    for preset in PRESETS {
        let marker = if preset.name == active_preset { "*" } else { " " };
        println!(
            "{marker} {} ({} agents, max_round={}) - {}",
            preset.name,
            preset.assistants.len() + 1,
            preset.max_round,
            preset.description
        );
    }
    Ok(())
}

pub fn run_presets_show(active_preset: &str, requested_name: Option<String>) -> Result<()> {
    let name = requested_name.unwrap_or_else(|| active_preset.to_string());
    let preset = find_preset(&name).ok_or_else(|| SessionError::UnknownPreset {
        name: name.clone(),
        available: preset_names().join(", "),
    })?;

    println!("Preset: {}", preset.name);
    println!("Description: {}", preset.description);
    println!("Max rounds: {}", preset.max_round);
    println!(
        "Proxy: {} (human_input={:?}, max_auto_reply={}, terminates_on={}, work_dir={})",
        preset.proxy.name,
        preset.proxy.human_input_mode,
        preset
            .proxy
            .max_consecutive_auto_reply
            .map(|n| n.to_string())
            .unwrap_or_else(|| "<default>".to_string()),
        preset.proxy.terminates_on.unwrap_or("<none>"),
        preset.proxy.work_dir.unwrap_or("<none>")
    );
    println!("Assistants:");
    for assistant in preset.assistants {
        println!(
            "- {} (temperature={}, max_tokens={}, seed={})",
            assistant.name,
            assistant.sampling.temperature,
            assistant
                .sampling
                .max_tokens
                .map(|n| n.to_string())
                .unwrap_or_else(|| "<default>".to_string()),
            assistant
                .sampling
                .seed
                .map(|n| n.to_string())
                .unwrap_or_else(|| "<none>".to_string())
        );
        println!("  {}", assistant.system_message);
    }
    println!("Default task:\n{}", preset.default_task);
    Ok(())
}
