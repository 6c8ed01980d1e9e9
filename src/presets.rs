//! Built-in agent sets. Role prompts are fixed strings; only the seed task
//! varies per run.

use crate::agents::{HumanInputMode, SamplingParams};

pub const DEFAULT_PRESET: &str = "architecture-design";

pub const TERMINATE: &str = "TERMINATE";

#[derive(Debug, Clone, Copy)]
pub struct ProxyTemplate {
    pub name: &'static str,
    pub system_message: &'static str,
    pub human_input_mode: HumanInputMode,
    pub max_consecutive_auto_reply: Option<u32>,
    pub terminates_on: Option<&'static str>,
    pub work_dir: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct AssistantTemplate {
    pub name: &'static str,
    pub system_message: &'static str,
    pub sampling: SamplingParams,
    pub max_consecutive_auto_reply: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub proxy: ProxyTemplate,
    pub assistants: &'static [AssistantTemplate],
    pub max_round: u32,
    pub default_task: &'static str,
}

const fn sampling(temperature: f32, max_tokens: Option<u32>, seed: Option<u64>) -> SamplingParams {
    SamplingParams {
        temperature,
        max_tokens,
        seed,
    }
}

const fn assistant(
    name: &'static str,
    system_message: &'static str,
    sampling: SamplingParams,
) -> AssistantTemplate {
    AssistantTemplate {
        name,
        system_message,
        sampling,
        max_consecutive_auto_reply: None,
    }
}

// Shared by the three practice sets.
const PRACTICE_SAMPLING: SamplingParams = sampling(0.1, Some(1024), Some(123));

const fn practice_proxy(name: &'static str) -> ProxyTemplate {
    ProxyTemplate {
        name,
        system_message: "",
        human_input_mode: HumanInputMode::Always,
        max_consecutive_auto_reply: None,
        terminates_on: None,
        work_dir: None,
    }
}

const ARCHITECTURE_ASSISTANTS: &[AssistantTemplate] = &[
    assistant(
        "SolutionArchitect",
        "Expert in analyzing client requirements and designing high-level architecture. \
         Responsible for identifying system boundaries, components, and key workflows.",
        sampling(0.3, Some(1024), Some(123)),
    ),
    assistant(
        "TechnicalArchitect",
        "Expert in recommending tech stacks and security. Ensure compliance, suggest best \
         practices, and highlight data privacy considerations.",
        sampling(0.2, Some(1024), Some(123)),
    ),
    assistant(
        "ImplementationPlanner",
        "Responsible for effort estimation, cost planning, implementation timeline, and risk \
         mitigation.",
        sampling(0.1, Some(1024), Some(123)),
    ),
];

const DATA_ANALYST_ASSISTANTS: &[AssistantTemplate] = &[assistant(
    "Data_Analyst",
    "You are a professional Data Analyst. When installing packages, use 'uv pip install' \
     instead of 'pip install'.",
    sampling(0.0, None, Some(42)),
)];

const TUTORIAL_ASSISTANTS: &[AssistantTemplate] = &[
    assistant(
        "TaskPlanner",
        "You are a senior curriculum architect. Your role is to break down the tutorial request \
         into a logical sequence of chapters. Each chapter should have a title and clear \
         objective. Start from conceptual basics and move to applied and advanced examples. \
         Format the output as a list of chapters with goals.",
        sampling(0.3, None, None),
    ),
    assistant(
        "ContentExpert",
        "You are an expert AI educator and documentation writer. Your role is to generate \
         educational content for each chapter. For each chapter, generate well-structured \
         markdown content with NO CODE. Use headings, bullets, explanations, and inline \
         formulas if needed.",
        sampling(0.4, None, None),
    ),
    assistant(
        "CodeDeveloper",
        "You are a senior Python developer specialized in LLM agents and AI Agents framework. \
         For each chapter, generate full runnable Python code cells that match the content \
         expert's explanation. Use uv pip install in setup cells. Add comments in code. Only \
         return Python code (no markdown)",
        sampling(0.0, None, None),
    ),
    assistant(
        "NotebookBuilder",
        "You are a notebook builder agent. Your job is to receive markdown and code sections \
         from other agents, and compile them into a well-structured Jupyter notebook. Make sure \
         the structure matches the logical flow and save it as autogen_tutorial.ipynb using \
         nbformat.",
        sampling(0.0, None, None),
    ),
    AssistantTemplate {
        name: "Evaluator",
        system_message: "You are a quality assurance expert. You review the notebook plan and \
                         suggest if anything is missing or weak. For example: lack of \
                         real-world use cases, missing API tool demos, or poor task chaining \
                         coverage. Offer 2-3 actionable suggestions, then say CONTINUE.",
        sampling: sampling(0.4, None, None),
        max_consecutive_auto_reply: Some(5),
    },
];

const BRAINSTORM_ASSISTANTS: &[AssistantTemplate] = &[
    assistant(
        "CreativeAgent",
        "You generate bold, original AI product concepts for the founder's domain and explain \
         the user problem each one solves.",
        PRACTICE_SAMPLING,
    ),
    assistant(
        "FeasibilityExpert",
        "You assess technical feasibility of proposed concepts: data needs, model choices, \
         integration effort, and delivery risks.",
        PRACTICE_SAMPLING,
    ),
    assistant(
        "BusinessAnalyst",
        "You evaluate market fit, revenue model, and go-to-market for the strongest concepts and \
         recommend one to pursue.",
        PRACTICE_SAMPLING,
    ),
];

const RISK_ASSISTANTS: &[AssistantTemplate] = &[
    assistant(
        "ThreatModeler",
        "You model the threat described by the CISO: actors, entry points, attack paths, and \
         affected assets.",
        PRACTICE_SAMPLING,
    ),
    assistant(
        "MitigationStrategist",
        "You propose prioritized preventive and detective controls for each identified attack \
         path.",
        PRACTICE_SAMPLING,
    ),
    assistant(
        "ImpactSimulator",
        "You estimate business impact of the threat with and without the proposed mitigations, \
         covering downtime, data loss, and regulatory exposure.",
        PRACTICE_SAMPLING,
    ),
];

const CONTRACT_ASSISTANTS: &[AssistantTemplate] = &[
    assistant(
        "ClauseExtractor",
        "You extract and label the key clauses of the contract: term, termination, \
         responsibilities, SLAs, and data protection.",
        PRACTICE_SAMPLING,
    ),
    assistant(
        "RiskAssessor",
        "You flag legal and operational risks in the extracted clauses, including anything \
         missing that a standard agreement would contain.",
        PRACTICE_SAMPLING,
    ),
    assistant(
        "RevisionSuggester",
        "You draft concrete revised clause language that addresses each flagged risk.",
        PRACTICE_SAMPLING,
    ),
];

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "architecture-design",
        description: "Architecture brainstorming between solution, technical and delivery roles",
        proxy: ProxyTemplate {
            name: "Client",
            system_message: "You are the client. Provide requirements. Reply TERMINATE when \
                             done to end the conversation.",
            human_input_mode: HumanInputMode::Terminate,
            max_consecutive_auto_reply: Some(10),
            terminates_on: Some(TERMINATE),
            work_dir: Some("output"),
        },
        assistants: ARCHITECTURE_ASSISTANTS,
        max_round: 15,
        default_task: "We want to build a healthcare data platform that:\n\
                       1. Allows clinics to upload patient data securely\n\
                       2. Performs analytics on treatment effectiveness\n\
                       3. Provides insights and recommendations\n\
                       4. Must be HIPAA compliant\n\
                       5. Should scale to handle data from multiple clinics\n\
                       6. The system need to design based on Azure Cloud Platform",
    },
    Preset {
        name: "data-analyst",
        description: "Single analyst that writes and runs charting code",
        proxy: ProxyTemplate {
            name: "Client",
            system_message: "Reply TERMINATE if the task has been solved at full satisfaction. \
                             Otherwise, reply CONTINUE, or the reason why the task is not \
                             solved yet.",
            human_input_mode: HumanInputMode::Terminate,
            max_consecutive_auto_reply: Some(10),
            terminates_on: Some(TERMINATE),
            work_dir: Some("coding"),
        },
        assistants: DATA_ANALYST_ASSISTANTS,
        max_round: 10,
        default_task: "Plot a chart of Google and Apple stock price change for the last 30 days.\n\
                       Then save the chart as 'stock_chart.png' and save the code as \
                       'stock_chart.py'.",
    },
    Preset {
        name: "tutorial-lab",
        description: "Five-role team that plans, writes, codes and reviews a tutorial notebook",
        proxy: ProxyTemplate {
            name: "User",
            system_message: "Reply TERMINATE only if the entire tutorial has been successfully \
                             generated and saved.",
            human_input_mode: HumanInputMode::Terminate,
            max_consecutive_auto_reply: Some(10),
            terminates_on: None,
            work_dir: Some("notebook"),
        },
        assistants: TUTORIAL_ASSISTANTS,
        max_round: 15,
        default_task: "Generate a professional AutoGen tutorial notebook that can be used to help \
                       others learn AutoGen framework. The notebook should include AutoGen \
                       framework introduction, key concepts, technical explanation, realistic \
                       examples, tools and memory usage, and advanced agent orchestration. Use \
                       proper markdown headers, comments, uv pip install, and save as \
                       autogen_tutorial.ipynb.",
    },
    Preset {
        name: "product-brainstorm",
        description: "Practice set: AI product ideation with feasibility and business review",
        proxy: practice_proxy("Founder"),
        assistants: BRAINSTORM_ASSISTANTS,
        max_round: 8,
        default_task: "Propose AI product ideas for independent veterinary clinics.",
    },
    Preset {
        name: "risk-intelligence",
        description: "Practice set: threat modeling, mitigation and impact simulation",
        proxy: practice_proxy("CISO"),
        assistants: RISK_ASSISTANTS,
        max_round: 10,
        default_task: "Assess a credential-stuffing campaign against our customer login portal.",
    },
    Preset {
        name: "contract-analysis",
        description: "Practice set: clause extraction, risk review and revision drafting",
        proxy: practice_proxy("LegalCounsel"),
        assistants: CONTRACT_ASSISTANTS,
        max_round: 12,
        default_task: "Please analyze the following contract:\n\
                       This Agreement shall commence on the Effective Date and shall remain in \
                       effect for a period of 12 months, unless earlier terminated by either \
                       party with 30 days' notice.\n\
                       The vendor is responsible for data processing. No explicit SLA or data \
                       protection clause is defined.",
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    let wanted = name.trim();
    PRESETS.iter().find(|preset| preset.name == wanted)
}

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|preset| preset.name).collect()
}
