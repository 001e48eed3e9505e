//! Domain types for the flowsync entity map and on-disk metadata files.
//!
//! The entity map (`map.json`) records the remote identifiers of every
//! project, agent, flow, and skill seen at the last successful sync. Every
//! level is keyed by IDN (the human-readable identifier), never by remote
//! id, so a rename shows up as a path change rather than a silent overwrite.
//!
//! Skill and flow metadata files (`*.meta.yaml`) are the user-editable view
//! of the same records; [`SkillMeta`] and [`FlowMeta`] convert to and from
//! the map entries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed customer identifier; one ledger and map exist per customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerIdn(pub String);

impl fmt::Display for CustomerIdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CustomerIdn {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CustomerIdn {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Leaf records
// ---------------------------------------------------------------------------

/// Model selection shared by flows and skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelRef {
    pub model_idn: String,
    pub provider_idn: String,
}

/// A named skill parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillParameter {
    pub name: String,
    #[serde(default)]
    pub default_value: String,
}

/// An event a flow reacts to. `id` is empty until the event exists remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEvent {
    #[serde(default)]
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_idn: Option<String>,
    #[serde(default)]
    pub interrupt_mode: String,
}

/// A persistent state field of a flow. `id` is empty until created remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateField {
    #[serde(default)]
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub scope: String,
}

// ---------------------------------------------------------------------------
// Entity map
// ---------------------------------------------------------------------------

/// A skill as recorded in the entity map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillInfo {
    /// Remote id; empty when the skill has never existed remotely.
    #[serde(default)]
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub title: String,
    pub runner_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    /// Workspace-relative, forward-slash path of the script file.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub runner_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub skills: BTreeMap<String, SkillInfo>,
    #[serde(default)]
    pub events: Vec<FlowEvent>,
    #[serde(default)]
    pub state_fields: Vec<StateField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub flows: BTreeMap<String, FlowEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectEntry {
    #[serde(default)]
    pub id: String,
    pub idn: String,
    /// Workspace-relative, forward-slash directory of the project tree.
    pub path: String,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentEntry>,
}

/// Root of the persisted entity map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectMap {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
}

/// Address of a flow inside a [`ProjectMap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub project_idn: String,
    pub agent_idn: String,
    pub flow_idn: String,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_idn, self.agent_idn, self.flow_idn)
    }
}

impl ProjectMap {
    pub fn flow(&self, key: &FlowKey) -> Option<&FlowEntry> {
        self.projects
            .get(&key.project_idn)?
            .agents
            .get(&key.agent_idn)?
            .flows
            .get(&key.flow_idn)
    }

    pub fn flow_mut(&mut self, key: &FlowKey) -> Option<&mut FlowEntry> {
        self.projects
            .get_mut(&key.project_idn)?
            .agents
            .get_mut(&key.agent_idn)?
            .flows
            .get_mut(&key.flow_idn)
    }

    /// Every flow address in the map, in sorted order.
    pub fn flow_keys(&self) -> Vec<FlowKey> {
        let mut keys = Vec::new();
        for (project_idn, project) in &self.projects {
            for (agent_idn, agent) in &project.agents {
                for flow_idn in agent.flows.keys() {
                    keys.push(FlowKey {
                        project_idn: project_idn.clone(),
                        agent_idn: agent_idn.clone(),
                        flow_idn: flow_idn.clone(),
                    });
                }
            }
        }
        keys
    }

    pub fn skill_count(&self) -> usize {
        self.projects
            .values()
            .flat_map(|p| p.agents.values())
            .flat_map(|a| a.flows.values())
            .map(|f| f.skills.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Metadata files
// ---------------------------------------------------------------------------

/// Contents of `<skill_idn>.meta.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub idn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_runner_type")]
    pub runner_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
}

fn default_runner_type() -> String {
    "guidance".to_string()
}

impl SkillMeta {
    /// Build the map entry for this metadata, rooted at `path`.
    pub fn to_info(&self, path: String) -> SkillInfo {
        SkillInfo {
            id: self.id.clone(),
            idn: self.idn.clone(),
            title: self.title.clone(),
            runner_type: self.runner_type.clone(),
            model: self.model.clone(),
            parameters: self.parameters.clone(),
            path,
            updated_at: None,
        }
    }
}

/// Contents of `flow.meta.yaml` inside a flow directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub idn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub runner_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub events: Vec<FlowEvent>,
    #[serde(default)]
    pub state_fields: Vec<StateField>,
}

impl FlowMeta {
    pub fn from_entry(idn: &str, flow: &FlowEntry) -> Self {
        Self {
            id: flow.id.clone(),
            idn: idn.to_string(),
            title: flow.title.clone(),
            runner_type: flow.runner_type.clone(),
            model: flow.model.clone(),
            events: flow.events.clone(),
            state_fields: flow.state_fields.clone(),
        }
    }
}

/// File extension of a skill script for a given runner type.
pub fn script_extension(runner_type: &str) -> &'static str {
    match runner_type.to_ascii_lowercase().as_str() {
        "nsl" => "nsl",
        "guidance" => "guidance",
        _ => "jinja",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
