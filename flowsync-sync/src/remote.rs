//! The remote platform seam.
//!
//! [`Platform`] is everything the reconcilers need from the REST API. The
//! transport lives behind it (the CLI ships an HTTP implementation, tests
//! use an in-memory one); nothing here knows about requests or URLs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowsync_core::{FlowEvent, ModelRef, SkillMeta, SkillParameter, StateField};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP {status} from {endpoint}: {message}")]
    Http {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("transport failure calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("cannot decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFlow {
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub default_runner_type: String,
    #[serde(default)]
    pub default_model: Option<ModelRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAgent {
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub flows: Vec<RemoteFlow>,
}

/// A skill as the platform returns it, script included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSkill {
    pub id: String,
    pub idn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub runner_type: String,
    #[serde(default)]
    pub model: Option<ModelRef>,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    #[serde(default)]
    pub prompt_script: String,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RemoteSkill {
    /// The metadata file view of this skill.
    pub fn meta(&self) -> SkillMeta {
        SkillMeta {
            id: self.id.clone(),
            idn: self.idn.clone(),
            title: self.title.clone(),
            runner_type: self.runner_type.clone(),
            model: self.model.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Payload for creating a skill in a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSkill {
    pub idn: String,
    pub title: String,
    pub runner_type: String,
    pub model: Option<ModelRef>,
    pub parameters: Vec<SkillParameter>,
    pub prompt_script: String,
}

impl NewSkill {
    pub fn from_meta(meta: &SkillMeta, prompt_script: String) -> Self {
        Self {
            idn: meta.idn.clone(),
            title: meta.title.clone(),
            runner_type: meta.runner_type.clone(),
            model: meta.model.clone(),
            parameters: meta.parameters.clone(),
            prompt_script,
        }
    }
}

/// Remote operations consumed by pull and push. All calls are
/// request/response; none stream.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>, RemoteError>;

    /// Agents of a project, each with its flows.
    async fn list_agents(&self, project_id: &str) -> Result<Vec<RemoteAgent>, RemoteError>;

    async fn list_flow_skills(&self, flow_id: &str) -> Result<Vec<RemoteSkill>, RemoteError>;

    async fn get_skill(&self, skill_id: &str) -> Result<RemoteSkill, RemoteError>;

    /// Create a skill and return its new remote id.
    async fn create_skill(&self, flow_id: &str, skill: &NewSkill) -> Result<String, RemoteError>;

    async fn update_skill(&self, skill: &RemoteSkill) -> Result<(), RemoteError>;

    async fn delete_skill(&self, skill_id: &str) -> Result<(), RemoteError>;

    async fn list_flow_events(&self, flow_id: &str) -> Result<Vec<FlowEvent>, RemoteError>;

    async fn list_flow_states(&self, flow_id: &str) -> Result<Vec<StateField>, RemoteError>;

    /// Create an event and return its new remote id.
    async fn create_flow_event(&self, flow_id: &str, event: &FlowEvent)
        -> Result<String, RemoteError>;

    /// Create a state field and return its new remote id.
    async fn create_flow_state(&self, flow_id: &str, state: &StateField)
        -> Result<String, RemoteError>;

    async fn publish_flow(&self, flow_id: &str) -> Result<(), RemoteError>;
}
