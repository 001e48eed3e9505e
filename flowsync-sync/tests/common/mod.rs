//! Shared fixtures: an in-memory platform and a scripted confirmer.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use flowsync_core::{CustomerIdn, FlowEvent, StateField};
use flowsync_sync::{
    Confirmer, Decision, NewSkill, Platform, ProposedChange, ProposedDeletion, RemoteAgent,
    RemoteError, RemoteFlow, RemoteProject, RemoteSkill, Workspace,
};

pub const FLOW_ID: &str = "f-1";
pub const FLOW_DIR: &str = "projects/acme/support/bot/main";
pub const PROJECT_DOC: &str = "projects/acme/support/flows.yaml";

pub fn acme() -> CustomerIdn {
    CustomerIdn::from("acme")
}

pub fn skill(id: &str, idn: &str, runner_type: &str, script: &str) -> RemoteSkill {
    RemoteSkill {
        id: id.to_string(),
        idn: idn.to_string(),
        title: format!("{idn} title"),
        runner_type: runner_type.to_string(),
        model: None,
        parameters: vec![],
        prompt_script: script.to_string(),
        updated_at: None,
    }
}

#[derive(Default)]
struct FakeState {
    projects: Vec<RemoteProject>,
    agents: HashMap<String, Vec<RemoteAgent>>,
    skills: HashMap<String, Vec<RemoteSkill>>,
    events: HashMap<String, Vec<FlowEvent>>,
    states: HashMap<String, Vec<StateField>>,
    calls: Vec<String>,
    next_id: usize,
    fail_agents: bool,
}

/// One project `support` → agent `bot` → flow `main` (`f-1`).
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(skills: Vec<RemoteSkill>) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.projects.push(RemoteProject {
                id: "p-1".to_string(),
                idn: "support".to_string(),
                title: "Support".to_string(),
            });
            state.agents.insert(
                "p-1".to_string(),
                vec![RemoteAgent {
                    id: "a-1".to_string(),
                    idn: "bot".to_string(),
                    title: "Bot".to_string(),
                    flows: vec![RemoteFlow {
                        id: FLOW_ID.to_string(),
                        idn: "main".to_string(),
                        title: "Main".to_string(),
                        default_runner_type: "nsl".to_string(),
                        default_model: None,
                    }],
                }],
            );
            state.skills.insert(FLOW_ID.to_string(), skills);
        }
        Arc::new(fake)
    }

    pub fn set_script(&self, skill_id: &str, script: &str) {
        let mut state = self.state.lock().unwrap();
        for skill in state.skills.values_mut().flatten() {
            if skill.id == skill_id {
                skill.prompt_script = script.to_string();
            }
        }
    }

    pub fn skill(&self, skill_id: &str) -> Option<RemoteSkill> {
        let state = self.state.lock().unwrap();
        state
            .skills
            .values()
            .flatten()
            .find(|s| s.id == skill_id)
            .cloned()
    }

    /// Delete a skill behind the workspace's back, without recording a call.
    pub fn remove_skill(&self, skill_id: &str) {
        let mut state = self.state.lock().unwrap();
        for skills in state.skills.values_mut() {
            skills.retain(|s| s.id != skill_id);
        }
    }

    pub fn add_event(&self, event: FlowEvent) {
        let mut state = self.state.lock().unwrap();
        state.events.entry(FLOW_ID.to_string()).or_default().push(event);
    }

    pub fn events(&self) -> Vec<FlowEvent> {
        let state = self.state.lock().unwrap();
        state.events.get(FLOW_ID).cloned().unwrap_or_default()
    }

    pub fn fail_agent_listing(&self) {
        self.state.lock().unwrap().fail_agents = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{prefix}-new-{}", state.next_id)
    }
}

fn not_found(kind: &'static str, id: &str) -> RemoteError {
    RemoteError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
        self.record("list_projects".to_string());
        Ok(self.state.lock().unwrap().projects.clone())
    }

    async fn list_agents(&self, project_id: &str) -> Result<Vec<RemoteAgent>, RemoteError> {
        self.record(format!("list_agents:{project_id}"));
        let state = self.state.lock().unwrap();
        if state.fail_agents {
            return Err(RemoteError::Http {
                endpoint: format!("/projects/{project_id}/agents"),
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(state.agents.get(project_id).cloned().unwrap_or_default())
    }

    async fn list_flow_skills(&self, flow_id: &str) -> Result<Vec<RemoteSkill>, RemoteError> {
        self.record(format!("list_flow_skills:{flow_id}"));
        let state = self.state.lock().unwrap();
        Ok(state.skills.get(flow_id).cloned().unwrap_or_default())
    }

    async fn get_skill(&self, skill_id: &str) -> Result<RemoteSkill, RemoteError> {
        self.record(format!("get_skill:{skill_id}"));
        self.skill(skill_id).ok_or_else(|| not_found("skill", skill_id))
    }

    async fn create_skill(&self, flow_id: &str, new: &NewSkill) -> Result<String, RemoteError> {
        self.record(format!("create_skill:{}", new.idn));
        let id = self.next_id("s");
        let mut state = self.state.lock().unwrap();
        state.skills.entry(flow_id.to_string()).or_default().push(RemoteSkill {
            id: id.clone(),
            idn: new.idn.clone(),
            title: new.title.clone(),
            runner_type: new.runner_type.clone(),
            model: new.model.clone(),
            parameters: new.parameters.clone(),
            prompt_script: new.prompt_script.clone(),
            updated_at: None,
        });
        Ok(id)
    }

    async fn update_skill(&self, skill: &RemoteSkill) -> Result<(), RemoteError> {
        self.record(format!("update_skill:{}", skill.id));
        let mut state = self.state.lock().unwrap();
        let slot = state
            .skills
            .values_mut()
            .flatten()
            .find(|s| s.id == skill.id)
            .ok_or_else(|| not_found("skill", &skill.id))?;
        *slot = skill.clone();
        Ok(())
    }

    async fn delete_skill(&self, skill_id: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_skill:{skill_id}"));
        let mut state = self.state.lock().unwrap();
        for skills in state.skills.values_mut() {
            skills.retain(|s| s.id != skill_id);
        }
        Ok(())
    }

    async fn list_flow_events(&self, flow_id: &str) -> Result<Vec<FlowEvent>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state.events.get(flow_id).cloned().unwrap_or_default())
    }

    async fn list_flow_states(&self, flow_id: &str) -> Result<Vec<StateField>, RemoteError> {
        let state = self.state.lock().unwrap();
        Ok(state.states.get(flow_id).cloned().unwrap_or_default())
    }

    async fn create_flow_event(
        &self,
        flow_id: &str,
        event: &FlowEvent,
    ) -> Result<String, RemoteError> {
        self.record(format!("create_flow_event:{}", event.idn));
        let id = self.next_id("e");
        let mut created = event.clone();
        created.id = id.clone();
        let mut state = self.state.lock().unwrap();
        state.events.entry(flow_id.to_string()).or_default().push(created);
        Ok(id)
    }

    async fn create_flow_state(
        &self,
        flow_id: &str,
        field: &StateField,
    ) -> Result<String, RemoteError> {
        self.record(format!("create_flow_state:{}", field.idn));
        let id = self.next_id("st");
        let mut created = field.clone();
        created.id = id.clone();
        let mut state = self.state.lock().unwrap();
        state.states.entry(flow_id.to_string()).or_default().push(created);
        Ok(id)
    }

    async fn publish_flow(&self, flow_id: &str) -> Result<(), RemoteError> {
        self.record(format!("publish_flow:{flow_id}"));
        Ok(())
    }
}

/// Answers prompts from a queue, declining once it runs dry.
#[derive(Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<Decision>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: Vec<Decision>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        })
    }

    /// Paths prompted for, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn answer(&self, path: &str) -> Decision {
        self.asked.lock().unwrap().push(path.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Decision::Decline)
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm_change(&self, change: &ProposedChange) -> Decision {
        self.answer(&change.path)
    }

    fn confirm_delete(&self, deletion: &ProposedDeletion) -> Decision {
        self.answer(&deletion.path)
    }
}

pub fn workspace(
    root: &Path,
    platform: Arc<FakePlatform>,
    confirmer: Arc<ScriptedConfirmer>,
) -> Workspace {
    Workspace::new(root, acme(), platform, confirmer)
}

pub fn flow_file(root: &TempDir, name: &str) -> PathBuf {
    root.path().join(FLOW_DIR).join(name)
}

pub fn flow_key(name: &str) -> String {
    format!("{FLOW_DIR}/{name}")
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
