//! Pull: fetch remote state and reconcile it into the local tree.
//!
//! Fan-out is projects → agents → flows → skills, each level with its own
//! pool. Every file a pull produces (skill scripts, skill and flow metadata,
//! each project's `flows.yaml`) goes through the three-way check against the
//! ledger loaded at the start of the run. Results land in a fresh ledger and
//! a fresh entity map; both are persisted only if no item failed.
//!
//! A skill tracked in the previous map but missing from its flow's listing
//! was deleted remotely. Its local files are left alone and drop out of the
//! map; the run warns about each one and counts them as `vanished`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use flowsync_core::{
    metadata, paths, project_map, AgentEntry, CustomerIdn, FlowEntry, FlowKey, FlowMeta,
    ProjectEntry, ProjectMap,
};

use crate::error::SyncError;
use crate::hash_store::{self, HashStore};
use crate::lock::WorkspaceLock;
use crate::pool::{self, Pool};
use crate::reconcile::{FileOutcome, Session};
use crate::remote::{Platform, RemoteAgent, RemoteFlow, RemoteProject, RemoteSkill};
use crate::workspace::Workspace;

pub const LOCK_NAME: &str = "pull";

#[derive(Debug, Clone, Copy, Default)]
pub struct PullOptions {
    pub force: bool,
    /// Show full files instead of 3 lines of context in prompts.
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub projects: usize,
    pub agents: usize,
    pub flows: usize,
    pub skills: usize,
    pub written: usize,
    pub unchanged: usize,
    pub diverged: usize,
    pub declined: usize,
    /// Previously tracked skills the platform no longer lists.
    pub vanished: usize,
    /// The run ended forced, by `--force` or an apply-to-all answer.
    pub force_all: bool,
}

impl PullReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Written => self.written += 1,
            FileOutcome::Diverged => self.diverged += 1,
            FileOutcome::Declined => self.declined += 1,
        }
    }

    /// Files changed on disk.
    pub fn changes(&self) -> usize {
        self.written
    }
}

/// Pull under the `pull` workspace lock.
pub async fn pull(workspace: &Workspace, options: PullOptions) -> Result<PullReport, SyncError> {
    let _lock = WorkspaceLock::acquire(&workspace.root, LOCK_NAME)?;
    pull_unlocked(workspace, options).await
}

/// Pull without taking a lock; the caller holds one.
pub async fn pull_unlocked(
    workspace: &Workspace,
    options: PullOptions,
) -> Result<PullReport, SyncError> {
    let root = &workspace.root;
    let customer = &workspace.customer;
    let old_ledger = hash_store::load_at(root, customer)?;
    let old_map = project_map::load_at(root, customer)?;
    tracing::info!(customer = %customer, tracked = old_ledger.len(), "pull started");

    let run = Arc::new(PullRun {
        session: Session::new(
            root,
            workspace.confirmer.clone(),
            ProjectMap::default(),
            HashStore::new(),
            options.force,
            options.verbose,
            workspace.cancel.clone(),
            PullReport::default(),
        ),
        old_ledger,
        old_map,
        platform: workspace.platform.clone(),
        customer: customer.clone(),
    });

    let projects = workspace.platform.list_projects().await?;
    let failures = Pool::new(pool::PROJECTS, workspace.cancel.clone())
        .run(projects, |project| {
            let run = run.clone();
            async move { run.pull_project(project).await }
        })
        .await;
    SyncError::from_failures(failures)?;

    let mut state = run.session.state.lock().await;
    project_map::save_at(root, customer, &state.map)?;
    hash_store::save_at(root, customer, &state.ledger)?;

    let mut report = std::mem::take(&mut state.tally);
    report.force_all = state.force;
    tracing::info!(
        written = report.written,
        unchanged = report.unchanged,
        diverged = report.diverged,
        declined = report.declined,
        vanished = report.vanished,
        "pull finished"
    );
    Ok(report)
}

struct PullRun {
    session: Session<PullReport>,
    old_ledger: HashStore,
    old_map: ProjectMap,
    platform: Arc<dyn Platform>,
    customer: CustomerIdn,
}

impl PullRun {
    async fn reconcile(&self, path: PathBuf, incoming: &[u8]) -> Result<(), SyncError> {
        let outcome = self
            .session
            .reconcile_incoming(&self.old_ledger, &path, incoming)
            .await?;
        self.session.state.lock().await.tally.record(outcome);
        Ok(())
    }

    async fn pull_project(self: Arc<Self>, project: RemoteProject) -> Result<(), SyncError> {
        let agents = self.platform.list_agents(&project.id).await?;
        let project_dir = paths::project_dir(&self.session.root, &self.customer, &project.idn);
        {
            let mut state = self.session.state.lock().await;
            state.map.projects.insert(
                project.idn.clone(),
                ProjectEntry {
                    id: project.id.clone(),
                    idn: project.idn.clone(),
                    path: self.session.key(&project_dir),
                    agents: BTreeMap::new(),
                },
            );
            state.tally.projects += 1;
        }

        let failures = Pool::new(pool::AGENTS, self.session.cancel.clone())
            .run(agents, |agent| {
                let run = self.clone();
                let project_idn = project.idn.clone();
                async move { run.pull_agent(project_idn, agent).await }
            })
            .await;
        SyncError::from_failures(failures)?;

        let document = {
            let state = self.session.state.lock().await;
            match state.map.projects.get(&project.idn) {
                Some(entry) => metadata::render_project_flows(entry)?,
                None => return Ok(()),
            }
        };
        self.reconcile(
            project_dir.join(paths::PROJECT_METADATA_FILE),
            document.as_bytes(),
        )
        .await
    }

    async fn pull_agent(
        self: Arc<Self>,
        project_idn: String,
        agent: RemoteAgent,
    ) -> Result<(), SyncError> {
        {
            let mut state = self.session.state.lock().await;
            if let Some(project) = state.map.projects.get_mut(&project_idn) {
                project.agents.insert(
                    agent.idn.clone(),
                    AgentEntry {
                        id: agent.id.clone(),
                        title: agent.title.clone(),
                        flows: BTreeMap::new(),
                    },
                );
            }
            state.tally.agents += 1;
        }

        let failures = Pool::new(pool::FLOWS, self.session.cancel.clone())
            .run(agent.flows, |flow| {
                let run = self.clone();
                let key = FlowKey {
                    project_idn: project_idn.clone(),
                    agent_idn: agent.idn.clone(),
                    flow_idn: flow.idn.clone(),
                };
                async move { run.pull_flow(key, flow).await }
            })
            .await;
        SyncError::from_failures(failures)
    }

    async fn pull_flow(self: Arc<Self>, key: FlowKey, flow: RemoteFlow) -> Result<(), SyncError> {
        let skills = self.platform.list_flow_skills(&flow.id).await?;
        let events = self.platform.list_flow_events(&flow.id).await?;
        let state_fields = self.platform.list_flow_states(&flow.id).await?;
        self.warn_vanished(&key, &skills).await;

        let flow_dir = paths::flow_dir(
            &self.session.root,
            &self.customer,
            &key.project_idn,
            &key.agent_idn,
            &key.flow_idn,
        );
        let entry = FlowEntry {
            id: flow.id.clone(),
            title: flow.title.clone(),
            runner_type: flow.default_runner_type.clone(),
            model: flow.default_model.clone(),
            skills: BTreeMap::new(),
            events,
            state_fields,
        };
        let flow_meta = metadata::render_flow_meta(&FlowMeta::from_entry(&key.flow_idn, &entry))?;
        {
            let mut state = self.session.state.lock().await;
            if let Some(agent) = state
                .map
                .projects
                .get_mut(&key.project_idn)
                .and_then(|p| p.agents.get_mut(&key.agent_idn))
            {
                agent.flows.insert(key.flow_idn.clone(), entry);
            }
            state.tally.flows += 1;
        }
        self.reconcile(flow_dir.join(paths::FLOW_META_FILE), flow_meta.as_bytes())
            .await?;

        let failures = Pool::new(pool::SKILLS, self.session.cancel.clone())
            .run(skills, |skill| {
                let run = self.clone();
                let key = key.clone();
                let flow_dir = flow_dir.clone();
                async move { run.pull_skill(key, flow_dir, skill).await }
            })
            .await;
        SyncError::from_failures(failures)
    }

    async fn warn_vanished(&self, key: &FlowKey, listed: &[RemoteSkill]) {
        let Some(previous) = self.old_map.flow(key) else {
            return;
        };
        let mut vanished = 0;
        for info in previous.skills.values() {
            if info.id.is_empty() || listed.iter().any(|s| s.id == info.id) {
                continue;
            }
            tracing::warn!(
                path = %info.path,
                id = %info.id,
                "skill was deleted remotely; local files are no longer tracked"
            );
            vanished += 1;
        }
        if vanished > 0 {
            self.session.state.lock().await.tally.vanished += vanished;
        }
    }

    async fn pull_skill(
        self: Arc<Self>,
        key: FlowKey,
        flow_dir: PathBuf,
        skill: RemoteSkill,
    ) -> Result<(), SyncError> {
        let script_path = paths::skill_script_path(&flow_dir, &skill.idn, &skill.runner_type);
        let meta_path = paths::skill_meta_path(&flow_dir, &skill.idn);
        let meta = skill.meta();
        let meta_doc = metadata::render_skill_meta(&meta)?;

        self.reconcile(script_path.clone(), skill.prompt_script.as_bytes())
            .await?;
        self.reconcile(meta_path, meta_doc.as_bytes()).await?;

        let mut info = meta.to_info(self.session.key(&script_path));
        info.updated_at = skill.updated_at;
        let mut state = self.session.state.lock().await;
        if let Some(flow) = state.map.flow_mut(&key) {
            flow.skills.insert(skill.idn.clone(), info);
        }
        state.tally.skills += 1;
        Ok(())
    }
}
