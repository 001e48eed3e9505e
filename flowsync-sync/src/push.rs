//! Push: reconcile the local tree into the remote platform.
//!
//! Per tracked skill in the entity map:
//!
//! | local script | remote id | action                                        |
//! |--------------|-----------|-----------------------------------------------|
//! | present      | known     | update if changed locally and not remotely    |
//! | absent       | known     | delete remotely (confirmed unless forced)     |
//! | either       | unknown   | skip, "run pull first"                        |
//!
//! A `<skill>.meta.yaml` under a tracked flow with no map entry is a new
//! skill: it is created remotely and its id written back into the file. An
//! untracked file that already carries an id belonged to a skill deleted
//! remotely; it is refused rather than recreated.
//! Events and state fields in `flow.meta.yaml` without an id are created the
//! same way.
//!
//! After every flow is processed, projects whose skill set changed get their
//! `flows.yaml` regenerated, the map and ledger are persisted, and each flow
//! with genuine updates is republished once.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use flowsync_core::{metadata, paths, project_map, CustomerIdn, FlowKey, SkillInfo, SkillMeta};

use crate::confirm::{ProposedChange, ProposedDeletion};
use crate::diff;
use crate::error::{io_err, SyncError};
use crate::hash_store;
use crate::lock::WorkspaceLock;
use crate::pool::{self, Pool};
use crate::reconcile::{summary, write_atomic, Session};
use crate::remote::{NewSkill, Platform, RemoteSkill};
use crate::snapshot::FlowSnapshotCache;
use crate::workspace::Workspace;

pub const LOCK_NAME: &str = "push";

#[derive(Debug, Clone, Copy)]
pub struct PushOptions {
    pub force: bool,
    pub verbose: bool,
    /// Republish flows whose skills were updated.
    pub publish: bool,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            force: false,
            verbose: false,
            publish: true,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct PushReport {
    pub updated: usize,
    pub created: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Skipped because the remote copy moved since the last pull.
    pub remote_changed: usize,
    /// Skipped because the skill has no remote id.
    pub untracked: usize,
    pub declined: usize,
    pub events_created: usize,
    pub state_fields_created: usize,
    /// Projects whose `flows.yaml` was regenerated, sorted.
    pub regenerated: Vec<String>,
    /// Flows republished, sorted.
    pub republished: Vec<String>,
    /// The run ended forced, by `--force` or an apply-to-all answer.
    pub force_all: bool,
    /// Per-item failures. The map and ledger were still persisted.
    #[serde(skip)]
    pub failures: Vec<SyncError>,
}

impl PushReport {
    /// Remote mutations performed on skills.
    pub fn changes(&self) -> usize {
        self.updated + self.created + self.deleted
    }

    /// Move the collected failures out as one error.
    pub fn take_error(&mut self) -> Result<(), SyncError> {
        SyncError::from_failures(std::mem::take(&mut self.failures))
    }
}

/// Run-internal bookkeeping behind the session lock.
#[derive(Debug, Default)]
struct PushTally {
    report: PushReport,
    /// Flow id → flow, for flows with updated skills.
    republish: BTreeMap<String, FlowKey>,
    /// Projects whose skill set changed.
    regenerate: BTreeSet<String>,
}

/// Push reconciler for one workspace.
#[derive(Debug, Clone)]
pub struct SkillSyncService {
    workspace: Workspace,
}

impl SkillSyncService {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Push under the `push` workspace lock.
    pub async fn push(&self, options: PushOptions) -> Result<PushReport, SyncError> {
        let _lock = WorkspaceLock::acquire(&self.workspace.root, LOCK_NAME)?;
        self.push_unlocked(options).await
    }

    /// Push without taking a lock; the caller holds one.
    pub async fn push_unlocked(&self, options: PushOptions) -> Result<PushReport, SyncError> {
        let ws = &self.workspace;
        let map = project_map::load_at(&ws.root, &ws.customer)?;
        let ledger = hash_store::load_at(&ws.root, &ws.customer)?;
        let flows = map.flow_keys();
        tracing::info!(
            customer = %ws.customer,
            flows = flows.len(),
            skills = map.skill_count(),
            "push started"
        );

        let run = Arc::new(PushRun {
            session: Session::new(
                &ws.root,
                ws.confirmer.clone(),
                map,
                ledger,
                options.force,
                options.verbose,
                ws.cancel.clone(),
                PushTally::default(),
            ),
            platform: ws.platform.clone(),
            cache: FlowSnapshotCache::new(),
            customer: ws.customer.clone(),
        });

        let mut failures = Pool::new(pool::FLOWS, ws.cancel.clone())
            .run(flows, |key| {
                let run = run.clone();
                async move { run.push_flow(key).await }
            })
            .await;

        let projects: Vec<String> = {
            let state = run.session.state.lock().await;
            state.tally.regenerate.iter().cloned().collect()
        };
        failures.extend(
            Pool::new(pool::flow_phase_limit(projects.len()), ws.cancel.clone())
                .run(projects, |project_idn| {
                    let run = run.clone();
                    async move { run.regenerate(project_idn).await }
                })
                .await,
        );

        let to_publish: Vec<(String, FlowKey)> = {
            let state = run.session.state.lock().await;
            if let Err(err) = project_map::save_at(&ws.root, &ws.customer, &state.map) {
                tracing::error!("failed to persist entity map: {err}");
                failures.push(err.into());
            }
            if let Err(err) = hash_store::save_at(&ws.root, &ws.customer, &state.ledger) {
                tracing::error!("failed to persist ledger: {err}");
                failures.push(err);
            }
            if options.publish {
                state
                    .tally
                    .republish
                    .iter()
                    .map(|(id, key)| (id.clone(), key.clone()))
                    .collect()
            } else {
                Vec::new()
            }
        };

        failures.extend(
            Pool::new(pool::flow_phase_limit(to_publish.len()), ws.cancel.clone())
                .run(to_publish, |(flow_id, key)| {
                    let run = run.clone();
                    async move { run.publish(flow_id, key).await }
                })
                .await,
        );

        let mut state = run.session.state.lock().await;
        let mut report = std::mem::take(&mut state.tally.report);
        report.force_all = state.force;
        report.regenerated.sort();
        report.republished.sort();
        if let Err(err) = SyncError::from_failures(failures) {
            report.failures = match err {
                SyncError::Batch(all) => all,
                single => vec![single],
            };
        }
        tracing::info!(
            updated = report.updated,
            created = report.created,
            deleted = report.deleted,
            unchanged = report.unchanged,
            remote_changed = report.remote_changed,
            failed = report.failures.len(),
            "push finished"
        );
        Ok(report)
    }
}

enum SkillJob {
    Tracked(SkillInfo),
    Create(PathBuf),
}

struct FlowContext {
    key: FlowKey,
    flow_id: String,
    flow_dir: PathBuf,
}

struct PushRun {
    session: Session<PushTally>,
    platform: Arc<dyn Platform>,
    cache: FlowSnapshotCache,
    customer: CustomerIdn,
}

impl PushRun {
    async fn push_flow(self: Arc<Self>, key: FlowKey) -> Result<(), SyncError> {
        let Some(flow) = self.session.state.lock().await.map.flow(&key).cloned() else {
            return Ok(());
        };
        let flow_dir = paths::flow_dir(
            &self.session.root,
            &self.customer,
            &key.project_idn,
            &key.agent_idn,
            &key.flow_idn,
        );

        let mut jobs: Vec<SkillJob> = flow.skills.values().cloned().map(SkillJob::Tracked).collect();
        jobs.extend(
            untracked_meta_files(&flow_dir, &flow.skills)?
                .into_iter()
                .map(SkillJob::Create),
        );

        let ctx = Arc::new(FlowContext {
            key,
            flow_id: flow.id,
            flow_dir,
        });
        let mut failures = Pool::new(pool::SKILLS, self.session.cancel.clone())
            .run(jobs, |job| {
                let run = self.clone();
                let ctx = ctx.clone();
                async move {
                    match job {
                        SkillJob::Tracked(info) => run.push_skill(&ctx, info).await,
                        SkillJob::Create(meta_path) => run.create_skill(&ctx, meta_path).await,
                    }
                }
            })
            .await;

        if let Err(err) = self.push_flow_fields(&ctx).await {
            failures.push(err);
        }
        SyncError::from_failures(failures)
    }

    async fn push_skill(&self, ctx: &FlowContext, info: SkillInfo) -> Result<(), SyncError> {
        let root = &self.session.root;
        let script_key = info.path.clone();
        let script_path = paths::resolve_key(root, &script_key);
        let meta_path = paths::skill_meta_path(&ctx.flow_dir, &info.idn);
        let meta_key = self.session.key(&meta_path);

        let Some(local) = hash_store::read_optional(&script_path)? else {
            return self.delete_skill(ctx, &info, &meta_path).await;
        };
        if info.id.is_empty() {
            tracing::warn!(path = %script_key, "skill has no remote id; run pull first");
            self.session.state.lock().await.tally.report.untracked += 1;
            return Ok(());
        }

        let local_hash = hash_store::hash_bytes(&local);
        let local_meta_raw = hash_store::read_optional(&meta_path)?;
        let local_meta = match &local_meta_raw {
            Some(raw) => Some(metadata::parse_skill_meta(
                &meta_path,
                &String::from_utf8_lossy(raw),
            )?),
            None => None,
        };
        let meta_hash = local_meta_raw.as_deref().map(hash_store::hash_bytes);
        let (baseline, meta_baseline) = {
            let state = self.session.state.lock().await;
            (
                state.ledger.get(&script_key).cloned(),
                state.ledger.get(&meta_key).cloned(),
            )
        };

        let remote = self
            .cache
            .lookup(self.platform.as_ref(), &ctx.flow_id, &info.id, &info.idn)
            .await?;
        let Some(remote) = remote else {
            tracing::warn!(path = %script_key, "skill no longer exists remotely; run pull first");
            self.session.state.lock().await.tally.report.remote_changed += 1;
            return Ok(());
        };
        let remote_hash = hash_store::hash_bytes(remote.prompt_script.as_bytes());
        if remote_hash != baseline.as_deref().unwrap_or(&remote_hash) {
            tracing::warn!(path = %script_key, "remote changed since last pull; run pull first");
            self.session.state.lock().await.tally.report.remote_changed += 1;
            return Ok(());
        }

        let script_changed = baseline.as_deref() != Some(local_hash.as_str());
        let meta_changed = match &meta_hash {
            Some(hash) => meta_baseline.as_deref() != Some(hash.as_str()),
            None => false,
        };
        if !script_changed && !meta_changed {
            tracing::debug!(path = %script_key, "unchanged");
            self.session.state.lock().await.tally.report.unchanged += 1;
            return Ok(());
        }

        let change = if script_changed {
            let before = remote.prompt_script.as_bytes().to_vec();
            ProposedChange {
                path: script_key.clone(),
                lines: diff::generate(&before, &local, self.session.prompt_context()),
                before,
                after: local.clone(),
                context: format!("push {}", ctx.key),
            }
        } else {
            let before = metadata::render_skill_meta(&remote.meta())?.into_bytes();
            let after = local_meta_raw.clone().unwrap_or_default();
            ProposedChange {
                path: meta_key.clone(),
                lines: diff::generate(&before, &after, self.session.prompt_context()),
                before,
                after,
                context: format!("push {}", ctx.key),
            }
        };
        if !self.session.confirm_change(change).await?.approves() {
            tracing::info!(path = %script_key, "declined; remote left as is");
            self.session.state.lock().await.tally.report.declined += 1;
            return Ok(());
        }

        let meta = local_meta.unwrap_or_else(|| remote.meta());
        let updated = RemoteSkill {
            id: remote.id.clone(),
            idn: remote.idn.clone(),
            title: meta.title.clone(),
            runner_type: meta.runner_type.clone(),
            model: meta.model.clone(),
            parameters: meta.parameters.clone(),
            prompt_script: String::from_utf8_lossy(&local).into_owned(),
            updated_at: remote.updated_at,
        };
        self.platform.update_skill(&updated).await?;
        self.cache.invalidate(&ctx.flow_id).await;
        tracing::info!(
            path = %script_key,
            "updated remote skill{}",
            summary(&script_key, &diff::generate(remote.prompt_script.as_bytes(), &local, diff::SUMMARY_CONTEXT))
        );

        let mut state = self.session.state.lock().await;
        state.ledger.insert(script_key, local_hash);
        if let Some(hash) = meta_hash {
            state.ledger.insert(meta_key, hash);
        }
        if let Some(entry) = state
            .map
            .flow_mut(&ctx.key)
            .and_then(|flow| flow.skills.get_mut(&info.idn))
        {
            entry.title = meta.title;
            entry.runner_type = meta.runner_type;
            entry.model = meta.model;
            entry.parameters = meta.parameters;
        }
        let tally = &mut state.tally;
        tally.report.updated += 1;
        tally
            .republish
            .insert(ctx.flow_id.clone(), ctx.key.clone());
        Ok(())
    }

    async fn delete_skill(
        &self,
        ctx: &FlowContext,
        info: &SkillInfo,
        meta_path: &Path,
    ) -> Result<(), SyncError> {
        let script_key = info.path.clone();
        if info.id.is_empty() {
            tracing::warn!(path = %script_key, "local file missing and no remote id; run pull first");
            self.session.state.lock().await.tally.report.untracked += 1;
            return Ok(());
        }

        let deletion = ProposedDeletion {
            path: script_key.clone(),
            skill_idn: info.idn.clone(),
            skill_id: info.id.clone(),
            context: format!("push {}", ctx.key),
        };
        if !self.session.confirm_delete(deletion).await?.approves() {
            tracing::info!(path = %script_key, "deletion declined");
            self.session.state.lock().await.tally.report.declined += 1;
            return Ok(());
        }

        self.platform.delete_skill(&info.id).await?;
        self.cache.invalidate(&ctx.flow_id).await;
        match std::fs::remove_file(meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(meta_path, e)),
        }
        tracing::info!(path = %script_key, id = %info.id, "deleted remote skill");

        let meta_key = self.session.key(meta_path);
        let mut state = self.session.state.lock().await;
        if let Some(flow) = state.map.flow_mut(&ctx.key) {
            flow.skills.remove(&info.idn);
        }
        state.ledger.remove(&script_key);
        state.ledger.remove(&meta_key);
        state.tally.report.deleted += 1;
        state
            .tally
            .regenerate
            .insert(ctx.key.project_idn.clone());
        Ok(())
    }

    async fn create_skill(&self, ctx: &FlowContext, meta_path: PathBuf) -> Result<(), SyncError> {
        let meta_key = self.session.key(&meta_path);
        let file_name = meta_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = paths::skill_idn_from_meta_file(&file_name)
            .unwrap_or_default()
            .to_string();

        let raw = std::fs::read_to_string(&meta_path).map_err(|e| io_err(&meta_path, e))?;
        let mut meta: SkillMeta = metadata::parse_skill_meta(&meta_path, &raw)?;
        if meta.idn.is_empty() {
            meta.idn = stem.clone();
        } else if meta.idn != stem {
            return Err(SyncError::structural(
                meta_key,
                format!("idn '{}' does not match the file name", meta.idn),
            ));
        }
        if !meta.id.is_empty() {
            return Err(SyncError::structural(
                meta_key,
                format!("has remote id '{}' but is not tracked; run pull", meta.id),
            ));
        }
        if ctx.flow_id.is_empty() {
            return Err(SyncError::structural(
                meta_key,
                "flow has no remote id; run pull first",
            ));
        }

        let script_path = paths::skill_script_path(&ctx.flow_dir, &meta.idn, &meta.runner_type);
        let script_key = self.session.key(&script_path);
        let Some(script) = hash_store::read_optional(&script_path)? else {
            return Err(SyncError::structural(
                meta_key,
                format!("script {script_key} is missing"),
            ));
        };

        let new_skill = NewSkill::from_meta(&meta, String::from_utf8_lossy(&script).into_owned());
        meta.id = self.platform.create_skill(&ctx.flow_id, &new_skill).await?;
        let rendered = metadata::render_skill_meta(&meta)?;
        write_atomic(&meta_path, rendered.as_bytes())?;
        self.cache.invalidate(&ctx.flow_id).await;
        tracing::info!(path = %script_key, id = %meta.id, "created remote skill");

        let mut state = self.session.state.lock().await;
        if let Some(flow) = state.map.flow_mut(&ctx.key) {
            flow.skills
                .insert(meta.idn.clone(), meta.to_info(script_key.clone()));
        }
        state
            .ledger
            .insert(script_key, hash_store::hash_bytes(&script));
        state
            .ledger
            .insert(meta_key, hash_store::hash_bytes(rendered.as_bytes()));
        state.tally.report.created += 1;
        state
            .tally
            .regenerate
            .insert(ctx.key.project_idn.clone());
        Ok(())
    }

    /// Create events and state fields listed in `flow.meta.yaml` without an
    /// id, then write the assigned ids back.
    async fn push_flow_fields(&self, ctx: &FlowContext) -> Result<(), SyncError> {
        let path = ctx.flow_dir.join(paths::FLOW_META_FILE);
        let Some(raw) = hash_store::read_optional(&path)? else {
            return Ok(());
        };
        let mut meta = metadata::parse_flow_meta(&path, &String::from_utf8_lossy(&raw))?;
        let pending = meta.events.iter().any(|e| e.id.is_empty())
            || meta.state_fields.iter().any(|s| s.id.is_empty());
        if !pending {
            return Ok(());
        }
        let key = self.session.key(&path);
        if ctx.flow_id.is_empty() {
            return Err(SyncError::structural(key, "flow has no remote id; run pull first"));
        }

        let mut failures: Vec<SyncError> = Vec::new();
        let mut events_created = 0;
        for event in meta.events.iter_mut().filter(|e| e.id.is_empty()) {
            match self.platform.create_flow_event(&ctx.flow_id, event).await {
                Ok(id) => {
                    tracing::info!(flow = %ctx.key, event = %event.idn, "created flow event");
                    event.id = id;
                    events_created += 1;
                }
                Err(err) => failures.push(err.into()),
            }
        }
        let mut states_created = 0;
        for field in meta.state_fields.iter_mut().filter(|s| s.id.is_empty()) {
            match self.platform.create_flow_state(&ctx.flow_id, field).await {
                Ok(id) => {
                    tracing::info!(flow = %ctx.key, state = %field.idn, "created flow state field");
                    field.id = id;
                    states_created += 1;
                }
                Err(err) => failures.push(err.into()),
            }
        }

        if events_created + states_created > 0 {
            let rendered = metadata::render_flow_meta(&meta)?;
            write_atomic(&path, rendered.as_bytes())?;
            let mut state = self.session.state.lock().await;
            if let Some(flow) = state.map.flow_mut(&ctx.key) {
                flow.events = meta.events;
                flow.state_fields = meta.state_fields;
            }
            state
                .ledger
                .insert(key, hash_store::hash_bytes(rendered.as_bytes()));
            let tally = &mut state.tally;
            tally.report.events_created += events_created;
            tally.report.state_fields_created += states_created;
            tally.regenerate.insert(ctx.key.project_idn.clone());
        }
        SyncError::from_failures(failures)
    }

    async fn regenerate(self: Arc<Self>, project_idn: String) -> Result<(), SyncError> {
        let mut state = self.session.state.lock().await;
        let Some(project) = state.map.projects.get(&project_idn) else {
            return Ok(());
        };
        let document = metadata::render_project_flows(project)?;
        let path = paths::resolve_key(&self.session.root, &project.path)
            .join(paths::PROJECT_METADATA_FILE);
        write_atomic(&path, document.as_bytes())?;
        tracing::info!(project = %project_idn, "regenerated project metadata");

        let key = self.session.key(&path);
        state
            .ledger
            .insert(key, hash_store::hash_bytes(document.as_bytes()));
        state.tally.report.regenerated.push(project_idn);
        Ok(())
    }

    async fn publish(self: Arc<Self>, flow_id: String, key: FlowKey) -> Result<(), SyncError> {
        self.platform.publish_flow(&flow_id).await?;
        tracing::info!(flow = %key, "republished");
        self.session
            .state
            .lock()
            .await
            .tally
            .report
            .republished
            .push(key.to_string());
        Ok(())
    }
}

/// Skill metadata files in `flow_dir` with no entry in `tracked`, sorted.
pub(crate) fn untracked_meta_files(
    flow_dir: &Path,
    tracked: &BTreeMap<String, SkillInfo>,
) -> Result<Vec<PathBuf>, SyncError> {
    let entries = match std::fs::read_dir(flow_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(flow_dir, e)),
    };
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(flow_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match paths::skill_idn_from_meta_file(&name) {
            Some(idn) if !tracked.contains_key(idn) => found.push(path),
            _ => {}
        }
    }
    found.sort();
    Ok(found)
}
