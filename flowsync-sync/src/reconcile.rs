//! Three-way divergence check and the run-scoped shared state.
//!
//! ## Divergence
//!
//! Given the ledger `baseline` for a path, the `local` digest and the
//! `incoming` digest:
//!
//! 1. `local == incoming` → [`Divergence::NoOp`].
//! 2. baseline present, `local != baseline` → [`Divergence::LocalDivergence`]:
//!    the file was edited since the last sync. Skipped without a prompt
//!    unless forced; the ledger keeps the baseline.
//! 3. otherwise → [`Divergence::Confirmable`]: prompt (or apply when forced).
//!
//! ## Shared state
//!
//! A [`Session`] owns everything workers share during one run. The entity
//! map, ledger, force flag and run tally sit behind one mutex; take it for
//! every read-modify-write and never across a remote call or a prompt.
//! Prompts are serialized by a second, separate lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use flowsync_core::{paths, ProjectMap};

use crate::confirm::{Confirmer, Decision, ProposedChange, ProposedDeletion};
use crate::diff::{self, DiffLine};
use crate::error::{io_err, SyncError};
use crate::hash_store::{self, HashStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    NoOp,
    LocalDivergence,
    Confirmable,
}

pub fn classify(baseline: Option<&str>, local: &str, incoming: &str) -> Divergence {
    if local == incoming {
        return Divergence::NoOp;
    }
    match baseline {
        Some(baseline) if local != baseline => Divergence::LocalDivergence,
        _ => Divergence::Confirmable,
    }
}

/// What happened to one incoming file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Written,
    Diverged,
    Declined,
}

/// Mutable state shared by every worker of a run.
#[derive(Debug)]
pub(crate) struct RunState<R> {
    pub map: ProjectMap,
    pub ledger: HashStore,
    /// Set up front by `--force` or later by an apply-to-all answer.
    pub force: bool,
    /// Per-operation counters and bookkeeping.
    pub tally: R,
}

pub(crate) struct Session<R> {
    pub root: PathBuf,
    pub verbose: bool,
    pub cancel: CancellationToken,
    confirmer: Arc<dyn Confirmer>,
    prompt: Mutex<()>,
    pub state: Mutex<RunState<R>>,
}

impl<R: Send + 'static> Session<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: &Path,
        confirmer: Arc<dyn Confirmer>,
        map: ProjectMap,
        ledger: HashStore,
        force: bool,
        verbose: bool,
        cancel: CancellationToken,
        tally: R,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            verbose,
            cancel,
            confirmer,
            prompt: Mutex::new(()),
            state: Mutex::new(RunState {
                map,
                ledger,
                force,
                tally,
            }),
        }
    }

    pub async fn forced(&self) -> bool {
        self.state.lock().await.force
    }

    pub fn key(&self, path: &Path) -> String {
        paths::ledger_key(&self.root, path)
    }

    pub fn prompt_context(&self) -> i32 {
        if self.verbose {
            diff::FULL_CONTEXT
        } else {
            diff::PROMPT_CONTEXT
        }
    }

    /// Ask about a change unless the run is forced. Only one prompt is in
    /// flight at a time; the force flag is re-read once the prompt lock is
    /// held, since an earlier prompt may have answered apply-to-all.
    pub async fn confirm_change(&self, change: ProposedChange) -> Result<Decision, SyncError> {
        if self.forced().await {
            return Ok(Decision::ApplyOnce);
        }
        let _prompt = self.prompt.lock().await;
        if self.forced().await {
            return Ok(Decision::ApplyOnce);
        }
        let confirmer = self.confirmer.clone();
        let decision = tokio::task::spawn_blocking(move || confirmer.confirm_change(&change))
            .await
            .map_err(|e| SyncError::Join(e.to_string()))?;
        self.record_decision(decision).await;
        Ok(decision)
    }

    pub async fn confirm_delete(&self, deletion: ProposedDeletion) -> Result<Decision, SyncError> {
        if self.forced().await {
            return Ok(Decision::ApplyOnce);
        }
        let _prompt = self.prompt.lock().await;
        if self.forced().await {
            return Ok(Decision::ApplyOnce);
        }
        let confirmer = self.confirmer.clone();
        let decision = tokio::task::spawn_blocking(move || confirmer.confirm_delete(&deletion))
            .await
            .map_err(|e| SyncError::Join(e.to_string()))?;
        self.record_decision(decision).await;
        Ok(decision)
    }

    async fn record_decision(&self, decision: Decision) {
        if decision == Decision::ApplyAll {
            tracing::info!("applying all remaining changes in this run");
            self.state.lock().await.force = true;
        }
    }

    /// Reconcile one incoming artifact against the local file at `path`.
    ///
    /// `old_ledger` is the ledger as loaded at the start of the run; results
    /// go to the session's ledger only.
    pub async fn reconcile_incoming(
        &self,
        old_ledger: &HashStore,
        path: &Path,
        incoming: &[u8],
    ) -> Result<FileOutcome, SyncError> {
        let key = self.key(path);
        let local = hash_store::read_optional(path)?;
        let local_bytes = local.clone().unwrap_or_default();
        let local_hash = hash_store::hash_bytes(&local_bytes);
        let incoming_hash = hash_store::hash_bytes(incoming);
        let baseline = old_ledger.get(&key).map(String::as_str);
        let forced = self.forced().await;

        match classify(baseline, &local_hash, &incoming_hash) {
            Divergence::NoOp => {
                tracing::debug!(path = %key, "unchanged");
                self.state.lock().await.ledger.insert(key, incoming_hash);
                Ok(FileOutcome::Unchanged)
            }
            Divergence::LocalDivergence if !forced => {
                let lines = diff::generate(&local_bytes, incoming, diff::SUMMARY_CONTEXT);
                tracing::warn!(
                    path = %key,
                    "local edits since last sync; skipped (use --force to overwrite){}",
                    summary(&key, &lines)
                );
                if let Some(baseline) = baseline {
                    self.state
                        .lock()
                        .await
                        .ledger
                        .insert(key, baseline.to_string());
                }
                Ok(FileOutcome::Diverged)
            }
            Divergence::LocalDivergence => {
                self.write_incoming(path, key, incoming, incoming_hash).await
            }
            Divergence::Confirmable => {
                // Nothing on disk and nothing recorded: there is no local work to lose.
                if local.is_none() && baseline.is_none() {
                    return self.write_incoming(path, key, incoming, incoming_hash).await;
                }
                let change = ProposedChange {
                    path: key.clone(),
                    lines: diff::generate(&local_bytes, incoming, self.prompt_context()),
                    before: local_bytes,
                    after: incoming.to_vec(),
                    context: "pull".to_string(),
                };
                if self.confirm_change(change).await?.approves() {
                    self.write_incoming(path, key, incoming, incoming_hash).await
                } else {
                    tracing::info!(path = %key, "declined; local file kept");
                    self.state.lock().await.ledger.insert(key, local_hash);
                    Ok(FileOutcome::Declined)
                }
            }
        }
    }

    async fn write_incoming(
        &self,
        path: &Path,
        key: String,
        incoming: &[u8],
        incoming_hash: String,
    ) -> Result<FileOutcome, SyncError> {
        write_atomic(path, incoming)?;
        tracing::info!(path = %key, "wrote");
        self.state.lock().await.ledger.insert(key, incoming_hash);
        Ok(FileOutcome::Written)
    }

    #[cfg(test)]
    pub fn into_state(self) -> RunState<R> {
        self.state.into_inner()
    }
}

/// Write `content` to `path` via `<path>.flowsync.tmp` and a rename,
/// creating parent directories as needed.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}.flowsync.tmp", path.display()));
    write_atomic_with_tmp(path, content, &tmp)
}

fn write_atomic_with_tmp(path: &Path, content: &[u8], tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Render `lines` for a log line, or an empty string when there is no diff.
pub(crate) fn summary(path: &str, lines: &[DiffLine]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n{}", diff::format(path, lines))
    }
}
