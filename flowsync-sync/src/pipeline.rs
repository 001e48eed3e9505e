//! Merge workflow: pull, then push, under one `merge` lock.
//!
//! Both halves share a single force flag: `--force` applies to both, and an
//! apply-to-all answered during the pull carries into the push. The push is
//! skipped when the pull fails, since pushing over a half-reconciled tree
//! would compare against a stale ledger.

use serde::Serialize;

use crate::error::SyncError;
use crate::lock::WorkspaceLock;
use crate::pull::{self, PullOptions, PullReport};
use crate::push::{PushOptions, PushReport, SkillSyncService};
use crate::workspace::Workspace;

pub const LOCK_NAME: &str = "merge";

#[derive(Debug, Serialize)]
pub struct MergeReport {
    pub pull: PullReport,
    pub push: PushReport,
}

pub async fn merge(workspace: &Workspace, options: PushOptions) -> Result<MergeReport, SyncError> {
    let _lock = WorkspaceLock::acquire(&workspace.root, LOCK_NAME)?;

    let pull = pull::pull_unlocked(
        workspace,
        PullOptions {
            force: options.force,
            verbose: options.verbose,
        },
    )
    .await?;

    let push = SkillSyncService::new(workspace.clone())
        .push_unlocked(PushOptions {
            force: options.force || pull.force_all,
            ..options
        })
        .await?;

    Ok(MergeReport { pull, push })
}
