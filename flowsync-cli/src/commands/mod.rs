pub mod pull;
pub mod push;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use flowsync_core::config::{self, WorkspaceConfig};
use flowsync_core::CustomerIdn;
use flowsync_sync::Workspace;

use crate::confirm::TerminalConfirmer;
use crate::platform::HttpPlatform;

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Apply every change without prompting.
    #[arg(long, global = true)]
    pub force: bool,

    /// Debug logging and full-context diffs in prompts.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Customer to operate on (defaults to the configured one).
    #[arg(long, global = true)]
    pub customer: Option<String>,

    /// Workspace root (defaults to the current directory).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("could not determine current directory"),
        }
    }

    pub fn config(&self) -> Result<WorkspaceConfig> {
        let root = self.root()?;
        config::load_at(&root).context("failed to load workspace config; create flowsync.yaml first")
    }

    /// Customer for offline commands: `--customer` needs no config file.
    pub fn customer_idn(&self) -> Result<CustomerIdn> {
        if let Some(customer) = &self.customer {
            return Ok(CustomerIdn::from(customer.as_str()));
        }
        let config = self.config()?;
        Ok(config.customer(None)?.customer_idn())
    }

    /// A workspace wired to the HTTP platform and the terminal confirmer.
    pub fn workspace(&self) -> Result<(Workspace, WorkspaceConfig)> {
        let root = self.root()?;
        let config = self.config()?;
        let customer = config.customer(self.customer.as_deref())?;
        let platform = HttpPlatform::from_config(customer, config.timeout_secs)?;
        let workspace = Workspace::new(
            root,
            customer.customer_idn(),
            Arc::new(platform),
            Arc::new(TerminalConfirmer::new()),
        );
        Ok((workspace, config))
    }
}

/// Run `fut` on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(fut))
}

/// Cancel the workspace's run on Ctrl-C; in-flight items finish first.
pub fn cancel_on_ctrl_c(workspace: &Workspace) {
    let cancel = workspace.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing in-flight work");
            cancel.cancel();
        }
    });
}
