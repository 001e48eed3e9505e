//! `flowsync sync`: pull, then push, under one lock.

use anyhow::{Context, Result};
use clap::Args;

use flowsync_sync::{pipeline, PushOptions};

use super::{block_on, cancel_on_ctrl_c, pull, push, GlobalArgs};

/// Arguments for `flowsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Do not republish flows whose skills were updated.
    #[arg(long)]
    pub no_publish: bool,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (workspace, config) = global.workspace()?;
        let options = PushOptions {
            force: global.force,
            verbose: global.verbose,
            publish: config.publish && !self.no_publish,
        };
        let customer = workspace.customer.to_string();
        let mut report = block_on(async {
            cancel_on_ctrl_c(&workspace);
            pipeline::merge(&workspace, options).await
        })?
        .with_context(|| format!("sync failed for '{customer}'"))?;

        pull::print_report(&customer, &report.pull);
        push::print_report(&customer, &report.push);
        report
            .push
            .take_error()
            .with_context(|| format!("sync for '{customer}' finished with errors"))
    }
}
