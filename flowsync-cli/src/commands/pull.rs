//! `flowsync pull`: reconcile remote state into the workspace.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use flowsync_sync::{pull, PullOptions, PullReport};

use super::{block_on, cancel_on_ctrl_c, GlobalArgs};

/// Arguments for `flowsync pull`.
#[derive(Args, Debug)]
pub struct PullArgs {}

impl PullArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (workspace, _config) = global.workspace()?;
        let options = PullOptions {
            force: global.force,
            verbose: global.verbose,
        };
        let report = block_on(async {
            cancel_on_ctrl_c(&workspace);
            pull::pull(&workspace, options).await
        })?
        .with_context(|| format!("pull failed for '{}'", workspace.customer))?;

        print_report(&workspace.customer.to_string(), &report);
        Ok(())
    }
}

pub fn print_report(customer: &str, report: &PullReport) {
    println!(
        "{} pull '{customer}': {} project(s), {} flow(s), {} skill(s)",
        "✓".green(),
        report.projects,
        report.flows,
        report.skills
    );
    if report.vanished > 0 {
        println!(
            "  {} {} skill(s) deleted remotely; their local files are no longer tracked",
            "!".yellow(),
            report.vanished
        );
    }
    if report.changes() == 0 && report.diverged == 0 && report.declined == 0 {
        println!("  nothing to do ({} unchanged)", report.unchanged);
        return;
    }
    println!(
        "  {} written, {} unchanged, {} diverged, {} declined",
        report.written, report.unchanged, report.diverged, report.declined
    );
    if report.diverged > 0 {
        println!(
            "  {} local edits kept; push them or rerun with --force to discard",
            "!".yellow()
        );
    }
}
