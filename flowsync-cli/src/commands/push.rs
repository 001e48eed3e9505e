//! `flowsync push`: upload local skill changes to the platform.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use flowsync_sync::{PushOptions, PushReport, SkillSyncService};

use super::{block_on, cancel_on_ctrl_c, GlobalArgs};

/// Arguments for `flowsync push`.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Do not republish flows whose skills were updated.
    #[arg(long)]
    pub no_publish: bool,
}

impl PushArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (workspace, config) = global.workspace()?;
        let options = PushOptions {
            force: global.force,
            verbose: global.verbose,
            publish: config.publish && !self.no_publish,
        };
        let customer = workspace.customer.to_string();
        let service = SkillSyncService::new(workspace.clone());
        let mut report = block_on(async {
            cancel_on_ctrl_c(&workspace);
            service.push(options).await
        })?
        .with_context(|| format!("push failed for '{customer}'"))?;

        print_report(&customer, &report);
        report
            .take_error()
            .with_context(|| format!("push for '{customer}' finished with errors"))
    }
}

pub fn print_report(customer: &str, report: &PushReport) {
    println!(
        "{} push '{customer}': {} updated, {} created, {} deleted, {} unchanged",
        "✓".green(),
        report.updated,
        report.created,
        report.deleted,
        report.unchanged
    );
    if report.remote_changed > 0 {
        println!(
            "  {} {} skill(s) changed remotely; run `flowsync pull` first",
            "!".yellow(),
            report.remote_changed
        );
    }
    if report.untracked > 0 {
        println!(
            "  {} {} skill(s) not tracked yet; run `flowsync pull` first",
            "!".yellow(),
            report.untracked
        );
    }
    if report.declined > 0 {
        println!("  {} declined", report.declined);
    }
    if report.events_created + report.state_fields_created > 0 {
        println!(
            "  {} event(s), {} state field(s) created",
            report.events_created, report.state_fields_created
        );
    }
    for project in &report.regenerated {
        println!("  ✎  regenerated flows.yaml for '{project}'");
    }
    for flow in &report.republished {
        println!("  ↑  published {flow}");
    }
}
