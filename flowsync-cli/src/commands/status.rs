//! `flowsync status`: local changes since the last sync, offline.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use flowsync_sync::{status, FileState, StatusEntry, StatusReport};

use super::GlobalArgs;

/// Arguments for `flowsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.root()?;
        let customer = global.customer_idn()?;
        let report = status::check(&root, &customer)
            .with_context(|| format!("status check failed for '{customer}'"))?;

        if self.json {
            return print_json(&customer.to_string(), &report);
        }
        print_table(&customer.to_string(), &report, global.verbose);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    customer: &'a str,
    never_synced: bool,
    summary: SummaryJson,
    files: &'a [StatusEntry],
}

#[derive(Serialize)]
struct SummaryJson {
    clean: usize,
    modified: usize,
    missing: usize,
    untracked: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "path")]
    path: String,
}

fn print_json(customer: &str, report: &StatusReport) -> Result<()> {
    let payload = StatusJson {
        customer,
        never_synced: report.never_synced,
        summary: SummaryJson {
            clean: report.count(FileState::Clean),
            modified: report.count(FileState::Modified),
            missing: report.count(FileState::Missing),
            untracked: report.count(FileState::Untracked),
        },
        files: &report.entries,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(customer: &str, report: &StatusReport, show_clean: bool) {
    if report.never_synced {
        println!("'{customer}' has never been synced. Run 'flowsync pull' first.");
        return;
    }

    println!(
        "flowsync v{} | {customer} | {} clean | {} modified | {} missing | {} untracked",
        env!("CARGO_PKG_VERSION"),
        report.count(FileState::Clean),
        report.count(FileState::Modified),
        report.count(FileState::Missing),
        report.count(FileState::Untracked),
    );

    let rows: Vec<StatusTableRow> = report
        .entries
        .iter()
        .filter(|e| show_clean || e.state != FileState::Clean)
        .map(|e| StatusTableRow {
            state: state_label(e.state),
            path: e.path.clone(),
        })
        .collect();
    if rows.is_empty() {
        println!("{} working tree clean", "✓".green());
        return;
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !report.is_clean() {
        println!("Run 'flowsync push' to upload local changes.");
    }
}

fn state_label(state: FileState) -> String {
    let label = state.label().to_uppercase();
    match state {
        FileState::Clean => label.green().to_string(),
        FileState::Modified => label.yellow().bold().to_string(),
        FileState::Missing => label.red().bold().to_string(),
        FileState::Untracked => label.magenta().bold().to_string(),
    }
}
