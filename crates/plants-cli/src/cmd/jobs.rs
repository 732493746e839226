use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use plants_core::jobs::{JobDb, JobStatus};
use plants_core::paths;
use std::path::Path;

#[derive(Subcommand)]
pub enum JobsSubcommand {
    /// List queued and finished jobs, newest first
    List {
        /// Only show pending and running jobs
        #[arg(long)]
        pending: bool,
    },
}

pub fn run(root: &Path, subcmd: JobsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        JobsSubcommand::List { pending } => list(root, pending, json),
    }
}

fn list(root: &Path, pending_only: bool, json: bool) -> anyhow::Result<()> {
    if !paths::config_path(root).exists() {
        anyhow::bail!("no .plants/ found under {}; run `plants init` first", root.display());
    }
    let db = JobDb::open(&paths::jobs_path(root))
        .context("failed to open job queue (is `plants serve` running?)")?;
    let mut jobs = db.list_all()?;
    if pending_only {
        jobs.retain(|j| !j.status.is_finished());
    }

    if json {
        return print_json(&jobs);
    }
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    let rows = jobs
        .into_iter()
        .map(|j| {
            let detail = match &j.status {
                JobStatus::Completed { note } => note.clone(),
                JobStatus::Failed { reason } => reason.clone(),
                _ => String::new(),
            };
            vec![
                j.id.to_string()[..8].to_string(),
                j.kind.name().to_string(),
                j.label,
                j.status.label().to_string(),
                j.run_at.format("%Y-%m-%d %H:%M").to_string(),
                j.attempts.to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["ID", "KIND", "LABEL", "STATUS", "RUN AT (UTC)", "TRIES", "DETAIL"], rows);
    Ok(())
}
