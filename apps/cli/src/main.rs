//! `fleet` — loads a workflow directory, runs one workflow end-to-end, and
//! prints the resulting run summary. Stands in for the out-of-scope
//! daemon/CLI bootstrap: everything the engine itself needs (registry,
//! store, archive, services) is wired up here rather than in a library
//! crate, mirroring the teacher's library-uses-`thiserror` /
//! binary-uses-`anyhow` split.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_action::{NodeRegistry, Services};
use fleet_core::WorkflowId;
use fleet_engine::{Engine, EngineConfig};
use fleet_execution::{RunArchive, TriggerInfo};
use fleet_workflow::WorkflowStore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "fleet", version, about = "Run and inspect fleet workflow runs")]
struct Cli {
    /// TOML file with `workflows_dir` / `archive_dir` defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding `<workflow-id>.json` workflow definitions.
    #[arg(long, global = true)]
    workflows_dir: Option<PathBuf>,

    /// Directory the Run Archive persists its index and run details to.
    #[arg(long, global = true)]
    archive_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single workflow to completion and print its run summary.
    Run {
        /// The workflow id (or `template-*` slug) to run.
        workflow_id: String,
        /// Inline JSON input, or `@path` to read it from a file. Defaults to `{}`.
        #[arg(long)]
        input: Option<String>,
    },
    /// List every workflow definition found in the workflows directory.
    List,
    /// Print recent run summaries from the archive.
    History {
        /// Restrict to a single workflow id.
        #[arg(long)]
        workflow_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Layered config: CLI flags override this file's values, which override
/// the built-in `./workflows` / `./runs` defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    workflows_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
}

fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else { return Ok(FileConfig::default()) };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn read_input(arg: Option<String>) -> Result<serde_json::Value> {
    let Some(arg) = arg else { return Ok(serde_json::json!({})) };
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading input file {path}"))?,
        None => arg,
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    fleet_log::init(fleet_log::LogConfig::with_default_filter("info")).ok();

    let cli = Cli::parse();
    let file_config = load_file_config(cli.config.as_deref())?;

    let workflows_dir = cli.workflows_dir.or(file_config.workflows_dir).unwrap_or_else(|| PathBuf::from("./workflows"));
    let archive_dir = cli.archive_dir.or(file_config.archive_dir).unwrap_or_else(|| PathBuf::from("./runs"));

    let store = WorkflowStore::new(&workflows_dir);
    store.load().with_context(|| format!("loading workflows from {}", workflows_dir.display()))?;

    match cli.command {
        Command::List => {
            let mut defs = store.list();
            defs.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
            for def in defs {
                println!("{}\t{}\t{} nodes\tenabled={}", def.id, def.name, def.nodes.len(), def.enabled);
            }
            Ok(())
        }
        Command::History { workflow_id, limit } => {
            let archive = RunArchive::new(&archive_dir, EngineConfig::default().max_persisted_runs);
            archive.load().with_context(|| format!("loading run archive from {}", archive_dir.display()))?;

            let filter = workflow_id.map(|raw| WorkflowId::from_str(&raw)).transpose().context("invalid --workflow-id")?;
            let cfg = EngineConfig::default();
            let history = archive.get_run_history(filter.as_ref(), limit, cfg.run_stuck_threshold_ms, |id| {
                store.get(id).map(|def| def.nodes.len()).unwrap_or(0)
            });

            for summary in history {
                println!(
                    "{}\t{}\t{}\t{:?}\tcompleted={} failed={} skipped={}",
                    summary.run_id,
                    summary.workflow_id,
                    summary.started_at,
                    summary.status,
                    summary.counts.completed,
                    summary.counts.failed,
                    summary.counts.skipped
                );
            }
            Ok(())
        }
        Command::Run { workflow_id, input } => run_workflow(store, archive_dir, workflow_id, input).await,
    }
}

async fn run_workflow(store: WorkflowStore, archive_dir: PathBuf, workflow_id: String, input: Option<String>) -> Result<()> {
    let workflow_id = WorkflowId::from_str(&workflow_id).context("invalid workflow id")?;
    let input = read_input(input)?;

    let registry = NodeRegistry::new();
    fleet_nodes::register_all(&registry);

    let archive = RunArchive::new(&archive_dir, EngineConfig::default().max_persisted_runs);
    archive.load().with_context(|| format!("loading run archive from {}", archive_dir.display()))?;

    // No kanban/git/agent-pool/telegram adapters are wired up for a
    // standalone CLI run — any node that needs one surfaces a
    // `ServiceUnavailable` error, same as a workflow author would see it
    // mid-authoring before the daemon attaches real collaborators.
    let services = Services::default();

    let engine = Engine::new(registry, store, archive, services, EngineConfig::from_env());

    let report = engine.run(&workflow_id, input, TriggerInfo { trigger_source: Some("cli".into()), ..TriggerInfo::default() }).await?;

    println!("{}", serde_json::to_string_pretty(&report.summary)?);
    if let Some(error) = &report.error {
        eprintln!("run failed: {error}");
        std::process::exit(1);
    }
    Ok(())
}
