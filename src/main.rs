//! weft: wave-based multi-agent orchestration over git worktrees.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use weft::config::{ClassifierConfig, OrchestratorConfig};
use weft::error::{Outcome, WeftError};
use weft::git::{check_git_available, current_branch, WorktreeManager};
use weft::launcher::tmux::check_tmux_available;
use weft::launcher::{PatternClassifier, TmuxLauncher};
use weft::models::{OrchestrationSession, SessionStatus};
use weft::orchestrator::report::{print_merge_report, print_run_summary, print_status};
use weft::orchestrator::{merge_completed, MergeOptions, WaveScheduler};
use weft::plan::load_plan;
use weft::store::{FsStateStore, SessionRegistry, StateStore};

#[derive(Parser)]
#[command(
    name = "weft",
    version,
    about = "Schedule coding agents over a workstream DAG, wave by wave"
)]
struct Cli {
    /// State directory (sessions, agent records, event log, worktrees).
    #[arg(long, global = true, default_value = ".weft")]
    work_dir: PathBuf,

    /// Repository root that worktrees are created from.
    #[arg(long, global = true, default_value = ".")]
    repo_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a plan file and create a new orchestration session.
    Create {
        /// JSON plan file with nodes, dependencies and optional config.
        plan_file: PathBuf,
    },

    /// Run an orchestration session wave by wave.
    Run {
        session_id: String,

        /// Continue a paused or crashed session from its first incomplete
        /// wave. Completed waves are never re-spawned.
        #[arg(long)]
        resume: bool,

        /// Start from this wave instead of the first incomplete one.
        #[arg(long)]
        from_wave: Option<usize>,

        /// Override the concurrent-spawn limit.
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Override the session budget ceiling, in USD.
        #[arg(long)]
        budget: Option<f64>,

        /// Override the command that starts the agent process.
        #[arg(long)]
        agent_command: Option<String>,
    },

    /// Show a session's waves, agents and spend.
    Status {
        session_id: String,

        /// Include the per-agent table.
        #[arg(long)]
        detailed: bool,
    },

    /// Merge the branches of completed workstreams, in wave order.
    Merge {
        session_id: String,

        /// Report what would merge without touching the repository.
        #[arg(long)]
        dry_run: bool,

        /// Restrict the pass to one wave.
        #[arg(long)]
        wave: Option<usize>,

        /// Merge even when a worktree still has uncommitted changes.
        #[arg(long)]
        force: bool,
    },

    /// Remove the worktrees of a finished session. Branches are deleted
    /// only once merged, unless forced.
    Cleanup {
        session_id: String,

        /// Remove worktrees with uncommitted changes and delete unmerged
        /// branches.
        #[arg(long)]
        force: bool,
    },

    /// List agents whose tmux session died before they finished, and mark
    /// them orphaned.
    Orphans,

    /// Relaunch an orphaned agent as a fresh agent in the same worktree.
    ResumeAgent { agent_id: String },

    /// Move an agent's record to cold storage.
    Archive { agent_id: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            let outcome = match e.downcast_ref::<WeftError>() {
                Some(WeftError::Configuration(_)) => Outcome::InvalidDag,
                _ => Outcome::AgentsFailed,
            };
            std::process::exit(outcome.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let store = FsStateStore::new(cli.work_dir.clone())?;

    match cli.command {
        Commands::Create { plan_file } => {
            check_git_available()?;

            let (dag, plan_config) = load_plan(&plan_file)?;
            let waves = dag.compute_waves()?;

            let mut config = OrchestratorConfig::default();
            config.apply_plan_config(&plan_config);

            let session = OrchestrationSession::new(
                waves,
                dag.nodes.len(),
                config.max_concurrent,
                plan_config.max_budget_usd,
            );
            store.save_session(&session)?;
            store.save_dag(&session.session_id, &dag)?;

            println!("{} {}", "created session".green().bold(), session.session_id);
            for wave in &session.waves {
                println!("  wave {}: {}", wave.wave_number, wave.nodes.join(", "));
            }
            println!("Run it with: weft run {}", session.session_id);
            Ok(0)
        }

        Commands::Run {
            session_id,
            resume,
            from_wave,
            max_concurrent,
            budget,
            agent_command,
        } => {
            check_git_available()?;
            check_tmux_available()?;

            let mut session = store.load_session(&session_id)?;
            let mut dag = store.load_dag(&session_id)?;

            if session.status != SessionStatus::Pending && !resume && from_wave.is_none() {
                anyhow::bail!(
                    "session '{session_id}' is {}; pass --resume to continue it \
                     or --from-wave to pick a wave",
                    session.status
                );
            }

            let mut config = OrchestratorConfig {
                work_dir: cli.work_dir.clone(),
                repo_root: cli.repo_root.clone(),
                max_concurrent: session.max_concurrent,
                ..OrchestratorConfig::default()
            };
            if let Some(max) = max_concurrent {
                config.max_concurrent = max.max(1);
            }
            if let Some(cmd) = agent_command {
                config.agent_command = cmd;
            }
            if let Some(b) = budget {
                session.budget_usd = Some(b);
            }

            let classifier = PatternClassifier::new(ClassifierConfig::default())?;
            let launcher = TmuxLauncher::new(
                config.agent_command.clone(),
                config.readiness_timeout,
                PatternClassifier::new(ClassifierConfig::default())?,
            );
            let workspace =
                WorktreeManager::new(config.repo_root.clone(), &config.work_dir, None);

            let stop = Arc::new(AtomicBool::new(false));
            let handler_flag = Arc::clone(&stop);
            ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))?;

            let scheduler =
                WaveScheduler::new(config, &store, &launcher, &classifier, &workspace);

            let started = Instant::now();
            let outcome = scheduler.run(&mut session, &mut dag, from_wave, &stop)?;
            print_run_summary(&session, &outcome, started.elapsed());

            Ok(outcome.outcome().exit_code())
        }

        Commands::Status {
            session_id,
            detailed,
        } => {
            let session = store.load_session(&session_id)?;
            print_status(&session, detailed);
            Ok(0)
        }

        Commands::Merge {
            session_id,
            dry_run,
            wave,
            force,
        } => {
            check_git_available()?;

            let session = store.load_session(&session_id)?;
            let dag = store.load_dag(&session_id)?;
            let workspace = WorktreeManager::new(cli.repo_root.clone(), &cli.work_dir, None);

            let target = current_branch(&cli.repo_root)?;
            println!("Merging completed workstreams into '{target}'");
            let report = merge_completed(
                &session,
                &dag,
                &workspace,
                MergeOptions {
                    wave_filter: wave,
                    dry_run,
                    force,
                },
            )?;
            print_merge_report(&report);
            Ok(if report.is_clean() { 0 } else { 1 })
        }

        Commands::Cleanup { session_id, force } => {
            check_git_available()?;

            let session = store.load_session(&session_id)?;
            let workspace = WorktreeManager::new(cli.repo_root.clone(), &cli.work_dir, None);

            let mut failures = 0;
            let workstreams: std::collections::BTreeSet<String> = session
                .agents
                .values()
                .map(|a| a.workstream_id.clone())
                .collect();
            for workstream in workstreams {
                match workspace.remove_worktree(&workstream, force) {
                    Ok(()) => println!("  {} {workstream}", "removed".green()),
                    Err(e) => {
                        eprintln!("  {} {workstream}: {e:#}", "kept".yellow());
                        failures += 1;
                    }
                }
            }
            workspace.prune()?;
            Ok(if failures == 0 { 0 } else { 1 })
        }

        Commands::Orphans => {
            let launcher = TmuxLauncher::new(
                OrchestratorConfig::default().agent_command,
                OrchestratorConfig::default().readiness_timeout,
                PatternClassifier::new(ClassifierConfig::default())?,
            );
            let registry = SessionRegistry::new(&store, &launcher);

            let orphans = registry.list_orphaned()?;
            if orphans.is_empty() {
                println!("no orphaned agents");
                return Ok(0);
            }
            for agent in &orphans {
                registry.mark_orphaned(&agent.id, "tmux session not found")?;
                println!(
                    "  {} {} (workstream {}, was {})",
                    "orphaned".yellow(),
                    agent.id,
                    agent.workstream_id,
                    agent.status
                );
            }
            println!("Relaunch one with: weft resume-agent <agent_id>");
            Ok(0)
        }

        Commands::ResumeAgent { agent_id } => {
            check_tmux_available()?;

            let launcher = TmuxLauncher::new(
                OrchestratorConfig::default().agent_command,
                OrchestratorConfig::default().readiness_timeout,
                PatternClassifier::new(ClassifierConfig::default())?,
            );
            let registry = SessionRegistry::new(&store, &launcher);

            let new_id = registry.resume(&agent_id)?;
            println!("{} {new_id}", "resumed as".green().bold());
            Ok(0)
        }

        Commands::Archive { agent_id } => {
            let launcher = TmuxLauncher::new(
                OrchestratorConfig::default().agent_command,
                OrchestratorConfig::default().readiness_timeout,
                PatternClassifier::new(ClassifierConfig::default())?,
            );
            let registry = SessionRegistry::new(&store, &launcher);
            registry.archive(&agent_id)?;
            println!("{} {agent_id}", "archived".green());
            Ok(0)
        }
    }
}
