//! The wave scheduler: spawn a wave, watch it, advance or stop.
//!
//! Waves run strictly in sequence. Within a wave, spawns go through the
//! admission gate with a stagger delay; monitoring then polls every agent
//! until the wave resolves. Session and DAG snapshots are persisted after
//! every state transition so a crash resumes from the last consistent
//! snapshot.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use crate::config::OrchestratorConfig;
use crate::error::{Outcome, WeftError};
use crate::git::WorkspaceProvider;
use crate::launcher::{AgentLauncher, AgentStatusClassifier, ObservedStatus, SpawnRequest};
use crate::models::{
    Agent, AgentStatus, EventKind, Node, NodeId, NodeStatus, OrchestrationSession, RegistryEvent,
    WaveStatus,
};
use crate::plan::Dag;
use crate::store::StateStore;

use super::gate::AdmissionGate;

/// How one monitored wave ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveOutcome {
    /// Every agent in the wave reached `Complete`.
    Complete,
    /// At least one agent failed or was killed. Surviving siblings were
    /// left running; their work stays on their branches.
    Failed { failed_agents: Vec<String> },
    /// Observed spend met the budget ceiling. Session-level stop.
    BudgetExceeded { spent: f64, budget: f64 },
    /// The monitoring wall clock expired or a stop was requested. Agents
    /// keep running; state is persisted for resume.
    TimedOut,
}

/// How a full run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Complete,
    Failed {
        wave: usize,
        failed_agents: Vec<String>,
    },
    BudgetExceeded {
        spent: f64,
        budget: f64,
    },
    TimedOut {
        wave: usize,
    },
}

impl RunOutcome {
    /// The process-level outcome this run maps to.
    pub fn outcome(&self) -> Outcome {
        match self {
            RunOutcome::Complete => Outcome::Success,
            RunOutcome::Failed { .. } => Outcome::AgentsFailed,
            RunOutcome::BudgetExceeded { .. } => Outcome::BudgetExceeded,
            RunOutcome::TimedOut { .. } => Outcome::Timeout,
        }
    }
}

/// The task text delivered to a freshly spawned agent.
///
/// The completion marker is described, never written out contiguously:
/// the delivered text is echoed in the captured pane, and a verbatim
/// marker there would read as completion before the agent has done
/// anything.
fn task_prompt(node: &Node) -> String {
    let mut prompt = format!(
        "You are working on workstream '{}'.\n\nTask: {}\n\n",
        node.workstream_id, node.task
    );
    if !node.deliverables.is_empty() {
        prompt.push_str("Deliverables:\n");
        for d in &node.deliverables {
            prompt.push_str(&format!("- {d}\n"));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Work only inside this directory. Commit your work to branch {} \
         as you go. When every deliverable is done, print one final line: \
         the word WORKSTREAM, a single space, then the word COMPLETE.",
        node.branch_name()
    ));
    prompt
}

pub struct WaveScheduler<'a> {
    config: OrchestratorConfig,
    store: &'a dyn StateStore,
    launcher: &'a dyn AgentLauncher,
    classifier: &'a dyn AgentStatusClassifier,
    workspace: &'a dyn WorkspaceProvider,
}

impl<'a> WaveScheduler<'a> {
    pub fn new(
        config: OrchestratorConfig,
        store: &'a dyn StateStore,
        launcher: &'a dyn AgentLauncher,
        classifier: &'a dyn AgentStatusClassifier,
        workspace: &'a dyn WorkspaceProvider,
    ) -> Self {
        Self {
            config,
            store,
            launcher,
            classifier,
            workspace,
        }
    }

    fn persist(&self, session: &OrchestrationSession, dag: &Dag) -> Result<()> {
        self.store.save_session(session)?;
        self.store.save_dag(&session.session_id, dag)
    }

    /// Provision the worktree and launch the agent for one node. On any
    /// error the launcher has already torn down partial sessions; the
    /// worktree is left in place for inspection.
    fn spawn_node(&self, node: &Node) -> Result<Agent> {
        let worktree = self.workspace.provision(&node.workstream_id)?;
        let mut agent = Agent::new(
            node,
            worktree.path.clone(),
            worktree.branch.clone(),
            String::new(),
        );
        agent.tmux_session = format!("{}-{}", self.config.session_prefix, agent.id);

        let request = SpawnRequest {
            session_name: agent.tmux_session.clone(),
            work_dir: worktree.path,
            task: task_prompt(node),
            agent_type: node.agent_type.clone(),
            resume_transcript: None,
        };

        let launched = self.launcher.spawn(&request).map_err(|e| {
            WeftError::Spawn {
                node: node.id.clone(),
                reason: format!("{e:#}"),
            }
        })?;
        agent.pid = launched.pid;
        Ok(agent)
    }

    /// Spawn every not-yet-spawned node of a wave, concurrently behind the
    /// admission gate. A failed spawn records a failed placeholder agent
    /// and fails the node; its siblings continue regardless.
    pub fn spawn_wave(
        &self,
        session: &mut OrchestrationSession,
        dag: &mut Dag,
        wave_number: usize,
    ) -> Result<()> {
        let to_spawn = session.unspawned_nodes(wave_number);

        {
            let wave = session.wave_mut(wave_number).ok_or_else(|| {
                WeftError::Configuration(format!("session has no wave {wave_number}"))
            })?;
            wave.status = WaveStatus::Active;
        }
        session.current_wave = wave_number;
        session.mark_running();
        self.persist(session, dag)?;

        if to_spawn.is_empty() {
            return Ok(());
        }

        let nodes: Vec<Node> = to_spawn
            .iter()
            .filter_map(|id| dag.get(id).cloned())
            .collect();

        println!(
            "{}",
            format!("Wave {wave_number}: spawning {} agent(s)", nodes.len()).bold()
        );

        let gate = AdmissionGate::new(self.config.max_concurrent);
        let (tx, rx) = mpsc::channel::<(NodeId, Result<Agent>)>();

        thread::scope(|s| {
            for (i, node) in nodes.iter().enumerate() {
                let permit = gate.acquire();
                if i > 0 && !self.config.spawn_stagger.is_zero() {
                    thread::sleep(self.config.spawn_stagger);
                }
                let tx = tx.clone();
                s.spawn(move || {
                    let result = self.spawn_node(node);
                    let _ = tx.send((node.id.clone(), result));
                    drop(permit);
                });
            }
            drop(tx);
        });

        let mut results: Vec<(NodeId, Result<Agent>)> = rx.into_iter().collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (node_id, result) in results {
            match result {
                Ok(agent) => {
                    println!(
                        "  {} {} in session {}",
                        "spawned".green(),
                        node_id,
                        agent.tmux_session
                    );
                    dag.set_status(&node_id, NodeStatus::Active);
                    self.store.save_agent(&agent)?;
                    self.store.append_event(
                        &RegistryEvent::new(EventKind::Spawn, &agent.id, &session.session_id)
                            .with_detail(format!("wave {wave_number}")),
                    )?;
                    session.register_agent(agent);
                }
                Err(e) => {
                    eprintln!("  {} {}: {e:#}", "spawn failed".red(), node_id);
                    tracing::warn!(node = %node_id, error = %e, "spawn failed");
                    dag.set_status(&node_id, NodeStatus::Failed);
                    if let Some(node) = dag.get(&node_id) {
                        let placeholder = Agent::failed_spawn(node, format!("{e:#}"));
                        self.store.save_agent(&placeholder)?;
                        session.register_agent(placeholder);
                    }
                }
            }
        }

        self.persist(session, dag)?;
        Ok(())
    }

    /// Poll the agents of one wave until it resolves.
    ///
    /// Check order within one tick: classification, then idle-timeout
    /// kills, then the budget gate, then completion, then failure, then
    /// the wall clock. The budget check runs before the completion check so
    /// an exhausted budget stops the session even when the wave would
    /// otherwise have completed on the same tick.
    pub fn monitor_wave(
        &self,
        session: &mut OrchestrationSession,
        dag: &mut Dag,
        wave_number: usize,
        stop: &AtomicBool,
    ) -> Result<WaveOutcome> {
        let started = Instant::now();
        let idle_limit = ChronoDuration::from_std(self.config.idle_timeout)
            .unwrap_or_else(|_| ChronoDuration::seconds(900));

        loop {
            let now = Utc::now();
            let agent_ids = session.agent_ids_in_wave(wave_number);

            for id in &agent_ids {
                let Some((tmux_session, node_id)) = session
                    .agents
                    .get(id)
                    .filter(|a| !a.status.is_terminal())
                    .map(|a| (a.tmux_session.clone(), a.node_id.clone()))
                else {
                    continue;
                };

                let alive = self.launcher.is_alive(&tmux_session);
                let output = self
                    .launcher
                    .capture_output(&tmux_session)
                    .unwrap_or_default();
                let observed = self.classifier.classify(&output, alive);
                let cost = self.classifier.extract_cost(&output);

                let Some(agent) = session.agents.get_mut(id) else {
                    continue;
                };
                if let Some(cost) = cost {
                    agent.record_cost(cost);
                }

                match observed {
                    ObservedStatus::Active => agent.observe_status(AgentStatus::Active, now),
                    ObservedStatus::Idle => agent.observe_status(AgentStatus::Idle, now),
                    ObservedStatus::Complete => {
                        agent.observe_status(AgentStatus::Complete, now);
                        println!("  {} {}", "complete".green(), node_id);
                        dag.set_status(&node_id, NodeStatus::Complete);
                        let agent = agent.clone();
                        self.store.save_agent(&agent)?;
                        self.store.append_event(
                            &RegistryEvent::new(EventKind::Complete, &agent.id, &session.session_id)
                                .with_detail(format!("wave {wave_number}")),
                        )?;
                    }
                    ObservedStatus::Failed => {
                        agent.observe_status(AgentStatus::Failed, now);
                        let reason = "fatal error detected in output";
                        agent.close_reason = Some(reason.to_string());
                        let err = WeftError::AgentFailure {
                            agent: agent.id.clone(),
                            reason: reason.to_string(),
                        };
                        eprintln!("  {}", err.to_string().red());
                        dag.set_status(&node_id, NodeStatus::Failed);
                        self.store.save_agent(agent)?;
                    }
                    ObservedStatus::Killed => {
                        agent.observe_status(AgentStatus::Killed, now);
                        agent.close_reason = Some("tmux session died".to_string());
                        eprintln!("  {} {}: session died", "killed".red(), node_id);
                        dag.set_status(&node_id, NodeStatus::Failed);
                        self.store.save_agent(agent)?;
                    }
                }
            }

            // Idle-timeout enforcement. A kill here counts as a failure for
            // the wave, exactly like a detected fatal error.
            for id in &agent_ids {
                let Some(agent) = session.agents.get_mut(id) else {
                    continue;
                };
                if agent.status != AgentStatus::Idle {
                    continue;
                }
                let Some(idle) = agent.idle_for(now) else {
                    continue;
                };
                if idle <= idle_limit {
                    continue;
                }

                self.launcher.kill(&agent.tmux_session);
                agent.mark_killed(format!(
                    "idle for {}s, limit {}s",
                    idle.num_seconds(),
                    idle_limit.num_seconds()
                ));
                eprintln!(
                    "  {} {}: idle past the {}s limit",
                    "killed".red(),
                    agent.workstream_id,
                    idle_limit.num_seconds()
                );
                let node_id = agent.node_id.clone();
                dag.set_status(&node_id, NodeStatus::Failed);
                let agent = agent.clone();
                self.store.save_agent(&agent)?;
            }

            session.recompute_total_cost();
            self.persist(session, dag)?;

            if session.budget_exhausted() {
                let spent = session.total_cost_usd;
                let budget = session.budget_usd.unwrap_or(0.0);
                let err = WeftError::BudgetExceeded { spent, budget };
                eprintln!("{}", err.to_string().red().bold());
                session.mark_failed();
                self.persist(session, dag)?;
                return Ok(WaveOutcome::BudgetExceeded { spent, budget });
            }

            let statuses: Vec<AgentStatus> = agent_ids
                .iter()
                .filter_map(|id| session.agents.get(id))
                .map(|a| a.status)
                .collect();

            let expected = session.wave(wave_number).map(|w| w.nodes.len()).unwrap_or(0);
            if statuses.len() == expected
                && statuses.iter().all(|s| *s == AgentStatus::Complete)
            {
                if let Some(wave) = session.wave_mut(wave_number) {
                    wave.status = WaveStatus::Complete;
                }
                self.persist(session, dag)?;
                return Ok(WaveOutcome::Complete);
            }

            let failed_agents: Vec<String> = agent_ids
                .iter()
                .filter_map(|id| session.agents.get(id))
                .filter(|a| a.status.is_failure())
                .map(|a| a.id.clone())
                .collect();
            if !failed_agents.is_empty() {
                if let Some(wave) = session.wave_mut(wave_number) {
                    wave.status = WaveStatus::Failed;
                }
                session.mark_failed();
                self.persist(session, dag)?;
                return Ok(WaveOutcome::Failed { failed_agents });
            }

            if started.elapsed() >= self.config.monitor_timeout {
                tracing::warn!(
                    wave = wave_number,
                    "monitoring wall clock expired; agents left running"
                );
                return Ok(WaveOutcome::TimedOut);
            }
            if stop.load(Ordering::Relaxed) {
                println!("stop requested; agents left running, state saved");
                return Ok(WaveOutcome::TimedOut);
            }

            thread::sleep(self.config.poll_interval);
        }
    }

    /// Drive the session from `start` to the last wave, strictly in order.
    /// A wave must complete before the next spawns; any other wave outcome
    /// ends the run.
    pub fn run(
        &self,
        session: &mut OrchestrationSession,
        dag: &mut Dag,
        from_wave: Option<usize>,
        stop: &AtomicBool,
    ) -> Result<RunOutcome> {
        let start = match from_wave {
            Some(n) => n,
            None => session.last_completed_wave() + 1,
        };
        if start < 1 {
            return Err(WeftError::Configuration(format!(
                "cannot start at wave {start}: waves are numbered from 1"
            ))
            .into());
        }
        if start > session.total_waves {
            // Nothing left to run. Covers re-running a finished session.
            session.mark_complete();
            self.persist(session, dag)?;
            return Ok(RunOutcome::Complete);
        }

        session.mark_running();
        self.persist(session, dag)?;

        for wave_number in start..=session.total_waves {
            if session
                .wave(wave_number)
                .map(|w| w.status == WaveStatus::Complete)
                .unwrap_or(false)
            {
                continue;
            }

            self.spawn_wave(session, dag, wave_number)?;
            match self.monitor_wave(session, dag, wave_number, stop)? {
                WaveOutcome::Complete => {
                    println!("{}", format!("Wave {wave_number} complete").green().bold());
                }
                WaveOutcome::Failed { failed_agents } => {
                    return Ok(RunOutcome::Failed {
                        wave: wave_number,
                        failed_agents,
                    });
                }
                WaveOutcome::BudgetExceeded { spent, budget } => {
                    return Ok(RunOutcome::BudgetExceeded { spent, budget });
                }
                WaveOutcome::TimedOut => {
                    return Ok(RunOutcome::TimedOut { wave: wave_number });
                }
            }
        }

        session.mark_complete();
        self.persist(session, dag)?;
        self.archive_session_agents(session)?;
        Ok(RunOutcome::Complete)
    }

    /// On full completion, move every agent record to cold storage.
    fn archive_session_agents(&self, session: &mut OrchestrationSession) -> Result<()> {
        let ids: Vec<String> = session.agents.keys().cloned().collect();
        for id in ids {
            self.store.archive_agent(&id)?;
            self.store
                .append_event(&RegistryEvent::new(EventKind::Archived, &id, &session.session_id))?;
            if let Some(agent) = session.agents.get_mut(&id) {
                agent.status = AgentStatus::Archived;
            }
        }
        self.store.save_session(session)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::launcher::PatternClassifier;

    fn node() -> Node {
        Node {
            id: "auth".to_string(),
            task: "Build the auth API".to_string(),
            agent_type: "backend".to_string(),
            workstream_id: "auth".to_string(),
            dependencies: vec![],
            deliverables: vec!["login endpoint".to_string(), "session tokens".to_string()],
            status: NodeStatus::Pending,
        }
    }

    #[test]
    fn test_delivered_task_text_is_not_read_as_completion() {
        let classifier = PatternClassifier::new(ClassifierConfig::default()).unwrap();
        // A fresh pane shows nothing but the echoed task text.
        let echoed = task_prompt(&node());
        assert_eq!(classifier.classify(&echoed, true), ObservedStatus::Active);

        // The marker printed by the agent itself still counts.
        let finished = format!("{echoed}\n...work...\nWORKSTREAM COMPLETE\n");
        assert_eq!(classifier.classify(&finished, true), ObservedStatus::Complete);
    }

    #[test]
    fn test_task_prompt_names_the_branch() {
        let prompt = task_prompt(&node());
        assert!(prompt.contains("feat/auth"));
        assert!(prompt.contains("- login endpoint"));
    }

    #[test]
    fn test_run_outcomes_map_to_exit_codes() {
        assert_eq!(RunOutcome::Complete.outcome().exit_code(), 0);
        assert_eq!(
            RunOutcome::Failed {
                wave: 2,
                failed_agents: vec!["agent-a".to_string()],
            }
            .outcome()
            .exit_code(),
            1
        );
        assert_eq!(
            RunOutcome::BudgetExceeded {
                spent: 5.0,
                budget: 4.0,
            }
            .outcome()
            .exit_code(),
            3
        );
        assert_eq!(RunOutcome::TimedOut { wave: 1 }.outcome().exit_code(), 4);
    }
}
