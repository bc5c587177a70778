//! Filesystem-backed state store.
//!
//! Layout under the work directory:
//!   sessions/<session_id>.json   session snapshots
//!   dags/<session_id>.json       DAG snapshots
//!   agents/<agent_id>.json       active agent records
//!   archive/<agent_id>.json      archived agent records (relocated, kept)
//!   events.jsonl                 append-only registry log
//!
//! Snapshots are replaced atomically (write to a temp file in the same
//! directory, then rename); the event log takes an exclusive advisory lock
//! for the duration of each append.

use anyhow::Result;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::WeftError;
use crate::models::{Agent, OrchestrationSession, RegistryEvent};
use crate::plan::Dag;

use super::StateStore;

pub struct FsStateStore {
    root: PathBuf,
}

impl FsStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        for dir in ["sessions", "dags", "agents", "archive"] {
            std::fs::create_dir_all(root.join(dir)).map_err(|e| {
                WeftError::Persistence(format!("cannot create state directory '{dir}': {e}"))
            })?;
        }
        Ok(Self { root })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.root.join("sessions").join(format!("{session_id}.json"))
    }

    fn dag_path(&self, session_id: &str) -> PathBuf {
        self.root.join("dags").join(format!("{session_id}.json"))
    }

    fn agent_path(&self, agent_id: &str) -> PathBuf {
        self.root.join("agents").join(format!("{agent_id}.json"))
    }

    fn archive_path(&self, agent_id: &str) -> PathBuf {
        self.root.join("archive").join(format!("{agent_id}.json"))
    }

    fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            WeftError::Persistence(format!("state path has no parent: {}", path.display()))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| WeftError::Persistence(format!("cannot create temp file: {e}")))?;

        serde_json::to_writer_pretty(&mut tmp, value)
            .map_err(|e| WeftError::Persistence(format!("cannot serialize state: {e}")))?;
        tmp.flush()
            .map_err(|e| WeftError::Persistence(format!("cannot flush state: {e}")))?;

        tmp.persist(path).map_err(|e| {
            WeftError::Persistence(format!("cannot replace {}: {e}", path.display()))
        })?;

        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WeftError::Persistence(format!("cannot read {}: {e}", path.display()))
        })?;
        let value = serde_json::from_str(&content).map_err(|e| {
            WeftError::Persistence(format!("corrupt state file {}: {e}", path.display()))
        })?;
        Ok(value)
    }
}

impl StateStore for FsStateStore {
    fn save_session(&self, session: &OrchestrationSession) -> Result<()> {
        self.write_json_atomic(&self.session_path(&session.session_id), session)
    }

    fn load_session(&self, session_id: &str) -> Result<OrchestrationSession> {
        self.read_json(&self.session_path(session_id))
    }

    fn save_dag(&self, session_id: &str, dag: &Dag) -> Result<()> {
        self.write_json_atomic(&self.dag_path(session_id), dag)
    }

    fn load_dag(&self, session_id: &str) -> Result<Dag> {
        self.read_json(&self.dag_path(session_id))
    }

    fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.write_json_atomic(&self.agent_path(&agent.id), agent)
    }

    fn load_agent(&self, agent_id: &str) -> Result<Agent> {
        self.read_json(&self.agent_path(agent_id))
    }

    fn list_agents(&self) -> Result<Vec<Agent>> {
        let agents_dir = self.root.join("agents");
        let mut agents = Vec::new();

        let entries = std::fs::read_dir(&agents_dir).map_err(|e| {
            WeftError::Persistence(format!("cannot read {}: {e}", agents_dir.display()))
        })?;

        for entry in entries {
            let entry =
                entry.map_err(|e| WeftError::Persistence(format!("cannot list agents: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match self.read_json::<Agent>(&path) {
                Ok(agent) => agents.push(agent),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable agent record");
                }
            }
        }

        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    fn archive_agent(&self, agent_id: &str) -> Result<()> {
        let active = self.agent_path(agent_id);
        let archived = self.archive_path(agent_id);

        let mut agent: Agent = self.read_json(&active)?;
        agent.status = crate::models::AgentStatus::Archived;

        self.write_json_atomic(&archived, &agent)?;
        std::fs::remove_file(&active).map_err(|e| {
            WeftError::Persistence(format!("cannot relocate {}: {e}", active.display()))
        })?;

        Ok(())
    }

    fn append_event(&self, event: &RegistryEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| WeftError::Persistence(format!("cannot serialize event: {e}")))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())
            .map_err(|e| WeftError::Persistence(format!("cannot open event log: {e}")))?;

        file.lock_exclusive()
            .map_err(|e| WeftError::Persistence(format!("cannot lock event log: {e}")))?;

        let result = (|| -> std::io::Result<()> {
            let mut file = &file;
            writeln!(file, "{line}")?;
            file.flush()
        })();

        let unlock = FileExt::unlock(&file);

        result.map_err(|e| WeftError::Persistence(format!("cannot append event: {e}")))?;
        unlock.map_err(|e| WeftError::Persistence(format!("cannot unlock event log: {e}")))?;

        Ok(())
    }

    fn read_events(&self) -> Result<Vec<RegistryEvent>> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)
            .map_err(|e| WeftError::Persistence(format!("cannot open event log: {e}")))?;

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line =
                line.map_err(|e| WeftError::Persistence(format!("cannot read event log: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line)
                .map_err(|e| WeftError::Persistence(format!("corrupt event line: {e}")))?;
            events.push(event);
        }

        Ok(events)
    }
}
