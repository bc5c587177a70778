//! Tmux-backed agent launcher.
//!
//! Spawns each agent in a detached tmux session rooted at its worktree,
//! waits for the agent frontend to become ready, then sends the task as
//! literal input (send-keys -l, never shell-interpreted) followed by
//! Enter. Launch failures kill the session before returning so no partial
//! agent is left running.

use anyhow::{anyhow, bail, Context, Result};
use shell_escape::escape;
use std::borrow::Cow;
use std::process::Command;
use std::time::{Duration, Instant};

use super::status::PatternClassifier;
use super::{AgentLauncher, LaunchedAgent, SpawnRequest};

pub struct TmuxLauncher {
    /// Command line that starts the agent process, e.g. `claude`.
    agent_command: String,
    readiness_timeout: Duration,
    readiness_poll: Duration,
    classifier: PatternClassifier,
}

/// Check if tmux is available on the system.
pub fn check_tmux_available() -> Result<()> {
    which::which("tmux").map_err(|_| {
        anyhow!(
            "tmux is not installed. Install it to spawn agent sessions.\n\
             On Ubuntu/Debian: sudo apt-get install tmux\n\
             On macOS: brew install tmux"
        )
    })?;
    Ok(())
}

impl TmuxLauncher {
    pub fn new(
        agent_command: String,
        readiness_timeout: Duration,
        classifier: PatternClassifier,
    ) -> Self {
        Self {
            agent_command,
            readiness_timeout,
            readiness_poll: Duration::from_millis(500),
            classifier,
        }
    }

    /// Compose the command line launched inside the tmux session.
    fn launch_command(&self, request: &SpawnRequest) -> String {
        match &request.resume_transcript {
            Some(transcript) => {
                let escaped = escape(Cow::Owned(transcript.to_string_lossy().to_string()));
                format!("{} --resume {escaped}", self.agent_command)
            }
            None => self.agent_command.clone(),
        }
    }

    /// Block until the agent frontend is ready for input, or fail.
    fn wait_for_ready(&self, session_name: &str) -> Result<()> {
        let start = Instant::now();
        loop {
            if start.elapsed() > self.readiness_timeout {
                bail!(
                    "agent did not become ready within {}s",
                    self.readiness_timeout.as_secs()
                );
            }

            if let Some(output) = self.capture_output(session_name) {
                if self.classifier.has_error(&output) {
                    bail!("agent reported an error during startup");
                }
                if self.classifier.is_ready(&output) {
                    return Ok(());
                }
            }

            std::thread::sleep(self.readiness_poll);
        }
    }

    fn send_literal(&self, session_name: &str, text: &str) -> Result<()> {
        // -l delivers the text verbatim: no key-name lookup, no shell.
        let output = Command::new("tmux")
            .args(["send-keys", "-t", session_name, "-l", text])
            .output()
            .context("Failed to send literal text to tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tmux send-keys -l failed: {stderr}");
        }

        Ok(())
    }

    fn send_submit(&self, session_name: &str) -> Result<()> {
        let output = Command::new("tmux")
            .args(["send-keys", "-t", session_name, "Enter"])
            .output()
            .context("Failed to send Enter to tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tmux send-keys Enter failed: {stderr}");
        }

        Ok(())
    }

    fn pane_pid(&self, session_name: &str) -> Option<u32> {
        let output = Command::new("tmux")
            .args(["list-panes", "-t", session_name, "-F", "#{pane_pid}"])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

impl AgentLauncher for TmuxLauncher {
    fn spawn(&self, request: &SpawnRequest) -> Result<LaunchedAgent> {
        check_tmux_available()?;

        if self.is_alive(&request.session_name) {
            bail!(
                "tmux session '{}' already exists; kill it first",
                request.session_name
            );
        }

        let work_dir = request.work_dir.to_str().ok_or_else(|| {
            anyhow!(
                "worktree path contains invalid UTF-8: {}",
                request.work_dir.display()
            )
        })?;

        let create_output = Command::new("tmux")
            .args([
                "new-session",
                "-d",
                "-s",
                &request.session_name,
                "-c",
                work_dir,
            ])
            .output()
            .context("Failed to create tmux session")?;

        if !create_output.status.success() {
            let stderr = String::from_utf8_lossy(&create_output.stderr);
            bail!("failed to create tmux session: {stderr}");
        }

        // From here on, any failure must tear the session down.
        let result = (|| -> Result<LaunchedAgent> {
            let command = self.launch_command(request);
            self.send_literal(&request.session_name, &command)?;
            self.send_submit(&request.session_name)?;

            self.wait_for_ready(&request.session_name)
                .with_context(|| format!("agent in '{}' never became ready", request.session_name))?;

            self.send_literal(&request.session_name, &request.task)?;
            self.send_submit(&request.session_name)?;

            Ok(LaunchedAgent {
                session_name: request.session_name.clone(),
                pid: self.pane_pid(&request.session_name),
            })
        })();

        if result.is_err() {
            self.kill(&request.session_name);
        }

        result
    }

    fn capture_output(&self, session_name: &str) -> Option<String> {
        let output = Command::new("tmux")
            .args(["capture-pane", "-p", "-t", session_name])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn is_alive(&self, session_name: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", session_name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn kill(&self, session_name: &str) {
        // Idempotent: killing a dead session is a no-op, not an error.
        let _ = Command::new("tmux")
            .args(["kill-session", "-t", session_name])
            .output();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use std::path::PathBuf;

    fn launcher() -> TmuxLauncher {
        TmuxLauncher::new(
            "claude".to_string(),
            Duration::from_secs(30),
            PatternClassifier::new(ClassifierConfig::default()).unwrap(),
        )
    }

    fn request(transcript: Option<&str>) -> SpawnRequest {
        SpawnRequest {
            session_name: "weft-test".to_string(),
            work_dir: PathBuf::from("/tmp"),
            task: "do the thing".to_string(),
            agent_type: "backend".to_string(),
            resume_transcript: transcript.map(PathBuf::from),
        }
    }

    #[test]
    fn test_launch_command_plain() {
        assert_eq!(launcher().launch_command(&request(None)), "claude");
    }

    #[test]
    fn test_launch_command_with_resume_escapes_path() {
        let cmd = launcher().launch_command(&request(Some("/tmp/my transcript.jsonl")));
        assert!(cmd.starts_with("claude --resume "));
        // Path with a space must be quoted for the shell.
        assert!(cmd.contains('\''));
    }
}
