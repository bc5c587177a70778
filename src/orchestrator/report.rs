//! Terminal summaries for runs, status queries and merge passes.

use colored::Colorize;
use std::time::Duration;

use crate::git::MergeOutcome;
use crate::models::{AgentStatus, OrchestrationSession, SessionStatus};

use super::merge::MergeReport;
use super::scheduler::RunOutcome;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn cost_line(session: &OrchestrationSession) -> String {
    match session.budget_usd {
        Some(budget) if budget > 0.0 => {
            let pct = session.total_cost_usd / budget * 100.0;
            format!(
                "${:.2} / ${budget:.2} ({pct:.0}% of budget)",
                session.total_cost_usd
            )
        }
        _ => format!("${:.2} (no budget set)", session.total_cost_usd),
    }
}

fn status_colored(status: AgentStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        AgentStatus::Complete | AgentStatus::Archived => text.green(),
        AgentStatus::Failed | AgentStatus::Killed | AgentStatus::Orphaned => text.red(),
        AgentStatus::Idle => text.yellow(),
        _ => text.normal(),
    }
}

/// Final summary after a run: outcome, duration, spend, per-agent results
/// and the next command to reach for.
pub fn print_run_summary(session: &OrchestrationSession, outcome: &RunOutcome, elapsed: Duration) {
    println!();
    match outcome {
        RunOutcome::Complete => {
            println!("{}", "Orchestration complete".green().bold());
        }
        RunOutcome::Failed {
            wave,
            failed_agents,
        } => {
            println!(
                "{}",
                format!(
                    "Orchestration failed in wave {wave} ({} agent(s) failed)",
                    failed_agents.len()
                )
                .red()
                .bold()
            );
        }
        RunOutcome::BudgetExceeded { spent, budget } => {
            println!(
                "{}",
                format!("Orchestration halted: budget exceeded (${spent:.2} / ${budget:.2})")
                    .red()
                    .bold()
            );
        }
        RunOutcome::TimedOut { wave } => {
            println!(
                "{}",
                format!("Orchestration paused in wave {wave} (time limit); agents still running")
                    .yellow()
                    .bold()
            );
        }
    }

    println!("  session:  {}", session.session_id);
    println!("  duration: {}", format_duration(elapsed));
    println!("  cost:     {}", cost_line(session));
    println!(
        "  waves:    {}/{} complete",
        session.last_completed_wave(),
        session.total_waves
    );

    if !session.agents.is_empty() {
        println!();
        for agent in session.agents.values() {
            println!(
                "  {:<24} {:<10} ${:.2}",
                agent.workstream_id,
                status_colored(agent.status),
                agent.cost_usd
            );
        }
    }

    println!();
    match outcome {
        RunOutcome::Complete => {
            println!("Next: weft merge {}", session.session_id);
        }
        RunOutcome::TimedOut { .. } => {
            println!("Next: weft run {} --resume", session.session_id);
        }
        RunOutcome::Failed { .. } => {
            println!(
                "Inspect failed agents with: weft status {} --detailed",
                session.session_id
            );
        }
        RunOutcome::BudgetExceeded { .. } => {
            println!(
                "Completed work is preserved on its branches; merge with: weft merge {}",
                session.session_id
            );
        }
    }
}

/// One-session status view; `detailed` adds the per-agent table.
pub fn print_status(session: &OrchestrationSession, detailed: bool) {
    let status = match session.status {
        SessionStatus::Complete => session.status.to_string().green(),
        SessionStatus::Failed => session.status.to_string().red(),
        _ => session.status.to_string().normal(),
    };
    println!("{} [{}]", session.session_id.bold(), status);
    println!(
        "  wave {}/{}, {} node(s), cost {}",
        session.current_wave,
        session.total_waves,
        session.total_nodes,
        cost_line(session)
    );

    for wave in &session.waves {
        println!(
            "  wave {}: {} ({})",
            wave.wave_number,
            wave.status,
            wave.nodes.join(", ")
        );
    }

    if detailed && !session.agents.is_empty() {
        println!();
        println!(
            "  {:<28} {:<24} {:<10} {:>8}  {}",
            "agent", "workstream", "status", "cost", "tmux session"
        );
        for agent in session.agents.values() {
            println!(
                "  {:<28} {:<24} {:<10} {:>8}  {}",
                agent.id,
                agent.workstream_id,
                status_colored(agent.status),
                format!("${:.2}", agent.cost_usd),
                agent.tmux_session
            );
        }
    }
}

pub fn print_merge_report(report: &MergeReport) {
    for plan in &report.planned {
        println!("  {} {}", "would merge".cyan(), plan);
    }
    for merged in &report.merged {
        let detail = match &merged.outcome {
            MergeOutcome::Merged {
                files_changed,
                insertions,
                deletions,
            } => format!("{files_changed} file(s), +{insertions}/-{deletions}"),
            MergeOutcome::FastForward => "fast-forward".to_string(),
            MergeOutcome::AlreadyUpToDate => "already up to date".to_string(),
            MergeOutcome::Conflict { .. } => String::new(),
        };
        println!("  {} {} ({detail})", "merged".green(), merged.branch);
    }
    for conflict in &report.conflicts {
        println!(
            "  {} {} ({} file(s): {})",
            "conflict".red(),
            conflict.branch,
            conflict.files.len(),
            conflict.files.join(", ")
        );
    }
    for skipped in &report.skipped {
        println!(
            "  {} {} ({})",
            "skipped".yellow(),
            skipped.workstream_id,
            skipped.reason
        );
    }

    if !report.conflicts.is_empty() {
        println!();
        println!("Resolve conflicts manually, then re-run the merge for the remaining branches.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(format_duration(Duration::from_secs(7500)), "2h05m");
    }
}
