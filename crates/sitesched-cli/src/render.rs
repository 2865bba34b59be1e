//! Plain-text rendering and exit codes for CLI output
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Success |
//! | 1 | Failure: fatal error, conflicts found, or shortages under `--strict` |

use std::fmt::Write;
use std::process;

use sitesched_core::{
    Explanation, FeasibilityResult, OptimizerMove, ScheduleOutcome, ScheduledTask,
};

// ============================================================================
// Exit Code
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
}

impl ExitCode {
    pub fn from_error_count(count: usize) -> Self {
        if count > 0 {
            ExitCode::Failure
        } else {
            ExitCode::Success
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code as u8)
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Summary, task table, resources and diagnostics
pub fn schedule_text(outcome: &ScheduleOutcome) -> String {
    let schedule = &outcome.schedule;
    let diagnostics = &outcome.diagnostics;
    let mut out = String::new();

    let _ = writeln!(out, "Project: {}", schedule.project_name);
    let _ = writeln!(
        out,
        "Start: {}  End: {}  Duration: {} working days",
        schedule.project_start, schedule.project_end, schedule.project_duration
    );
    if let Some(cost) = &schedule.total_cost {
        let _ = writeln!(out, "Total cost: {}", cost);
    }

    let mut tasks: Vec<&ScheduledTask> = schedule.tasks.values().collect();
    tasks.sort_by(|a, b| {
        a.early_start
            .cmp(&b.early_start)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    let width = tasks
        .iter()
        .map(|t| t.task_id.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<width$}  {:<10}  {:<10}  {:>4}  {:>5}  CRIT",
        "TASK",
        "START",
        "FINISH",
        "DUR",
        "FLOAT",
        width = width
    );
    for task in &tasks {
        let _ = writeln!(
            out,
            "{:<width$}  {}  {}  {:>4}  {:>5}  {}",
            task.task_id,
            task.start,
            task.finish,
            task.duration,
            task.total_float,
            if task.is_critical { "*" } else { "" },
            width = width
        );
    }

    if !schedule.critical_chains.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Critical chains:");
        for chain in &schedule.critical_chains {
            let _ = writeln!(out, "  {}", chain.join(" -> "));
        }
    }

    if !schedule.resource_usage.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Resources:");
        for usage in schedule.resource_usage.values() {
            let peak = usage
                .peak_date
                .map(|d| format!(" on {}", d))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {}: capacity {}, peak {}{}, utilization {:.2}%",
                usage.resource_id, usage.capacity, usage.peak_units, peak, usage.utilization_percent
            );
        }
    }

    let has_notes = !diagnostics.shifts.is_empty()
        || !diagnostics.adjustments.is_empty()
        || diagnostics.leveling_incomplete
        || diagnostics.optimizer.is_some();
    if has_notes {
        let _ = writeln!(out);
        let _ = writeln!(out, "Diagnostics:");
    }
    for shift in &diagnostics.shifts {
        let _ = writeln!(
            out,
            "  leveling: '{}' delayed {} working days for '{}'{}",
            shift.task_id,
            shift.delay(),
            shift.resource_id,
            if shift.was_critical { " (extends project)" } else { "" }
        );
    }
    for adjustment in &diagnostics.adjustments {
        let _ = writeln!(
            out,
            "  allocation: '{}' gets {} of {} requested '{}'",
            adjustment.task_id, adjustment.assigned, adjustment.requested, adjustment.resource_id
        );
    }
    if diagnostics.leveling_incomplete {
        let _ = writeln!(
            out,
            "  leveling: stopped after {} iterations",
            diagnostics.leveling_iterations
        );
    }
    if let Some(report) = &diagnostics.optimizer {
        let _ = writeln!(
            out,
            "  optimizer: {} ran {} iterations, duration {} -> {}{}",
            report.objective,
            report.iterations,
            report.baseline_duration,
            report.final_duration,
            if report.cancelled {
                " (cancelled)"
            } else if report.terminated_early {
                " (iteration limit)"
            } else {
                ""
            }
        );
        for step in &report.moves {
            let line = match step {
                OptimizerMove::Crash {
                    task_id,
                    resource_id,
                    units,
                } => format!("crash '{}' to {} x '{}'", task_id, units, resource_id),
                OptimizerMove::Shift { task_id, delay } => {
                    format!("shift '{}' by {} working days", task_id, delay)
                }
            };
            let _ = writeln!(out, "    {}", line);
        }
    }

    out.trim_end().to_string()
}

// ============================================================================
// Check / Explain
// ============================================================================

pub fn feasibility_text(project: &str, result: &FeasibilityResult) -> String {
    let mut out = String::new();
    if result.feasible {
        let _ = write!(out, "{}: feasible", project);
        return out;
    }

    let _ = writeln!(
        out,
        "{}: {} conflict(s)",
        project,
        result.conflicts.len()
    );
    for conflict in &result.conflicts {
        let _ = writeln!(out, "  error: {}", conflict.description);
    }
    for suggestion in &result.suggestions {
        let _ = writeln!(
            out,
            "  help: {} ({})",
            suggestion.description, suggestion.impact
        );
    }
    out.trim_end().to_string()
}

pub fn explanation_text(explanation: &Explanation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", explanation.task_id, explanation.reason);
    for constraint in &explanation.constraints_applied {
        let _ = writeln!(out, "  constraint: {}", constraint);
    }
    for alternative in &explanation.alternatives_considered {
        let _ = writeln!(out, "  note: {}", alternative);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesched_core::{Conflict, ScheduleError, Suggestion};

    #[test]
    fn exit_code_from_errors() {
        assert_eq!(ExitCode::from_error_count(0), ExitCode::Success);
        assert_eq!(ExitCode::from_error_count(2), ExitCode::Failure);
    }

    #[test]
    fn infeasible_lists_conflicts_and_help() {
        let err = ScheduleError::Cycle {
            tasks: vec!["a".into(), "b".into()],
        };
        let result = FeasibilityResult {
            feasible: false,
            conflicts: vec![Conflict::from_error(&err)],
            suggestions: vec![Suggestion {
                description: "Remove one dependency among: a, b".into(),
                impact: "Makes the dependency graph acyclic".into(),
            }],
        };
        let text = feasibility_text("Tower", &result);

        assert!(text.starts_with("Tower: 1 conflict(s)"));
        assert!(text.contains("error: Circular dependency among tasks: a, b"));
        assert!(text.contains("help: Remove one dependency"));
    }
}
