//! Schedule optimizer
//!
//! Hill climbing over a leveled baseline. Each iteration evaluates every
//! candidate move by re-running the full leveler and applies the single best
//! one; the loop stops when no move improves the objective, when the
//! iteration budget is spent, or when the caller cancels.
//!
//! - `minimize_duration` crashes critical effort-driven tasks: one extra unit
//!   on a requirement that still has headroom (`max_quantity`, pool capacity).
//!   Accepted only when the project gets strictly shorter.
//! - `minimize_peak_usage` pushes a task with float later, by any number of
//!   days within its float. Accepted only when the peak improves and the
//!   duration does not grow.
//!
//! Neither move may add shortages, so the result is never worse than the
//! baseline.

use sitesched_core::{
    CancellationToken, DurationMethod, OptimizationObjective, OptimizerMove, OptimizerReport,
    PeakUsage, ScheduleError,
};
use tracing::{debug, info};

use crate::dag::SchedulingGraph;
use crate::leveling::{LevelingResult, ResourceLeveler};

/// The best schedule found plus the state that reproduces it
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Leveled result of the best state
    pub leveled: LevelingResult,
    /// Graph before leveling, with any crashed unit counts
    pub graph: SchedulingGraph,
    /// Release offsets before leveling, with any optimizer shifts
    pub release: Vec<i64>,
    /// None when no objective was configured
    pub report: Option<OptimizerReport>,
}

/// A candidate state and the move that produced it
struct Candidate {
    graph: SchedulingGraph,
    release: Vec<i64>,
    leveled: LevelingResult,
    peak: PeakUsage,
    step: OptimizerMove,
}

#[derive(Debug, Clone)]
pub struct ScheduleOptimizer<'a> {
    leveler: ResourceLeveler<'a>,
    objective: OptimizationObjective,
    max_iterations: usize,
    cancellation: Option<CancellationToken>,
}

impl<'a> ScheduleOptimizer<'a> {
    pub fn new(
        leveler: ResourceLeveler<'a>,
        objective: OptimizationObjective,
        max_iterations: usize,
    ) -> Self {
        Self {
            leveler,
            objective,
            max_iterations,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map_or(false, CancellationToken::is_cancelled)
    }

    fn peak(&self, leveled: &LevelingResult) -> PeakUsage {
        self.leveler
            .timeline()
            .peak(&leveled.graph, &leveled.cpm)
    }

    /// Improve `baseline`, the leveled form of (`graph`, `release`)
    pub fn optimize(
        &self,
        graph: SchedulingGraph,
        release: Vec<i64>,
        baseline: LevelingResult,
    ) -> Result<OptimizationResult, ScheduleError> {
        if self.objective == OptimizationObjective::None {
            return Ok(OptimizationResult {
                leveled: baseline,
                graph,
                release,
                report: None,
            });
        }

        let baseline_duration = baseline.duration();
        let baseline_peak = self.peak(&baseline);
        info!(
            objective = %self.objective,
            duration = baseline_duration,
            max_iterations = self.max_iterations,
            "optimizer started"
        );

        let mut graph = graph;
        let mut release = release;
        let mut best = baseline;
        let mut best_peak = baseline_peak;
        let mut moves = Vec::new();
        let mut iterations = 0;
        let mut cancelled = false;
        let mut converged = false;

        while iterations < self.max_iterations {
            if self.cancelled() {
                cancelled = true;
                break;
            }
            iterations += 1;

            let candidate = match self.objective {
                OptimizationObjective::MinimizeDuration => {
                    self.best_crash(&graph, &release, &best)?
                }
                OptimizationObjective::MinimizePeakUsage => {
                    self.best_shift(&graph, &release, &best, &best_peak)?
                }
                OptimizationObjective::None => None,
            };

            let Some(candidate) = candidate else {
                converged = true;
                break;
            };

            debug!(
                step = ?candidate.step,
                duration = candidate.leveled.duration(),
                peak_ratio = candidate.peak.ratio,
                "optimizer accepted move"
            );
            graph = candidate.graph;
            release = candidate.release;
            best = candidate.leveled;
            best_peak = candidate.peak;
            moves.push(candidate.step);
        }

        let report = OptimizerReport {
            objective: self.objective,
            iterations,
            moves,
            baseline_duration,
            final_duration: best.duration(),
            baseline_peak,
            final_peak: best_peak,
            terminated_early: !converged && !cancelled,
            cancelled,
        };
        info!(
            iterations,
            moves = report.moves.len(),
            duration = report.final_duration,
            cancelled,
            "optimizer finished"
        );

        Ok(OptimizationResult {
            leveled: best,
            graph,
            release,
            report: Some(report),
        })
    }

    /// Shortest schedule reachable by adding one unit to one critical requirement
    fn best_crash(
        &self,
        graph: &SchedulingGraph,
        release: &[i64],
        current: &LevelingResult,
    ) -> Result<Option<Candidate>, ScheduleError> {
        let mut best: Option<Candidate> = None;

        for &idx in &current.cpm.critical_path {
            let task = &graph.tasks[idx];
            if task.task.method != DurationMethod::EffortDriven {
                continue;
            }
            for (d, demand) in task.demands.iter().enumerate() {
                let limit = demand.max_units.unwrap_or(demand.units);
                let capacity = self.leveler.capacity_of(&demand.resource_id).unwrap_or(0);
                let units = demand.units + 1;
                if units > limit || units > capacity {
                    continue;
                }

                let mut trial = graph.clone();
                if !trial.set_demand_units(idx, d, units)? {
                    continue;
                }
                let leveled = self.leveler.level(trial.clone(), release.to_vec())?;
                if leveled.duration() >= current.duration()
                    || leveled.shortages.len() > current.shortages.len()
                {
                    continue;
                }
                if best
                    .as_ref()
                    .map_or(true, |b| leveled.duration() < b.leveled.duration())
                {
                    best = Some(Candidate {
                        peak: self.peak(&leveled),
                        graph: trial,
                        release: release.to_vec(),
                        leveled,
                        step: OptimizerMove::Crash {
                            task_id: task.id.clone(),
                            resource_id: demand.resource_id.clone(),
                            units,
                        },
                    });
                }
            }
        }
        Ok(best)
    }

    /// Flattest schedule reachable by delaying one task within its float
    fn best_shift(
        &self,
        graph: &SchedulingGraph,
        release: &[i64],
        current: &LevelingResult,
        current_peak: &PeakUsage,
    ) -> Result<Option<Candidate>, ScheduleError> {
        let mut best: Option<Candidate> = None;

        for (idx, task) in graph.tasks.iter().enumerate() {
            let r = current.cpm.get(idx);
            if r.total_float <= 0 || r.duration == 0 || task.demands.is_empty() {
                continue;
            }

            for delay in 1..=r.total_float {
                let mut trial_release = release.to_vec();
                trial_release[idx] = r.es + delay;
                let leveled = self.leveler.level(graph.clone(), trial_release.clone())?;
                if leveled.duration() > current.duration()
                    || leveled.shortages.len() > current.shortages.len()
                {
                    continue;
                }
                let peak = self.peak(&leveled);
                let target = best.as_ref().map_or(current_peak, |b| &b.peak);
                if peak.is_better_than(target) {
                    best = Some(Candidate {
                        graph: graph.clone(),
                        release: trial_release,
                        step: OptimizerMove::Shift {
                            task_id: task.id.clone(),
                            delay: leveled.cpm.get(idx).es - r.es,
                        },
                        leveled,
                        peak,
                    });
                }
            }
        }
        Ok(best)
    }
}
