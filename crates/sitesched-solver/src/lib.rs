//! # sitesched-solver
//!
//! Schedule generation engine for construction projects.
//!
//! A run is a straight pipeline, each stage consuming the complete output of
//! the previous one:
//!
//! 1. [`dag`]: validate tasks and dependencies, resolve durations, order waves
//! 2. [`cpm`]: forward/backward pass, float and criticality
//! 3. [`leveling`]: shift tasks until no resource class is over-allocated
//! 4. [`optimizer`]: optional crashing or peak shaving
//! 5. [`assembler`]: dates, assignments, costs and usage profiles
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use sitesched_core::{Dependency, Project, Scheduler, Task};
//! use sitesched_solver::SiteScheduler;
//!
//! let mut project = Project::new("Slab", NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
//! project.tasks = vec![Task::new("formwork").fixed(2.0), Task::new("pour").fixed(1.0)];
//! project.dependencies = vec![Dependency::finish_to_start("formwork", "pour")];
//!
//! let schedule = SiteScheduler::new().schedule(&project).unwrap();
//! assert_eq!(schedule.project_duration, 3);
//! ```

pub mod assembler;
pub mod cpm;
pub mod dag;
pub mod duration;
pub mod leveling;
pub mod optimizer;
pub mod timeline;

use sitesched_core::{
    CancellationToken, Conflict, EngineConfig, Explanation, FeasibilityResult, Project,
    ResourceShortage, ScheduleDiagnostics, ScheduleError, ScheduleOutcome, Scheduler,
    ShortageKind, Suggestion, TaskId,
};
use tracing::info;

use crate::assembler::ScheduleAssembler;
use crate::cpm::{edge_slack, CpmScheduler};
use crate::dag::{EdgeKind, SchedulingGraph};
use crate::leveling::ResourceLeveler;
use crate::optimizer::{OptimizationResult, ScheduleOptimizer};

/// Pipeline state after leveling and optimization
struct Solved {
    result: OptimizationResult,
    /// Working days leveling pushed each task past its pre-leveling early start
    delays: Vec<i64>,
}

/// CPM-based scheduler with resource leveling and optional optimization
#[derive(Debug, Clone, Default)]
pub struct SiteScheduler {
    config: EngineConfig,
    cancellation: Option<CancellationToken>,
}

impl SiteScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            cancellation: None,
        }
    }

    /// Stop the optimizer loop once `token` is cancelled or its deadline passes
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn leveler<'a>(&self, project: &'a Project) -> ResourceLeveler<'a> {
        ResourceLeveler::new(&project.resources, &project.calendars, project.start)
            .with_tie_break(self.config.tie_break_policy)
            .with_max_iterations(self.config.max_leveling_iterations)
            .enabled(self.config.resource_leveling)
    }

    /// Input validation and graph construction
    fn prepare(&self, project: &Project) -> Result<SchedulingGraph, ScheduleError> {
        self.config.validate()?;
        project.calendars.validate()?;
        SchedulingGraph::build(&project.tasks, &project.dependencies, &project.requirements)
    }

    fn solve(&self, project: &Project) -> Result<Solved, ScheduleError> {
        let graph = self.prepare(project)?;
        info!(
            project = %project.name,
            tasks = graph.len(),
            dependencies = graph.edges.len(),
            waves = graph.waves.len(),
            "dependency graph built"
        );

        let leveler = self.leveler(project);
        let baseline = leveler.level(graph.clone(), Vec::new())?;

        let result = ScheduleOptimizer::new(
            leveler,
            self.config.optimization_objective,
            self.config.max_optimizer_iterations,
        )
        .with_cancellation(self.cancellation.clone())
        .optimize(graph, Vec::new(), baseline)?;

        // Optimizer shifts live in `result.release` and are not leveling delays
        let unconstrained =
            CpmScheduler::new().schedule_with_release(&result.graph, &result.release)?;
        let delays = (0..result.leveled.graph.len())
            .map(|idx| (result.leveled.cpm.get(idx).es - unconstrained.get(idx).es).max(0))
            .collect();

        Ok(Solved { result, delays })
    }
}

impl Scheduler for SiteScheduler {
    fn run(&self, project: &Project) -> Result<ScheduleOutcome, ScheduleError> {
        let Solved { result, delays } = self.solve(project)?;
        let leveled = &result.leveled;
        let schedule =
            ScheduleAssembler::new(project).assemble(&leveled.graph, &leveled.cpm, &delays);

        info!(
            project = %project.name,
            duration = schedule.project_duration,
            critical = schedule.critical_path.len(),
            shortages = leveled.shortages.len(),
            "schedule assembled"
        );

        let diagnostics = ScheduleDiagnostics {
            shortages: leveled.shortages.clone(),
            shifts: leveled.shifts.clone(),
            resource_links: leveled.links.clone(),
            adjustments: leveled.adjustments.clone(),
            leveling_iterations: leveled.iterations,
            leveling_incomplete: leveled.incomplete,
            optimizer: result.report,
        };
        Ok(ScheduleOutcome {
            schedule,
            diagnostics,
        })
    }

    fn is_feasible(&self, project: &Project) -> FeasibilityResult {
        let graph = match self.prepare(project) {
            Ok(graph) => graph,
            Err(err) => {
                let suggestions = suggest_for_error(&err).into_iter().collect();
                return FeasibilityResult {
                    feasible: false,
                    conflicts: vec![Conflict::from_error(&err)],
                    suggestions,
                };
            }
        };

        let leveled = match self.leveler(project).level(graph, Vec::new()) {
            Ok(leveled) => leveled,
            Err(err) => {
                return FeasibilityResult {
                    feasible: false,
                    conflicts: vec![Conflict::from_error(&err)],
                    suggestions: Vec::new(),
                }
            }
        };

        let conflicts = leveled
            .shortages
            .iter()
            .map(|s| Conflict::from_error(&ScheduleError::ResourceShortage(vec![s.clone()])))
            .collect::<Vec<_>>();
        let suggestions = leveled.shortages.iter().map(suggest_for_shortage).collect();

        FeasibilityResult {
            feasible: conflicts.is_empty(),
            conflicts,
            suggestions,
        }
    }

    fn explain(&self, project: &Project, task: &TaskId) -> Explanation {
        let explanation = |reason: String| Explanation {
            task_id: task.clone(),
            reason,
            constraints_applied: Vec::new(),
            alternatives_considered: Vec::new(),
        };

        let solved = match self.solve(project) {
            Ok(solved) => solved,
            Err(err) => return explanation(format!("Project cannot be scheduled: {}", err)),
        };
        let leveled = &solved.result.leveled;
        let Some(idx) = leveled.graph.index_of(task) else {
            return explanation(format!("Task '{}' is not part of the project", task));
        };

        let r = leveled.cpm.get(idx);
        let mut timeline = self.leveler(project).timeline();
        timeline.ensure(r.es.max(0) as usize + 1);

        let mut constraints_applied = Vec::new();
        let mut driver = None;
        for edge in leveled.graph.incoming(idx) {
            let pred = &leveled.graph.tasks[edge.from].id;
            let slack = edge_slack(edge, &leveled.cpm);
            let source = match edge.kind {
                EdgeKind::Declared => "dependency",
                EdgeKind::Resource => "resource link",
            };
            constraints_applied.push(format!(
                "{} {} from '{}' (lag {}, slack {})",
                edge.dep_type, source, pred, edge.lag, slack
            ));
            if slack == 0 && driver.is_none() {
                driver = Some(format!("{} {} on '{}'", edge.dep_type, source, pred));
            }
        }

        let delay = solved.delays[idx];
        if let Some(shift) = leveled.shifts.iter().find(|s| s.task_id == *task) {
            constraints_applied.push(format!(
                "resource leveling on '{}' moved the start from day {} to day {}",
                shift.resource_id, shift.original_start, shift.new_start
            ));
        }

        let start = timeline.date(r.es);
        let reason = match (&driver, r.es, delay) {
            (_, 0, _) => format!("Starts at project start ({})", start),
            (Some(driver), _, _) => format!("Starts on {} driven by {}", start, driver),
            (None, _, d) if d > 0 => format!(
                "Starts on {} after a resource leveling delay of {} working days",
                start, d
            ),
            (None, _, _) => format!("Starts on {}", start),
        };

        let mut alternatives_considered = Vec::new();
        if r.is_critical {
            alternatives_considered
                .push("On the critical path: any delay extends the project".to_string());
        } else {
            alternatives_considered.push(format!(
                "Could slip {} working days without delaying the project ({} without delaying a successor)",
                r.total_float, r.free_float
            ));
        }

        Explanation {
            task_id: task.clone(),
            reason,
            constraints_applied,
            alternatives_considered,
        }
    }
}

fn suggest_for_error(err: &ScheduleError) -> Option<Suggestion> {
    let (description, impact) = match err {
        ScheduleError::Cycle { tasks } => (
            format!("Remove one dependency among: {}", tasks.join(", ")),
            "Makes the dependency graph acyclic",
        ),
        ScheduleError::UnknownTaskReference { missing, .. } => (
            format!("Add task '{}' or remove references to it", missing),
            "Resolves the dangling reference",
        ),
        ScheduleError::DuplicateTask(id) => (
            format!("Rename one of the tasks with id '{}'", id),
            "Makes task ids unique",
        ),
        ScheduleError::InvalidCalendar { calendar, .. } => (
            format!("Give calendar '{}' at least one working day", calendar),
            "Allows offsets to map to dates",
        ),
        _ => return None,
    };
    Some(Suggestion {
        description,
        impact: impact.to_string(),
    })
}

fn suggest_for_shortage(shortage: &ResourceShortage) -> Suggestion {
    let task = shortage.task_id.as_deref().unwrap_or("the project");
    let description = match &shortage.kind {
        ShortageKind::UnknownResource => {
            format!("Add resource '{}' to the pool", shortage.resource_id)
        }
        ShortageKind::NoCapacity => format!(
            "Give resource '{}' capacity on at least one working day",
            shortage.resource_id
        ),
        ShortageKind::ExceedsCapacity { required, .. } => format!(
            "Raise capacity of '{}' to at least {}",
            shortage.resource_id, required
        ),
        ShortageKind::NoFeasibleWindow => format!(
            "Relax the calendar of '{}' or split task '{}'",
            shortage.resource_id, task
        ),
        ShortageKind::Overallocated { .. } => format!(
            "Add capacity to '{}' or let resource leveling resolve it",
            shortage.resource_id
        ),
    };
    Suggestion {
        description,
        impact: format!("Lets '{}' be scheduled without over-allocation", task),
    }
}
