//! Resource Leveling Algorithm
//!
//! Detects and resolves resource over-allocation by shifting tasks later,
//! re-running CPM incrementally after every shift.
//!
//! Each iteration looks at the earliest over-allocated (day, class) pair and
//! picks one of the tasks active on that day to yield:
//!
//! 1. Non-critical tasks yield before critical ones
//! 2. Then the task with the greatest total float
//! 3. Then the task with the latest early start, so work already in progress
//!    keeps its place against equally ranked newcomers
//! 4. Then the tie-break policy (later-listed task, or greater task id)
//!
//! The yielding task jumps to the earliest finish among the other tasks
//! holding the class that day, or one working day when it competes only with
//! the class calendar.
//!
//! When only zero-float tasks remain the project is extended: no resource is
//! double-booked, even at the cost of a longer critical path.
//!
//! Requirements that can never be met (unknown class, zero capacity, more
//! units than the class ever offers, or no free window before the horizon)
//! are reported as shortages and left out of leveling. Effort-driven tasks
//! asking for more units than exist are instead cut down to the class
//! capacity, which lengthens them. With leveling disabled the same checks
//! run, and every class still over capacity is reported as well.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use sitesched_core::{
    AssignmentAdjustment, CalendarSet, DurationMethod, Resource, ResourceId, ResourceLink,
    ResourceShortage, ScheduleError, ShiftEvent, ShortageKind, TieBreakPolicy,
};
use tracing::{debug, info, warn};

use crate::cpm::{CpmSchedule, CpmScheduler};
use crate::dag::{SchedulingGraph, TaskIdx};
use crate::timeline::Timeline;

/// Extra working days beyond the serial-schedule bound a task may be pushed
const HORIZON_MARGIN_DAYS: usize = 366;

/// Result of resource leveling
#[derive(Debug, Clone)]
pub struct LevelingResult {
    /// Graph including any resource links
    pub graph: SchedulingGraph,
    /// CPM of the leveled placement
    pub cpm: CpmSchedule,
    /// Release offsets that reproduce `cpm` (input release plus leveling delays)
    pub release: Vec<i64>,
    /// Tasks that were shifted
    pub shifts: Vec<ShiftEvent>,
    /// Requirements that could not be honoured
    pub shortages: Vec<ResourceShortage>,
    pub links: Vec<ResourceLink>,
    pub adjustments: Vec<AssignmentAdjustment>,
    pub iterations: usize,
    /// The iteration cap was hit with over-allocation remaining
    pub incomplete: bool,
}

impl LevelingResult {
    fn unleveled(graph: SchedulingGraph, cpm: CpmSchedule, release: Vec<i64>) -> Self {
        Self {
            graph,
            cpm,
            release,
            shifts: Vec::new(),
            shortages: Vec::new(),
            links: Vec::new(),
            adjustments: Vec::new(),
            iterations: 0,
            incomplete: false,
        }
    }

    /// Project duration in working days
    pub fn duration(&self) -> i64 {
        self.cpm.project_end
    }

    /// Leveling delay per task
    pub fn delays(&self) -> Vec<i64> {
        let mut delays = vec![0; self.graph.len()];
        for shift in &self.shifts {
            if let Some(idx) = self.graph.index_of(&shift.task_id) {
                delays[idx] = shift.delay();
            }
        }
        delays
    }
}

/// Task candidate for shifting
#[derive(Debug, Clone, Eq, PartialEq)]
struct ShiftCandidate {
    idx: TaskIdx,
    is_critical: bool,
    total_float: i64,
    es: i64,
    /// Position under the tie-break policy; higher yields first
    rank: usize,
}

impl Ord for ShiftCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Greatest candidate yields:
        // 1. Not critical
        // 2. More float
        // 3. Later early start
        // 4. Higher tie-break rank
        other
            .is_critical
            .cmp(&self.is_critical)
            .then(self.total_float.cmp(&other.total_float))
            .then(self.es.cmp(&other.es))
            .then(self.rank.cmp(&other.rank))
    }
}

impl PartialOrd for ShiftCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Resource-constrained leveler
#[derive(Debug, Clone)]
pub struct ResourceLeveler<'a> {
    resources: &'a [Resource],
    calendars: &'a CalendarSet,
    start: NaiveDate,
    tie_break: TieBreakPolicy,
    max_iterations: Option<usize>,
    enabled: bool,
}

impl<'a> ResourceLeveler<'a> {
    pub fn new(resources: &'a [Resource], calendars: &'a CalendarSet, start: NaiveDate) -> Self {
        Self {
            resources,
            calendars,
            start,
            tie_break: TieBreakPolicy::InputOrder,
            max_iterations: None,
            enabled: true,
        }
    }

    pub fn with_tie_break(mut self, policy: TieBreakPolicy) -> Self {
        self.tie_break = policy;
        self
    }

    pub fn with_max_iterations(mut self, max: Option<usize>) -> Self {
        self.max_iterations = max;
        self
    }

    /// With leveling disabled, `level` checks allocation and reports
    /// over-allocation without shifting anything
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn timeline(&self) -> Timeline<'a> {
        Timeline::new(self.resources, self.calendars, self.start)
    }

    /// Nominal capacity of a pool class
    pub fn capacity_of(&self, resource_id: &str) -> Option<u32> {
        self.resources
            .iter()
            .find(|r| r.id == resource_id)
            .map(|r| r.capacity)
    }

    /// Level `graph` starting from `release` (one entry per task, missing entries are 0)
    pub fn level(
        &self,
        mut graph: SchedulingGraph,
        mut release: Vec<i64>,
    ) -> Result<LevelingResult, ScheduleError> {
        let scheduler = CpmScheduler::new();
        let n = graph.len();
        release.resize(n, 0);
        let mut cpm = scheduler.schedule_with_release(&graph, &release)?;

        if graph.is_empty() {
            return Ok(LevelingResult::unleveled(graph, cpm, release));
        }

        let horizon = self.horizon(&graph, &cpm);
        let mut timeline = self.timeline();
        timeline.ensure(horizon + 1);

        let base_release = release.clone();
        let mut excluded: Vec<Vec<bool>> = graph
            .tasks
            .iter()
            .map(|t| vec![false; t.demands.len()])
            .collect();
        let mut shortages = Vec::new();
        let mut adjustments = Vec::new();

        // ════════════════════════════════════════════════════════════════════
        // ALLOCATION: reject or resize requirements the pool can never meet
        // ════════════════════════════════════════════════════════════════════

        let mut resized = Vec::new();
        for idx in 0..n {
            for d in 0..graph.tasks[idx].demands.len() {
                let demand = graph.tasks[idx].demands[d].clone();
                let task_id = graph.tasks[idx].id.clone();
                let shortage = |kind| ResourceShortage {
                    resource_id: demand.resource_id.clone(),
                    task_id: Some(task_id.clone()),
                    kind,
                };

                let Some(class) = timeline.class_index(&demand.resource_id) else {
                    shortages.push(shortage(ShortageKind::UnknownResource));
                    excluded[idx][d] = true;
                    continue;
                };
                let capacity = timeline.max_capacity(class, horizon);
                if demand.units == 0 {
                    continue;
                }
                if capacity == 0 {
                    shortages.push(shortage(ShortageKind::NoCapacity));
                    excluded[idx][d] = true;
                } else if demand.units > capacity {
                    if graph.tasks[idx].task.method == DurationMethod::EffortDriven {
                        graph.set_demand_units(idx, d, capacity)?;
                        adjustments.push(AssignmentAdjustment {
                            task_id: task_id.clone(),
                            resource_id: demand.resource_id.clone(),
                            requested: demand.units,
                            assigned: capacity,
                        });
                        resized.push(idx);
                    } else {
                        shortages.push(shortage(ShortageKind::ExceedsCapacity {
                            required: demand.units,
                            capacity,
                        }));
                        excluded[idx][d] = true;
                    }
                }
            }
        }
        if !resized.is_empty() {
            resized.dedup();
            cpm = scheduler.reschedule_from(&graph, &cpm, &release, &resized)?;
        }

        if !self.enabled {
            let usage = timeline.pool_usage(&graph, &cpm, Some(&excluded));
            shortages.extend(remaining_overallocations(&usage, &timeline));
            for shortage in &shortages {
                warn!(resource = %shortage.resource_id, "{}", shortage);
            }
            info!(
                shortages = shortages.len(),
                duration = cpm.project_end,
                "resource leveling disabled"
            );
            return Ok(LevelingResult {
                shortages,
                adjustments,
                ..LevelingResult::unleveled(graph, cpm, release)
            });
        }

        // ════════════════════════════════════════════════════════════════════
        // LEVELING LOOP: shift one task per conflict until no day is over-allocated
        // ════════════════════════════════════════════════════════════════════

        let rank = self.ranks(&graph);
        let original_start = cpm.starts();
        let max_iterations = self
            .max_iterations
            .unwrap_or_else(|| n.saturating_mul(horizon).max(1000));
        let mut shifted: BTreeMap<TaskIdx, (ResourceId, bool)> = BTreeMap::new();
        let mut iterations = 0;
        let mut incomplete = false;

        loop {
            let usage = timeline.pool_usage(&graph, &cpm, Some(&excluded));
            let Some((day, class)) = first_overallocation(&usage, &timeline) else {
                break;
            };

            if iterations >= max_iterations {
                incomplete = true;
                shortages.extend(remaining_overallocations(&usage, &timeline));
                warn!(iterations, "leveling stopped at its iteration cap");
                break;
            }
            iterations += 1;

            let class_id = timeline.classes()[class].id.clone();
            let active: Vec<ShiftCandidate> = graph
                .tasks
                .iter()
                .enumerate()
                .filter(|(idx, task)| {
                    let r = cpm.get(*idx);
                    r.duration > 0
                        && r.es <= day as i64
                        && (day as i64) < r.ef
                        && task
                            .demands
                            .iter()
                            .enumerate()
                            .any(|(d, x)| x.resource_id == class_id && !excluded[*idx][d])
                })
                .map(|(idx, _)| {
                    let r = cpm.get(idx);
                    ShiftCandidate {
                        idx,
                        is_critical: r.is_critical,
                        total_float: r.total_float,
                        es: r.es,
                        rank: rank[idx],
                    }
                })
                .collect();

            let Some(chosen) = active.iter().max().cloned() else {
                return Err(ScheduleError::GraphIntegrity(format!(
                    "over-allocation of '{}' on day {} has no active task",
                    class_id, day
                )));
            };

            let idx = chosen.idx;
            let task_id = graph.tasks[idx].id.clone();
            // Earliest day another holder of the class frees a unit
            let new_start = active
                .iter()
                .filter(|c| c.idx != idx)
                .map(|c| cpm.get(c.idx).ef)
                .min()
                .unwrap_or(0)
                .max(chosen.es + 1);

            if new_start + graph.tasks[idx].duration > horizon as i64 {
                warn!(task = %task_id, resource = %class_id, "no feasible window before the leveling horizon");
                for (d, demand) in graph.tasks[idx].demands.iter().enumerate() {
                    if !excluded[idx][d] {
                        shortages.push(ResourceShortage {
                            resource_id: demand.resource_id.clone(),
                            task_id: Some(task_id.clone()),
                            kind: ShortageKind::NoFeasibleWindow,
                        });
                        excluded[idx][d] = true;
                    }
                }
                release[idx] = base_release[idx];
                shifted.remove(&idx);
                cpm = scheduler.reschedule_from(&graph, &cpm, &release, &[idx])?;
                continue;
            }

            debug!(
                task = %task_id,
                resource = %class_id,
                day,
                new_start,
                critical = chosen.is_critical,
                "shifting task"
            );
            release[idx] = new_start;
            let entry = shifted.entry(idx).or_insert((class_id, false));
            entry.1 |= chosen.is_critical;
            cpm = scheduler.reschedule_from(&graph, &cpm, &release, &[idx])?;
        }

        // ════════════════════════════════════════════════════════════════════
        // RESOURCE LINKS: make the leveled order visible to float calculation
        // ════════════════════════════════════════════════════════════════════

        let mut wanted: Vec<(TaskIdx, TaskIdx, ResourceId)> = Vec::new();
        for &idx in shifted.keys() {
            let r = cpm.get(idx);
            for (d, demand) in graph.tasks[idx].demands.iter().enumerate() {
                if excluded[idx][d] {
                    continue;
                }
                for (other, task) in graph.tasks.iter().enumerate() {
                    let o = cpm.get(other);
                    if other == idx || o.duration == 0 || o.ef != r.es {
                        continue;
                    }
                    let shares_class = task
                        .demands
                        .iter()
                        .enumerate()
                        .any(|(od, x)| x.resource_id == demand.resource_id && !excluded[other][od]);
                    if shares_class && !wanted.iter().any(|(f, t, _)| *f == other && *t == idx) {
                        wanted.push((other, idx, demand.resource_id.clone()));
                    }
                }
            }
        }

        let pairs: Vec<(TaskIdx, TaskIdx)> = wanted.iter().map(|(f, t, _)| (*f, *t)).collect();
        let added = graph.add_resource_links(&pairs)?;
        let links: Vec<ResourceLink> = wanted
            .iter()
            .filter(|(f, t, _)| added.contains(&(*f, *t)))
            .map(|(f, t, resource)| ResourceLink {
                predecessor: graph.tasks[*f].id.clone(),
                successor: graph.tasks[*t].id.clone(),
                resource_id: resource.clone(),
            })
            .collect();
        if !added.is_empty() {
            cpm = scheduler.schedule_with_release(&graph, &release)?;
        }

        let shifts: Vec<ShiftEvent> = shifted
            .into_iter()
            .filter(|(idx, _)| cpm.get(*idx).es != original_start[*idx])
            .map(|(idx, (resource_id, was_critical))| ShiftEvent {
                task_id: graph.tasks[idx].id.clone(),
                resource_id,
                original_start: original_start[idx],
                new_start: cpm.get(idx).es,
                was_critical,
            })
            .collect();

        for shortage in &shortages {
            warn!(resource = %shortage.resource_id, "{}", shortage);
        }
        info!(
            iterations,
            shifted = shifts.len(),
            links = links.len(),
            shortages = shortages.len(),
            duration = cpm.project_end,
            "resource leveling finished"
        );

        Ok(LevelingResult {
            graph,
            cpm,
            release,
            shifts,
            shortages,
            links,
            adjustments,
            iterations,
            incomplete,
        })
    }

    /// Serial-schedule bound plus margin: no valid placement needs more days
    fn horizon(&self, graph: &SchedulingGraph, cpm: &CpmSchedule) -> usize {
        let durations: i64 = graph.tasks.iter().map(|t| t.duration).sum();
        let lags: i64 = graph.edges.iter().map(|e| e.lag.max(0)).sum();
        (cpm.project_end + durations + lags).max(0) as usize + HORIZON_MARGIN_DAYS
    }

    fn ranks(&self, graph: &SchedulingGraph) -> Vec<usize> {
        match self.tie_break {
            TieBreakPolicy::InputOrder => (0..graph.len()).collect(),
            TieBreakPolicy::TaskId => {
                let mut order: Vec<TaskIdx> = (0..graph.len()).collect();
                order.sort_by(|a, b| graph.tasks[*a].id.cmp(&graph.tasks[*b].id));
                let mut rank = vec![0; graph.len()];
                for (position, idx) in order.into_iter().enumerate() {
                    rank[idx] = position;
                }
                rank
            }
        }
    }
}

/// Earliest (offset, class) whose usage exceeds capacity
fn first_overallocation(usage: &[Vec<u32>], timeline: &Timeline<'_>) -> Option<(usize, usize)> {
    usage
        .iter()
        .enumerate()
        .filter_map(|(class, days)| {
            days.iter()
                .enumerate()
                .find(|(day, used)| **used > timeline.capacity(class, *day))
                .map(|(day, _)| (day, class))
        })
        .min()
}

/// First over-allocated day of every class, as shortages
fn remaining_overallocations(usage: &[Vec<u32>], timeline: &Timeline<'_>) -> Vec<ResourceShortage> {
    usage
        .iter()
        .enumerate()
        .filter_map(|(class, days)| {
            days.iter()
                .enumerate()
                .find(|(day, used)| **used > timeline.capacity(class, *day))
                .map(|(day, used)| ResourceShortage {
                    resource_id: timeline.classes()[class].id.clone(),
                    task_id: None,
                    kind: ShortageKind::Overallocated {
                        date: timeline.date(day as i64),
                        used: *used,
                        capacity: timeline.capacity(class, day),
                    },
                })
        })
        .collect()
}
