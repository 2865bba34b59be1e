//! Schedule assembly
//!
//! Turns a finalized graph and its CPM result into the [`Schedule`] value
//! object: offsets become dates, demands become assignments with costs, and
//! the usage profile, utilization summary and critical chains are derived.
//! Assembly reads its inputs only; the same inputs give identical output.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use sitesched_core::{
    Assignment, Money, Project, ResourceId, ResourceUtilization, Schedule, ScheduledTask,
};

use crate::cpm::{edge_slack, CpmSchedule};
use crate::dag::{SchedulingGraph, TaskIdx};
use crate::timeline::{usage_by_class, Timeline};

/// Upper bound on enumerated critical chains
const MAX_CRITICAL_CHAINS: usize = 100;

pub struct ScheduleAssembler<'a> {
    project: &'a Project,
}

impl<'a> ScheduleAssembler<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    /// Build the schedule; `delays` holds the leveling delay per task
    pub fn assemble(&self, graph: &SchedulingGraph, cpm: &CpmSchedule, delays: &[i64]) -> Schedule {
        let project = self.project;
        let end = cpm.project_end.max(0);
        let mut timeline = Timeline::new(&project.resources, &project.calendars, project.start);
        timeline.ensure(end as usize + 1);

        // Last working day of a span [from, to)
        let last_day = |from: i64, to: i64| {
            if to > from {
                timeline.date(to - 1)
            } else {
                timeline.date(from)
            }
        };

        let mut tasks = BTreeMap::new();
        let mut total = Decimal::ZERO;
        let mut any_cost = false;

        for (idx, graph_task) in graph.tasks.iter().enumerate() {
            let r = cpm.get(idx);
            let start = timeline.date(r.es);
            let finish = last_day(r.es, r.ef);

            let assignments: Vec<Assignment> = graph_task
                .demands
                .iter()
                .filter(|d| d.units > 0 && timeline.class_index(&d.resource_id).is_some())
                .map(|d| Assignment {
                    resource_id: d.resource_id.clone(),
                    units: d.units,
                    start,
                    finish,
                    cost: self.assignment_cost(&d.resource_id, d.units, r.duration),
                })
                .collect();

            let task_cost = assignments
                .iter()
                .filter_map(|a| a.cost.as_ref())
                .map(|c| c.amount)
                .reduce(|a, b| a + b);
            if let Some(amount) = task_cost {
                total += amount;
                any_cost = true;
            }

            let task = &graph_task.task;
            tasks.insert(
                graph_task.id.clone(),
                ScheduledTask {
                    task_id: graph_task.id.clone(),
                    name: if task.name.is_empty() {
                        graph_task.id.clone()
                    } else {
                        task.name.clone()
                    },
                    zone: task.zone.clone(),
                    floor: task.floor,
                    discipline: task.discipline.clone(),
                    start,
                    finish,
                    duration: r.duration,
                    early_start: r.es,
                    early_finish: r.ef,
                    late_start: r.ls,
                    late_finish: r.lf,
                    late_start_date: timeline.date(r.ls),
                    late_finish_date: last_day(r.ls, r.lf),
                    total_float: r.total_float,
                    free_float: r.free_float,
                    is_critical: r.is_critical,
                    assignments,
                    cost: task_cost.map(|amount| Money::new(amount, project.currency.clone())),
                    leveling_delay: delays.get(idx).copied().unwrap_or(0),
                },
            );
        }

        let (resource_usage, daily_usage) = self.usage(graph, cpm, &timeline);

        Schedule {
            project_name: project.name.clone(),
            project_start: timeline.date(0),
            project_end: last_day(0, end),
            project_duration: end,
            tasks,
            critical_path: cpm
                .critical_path
                .iter()
                .map(|idx| graph.tasks[*idx].id.clone())
                .collect(),
            critical_chains: critical_chains(graph, cpm),
            resource_usage,
            daily_usage,
            total_cost: any_cost.then(|| Money::new(total, project.currency.clone())),
        }
    }

    /// rate x hours per working day x units x duration
    fn assignment_cost(&self, resource_id: &str, units: u32, duration: i64) -> Option<Money> {
        let resource = self.project.get_resource(resource_id)?;
        let rate = resource.rate.as_ref()?;
        let hours = self.project.calendars.for_resource(resource_id).hours_per_day;
        let amount = rate.amount
            * Decimal::from(hours)
            * Decimal::from(units)
            * Decimal::from(duration);
        Some(Money::new(amount, self.project.currency.clone()))
    }

    #[allow(clippy::type_complexity)]
    fn usage(
        &self,
        graph: &SchedulingGraph,
        cpm: &CpmSchedule,
        timeline: &Timeline<'_>,
    ) -> (
        BTreeMap<ResourceId, ResourceUtilization>,
        BTreeMap<chrono::NaiveDate, BTreeMap<ResourceId, u32>>,
    ) {
        // Pool classes first, then classes only referenced by requirements
        let mut ids: Vec<ResourceId> = timeline.classes().iter().map(|c| c.id.clone()).collect();
        let referenced: BTreeSet<&ResourceId> = graph
            .tasks
            .iter()
            .flat_map(|t| t.demands.iter().map(|d| &d.resource_id))
            .collect();
        for id in referenced {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }

        let usage = usage_by_class(graph, cpm, &ids, None);
        let span = cpm.project_end.max(0) as usize;

        let mut daily_usage: BTreeMap<chrono::NaiveDate, BTreeMap<ResourceId, u32>> =
            BTreeMap::new();
        for (id, days) in ids.iter().zip(&usage) {
            for (day, units) in days.iter().enumerate().filter(|(_, u)| **u > 0) {
                daily_usage
                    .entry(timeline.date(day as i64))
                    .or_default()
                    .insert(id.clone(), *units);
            }
        }

        let mut resource_usage = BTreeMap::new();
        for (class_idx, class) in timeline.classes().iter().enumerate() {
            let days = &usage[class_idx];
            let peak_units = days.iter().copied().max().unwrap_or(0);
            let peak_date = (peak_units > 0)
                .then(|| days.iter().position(|u| *u == peak_units))
                .flatten()
                .map(|day| timeline.date(day as i64));
            let used_unit_days: u64 = days.iter().map(|u| u64::from(*u)).sum();
            let available_unit_days = timeline.available_unit_days(class_idx, span);
            let utilization_percent = if available_unit_days == 0 {
                0.0
            } else {
                let percent = used_unit_days as f64 / available_unit_days as f64 * 100.0;
                (percent * 100.0).round() / 100.0
            };

            resource_usage.insert(
                class.id.clone(),
                ResourceUtilization {
                    resource_id: class.id.clone(),
                    capacity: class.capacity,
                    peak_units,
                    peak_date,
                    used_unit_days,
                    available_unit_days,
                    utilization_percent,
                },
            );
        }

        (resource_usage, daily_usage)
    }
}

/// Maximal chains of critical tasks joined by binding dependencies
///
/// A chain follows only edges with zero slack between two critical tasks.
/// Chains start at critical tasks with no such incoming edge and are listed
/// in topological order of their first task.
pub fn critical_chains(graph: &SchedulingGraph, cpm: &CpmSchedule) -> Vec<Vec<String>> {
    let n = graph.len();
    let mut next: Vec<Vec<TaskIdx>> = vec![Vec::new(); n];
    let mut has_binding_pred = vec![false; n];

    for edge in &graph.edges {
        if cpm.get(edge.from).is_critical
            && cpm.get(edge.to).is_critical
            && edge_slack(edge, cpm) == 0
        {
            next[edge.from].push(edge.to);
            has_binding_pred[edge.to] = true;
        }
    }
    for successors in &mut next {
        successors.sort_unstable();
        successors.dedup();
    }

    let mut chains = Vec::new();
    for &root in &cpm.critical_path {
        if has_binding_pred[root] {
            continue;
        }
        let mut stack: Vec<Vec<TaskIdx>> = vec![vec![root]];
        while let Some(path) = stack.pop() {
            if chains.len() >= MAX_CRITICAL_CHAINS {
                return chains;
            }
            let Some(&last) = path.last() else {
                continue;
            };
            if next[last].is_empty() {
                chains.push(path.iter().map(|i| graph.tasks[*i].id.clone()).collect());
                continue;
            }
            // Reverse push keeps the lowest successor first
            for &succ in next[last].iter().rev() {
                let mut extended = path.clone();
                extended.push(succ);
                stack.push(extended);
            }
        }
    }
    chains
}
