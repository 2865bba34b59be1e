//! Critical Path Method Implementation
//!
//! Textbook CPM operating on a [`SchedulingGraph`], in working-day offsets.
//!
//! # Algorithm
//!
//! 1. Topological waves (done in dag.rs)
//! 2. Forward pass: ES (Early Start) and EF (Early Finish), wave by wave
//! 3. Backward pass: LS (Late Start) and LF (Late Finish), waves reversed
//! 4. Float: Total = LS - ES (must be >= 0), Free = min slack of outgoing edges
//! 5. Critical: every task with zero total float
//!
//! Each task moves through [`TaskPhase`] `Unvisited -> ForwardComputed ->
//! BackwardComputed -> Finalized`. Tasks within one wave only read values of
//! earlier waves, so they are computed in parallel.
//!
//! A per-task *release* offset lets callers hold a task back (resource
//! leveling, optimizer shifts): `ES = max(release, predecessor constraints, 0)`.

use rayon::prelude::*;
use sitesched_core::{DependencyType, ScheduleError};

use crate::dag::{DependencyEdge, SchedulingGraph, TaskIdx};

/// Progress of one task through a CPM run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Unvisited,
    ForwardComputed,
    BackwardComputed,
    Finalized,
}

/// Result of CPM scheduling for a single task
#[derive(Debug, Clone, PartialEq)]
pub struct CpmResult {
    /// Early Start (days from project start)
    pub es: i64,
    /// Early Finish (days from project start)
    pub ef: i64,
    /// Late Start (days from project start)
    pub ls: i64,
    /// Late Finish (days from project start)
    pub lf: i64,
    /// Total float (days), never negative
    pub total_float: i64,
    /// Free float (days)
    pub free_float: i64,
    pub is_critical: bool,
    pub duration: i64,
    pub phase: TaskPhase,
}

/// Complete CPM schedule, indexed like the graph arena
#[derive(Debug, Clone)]
pub struct CpmSchedule {
    pub results: Vec<CpmResult>,
    /// Zero-float tasks in topological order
    pub critical_path: Vec<TaskIdx>,
    /// Max EF over all tasks (0 for an empty graph)
    pub project_end: i64,
}

impl CpmSchedule {
    pub fn get(&self, idx: TaskIdx) -> &CpmResult {
        &self.results[idx]
    }

    /// Early start of every task
    pub fn starts(&self) -> Vec<i64> {
        self.results.iter().map(|r| r.es).collect()
    }
}

/// CPM scheduler operating on the dependency graph
#[derive(Debug, Clone, Copy, Default)]
pub struct CpmScheduler;

impl CpmScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Full CPM pass with every task released at project start
    pub fn schedule(&self, graph: &SchedulingGraph) -> Result<CpmSchedule, ScheduleError> {
        self.run(graph, &[], None)
    }

    /// Full CPM pass honouring per-task release offsets
    pub fn schedule_with_release(
        &self,
        graph: &SchedulingGraph,
        release: &[i64],
    ) -> Result<CpmSchedule, ScheduleError> {
        self.run(graph, release, None)
    }

    /// Incremental pass after `changed` tasks got a new duration or release
    ///
    /// The forward pass only revisits the changed tasks and their descendants;
    /// everything else keeps its early dates from `previous`. The backward pass
    /// is always complete since the project end may have moved.
    pub fn reschedule_from(
        &self,
        graph: &SchedulingGraph,
        previous: &CpmSchedule,
        release: &[i64],
        changed: &[TaskIdx],
    ) -> Result<CpmSchedule, ScheduleError> {
        if previous.results.len() != graph.len() {
            return Err(ScheduleError::GraphIntegrity(format!(
                "previous schedule covers {} tasks, graph has {}",
                previous.results.len(),
                graph.len()
            )));
        }
        let affected = graph.descendants(changed);
        self.run(graph, release, Some((previous, affected)))
    }

    fn run(
        &self,
        graph: &SchedulingGraph,
        release: &[i64],
        seed: Option<(&CpmSchedule, Vec<bool>)>,
    ) -> Result<CpmSchedule, ScheduleError> {
        let n = graph.len();
        let duration: Vec<i64> = graph.tasks.iter().map(|t| t.duration).collect();
        let release_of = |idx: TaskIdx| release.get(idx).copied().unwrap_or(0).max(0);

        let mut es = vec![0i64; n];
        let mut ef = vec![0i64; n];
        let mut phase = vec![TaskPhase::Unvisited; n];

        let affected = match seed {
            Some((previous, affected)) => {
                for idx in (0..n).filter(|i| !affected[*i]) {
                    es[idx] = previous.results[idx].es;
                    ef[idx] = previous.results[idx].ef;
                    phase[idx] = TaskPhase::ForwardComputed;
                }
                Some(affected)
            }
            None => None,
        };

        // ════════════════════════════════════════════════════════════════════
        // FORWARD PASS: Compute Early Start (ES) and Early Finish (EF)
        // ════════════════════════════════════════════════════════════════════
        //
        // For each wave in topological order:
        //   ES = max(release, constraint from each predecessor, 0)
        //   EF = ES + duration

        for wave in &graph.waves {
            let computed: Vec<(TaskIdx, i64)> = {
                let (es, ef, affected) = (&es, &ef, &affected);
                wave.par_iter()
                    .copied()
                    .filter(|idx| affected.as_ref().map_or(true, |a| a[*idx]))
                    .map(|idx| {
                        let early_start = graph
                            .incoming(idx)
                            .map(|edge| successor_es(edge, es[edge.from], ef[edge.from], duration[idx]))
                            .fold(release_of(idx), i64::max);
                        (idx, early_start)
                    })
                    .collect()
            };
            for (idx, early_start) in computed {
                es[idx] = early_start;
                ef[idx] = early_start + duration[idx];
                phase[idx] = TaskPhase::ForwardComputed;
            }
        }

        if let Some(idx) = phase.iter().position(|p| *p != TaskPhase::ForwardComputed) {
            return Err(ScheduleError::GraphIntegrity(format!(
                "task '{}' was not reached by the forward pass",
                graph.tasks[idx].id
            )));
        }

        // Project end is the maximum EF
        let project_end = ef.iter().copied().max().unwrap_or(0);

        // ════════════════════════════════════════════════════════════════════
        // BACKWARD PASS: Compute Late Start (LS) and Late Finish (LF)
        // ════════════════════════════════════════════════════════════════════
        //
        // For each wave in REVERSE order:
        //   LF = min(project_end, constraint from each successor)
        //   LS = LF - duration

        let mut ls = vec![0i64; n];
        let mut lf = vec![0i64; n];

        for wave in graph.waves.iter().rev() {
            let computed: Vec<(TaskIdx, i64)> = {
                let (ls, lf) = (&ls, &lf);
                wave.par_iter()
                    .map(|&idx| {
                        let late_finish = graph
                            .outgoing(idx)
                            .map(|edge| predecessor_lf(edge, ls[edge.to], lf[edge.to], duration[idx]))
                            .fold(project_end, i64::min);
                        (idx, late_finish)
                    })
                    .collect()
            };
            for (idx, late_finish) in computed {
                lf[idx] = late_finish;
                ls[idx] = late_finish - duration[idx];
                phase[idx] = TaskPhase::BackwardComputed;
            }
        }

        // ════════════════════════════════════════════════════════════════════
        // FLOAT CALCULATION
        // ════════════════════════════════════════════════════════════════════
        //
        // Total Float = LS - ES = LF - EF (must be >= 0)
        // Free Float  = min slack over outgoing edges, bounded by total float
        // Critical    = Total Float == 0

        let mut results = Vec::with_capacity(n);
        for idx in 0..n {
            if phase[idx] != TaskPhase::BackwardComputed {
                return Err(ScheduleError::GraphIntegrity(format!(
                    "task '{}' was not reached by the backward pass",
                    graph.tasks[idx].id
                )));
            }

            let total_float = ls[idx] - es[idx];
            if total_float < 0 {
                return Err(ScheduleError::GraphIntegrity(format!(
                    "task '{}' has negative float ({})",
                    graph.tasks[idx].id, total_float
                )));
            }

            let free_float = graph
                .outgoing(idx)
                .map(|edge| es[edge.to] - successor_es(edge, es[idx], ef[idx], duration[edge.to]))
                .fold(total_float, i64::min)
                .max(0);

            results.push(CpmResult {
                es: es[idx],
                ef: ef[idx],
                ls: ls[idx],
                lf: lf[idx],
                total_float,
                free_float,
                is_critical: total_float == 0,
                duration: duration[idx],
                phase: TaskPhase::Finalized,
            });
        }

        let critical_path = graph
            .topo_order
            .iter()
            .copied()
            .filter(|idx| results[*idx].is_critical)
            .collect();

        Ok(CpmSchedule {
            results,
            critical_path,
            project_end,
        })
    }
}

/// Slack of one edge: how far the predecessor may slip before it moves the successor
pub fn edge_slack(edge: &DependencyEdge, cpm: &CpmSchedule) -> i64 {
    let pred = cpm.get(edge.from);
    let succ = cpm.get(edge.to);
    succ.es - successor_es(edge, pred.es, pred.ef, succ.duration)
}

/// Compute the ES constraint for a successor based on dependency type
///
/// For FS and SS, the constraint is directly on ES.
/// For FF and SF, the constraint is on EF, so we convert to ES by subtracting duration.
pub fn successor_es(edge: &DependencyEdge, pred_es: i64, pred_ef: i64, succ_duration: i64) -> i64 {
    let lag = edge.lag;

    match edge.dep_type {
        // ES(succ) >= EF(pred) + lag
        DependencyType::FinishToStart => pred_ef + lag,
        // ES(succ) >= ES(pred) + lag
        DependencyType::StartToStart => pred_es + lag,
        // EF(succ) >= EF(pred) + lag
        DependencyType::FinishToFinish => pred_ef + lag - succ_duration,
        // EF(succ) >= ES(pred) + lag
        DependencyType::StartToFinish => pred_es + lag - succ_duration,
    }
}

/// Compute the LF constraint for a predecessor based on dependency type
///
/// For FS and FF, the constraint is directly on LF.
/// For SS and SF, the constraint is on LS, so we convert to LF by adding duration.
fn predecessor_lf(edge: &DependencyEdge, succ_ls: i64, succ_lf: i64, pred_duration: i64) -> i64 {
    let lag = edge.lag;

    match edge.dep_type {
        // LF(pred) <= LS(succ) - lag
        DependencyType::FinishToStart => succ_ls - lag,
        // LS(pred) <= LS(succ) - lag
        DependencyType::StartToStart => succ_ls - lag + pred_duration,
        // LF(pred) <= LF(succ) - lag
        DependencyType::FinishToFinish => succ_lf - lag,
        // LS(pred) <= LF(succ) - lag
        DependencyType::StartToFinish => succ_lf - lag + pred_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesched_core::{Dependency, Task};

    fn make_graph(tasks: &[(&str, f64, &[&str])]) -> SchedulingGraph {
        let list: Vec<Task> = tasks.iter().map(|(id, d, _)| Task::new(*id).fixed(*d)).collect();
        let deps: Vec<Dependency> = tasks
            .iter()
            .flat_map(|(id, _, preds)| {
                preds
                    .iter()
                    .map(move |p| Dependency::finish_to_start(*p, *id))
            })
            .collect();
        SchedulingGraph::build(&list, &deps, &[]).unwrap()
    }

    fn result<'a>(graph: &SchedulingGraph, cpm: &'a CpmSchedule, id: &str) -> &'a CpmResult {
        cpm.get(graph.index_of(id).unwrap())
    }

    #[test]
    fn test_single_task() {
        let graph = make_graph(&[("a", 5.0, &[])]);
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        let a = result(&graph, &cpm, "a");
        assert_eq!((a.es, a.ef, a.ls, a.lf), (0, 5, 0, 5));
        assert_eq!(a.total_float, 0);
        assert!(a.is_critical);
        assert_eq!(a.phase, TaskPhase::Finalized);
        assert_eq!(cpm.project_end, 5);
    }

    #[test]
    fn test_sequential_chain() {
        // A(2) -> B(3) -> C(1) = 6 days total
        let graph = make_graph(&[("a", 2.0, &[]), ("b", 3.0, &["a"]), ("c", 1.0, &["b"])]);
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        assert_eq!(cpm.project_end, 6);
        assert_eq!(cpm.critical_path, vec![0, 1, 2]);
        assert_eq!(result(&graph, &cpm, "b").es, 2);
        assert_eq!(result(&graph, &cpm, "c").ef, 6);
    }

    #[test]
    fn test_parallel_paths_with_float() {
        // A(5) ---> C(2)
        // B(3) -----^
        let graph = make_graph(&[("a", 5.0, &[]), ("b", 3.0, &[]), ("c", 2.0, &["a", "b"])]);
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        assert_eq!(cpm.project_end, 7);
        let b = result(&graph, &cpm, "b");
        assert!(!b.is_critical);
        assert_eq!(b.total_float, 2);
        assert_eq!(b.free_float, 2);
        assert_eq!(b.ls, 2);
        assert!(result(&graph, &cpm, "c").is_critical);
    }

    #[test]
    fn test_float_never_negative() {
        let graph = make_graph(&[
            ("start", 0.0, &[]),
            ("a", 5.0, &["start"]),
            ("b", 8.0, &["start"]),
            ("c", 3.0, &["a"]),
            ("d", 4.0, &["b"]),
            ("e", 6.0, &["c", "d"]),
            ("f", 2.0, &["a"]),
            ("end", 0.0, &["e", "f"]),
        ]);
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        for r in &cpm.results {
            assert!(r.total_float >= 0);
            assert!(r.ef <= r.lf);
        }
        assert_eq!(cpm.project_end, 18);
        // start, b, d, e, end
        assert_eq!(cpm.critical_path.len(), 5);
    }

    #[test]
    fn test_dependency_types() {
        let tasks = vec![
            Task::new("a").fixed(4.0),
            Task::new("ss").fixed(2.0),
            Task::new("ff").fixed(2.0),
            Task::new("sf").fixed(2.0),
        ];
        let deps = vec![
            Dependency::new("a", "ss", DependencyType::StartToStart).with_lag(1),
            Dependency::new("a", "ff", DependencyType::FinishToFinish),
            Dependency::new("a", "sf", DependencyType::StartToFinish).with_lag(3),
        ];
        let graph = SchedulingGraph::build(&tasks, &deps, &[]).unwrap();
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        assert_eq!(result(&graph, &cpm, "ss").es, 1);
        assert_eq!(result(&graph, &cpm, "ff").ef, 4);
        assert_eq!(result(&graph, &cpm, "sf").ef, 3);
    }

    #[test]
    fn test_lead_never_precedes_project_start() {
        let tasks = vec![Task::new("a").fixed(1.0), Task::new("b").fixed(3.0)];
        let deps = vec![Dependency::finish_to_start("a", "b").with_lag(-4)];
        let graph = SchedulingGraph::build(&tasks, &deps, &[]).unwrap();
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        assert_eq!(result(&graph, &cpm, "b").es, 0);
        assert_eq!(cpm.project_end, 3);
    }

    #[test]
    fn test_release_delays_task_and_descendants() {
        let graph = make_graph(&[("a", 2.0, &[]), ("b", 1.0, &["a"]), ("c", 4.0, &[])]);
        let cpm = CpmScheduler::new()
            .schedule_with_release(&graph, &[3, 0, 0])
            .unwrap();

        assert_eq!(result(&graph, &cpm, "a").es, 3);
        assert_eq!(result(&graph, &cpm, "b").es, 5);
        assert_eq!(cpm.project_end, 6);
        assert_eq!(result(&graph, &cpm, "c").total_float, 2);
    }

    #[test]
    fn test_incremental_matches_full_pass() {
        let mut graph = make_graph(&[
            ("a", 2.0, &[]),
            ("b", 3.0, &["a"]),
            ("c", 1.0, &[]),
            ("d", 2.0, &["b", "c"]),
        ]);
        let scheduler = CpmScheduler::new();
        let before = scheduler.schedule(&graph).unwrap();

        graph.tasks[1].duration = 6;
        let release = vec![0, 0, 1, 0];
        let incremental = scheduler
            .reschedule_from(&graph, &before, &release, &[1, 2])
            .unwrap();
        let full = scheduler.schedule_with_release(&graph, &release).unwrap();

        assert_eq!(incremental.results, full.results);
        assert_eq!(incremental.project_end, 10);
    }

    #[test]
    fn test_empty_graph() {
        let graph = SchedulingGraph::build(&[], &[], &[]).unwrap();
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();
        assert_eq!(cpm.project_end, 0);
        assert!(cpm.critical_path.is_empty());
    }

    #[test]
    fn test_unvisited_task_is_integrity_error() {
        let mut graph = make_graph(&[("a", 2.0, &[]), ("b", 3.0, &["a"])]);
        graph.waves.pop();
        let err = CpmScheduler::new().schedule(&graph).unwrap_err();
        assert!(matches!(err, ScheduleError::GraphIntegrity(msg) if msg.contains("'b'")));
    }

    #[test]
    fn test_edge_slack_identifies_driving_edge() {
        let graph = make_graph(&[("a", 5.0, &[]), ("b", 3.0, &[]), ("c", 2.0, &["a", "b"])]);
        let cpm = CpmScheduler::new().schedule(&graph).unwrap();

        let slacks: Vec<i64> = graph.incoming(2).map(|e| edge_slack(e, &cpm)).collect();
        assert_eq!(slacks, vec![0, 2]);
    }
}
