//! Dependency graph construction and validation
//!
//! Tasks live in an arena (`Vec<GraphTask>`) and are referred to by index.
//! Edges are stored once in `edges`; `successors` and `predecessors` hold
//! edge indices per task, so parallel read access during CPM needs no locks.
//!
//! The topological order is computed level by level (Kahn's algorithm one
//! frontier at a time). Each level is a *wave*: every predecessor of a task
//! sits in an earlier wave, so all tasks of one wave can be evaluated
//! concurrently.

use std::collections::HashMap;

use sitesched_core::{
    Dependency, DependencyType, ResourceId, ResourceRequirement, ScheduleError, Task, TaskId,
};

use crate::duration::DurationCalculator;

/// Index of a task in the graph arena
pub type TaskIdx = usize;

/// Units of one resource class a task holds while active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demand {
    pub resource_id: ResourceId,
    pub units: u32,
    /// Crash limit for effort-driven tasks
    pub max_units: Option<u32>,
}

/// A schedulable task with its resolved duration
#[derive(Debug, Clone)]
pub struct GraphTask {
    pub id: TaskId,
    pub task: Task,
    /// Working days
    pub duration: i64,
    pub demands: Vec<Demand>,
}

impl GraphTask {
    /// Resource units that share an effort-driven task's work (1 when it has none)
    pub fn assigned_units(&self) -> u32 {
        if self.demands.is_empty() {
            1
        } else {
            self.demands.iter().map(|d| d.units).sum()
        }
    }
}

/// Where an edge came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Supplied with the project
    Declared,
    /// Added by the leveler between tasks sharing a resource
    Resource,
}

/// An edge in the dependency graph
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub from: TaskIdx,
    pub to: TaskIdx,
    pub dep_type: DependencyType,
    /// Working days (negative for lead time)
    pub lag: i64,
    pub kind: EdgeKind,
}

/// A validated, acyclic scheduling graph
#[derive(Debug, Clone)]
pub struct SchedulingGraph {
    pub tasks: Vec<GraphTask>,
    pub task_map: HashMap<TaskId, TaskIdx>,
    pub edges: Vec<DependencyEdge>,
    /// Outgoing edge indices per task
    pub successors: Vec<Vec<usize>>,
    /// Incoming edge indices per task
    pub predecessors: Vec<Vec<usize>>,
    /// Topological order (concatenation of `waves`)
    pub topo_order: Vec<TaskIdx>,
    pub waves: Vec<Vec<TaskIdx>>,
}

impl SchedulingGraph {
    /// Build and validate the graph for a run
    ///
    /// Fails on duplicate task ids, references to unknown tasks, invalid
    /// durations, and cycles (self-dependencies included).
    pub fn build(
        tasks: &[Task],
        dependencies: &[Dependency],
        requirements: &[ResourceRequirement],
    ) -> Result<Self, ScheduleError> {
        let mut task_map: HashMap<TaskId, TaskIdx> = HashMap::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            if task_map.insert(task.id.clone(), idx).is_some() {
                return Err(ScheduleError::DuplicateTask(task.id.clone()));
            }
        }

        let mut demands: Vec<Vec<Demand>> = vec![Vec::new(); tasks.len()];
        for req in requirements {
            let idx = *task_map.get(&req.task_id).ok_or_else(|| {
                ScheduleError::UnknownTaskReference {
                    context: format!("resource requirement for '{}'", req.resource_id),
                    missing: req.task_id.clone(),
                }
            })?;
            demands[idx].push(Demand {
                resource_id: req.resource_id.clone(),
                units: req.quantity,
                max_units: req.max_quantity,
            });
        }

        let calculator = DurationCalculator::new();
        let mut graph_tasks = Vec::with_capacity(tasks.len());
        for (task, demands) in tasks.iter().zip(demands) {
            let mut graph_task = GraphTask {
                id: task.id.clone(),
                task: task.clone(),
                duration: 0,
                demands,
            };
            graph_task.duration = calculator.compute(task, graph_task.assigned_units())?;
            graph_tasks.push(graph_task);
        }

        let mut edges = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            let lookup = |id: &TaskId| {
                task_map
                    .get(id)
                    .copied()
                    .ok_or_else(|| ScheduleError::UnknownTaskReference {
                        context: format!("dependency {} -> {}", dep.predecessor, dep.successor),
                        missing: id.clone(),
                    })
            };
            let from = lookup(&dep.predecessor)?;
            let to = lookup(&dep.successor)?;
            if from == to {
                return Err(ScheduleError::Cycle {
                    tasks: vec![dep.predecessor.clone()],
                });
            }
            // Parallel edges between the same pair are kept: each is its own constraint
            edges.push(DependencyEdge {
                from,
                to,
                dep_type: dep.dep_type,
                lag: dep.lag,
                kind: EdgeKind::Declared,
            });
        }

        let mut graph = Self {
            tasks: graph_tasks,
            task_map,
            edges,
            successors: Vec::new(),
            predecessors: Vec::new(),
            topo_order: Vec::new(),
            waves: Vec::new(),
        };
        graph.rebuild_adjacency();
        graph.compute_order()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Index of a task by ID
    pub fn index_of(&self, id: &str) -> Option<TaskIdx> {
        self.task_map.get(id).copied()
    }

    /// Get a task by ID
    pub fn get_task(&self, id: &str) -> Option<&GraphTask> {
        self.index_of(id).map(|i| &self.tasks[i])
    }

    /// Edges entering `idx`
    pub fn incoming(&self, idx: TaskIdx) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.predecessors[idx].iter().map(move |e| &self.edges[*e])
    }

    /// Edges leaving `idx`
    pub fn outgoing(&self, idx: TaskIdx) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.successors[idx].iter().map(move |e| &self.edges[*e])
    }

    /// The roots and every task reachable from them, as a membership mask
    pub fn descendants(&self, roots: &[TaskIdx]) -> Vec<bool> {
        let mut seen = vec![false; self.tasks.len()];
        let mut stack: Vec<TaskIdx> = roots.to_vec();
        while let Some(idx) = stack.pop() {
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            stack.extend(self.outgoing(idx).map(|e| e.to).filter(|to| !seen[*to]));
        }
        seen
    }

    /// Check whether `to` can be reached from `from`
    pub fn reaches(&self, from: TaskIdx, to: TaskIdx) -> bool {
        self.descendants(&[from])[to]
    }

    /// Change the units of one demand and re-derive the task duration
    ///
    /// Returns true when the duration changed. Only effort-driven tasks react
    /// to the unit count.
    pub fn set_demand_units(
        &mut self,
        idx: TaskIdx,
        demand: usize,
        units: u32,
    ) -> Result<bool, ScheduleError> {
        let task = &mut self.tasks[idx];
        task.demands[demand].units = units;
        let duration = DurationCalculator::new().compute(&task.task, task.assigned_units())?;
        let changed = duration != task.duration;
        task.duration = duration;
        Ok(changed)
    }

    /// Add finish-to-start resource links (lag 0), skipping any that would close a cycle
    ///
    /// Returns the links actually added.
    pub fn add_resource_links(
        &mut self,
        links: &[(TaskIdx, TaskIdx)],
    ) -> Result<Vec<(TaskIdx, TaskIdx)>, ScheduleError> {
        let mut added = Vec::new();
        for &(from, to) in links {
            if from == to || self.reaches(to, from) {
                continue;
            }
            let edge = self.edges.len();
            self.edges.push(DependencyEdge {
                from,
                to,
                dep_type: DependencyType::FinishToStart,
                lag: 0,
                kind: EdgeKind::Resource,
            });
            self.successors[from].push(edge);
            self.predecessors[to].push(edge);
            added.push((from, to));
        }
        if !added.is_empty() {
            self.compute_order()?;
        }
        Ok(added)
    }

    fn rebuild_adjacency(&mut self) {
        let n = self.tasks.len();
        self.successors = vec![Vec::new(); n];
        self.predecessors = vec![Vec::new(); n];
        for (i, edge) in self.edges.iter().enumerate() {
            self.successors[edge.from].push(i);
            self.predecessors[edge.to].push(i);
        }
    }

    /// Level-by-level Kahn's algorithm
    ///
    /// Tasks left with unresolved predecessors form a cycle (or hang off one);
    /// pruning those with no remaining successors leaves the offending set.
    fn compute_order(&mut self) -> Result<(), ScheduleError> {
        let n = self.tasks.len();
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(|p| p.len()).collect();

        let mut wave: Vec<TaskIdx> = (0..n).filter(|i| in_degree[*i] == 0).collect();
        let mut waves = Vec::new();
        let mut topo_order = Vec::with_capacity(n);

        while !wave.is_empty() {
            let mut next = Vec::new();
            for &idx in &wave {
                for &e in &self.successors[idx] {
                    let to = self.edges[e].to;
                    in_degree[to] -= 1;
                    if in_degree[to] == 0 {
                        next.push(to);
                    }
                }
            }
            next.sort_unstable();
            topo_order.extend_from_slice(&wave);
            waves.push(wave);
            wave = next;
        }

        if topo_order.len() != n {
            let mut residual: Vec<bool> = in_degree.iter().map(|d| *d > 0).collect();
            loop {
                let sinks: Vec<TaskIdx> = (0..n)
                    .filter(|i| residual[*i])
                    .filter(|i| !self.successors[*i].iter().any(|e| residual[self.edges[*e].to]))
                    .collect();
                if sinks.is_empty() {
                    break;
                }
                for i in sinks {
                    residual[i] = false;
                }
            }
            let tasks = (0..n)
                .filter(|i| residual[*i])
                .map(|i| self.tasks[i].id.clone())
                .collect();
            return Err(ScheduleError::Cycle { tasks });
        }

        self.topo_order = topo_order;
        self.waves = waves;
        Ok(())
    }
}
