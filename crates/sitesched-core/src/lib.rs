//! # sitesched-core
//!
//! Core domain model and traits for the sitesched construction scheduling engine.
//!
//! This crate provides:
//! - Domain types: `Project`, `Task`, `Dependency`, `ResourceRequirement`, `Resource`
//! - Calendars with per-resource-class overrides (`calendar`)
//! - Engine configuration and cooperative cancellation (`config`)
//! - Zone/floor template expansion into concrete projects (`template`)
//! - Output value objects: `Schedule`, `ScheduleDiagnostics`, `ScheduleOutcome`
//! - The `Scheduler` trait and the `ScheduleError` taxonomy
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use sitesched_core::{Dependency, Project, Resource, ResourceRequirement, Task};
//!
//! let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
//! let mut project = Project::new("Block A", start);
//! project.tasks.push(Task::new("excavation").fixed(5.0));
//! project.tasks.push(
//!     Task::new("footings")
//!         .quantity(42.0, "m3")
//!         .productivity(12.0),
//! );
//! project.dependencies.push(Dependency::finish_to_start("excavation", "footings"));
//! project.resources.push(Resource::new("concrete_crew").capacity(2));
//! project
//!     .requirements
//!     .push(ResourceRequirement::new("footings", "concrete_crew", 1));
//! ```

pub mod calendar;
pub mod config;
pub mod template;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use calendar::{Calendar, CalendarException, CalendarSet, Holiday};
pub use config::{CancellationToken, EngineConfig, OptimizationObjective, TieBreakPolicy};
pub use template::ProjectTemplate;

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a task
pub type TaskId = String;

/// Unique identifier for a resource class
pub type ResourceId = String;

/// Unique identifier for a calendar
pub type CalendarId = String;

/// Monetary amount with currency
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: impl Into<Decimal>, currency: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.round_dp(2), self.currency)
    }
}

fn default_currency() -> String {
    "EUR".into()
}

// ============================================================================
// Project
// ============================================================================

/// A complete project definition, as handed to a scheduling run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Human-readable name
    pub name: String,
    /// First calendar date work may start
    pub start: NaiveDate,
    /// Currency used for cost estimation
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Tasks, in input order
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Precedence constraints between tasks
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Resource needs of tasks
    #[serde(default)]
    pub requirements: Vec<ResourceRequirement>,
    /// Resource pool snapshot
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Project default calendar and per-resource-class overrides
    #[serde(default)]
    pub calendars: CalendarSet,
}

impl Project {
    /// Create a new empty project
    pub fn new(name: impl Into<String>, start: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start,
            currency: default_currency(),
            tasks: Vec::new(),
            dependencies: Vec::new(),
            requirements: Vec::new(),
            resources: Vec::new(),
            calendars: CalendarSet::default(),
        }
    }

    /// Get a task by ID
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get a resource class by ID
    pub fn get_resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Resource requirements declared for a task
    pub fn requirements_for<'a>(
        &'a self,
        task_id: &'a str,
    ) -> impl Iterator<Item = &'a ResourceRequirement> + 'a {
        self.requirements.iter().filter(move |r| r.task_id == task_id)
    }
}

// ============================================================================
// Task
// ============================================================================

/// How a task's working-day duration is derived
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationMethod {
    /// The configured override is the duration
    #[default]
    Fixed,
    /// `quantity / productivity_rate`
    QuantityProductivity,
    /// `effort / assigned units`
    EffortDriven,
}

impl fmt::Display for DurationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DurationMethod::Fixed => "fixed",
            DurationMethod::QuantityProductivity => "quantity_productivity",
            DurationMethod::EffortDriven => "effort_driven",
        };
        f.write_str(s)
    }
}

/// A unit of construction work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the project
    pub id: TaskId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Zone (building section) tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Floor tag (0 = ground)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    /// Discipline tag (e.g. "structure", "mep")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discipline: Option<String>,
    /// Duration calculation method
    #[serde(default)]
    pub method: DurationMethod,
    /// Work quantity (e.g. m3 of concrete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Unit of `quantity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Quantity completed per working day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productivity_rate: Option<f64>,
    /// Duration override in working days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_duration: Option<f64>,
    /// Total effort in unit-days, split across assigned units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<f64>,
}

impl Task {
    /// Create a new task with the given ID
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            zone: None,
            floor: None,
            discipline: None,
            method: DurationMethod::Fixed,
            quantity: None,
            unit: None,
            productivity_rate: None,
            fixed_duration: None,
            effort: None,
        }
    }

    /// Set the task name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the zone tag
    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Set the floor tag
    pub fn floor(mut self, floor: u32) -> Self {
        self.floor = Some(floor);
        self
    }

    /// Set the discipline tag
    pub fn discipline(mut self, discipline: impl Into<String>) -> Self {
        self.discipline = Some(discipline.into());
        self
    }

    /// Use a fixed duration in working days
    pub fn fixed(mut self, days: f64) -> Self {
        self.method = DurationMethod::Fixed;
        self.fixed_duration = Some(days);
        self
    }

    /// Set the work quantity
    pub fn quantity(mut self, quantity: f64, unit: impl Into<String>) -> Self {
        self.quantity = Some(quantity);
        self.unit = Some(unit.into());
        self
    }

    /// Derive duration from quantity and this daily productivity
    pub fn productivity(mut self, rate: f64) -> Self {
        self.method = DurationMethod::QuantityProductivity;
        self.productivity_rate = Some(rate);
        self
    }

    /// Derive duration from total effort and the assigned unit count
    pub fn effort(mut self, unit_days: f64) -> Self {
        self.method = DurationMethod::EffortDriven;
        self.effort = Some(unit_days);
        self
    }

    /// Make this a zero-duration milestone
    pub fn milestone(self) -> Self {
        self.fixed(0.0)
    }
}

// ============================================================================
// Dependencies
// ============================================================================

/// Type of dependency between tasks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Successor starts after predecessor finishes
    #[default]
    #[serde(alias = "FS")]
    FinishToStart,
    /// Successor starts when predecessor starts
    #[serde(alias = "SS")]
    StartToStart,
    /// Successor finishes when predecessor finishes
    #[serde(alias = "FF")]
    FinishToFinish,
    /// Successor finishes when predecessor starts
    #[serde(alias = "SF")]
    StartToFinish,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyType::FinishToStart => "FS",
            DependencyType::StartToStart => "SS",
            DependencyType::FinishToFinish => "FF",
            DependencyType::StartToFinish => "SF",
        };
        f.write_str(s)
    }
}

/// Directed precedence edge between two tasks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub predecessor: TaskId,
    pub successor: TaskId,
    #[serde(default, rename = "type")]
    pub dep_type: DependencyType,
    /// Signed working-day offset; negative values are leads
    #[serde(default)]
    pub lag: i64,
}

impl Dependency {
    pub fn new(
        predecessor: impl Into<String>,
        successor: impl Into<String>,
        dep_type: DependencyType,
    ) -> Self {
        Self {
            predecessor: predecessor.into(),
            successor: successor.into(),
            dep_type,
            lag: 0,
        }
    }

    pub fn finish_to_start(predecessor: impl Into<String>, successor: impl Into<String>) -> Self {
        Self::new(predecessor, successor, DependencyType::FinishToStart)
    }

    pub fn with_lag(mut self, lag: i64) -> Self {
        self.lag = lag;
        self
    }
}

// ============================================================================
// Resources
// ============================================================================

/// A task's need for units of one resource class, held for the whole task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub task_id: TaskId,
    pub resource_id: ResourceId,
    /// Units required on every working day of the task
    pub quantity: u32,
    /// Upper bound for crashing effort-driven tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
}

impl ResourceRequirement {
    pub fn new(task_id: impl Into<String>, resource_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            task_id: task_id.into(),
            resource_id: resource_id.into(),
            quantity,
            max_quantity: None,
        }
    }

    /// Allow the optimizer to raise this requirement up to `max` units
    pub fn with_max(mut self, max: u32) -> Self {
        self.max_quantity = Some(max);
        self
    }
}

/// Kind of resource class
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Worker,
    Equipment,
}

/// Resource pool entry: a class of workers or equipment with a daily capacity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identifier (the resource class)
    pub id: ResourceId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: ResourceKind,
    /// Units available per working day
    pub capacity: u32,
    /// Cost per unit-hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Money>,
}

impl Resource {
    /// Create a new resource class with capacity 1
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: ResourceKind::Worker,
            capacity: 1,
            rate: None,
        }
    }

    /// Set the resource name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set units available per working day
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Mark as equipment
    pub fn equipment(mut self) -> Self {
        self.kind = ResourceKind::Equipment;
        self
    }

    /// Set the hourly rate per unit
    pub fn rate(mut self, rate: Money) -> Self {
        self.rate = Some(rate);
        self
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// The computed schedule for a project
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub project_name: String,
    /// Date of working-day offset 0
    pub project_start: NaiveDate,
    /// Last working day of the project (start date when empty)
    pub project_end: NaiveDate,
    /// Total duration in working days
    pub project_duration: i64,
    /// Scheduled tasks by ID
    pub tasks: BTreeMap<TaskId, ScheduledTask>,
    /// Every zero-float task, in topological order
    pub critical_path: Vec<TaskId>,
    /// Maximal dependency-linked chains of critical tasks
    pub critical_chains: Vec<Vec<TaskId>>,
    /// Per-resource-class utilization summary
    pub resource_usage: BTreeMap<ResourceId, ResourceUtilization>,
    /// Units in use per working day and resource class
    pub daily_usage: BTreeMap<NaiveDate, BTreeMap<ResourceId, u32>>,
    /// Sum of all task costs, when any resource has a rate
    pub total_cost: Option<Money>,
}

impl Schedule {
    pub fn get(&self, task_id: &str) -> Option<&ScheduledTask> {
        self.tasks.get(task_id)
    }

    pub fn is_critical(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).map(|t| t.is_critical).unwrap_or(false)
    }
}

/// A task with computed schedule information
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discipline: Option<String>,
    /// First working day
    pub start: NaiveDate,
    /// Last working day (equal to `start` for milestones)
    pub finish: NaiveDate,
    /// Working days
    pub duration: i64,
    pub early_start: i64,
    pub early_finish: i64,
    pub late_start: i64,
    pub late_finish: i64,
    pub late_start_date: NaiveDate,
    pub late_finish_date: NaiveDate,
    pub total_float: i64,
    pub free_float: i64,
    pub is_critical: bool,
    pub assignments: Vec<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Money>,
    /// Working days the leveler pushed this task past its unconstrained start
    pub leveling_delay: i64,
}

/// Resource units held by a task for its whole duration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub resource_id: ResourceId,
    pub units: u32,
    pub start: NaiveDate,
    pub finish: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Money>,
}

/// Utilization summary for one resource class
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub resource_id: ResourceId,
    pub capacity: u32,
    pub peak_units: u32,
    /// First date the peak was reached
    pub peak_date: Option<NaiveDate>,
    /// Sum of units in use over every working day of the span
    pub used_unit_days: u64,
    /// Sum of calendar-adjusted capacity over the span
    pub available_unit_days: u64,
    /// `used / available * 100`
    pub utilization_percent: f64,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Why a resource requirement could not be honoured
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShortageKind {
    /// The resource class is not in the pool
    UnknownResource,
    /// The class has zero capacity on every working day of the span
    NoCapacity,
    /// A single task needs more units than the class ever offers
    ExceedsCapacity { required: u32, capacity: u32 },
    /// No start within the leveling horizon leaves room for the task
    NoFeasibleWindow,
    /// Over-allocation left in place when the leveling budget ran out
    Overallocated {
        date: NaiveDate,
        used: u32,
        capacity: u32,
    },
}

/// A shortage the leveler could not resolve
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShortage {
    pub resource_id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(flatten)]
    pub kind: ShortageKind,
}

impl fmt::Display for ResourceShortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = match &self.task_id {
            Some(task) => format!("'{}' for task '{}'", self.resource_id, task),
            None => format!("'{}'", self.resource_id),
        };
        match &self.kind {
            ShortageKind::UnknownResource => {
                write!(f, "resource {} is not in the pool", subject)
            }
            ShortageKind::NoCapacity => {
                write!(f, "resource {} has no capacity on any working day", subject)
            }
            ShortageKind::ExceedsCapacity { required, capacity } => write!(
                f,
                "resource {} needs {} units but capacity is {}",
                subject, required, capacity
            ),
            ShortageKind::NoFeasibleWindow => {
                write!(f, "resource {} has no free window within the horizon", subject)
            }
            ShortageKind::Overallocated {
                date,
                used,
                capacity,
            } => write!(
                f,
                "resource {} over-allocated on {} ({}/{})",
                subject, date, used, capacity
            ),
        }
    }
}

fn join_shortages(shortages: &[ResourceShortage]) -> String {
    shortages
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A task the leveler delayed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftEvent {
    pub task_id: TaskId,
    /// Resource class whose over-allocation first forced the shift
    pub resource_id: ResourceId,
    /// Early start before leveling (working-day offset)
    pub original_start: i64,
    /// Early start after leveling
    pub new_start: i64,
    /// True when the task had zero float when shifted (the project was extended)
    pub was_critical: bool,
}

impl ShiftEvent {
    pub fn delay(&self) -> i64 {
        self.new_start - self.original_start
    }
}

/// Finish-to-start edge added by the leveler between two tasks sharing a resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub predecessor: TaskId,
    pub successor: TaskId,
    pub resource_id: ResourceId,
}

/// Effort-driven assignment the allocator reduced to fit the pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentAdjustment {
    pub task_id: TaskId,
    pub resource_id: ResourceId,
    pub requested: u32,
    pub assigned: u32,
}

/// Peak resource usage of a schedule
///
/// Ordered by the worst per-day utilization ratio across classes, then by
/// the sum of per-class peak units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakUsage {
    pub ratio: f64,
    pub units: u32,
}

impl PeakUsage {
    const EPSILON: f64 = 1e-9;

    pub fn is_better_than(&self, other: &PeakUsage) -> bool {
        if self.ratio < other.ratio - Self::EPSILON {
            return true;
        }
        (self.ratio - other.ratio).abs() <= Self::EPSILON && self.units < other.units
    }
}

/// A move the optimizer accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "move", rename_all = "snake_case")]
pub enum OptimizerMove {
    /// Added one unit of a resource to an effort-driven critical task
    Crash {
        task_id: TaskId,
        resource_id: ResourceId,
        units: u32,
    },
    /// Pushed a task with float later, within its float
    Shift { task_id: TaskId, delay: i64 },
}

/// What the optimizer did
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerReport {
    pub objective: OptimizationObjective,
    pub iterations: usize,
    pub moves: Vec<OptimizerMove>,
    pub baseline_duration: i64,
    pub final_duration: i64,
    pub baseline_peak: PeakUsage,
    pub final_peak: PeakUsage,
    /// The iteration budget ran out while improving moves still existed
    pub terminated_early: bool,
    /// Cancellation or deadline stopped the loop
    pub cancelled: bool,
}

/// Everything the engine applied or could not resolve during a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDiagnostics {
    pub shortages: Vec<ResourceShortage>,
    pub shifts: Vec<ShiftEvent>,
    pub resource_links: Vec<ResourceLink>,
    pub adjustments: Vec<AssignmentAdjustment>,
    pub leveling_iterations: usize,
    /// Leveling stopped at its iteration cap with over-allocation remaining
    pub leveling_incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerReport>,
}

impl ScheduleDiagnostics {
    pub fn has_shortages(&self) -> bool {
        !self.shortages.is_empty()
    }
}

/// Schedule plus diagnostics, as returned by a scheduling run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub schedule: Schedule,
    pub diagnostics: ScheduleDiagnostics,
}

impl ScheduleOutcome {
    /// Refuse partial results: any shortage becomes an error
    pub fn into_strict(self) -> Result<Schedule, ScheduleError> {
        if self.diagnostics.shortages.is_empty() {
            Ok(self.schedule)
        } else {
            Err(ScheduleError::ResourceShortage(self.diagnostics.shortages))
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Core scheduling abstraction
pub trait Scheduler: Send + Sync {
    /// Compute a schedule with its diagnostics
    fn run(&self, project: &Project) -> Result<ScheduleOutcome, ScheduleError>;

    /// Compute a schedule for the given project
    fn schedule(&self, project: &Project) -> Result<Schedule, ScheduleError> {
        self.run(project).map(|outcome| outcome.schedule)
    }

    /// Check if a schedule is feasible without computing it
    fn is_feasible(&self, project: &Project) -> FeasibilityResult;

    /// Explain why a particular scheduling decision was made
    fn explain(&self, project: &Project, task: &TaskId) -> Explanation;
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of feasibility check
#[derive(Clone, Debug, Default, Serialize)]
pub struct FeasibilityResult {
    pub feasible: bool,
    pub conflicts: Vec<Conflict>,
    pub suggestions: Vec<Suggestion>,
}

/// A reason a project cannot be scheduled as given
#[derive(Clone, Debug, Serialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    pub description: String,
    pub involved_tasks: Vec<TaskId>,
    pub involved_resources: Vec<ResourceId>,
}

impl Conflict {
    /// Describe a structural error as a conflict
    pub fn from_error(error: &ScheduleError) -> Self {
        let (conflict_type, involved_tasks) = match error {
            ScheduleError::Cycle { tasks } => (ConflictType::CircularDependency, tasks.clone()),
            ScheduleError::UnknownTaskReference { missing, .. } => {
                (ConflictType::UnknownReference, vec![missing.clone()])
            }
            ScheduleError::DuplicateTask(id) => (ConflictType::DuplicateTask, vec![id.clone()]),
            ScheduleError::InvalidDuration { task, .. } => {
                (ConflictType::InvalidDuration, vec![task.clone()])
            }
            ScheduleError::InvalidCalendar { .. } => (ConflictType::InvalidCalendar, Vec::new()),
            ScheduleError::ResourceShortage(shortages) => (
                ConflictType::ResourceShortage,
                shortages.iter().filter_map(|s| s.task_id.clone()).collect(),
            ),
            _ => (ConflictType::Internal, Vec::new()),
        };
        let involved_resources = match error {
            ScheduleError::ResourceShortage(shortages) => {
                let mut ids: Vec<_> = shortages.iter().map(|s| s.resource_id.clone()).collect();
                ids.sort();
                ids.dedup();
                ids
            }
            _ => Vec::new(),
        };
        Self {
            conflict_type,
            description: error.to_string(),
            involved_tasks,
            involved_resources,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    CircularDependency,
    UnknownReference,
    DuplicateTask,
    InvalidDuration,
    InvalidCalendar,
    ResourceShortage,
    Internal,
}

#[derive(Clone, Debug, Serialize)]
pub struct Suggestion {
    pub description: String,
    pub impact: String,
}

/// Why a task was scheduled where it was
#[derive(Clone, Debug, Serialize)]
pub struct Explanation {
    pub task_id: TaskId,
    pub reason: String,
    pub constraints_applied: Vec<String>,
    pub alternatives_considered: Vec<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Scheduling error
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ScheduleError {
    #[error("Invalid duration for task '{task}': {reason}")]
    InvalidDuration { task: TaskId, reason: String },

    #[error("Unknown task '{missing}' referenced by {context}")]
    UnknownTaskReference { context: String, missing: TaskId },

    #[error("Circular dependency among tasks: {}", tasks.join(", "))]
    Cycle { tasks: Vec<TaskId> },

    #[error("Graph integrity violated: {0}")]
    GraphIntegrity(String),

    #[error("Resource shortage: {}", join_shortages(.0))]
    ResourceShortage(Vec<ResourceShortage>),

    #[error("Invalid calendar '{calendar}': {reason}")]
    InvalidCalendar { calendar: CalendarId, reason: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn task_builder_sets_method() {
        let task = Task::new("pour")
            .name("Pour slab")
            .zone("A")
            .floor(2)
            .discipline("structure")
            .quantity(30.0, "m3")
            .productivity(10.0);

        assert_eq!(task.name, "Pour slab");
        assert_eq!(task.method, DurationMethod::QuantityProductivity);
        assert_eq!(task.floor, Some(2));
        assert_eq!(task.unit.as_deref(), Some("m3"));
    }

    #[test]
    fn milestone_is_fixed_zero() {
        let task = Task::new("handover").milestone();
        assert_eq!(task.method, DurationMethod::Fixed);
        assert_eq!(task.fixed_duration, Some(0.0));
    }

    #[test]
    fn dependency_type_accepts_short_aliases() {
        let dep: Dependency =
            serde_json::from_str(r#"{"predecessor":"a","successor":"b","type":"SS","lag":-1}"#)
                .unwrap();
        assert_eq!(dep.dep_type, DependencyType::StartToStart);
        assert_eq!(dep.lag, -1);

        let dep: Dependency =
            serde_json::from_str(r#"{"predecessor":"a","successor":"b"}"#).unwrap();
        assert_eq!(dep, Dependency::finish_to_start("a", "b"));
    }

    #[test]
    fn project_from_json_uses_defaults() {
        let json = r#"{
            "name": "Tower",
            "start": "2025-03-03",
            "tasks": [{"id": "a", "fixed_duration": 2}],
            "resources": [{"id": "crane", "capacity": 1, "kind": "equipment"}]
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();

        assert_eq!(project.currency, "EUR");
        assert_eq!(project.start, date(2025, 3, 3));
        assert_eq!(project.tasks[0].method, DurationMethod::Fixed);
        assert_eq!(project.resources[0].kind, ResourceKind::Equipment);
        assert_eq!(project.calendars.default.working_days, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn requirements_for_filters_by_task() {
        let mut project = Project::new("p", date(2025, 1, 6));
        project.requirements.push(ResourceRequirement::new("a", "mason", 2));
        project.requirements.push(ResourceRequirement::new("b", "mason", 1));
        project.requirements.push(ResourceRequirement::new("a", "crane", 1).with_max(2));

        let ids: Vec<_> = project
            .requirements_for("a")
            .map(|r| r.resource_id.as_str())
            .collect();
        assert_eq!(ids, vec!["mason", "crane"]);
    }

    #[test]
    fn cycle_error_names_tasks() {
        let err = ScheduleError::Cycle {
            tasks: vec!["A".into(), "B".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency among tasks: A, B");
    }

    #[test]
    fn strict_outcome_rejects_shortages() {
        let schedule = Schedule {
            project_name: "p".into(),
            project_start: date(2025, 1, 6),
            project_end: date(2025, 1, 6),
            project_duration: 0,
            tasks: BTreeMap::new(),
            critical_path: Vec::new(),
            critical_chains: Vec::new(),
            resource_usage: BTreeMap::new(),
            daily_usage: BTreeMap::new(),
            total_cost: None,
        };
        let shortage = ResourceShortage {
            resource_id: "crane".into(),
            task_id: Some("lift".into()),
            kind: ShortageKind::ExceedsCapacity {
                required: 2,
                capacity: 1,
            },
        };

        let ok = ScheduleOutcome {
            schedule: schedule.clone(),
            diagnostics: ScheduleDiagnostics::default(),
        };
        assert!(ok.into_strict().is_ok());

        let failing = ScheduleOutcome {
            schedule,
            diagnostics: ScheduleDiagnostics {
                shortages: vec![shortage],
                ..Default::default()
            },
        };
        let err = failing.into_strict().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource shortage: resource 'crane' for task 'lift' needs 2 units but capacity is 1"
        );
    }

    #[test]
    fn peak_usage_ordering() {
        let low = PeakUsage { ratio: 0.5, units: 4 };
        let high = PeakUsage { ratio: 1.0, units: 2 };
        let same_ratio_fewer = PeakUsage { ratio: 0.5, units: 3 };

        assert!(low.is_better_than(&high));
        assert!(!high.is_better_than(&low));
        assert!(same_ratio_fewer.is_better_than(&low));
        assert!(!low.is_better_than(&low));
    }

    #[test]
    fn conflict_from_cycle() {
        let err = ScheduleError::Cycle {
            tasks: vec!["A".into(), "B".into()],
        };
        let conflict = Conflict::from_error(&err);
        assert_eq!(conflict.conflict_type, ConflictType::CircularDependency);
        assert_eq!(conflict.involved_tasks, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn money_display_rounds() {
        let cost = Money::new(dec!(1234.567), "EUR");
        assert_eq!(cost.to_string(), "1234.57 EUR");
    }
}
