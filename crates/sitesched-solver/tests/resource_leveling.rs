//! Integration tests for resource leveling and optimization
//!
//! Runs full projects through `SiteScheduler` and checks the leveled
//! schedule against the pool: no day over capacity, shortages reported
//! instead of silently dropped, optimizer never worse than its baseline.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sitesched_core::{
    CancellationToken, Dependency, EngineConfig, OptimizationObjective, Project, Resource,
    ResourceRequirement, ScheduleError, Scheduler, ShortageKind, Task, TieBreakPolicy,
};
use sitesched_solver::SiteScheduler;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn assert_within_capacity(project: &Project, schedule: &sitesched_core::Schedule) {
    for (day, usage) in &schedule.daily_usage {
        for (resource_id, units) in usage {
            let Some(resource) = project.get_resource(resource_id) else {
                continue;
            };
            assert!(
                *units <= resource.capacity,
                "{} over capacity on {}: {} > {}",
                resource_id,
                day,
                units,
                resource.capacity
            );
        }
    }
}

/// Eight tasks competing for two crews and one crane
fn busy_site() -> Project {
    let mut project = Project::new("Busy Site", date(2025, 1, 6));
    project.resources = vec![
        Resource::new("crew").capacity(2),
        Resource::new("crane").equipment().capacity(1),
    ];
    project.tasks = (0..8)
        .map(|i| Task::new(format!("t{}", i)).fixed(f64::from(i % 3 + 1)))
        .collect();
    project.dependencies = vec![
        Dependency::finish_to_start("t0", "t4"),
        Dependency::finish_to_start("t1", "t5"),
        Dependency::finish_to_start("t4", "t7"),
    ];
    project.requirements = (0..8)
        .map(|i| ResourceRequirement::new(format!("t{}", i), "crew", 1))
        .chain([0, 3, 6].map(|i| ResourceRequirement::new(format!("t{}", i), "crane", 1)))
        .collect();
    project
}

// =============================================================================
// Scenario: D and E share a single-unit resource
// =============================================================================

#[test]
fn parallel_tasks_are_serialized_on_shared_resource() {
    let mut project = Project::new("D/E", date(2025, 1, 6));
    project.resources = vec![Resource::new("crane").capacity(1)];
    project.tasks = vec![Task::new("D").fixed(4.0), Task::new("E").fixed(2.0)];
    project.requirements = vec![
        ResourceRequirement::new("D", "crane", 1),
        ResourceRequirement::new("E", "crane", 1),
    ];

    let outcome = SiteScheduler::new().run(&project).unwrap();
    let schedule = &outcome.schedule;
    let d = schedule.get("D").unwrap();
    let e = schedule.get("E").unwrap();

    assert!(d.is_critical, "D keeps its criticality");
    assert!(e.start > d.finish, "E starts after D's resource window");
    assert_eq!(e.start, date(2025, 1, 10));
    assert_eq!(schedule.project_duration, 6);
    assert_within_capacity(&project, schedule);
    assert_eq!(outcome.diagnostics.shifts[0].task_id, "E");
    assert!(outcome.diagnostics.shortages.is_empty());
}

#[test]
fn non_critical_task_yields_before_critical_path_slips() {
    let mut project = Project::new("Float first", date(2025, 1, 6));
    project.resources = vec![Resource::new("crew").capacity(1)];
    project.tasks = vec![
        Task::new("x").fixed(1.0),
        Task::new("c").fixed(3.0),
        Task::new("y").fixed(5.0),
        Task::new("n").fixed(2.0),
    ];
    project.dependencies = vec![
        Dependency::finish_to_start("x", "c"),
        Dependency::finish_to_start("c", "y"),
    ];
    project.requirements = vec![
        ResourceRequirement::new("c", "crew", 1),
        ResourceRequirement::new("n", "crew", 1),
    ];

    let outcome = SiteScheduler::new().run(&project).unwrap();
    let schedule = &outcome.schedule;

    assert_eq!(schedule.project_duration, 9);
    assert_eq!(schedule.get("c").unwrap().start, date(2025, 1, 7));
    assert_eq!(schedule.get("c").unwrap().leveling_delay, 0);
    assert_eq!(schedule.get("n").unwrap().start, date(2025, 1, 10));
    assert_eq!(schedule.get("n").unwrap().leveling_delay, 4);
    assert_eq!(outcome.diagnostics.shifts.len(), 1);
    assert_eq!(outcome.diagnostics.shifts[0].task_id, "n");
    assert_within_capacity(&project, schedule);
}

// =============================================================================
// Capacity is never exceeded
// =============================================================================

#[test]
fn leveled_usage_stays_within_capacity() {
    let project = busy_site();
    let outcome = SiteScheduler::new().run(&project).unwrap();

    assert_within_capacity(&project, &outcome.schedule);
    assert!(outcome.diagnostics.shortages.is_empty());
    assert!(!outcome.diagnostics.leveling_incomplete);
    assert!(outcome.schedule.resource_usage["crane"].peak_units <= 1);
}

#[test]
fn leveling_is_deterministic() {
    let project = busy_site();
    let scheduler = SiteScheduler::new();

    let first = scheduler.run(&project).unwrap();
    let second = scheduler.run(&project).unwrap();
    assert_eq!(first, second);
}

#[test]
fn tie_break_policy_is_honoured() {
    let mut project = Project::new("Tie", date(2025, 1, 6));
    project.resources = vec![Resource::new("crew")];
    project.tasks = vec![Task::new("b").fixed(2.0), Task::new("a").fixed(2.0)];
    project.requirements = vec![
        ResourceRequirement::new("b", "crew", 1),
        ResourceRequirement::new("a", "crew", 1),
    ];

    let by_input = SiteScheduler::new().schedule(&project).unwrap();
    assert_eq!(by_input.get("a").unwrap().early_start, 2);

    let config = EngineConfig::default().with_tie_break(TieBreakPolicy::TaskId);
    let by_id = SiteScheduler::with_config(config).schedule(&project).unwrap();
    assert_eq!(by_id.get("b").unwrap().early_start, 2);
}

#[test]
fn disabled_leveling_keeps_overlap() {
    let config = EngineConfig::default().without_leveling();
    let outcome = SiteScheduler::with_config(config).run(&busy_site()).unwrap();

    assert!(outcome.diagnostics.shifts.is_empty());
    assert!(outcome.schedule.resource_usage["crane"].peak_units > 1);
    assert!(outcome
        .diagnostics
        .shortages
        .iter()
        .any(|s| s.resource_id == "crane"
            && matches!(s.kind, ShortageKind::Overallocated { capacity: 1, .. })));
}

// =============================================================================
// Shortages
// =============================================================================

#[test]
fn zero_capacity_is_reported_not_fatal() {
    let mut project = busy_site();
    project.resources.push(Resource::new("hoist").capacity(0));
    project
        .requirements
        .push(ResourceRequirement::new("t2", "hoist", 1));

    let outcome = SiteScheduler::new().run(&project).unwrap();
    let shortage = &outcome.diagnostics.shortages[0];

    assert_eq!(shortage.resource_id, "hoist");
    assert_eq!(shortage.task_id.as_deref(), Some("t2"));
    assert_eq!(shortage.kind, ShortageKind::NoCapacity);
    assert!(outcome.schedule.get("t2").is_some());
}

#[test]
fn strict_mode_turns_shortage_into_error() {
    let mut project = busy_site();
    project
        .requirements
        .push(ResourceRequirement::new("t2", "crane", 3));

    let outcome = SiteScheduler::new().run(&project).unwrap();
    let err = outcome.into_strict().unwrap_err();

    match err {
        ScheduleError::ResourceShortage(shortages) => {
            assert_eq!(
                shortages[0].kind,
                ShortageKind::ExceedsCapacity {
                    required: 3,
                    capacity: 1
                }
            );
        }
        other => panic!("expected shortage, got {:?}", other),
    }
}

// =============================================================================
// Optimizer
// =============================================================================

fn crashable() -> Project {
    let mut project = Project::new("Crash", date(2025, 1, 6));
    project.resources = vec![Resource::new("mason").capacity(4)];
    project.tasks = vec![
        Task::new("footings").fixed(2.0),
        Task::new("blockwork").effort(24.0),
        Task::new("roof").fixed(3.0),
    ];
    project.dependencies = vec![
        Dependency::finish_to_start("footings", "blockwork"),
        Dependency::finish_to_start("blockwork", "roof"),
    ];
    project.requirements = vec![ResourceRequirement::new("blockwork", "mason", 2).with_max(4)];
    project
}

#[test]
fn minimize_duration_is_never_worse() {
    let project = crashable();
    let baseline = SiteScheduler::new().schedule(&project).unwrap();

    let config = EngineConfig::default().with_objective(OptimizationObjective::MinimizeDuration);
    let outcome = SiteScheduler::with_config(config).run(&project).unwrap();
    let report = outcome.diagnostics.optimizer.unwrap();

    assert_eq!(baseline.project_duration, 17);
    assert_eq!(report.baseline_duration, 17);
    assert_eq!(outcome.schedule.project_duration, 11);
    assert!(report.final_duration <= report.baseline_duration);
    assert_eq!(report.moves.len(), 2);
    assert_eq!(
        outcome.schedule.get("blockwork").unwrap().assignments[0].units,
        4
    );
}

#[test]
fn minimize_peak_usage_is_never_worse() {
    let project = busy_site();
    let config = EngineConfig::default().with_objective(OptimizationObjective::MinimizePeakUsage);
    let outcome = SiteScheduler::with_config(config).run(&project).unwrap();
    let report = outcome.diagnostics.optimizer.unwrap();

    assert!(!report.final_peak.ratio.is_nan());
    assert!(report.final_peak.ratio <= report.baseline_peak.ratio);
    assert!(report.final_duration <= report.baseline_duration);
    assert_within_capacity(&project, &outcome.schedule);
}

#[test]
fn cancelled_run_returns_baseline() {
    let project = crashable();
    let token = CancellationToken::new();
    token.cancel();

    let config = EngineConfig::default().with_objective(OptimizationObjective::MinimizeDuration);
    let outcome = SiteScheduler::with_config(config)
        .with_cancellation(token)
        .run(&project)
        .unwrap();
    let report = outcome.diagnostics.optimizer.unwrap();

    assert!(report.cancelled);
    assert_eq!(outcome.schedule.project_duration, 17);
}
