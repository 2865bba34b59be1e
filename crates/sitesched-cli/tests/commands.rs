//! CLI integration tests
//!
//! Runs the built `sitesched` binary against project files written to a
//! temporary directory.
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Success |
//! | 1 | Fatal error, conflicts, or shortages under `--strict` |

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

const CHAIN: &str = r#"{
    "name": "Chain",
    "start": "2025-01-06",
    "tasks": [
        {"id": "A", "fixed_duration": 2},
        {"id": "B", "fixed_duration": 3},
        {"id": "C", "fixed_duration": 1}
    ],
    "dependencies": [
        {"predecessor": "A", "successor": "B"},
        {"predecessor": "B", "successor": "C", "type": "FS"}
    ]
}"#;

const CYCLE: &str = r#"{
    "name": "Cycle",
    "start": "2025-01-06",
    "tasks": [{"id": "A", "fixed_duration": 1}, {"id": "B", "fixed_duration": 1}],
    "dependencies": [
        {"predecessor": "A", "successor": "B"},
        {"predecessor": "B", "successor": "A"}
    ]
}"#;

const SHORTAGE: &str = r#"{
    "name": "Shortage",
    "start": "2025-01-06",
    "tasks": [{"id": "lift", "fixed_duration": 2}],
    "requirements": [{"task_id": "lift", "resource_id": "crane", "quantity": 2}],
    "resources": [{"id": "crane", "capacity": 1}]
}"#;

const TEMPLATE: &str = r#"{
    "name": "Tower",
    "start": "2025-03-03",
    "zones": [{"name": "A", "floors": 1}],
    "templates": [
        {"id": "slab", "discipline": "structure", "fixed_duration": 3},
        {"id": "walls", "discipline": "masonry", "fixed_duration": 2,
         "predecessors": [{"template": "slab"}]}
    ]
}"#;

fn sitesched() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sitesched"))
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(args: &[&str], file: &Path) -> Output {
    let mut cmd = sitesched();
    cmd.args(&args[..1]).arg(file).args(&args[1..]);
    cmd.env_remove("RUST_LOG").env_remove("SITESCHED_CONFIG");
    cmd.output().expect("failed to execute sitesched")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// schedule
// =============================================================================

#[test]
fn schedule_text_summary() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "chain.json", CHAIN);

    let output = run(&["schedule"], &file);

    assert_eq!(output.status.code(), Some(0));
    let text = stdout(&output);
    assert!(text.contains("Duration: 6 working days"), "{}", text);
    assert!(text.contains("A -> B -> C"), "{}", text);
}

#[test]
fn schedule_json_to_output_file() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "chain.json", CHAIN);
    let out = dir.path().join("schedule.json");

    let output = run(
        &["schedule", "--format", "json", "--output", out.to_str().unwrap()],
        &file,
    );

    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["schedule"]["project_duration"], 6);
    assert_eq!(json["schedule"]["tasks"]["C"]["start"], "2025-01-13");
}

#[test]
fn cycle_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "cycle.json", CYCLE);

    let output = run(&["schedule"], &file);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Circular dependency among tasks: A, B"));
}

#[test]
fn shortage_warns_unless_strict() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "shortage.json", SHORTAGE);

    let lenient = run(&["schedule"], &file);
    assert_eq!(lenient.status.code(), Some(0));
    assert!(stderr(&lenient).contains("warning: resource 'crane' for task 'lift'"));

    let strict = run(&["schedule", "--strict"], &file);
    assert_eq!(strict.status.code(), Some(1));
    assert!(stderr(&strict).contains("Resource shortage"));
}

#[test]
fn config_file_and_flag_overrides() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "chain.json", CHAIN);
    let config = write(&dir, "engine.toml", "optimization_objective = \"minimize_duration\"\n");

    let output = run(
        &["schedule", "--config", config.to_str().unwrap(), "--format", "json"],
        &file,
    );
    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["diagnostics"]["optimizer"]["objective"], "minimize_duration");

    let output = run(
        &[
            "schedule",
            "--config",
            config.to_str().unwrap(),
            "--objective",
            "none",
            "--format",
            "json",
        ],
        &file,
    );
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(json["diagnostics"].get("optimizer").is_none());
}

#[test]
fn unknown_config_key_is_rejected() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "chain.json", CHAIN);
    let config = write(&dir, "engine.toml", "optimisation = \"fast\"\n");

    let output = run(&["schedule", "--config", config.to_str().unwrap()], &file);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid configuration"));
}

#[test]
fn missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let output = run(&["schedule"], &dir.path().join("absent.json"));

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("absent.json"));
}

// =============================================================================
// check / explain / expand
// =============================================================================

#[test]
fn check_reports_feasible_project() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "chain.json", CHAIN);

    let output = run(&["check"], &file);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Chain: feasible"));
}

#[test]
fn check_lists_conflicts() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "shortage.json", SHORTAGE);

    let output = run(&["check", "--format", "json"], &file);

    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["feasible"], false);
    assert_eq!(json["conflicts"][0]["conflict_type"], "resource_shortage");
}

#[test]
fn explain_names_predecessor() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "chain.json", CHAIN);

    let output = run(&["explain"], &file);
    // TASK comes after FILE
    assert_ne!(output.status.code(), Some(0));

    let output = sitesched()
        .arg("explain")
        .arg(&file)
        .arg("B")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("FS dependency on 'A'"));
}

#[test]
fn expand_then_schedule_template() {
    let dir = TempDir::new().unwrap();
    let template = write(&dir, "tower.json", TEMPLATE);
    let project = dir.path().join("project.json");

    let output = run(&["expand", "--output", project.to_str().unwrap()], &template);
    assert_eq!(output.status.code(), Some(0));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&project).unwrap()).unwrap();
    assert_eq!(json["tasks"].as_array().unwrap().len(), 4);

    let direct = run(&["schedule", "--template", "--format", "json"], &template);
    assert_eq!(direct.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_str(&stdout(&direct)).unwrap();
    // slab F0, slab F1 (vertical), walls F1
    assert_eq!(json["schedule"]["project_duration"], 8);
}
