//! Engine configuration and cooperative cancellation
//!
//! ```toml
//! optimization_objective = "minimize_duration"
//! max_optimizer_iterations = 25
//! tie_break_policy = "task_id"
//! resource_leveling = true
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ScheduleError;

/// What the optimizer tries to improve after leveling
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationObjective {
    /// Keep the leveled baseline
    #[default]
    None,
    /// Crash effort-driven critical tasks
    MinimizeDuration,
    /// Shift tasks within float to flatten resource usage
    MinimizePeakUsage,
}

impl std::fmt::Display for OptimizationObjective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::MinimizeDuration => "minimize_duration",
            Self::MinimizePeakUsage => "minimize_peak_usage",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OptimizationObjective {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "minimize_duration" | "duration" => Ok(Self::MinimizeDuration),
            "minimize_peak_usage" | "peak" => Ok(Self::MinimizePeakUsage),
            other => Err(ScheduleError::InvalidConfig(format!(
                "unknown optimization objective '{}'",
                other
            ))),
        }
    }
}

/// Ordering among leveling candidates that tie on criticality, float and start
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// The task listed later in the project yields
    #[default]
    InputOrder,
    /// The lexicographically greater task id yields
    TaskId,
}

/// Recognized engine options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub optimization_objective: OptimizationObjective,
    /// Must be greater than zero
    pub max_optimizer_iterations: usize,
    pub tie_break_policy: TieBreakPolicy,
    /// Resolve over-allocation before optimizing
    pub resource_leveling: bool,
    /// Cap on leveling shifts; derived from problem size when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_leveling_iterations: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimization_objective: OptimizationObjective::None,
            max_optimizer_iterations: 50,
            tie_break_policy: TieBreakPolicy::InputOrder,
            resource_leveling: true,
            max_leveling_iterations: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml_str(s: &str) -> Result<Self, ScheduleError> {
        let config: EngineConfig =
            toml::from_str(s).map_err(|e| ScheduleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.max_optimizer_iterations == 0 {
            return Err(ScheduleError::InvalidConfig(
                "max_optimizer_iterations must be greater than zero".into(),
            ));
        }
        if self.max_leveling_iterations == Some(0) {
            return Err(ScheduleError::InvalidConfig(
                "max_leveling_iterations must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn with_objective(mut self, objective: OptimizationObjective) -> Self {
        self.optimization_objective = objective;
        self
    }

    pub fn with_max_optimizer_iterations(mut self, iterations: usize) -> Self {
        self.max_optimizer_iterations = iterations;
        self
    }

    pub fn with_tie_break(mut self, policy: TieBreakPolicy) -> Self {
        self.tie_break_policy = policy;
        self
    }

    pub fn without_leveling(mut self) -> Self {
        self.resource_leveling = false;
        self
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared stop signal for long-running optimizer loops
///
/// Clones share the same flag. A deadline, when set, cancels implicitly once
/// it passes.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that reports cancellation once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }
}
