//! Duration calculation
//!
//! Turns a task's configured method into a whole number of working days.
//!
//! | Method                  | Raw duration                   |
//! |-------------------------|--------------------------------|
//! | `fixed`                 | `fixed_duration`               |
//! | `quantity_productivity` | `quantity / productivity_rate` |
//! | `effort_driven`         | `effort / assigned units`      |
//!
//! Raw durations are rounded up to whole working days. A tolerance absorbs
//! floating-point noise (`3.0000000001` stays 3) and any positive fraction
//! below one day becomes a full day. Zero stays zero and yields a milestone.

use sitesched_core::{DurationMethod, ScheduleError, Task};

/// Tolerance applied before rounding up
const ROUNDING_EPSILON: f64 = 1e-9;

/// Stateless duration calculator
#[derive(Clone, Copy, Debug, Default)]
pub struct DurationCalculator;

impl DurationCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Working-day duration for `task` with `assigned_units` resource units
    pub fn compute(&self, task: &Task, assigned_units: u32) -> Result<i64, ScheduleError> {
        self.raw(task, assigned_units).map(to_working_days)
    }

    /// Unrounded duration in working days
    pub fn raw(&self, task: &Task, assigned_units: u32) -> Result<f64, ScheduleError> {
        let invalid = |reason: &str| ScheduleError::InvalidDuration {
            task: task.id.clone(),
            reason: reason.to_string(),
        };

        let days = match task.method {
            DurationMethod::Fixed => {
                let days = task
                    .fixed_duration
                    .ok_or_else(|| invalid("fixed duration is missing"))?;
                if days < 0.0 {
                    return Err(invalid("fixed duration is negative"));
                }
                days
            }
            DurationMethod::QuantityProductivity => {
                let rate = task
                    .productivity_rate
                    .ok_or_else(|| invalid("productivity rate is missing"))?;
                if rate.is_nan() || rate <= 0.0 {
                    return Err(invalid("productivity rate must be positive"));
                }
                let quantity = task.quantity.ok_or_else(|| invalid("quantity is missing"))?;
                if quantity < 0.0 {
                    return Err(invalid("quantity is negative"));
                }
                quantity / rate
            }
            DurationMethod::EffortDriven => {
                let effort = task.effort.ok_or_else(|| invalid("effort is missing"))?;
                if effort < 0.0 {
                    return Err(invalid("effort is negative"));
                }
                if assigned_units == 0 {
                    return Err(invalid("effort-driven task has no assigned units"));
                }
                effort / f64::from(assigned_units)
            }
        };

        if !days.is_finite() {
            return Err(invalid("duration is not a finite number"));
        }
        Ok(days)
    }
}

/// Round a raw duration up to whole working days
pub fn to_working_days(raw: f64) -> i64 {
    if raw <= 0.0 {
        return 0;
    }
    ((raw - ROUNDING_EPSILON).ceil() as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> DurationCalculator {
        DurationCalculator::new()
    }

    #[test]
    fn fixed_duration_ignores_quantity() {
        let task = Task::new("a").quantity(100.0, "m2").fixed(4.0);
        assert_eq!(calc().compute(&task, 1).unwrap(), 4);
    }

    #[test]
    fn negative_fixed_duration_rejected() {
        let task = Task::new("a").fixed(-1.0);
        let err = calc().compute(&task, 1).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDuration { task, .. } if task == "a"));
    }

    #[test]
    fn quantity_over_productivity_rounds_up() {
        let task = Task::new("a").quantity(42.0, "m3").productivity(12.0);
        assert_eq!(calc().compute(&task, 1).unwrap(), 4);
    }

    #[test]
    fn exact_division_stays_whole() {
        let task = Task::new("a").quantity(0.3, "t").productivity(0.1);
        // 0.3 / 0.1 == 2.9999999999999996
        assert_eq!(calc().compute(&task, 1).unwrap(), 3);
    }

    #[test]
    fn zero_productivity_rejected() {
        let task = Task::new("a").quantity(10.0, "m").productivity(0.0);
        assert!(calc().compute(&task, 1).is_err());
    }

    #[test]
    fn zero_quantity_is_milestone() {
        let task = Task::new("a").quantity(0.0, "m").productivity(5.0);
        assert_eq!(calc().compute(&task, 1).unwrap(), 0);
    }

    #[test]
    fn effort_divided_by_units() {
        let task = Task::new("a").effort(10.0);
        assert_eq!(calc().compute(&task, 1).unwrap(), 10);
        assert_eq!(calc().compute(&task, 3).unwrap(), 4);
        assert_eq!(calc().compute(&task, 4).unwrap(), 3);
    }

    #[test]
    fn effort_without_units_rejected() {
        let task = Task::new("a").effort(10.0);
        assert!(calc().compute(&task, 0).is_err());
    }

    #[test]
    fn sub_day_fraction_becomes_one_day() {
        assert_eq!(to_working_days(0.2), 1);
        assert_eq!(to_working_days(0.0), 0);
        assert_eq!(to_working_days(1.0 + 1e-12), 1);
        assert_eq!(to_working_days(1.5), 2);
    }
}
