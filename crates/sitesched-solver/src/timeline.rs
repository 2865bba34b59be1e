//! Working-day timeline and resource usage profiles
//!
//! CPM works in working-day offsets of the project default calendar. The
//! [`Timeline`] maps those offsets to dates and, for every resource class in
//! the pool, to the units available that day (zero when the class's own
//! calendar marks the date as non-working).

use chrono::NaiveDate;
use rayon::prelude::*;
use sitesched_core::{CalendarSet, PeakUsage, Resource, ResourceId};

use crate::cpm::CpmSchedule;
use crate::dag::SchedulingGraph;

/// A resource class of the pool
#[derive(Debug, Clone)]
pub struct ResourceClass {
    pub id: ResourceId,
    /// Units per working day
    pub capacity: u32,
}

/// Offset -> date and offset -> capacity lookups, grown on demand
#[derive(Debug, Clone)]
pub struct Timeline<'a> {
    calendars: &'a CalendarSet,
    dates: Vec<NaiveDate>,
    classes: Vec<ResourceClass>,
    capacity: Vec<Vec<u32>>,
}

impl<'a> Timeline<'a> {
    /// Offset 0 is the first working day on or after `start`
    pub fn new(resources: &[Resource], calendars: &'a CalendarSet, start: NaiveDate) -> Self {
        let classes: Vec<ResourceClass> = resources
            .iter()
            .map(|r| ResourceClass {
                id: r.id.clone(),
                capacity: r.capacity,
            })
            .collect();
        let mut timeline = Self {
            calendars,
            dates: vec![calendars.default.next_working_day(start)],
            capacity: vec![Vec::new(); classes.len()],
            classes,
        };
        timeline.ensure(1);
        timeline
    }

    /// Make offsets `0..len` available
    pub fn ensure(&mut self, len: usize) {
        while self.dates.len() < len {
            let last = self.dates[self.dates.len() - 1];
            self.dates.push(self.calendars.default.add_working_days(last, 1));
        }
        for (class, capacity) in self.classes.iter().zip(self.capacity.iter_mut()) {
            let calendar = self.calendars.for_resource(&class.id);
            while capacity.len() < self.dates.len() {
                let date = self.dates[capacity.len()];
                capacity.push(if calendar.is_working_day(date) {
                    class.capacity
                } else {
                    0
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Date of a working-day offset (clamped to the known range)
    pub fn date(&self, offset: i64) -> NaiveDate {
        let i = (offset.max(0) as usize).min(self.dates.len() - 1);
        self.dates[i]
    }

    pub fn classes(&self) -> &[ResourceClass] {
        &self.classes
    }

    pub fn class_index(&self, id: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.id == id)
    }

    /// Units of a class available at an offset
    pub fn capacity(&self, class: usize, offset: usize) -> u32 {
        self.capacity[class].get(offset).copied().unwrap_or(0)
    }

    /// Highest daily capacity of a class within `0..len`
    pub fn max_capacity(&self, class: usize, len: usize) -> u32 {
        self.capacity[class].iter().take(len).copied().max().unwrap_or(0)
    }

    /// Sum of capacity of a class within `0..len`
    pub fn available_unit_days(&self, class: usize, len: usize) -> u64 {
        self.capacity[class]
            .iter()
            .take(len)
            .map(|c| u64::from(*c))
            .sum()
    }

    /// Daily usage of every pool class, skipping masked demands
    pub fn pool_usage(
        &self,
        graph: &SchedulingGraph,
        cpm: &CpmSchedule,
        skip: Option<&[Vec<bool>]>,
    ) -> Vec<Vec<u32>> {
        let ids: Vec<ResourceId> = self.classes.iter().map(|c| c.id.clone()).collect();
        usage_by_class(graph, cpm, &ids, skip)
    }

    /// Peak usage over the pool, ratios against nominal capacity
    pub fn peak(&self, graph: &SchedulingGraph, cpm: &CpmSchedule) -> PeakUsage {
        let usage = self.pool_usage(graph, cpm, None);
        let mut peak = PeakUsage::default();
        for (class, days) in self.classes.iter().zip(&usage) {
            let max = days.iter().copied().max().unwrap_or(0);
            peak.units += max;
            if class.capacity > 0 {
                peak.ratio = peak.ratio.max(f64::from(max) / f64::from(class.capacity));
            }
        }
        peak
    }
}

/// Units in use per class (outer, in `class_ids` order) and offset (inner)
///
/// Every inner vector spans `0..project_end`. Zero-duration tasks hold no
/// resources. Classes are summed in parallel.
pub fn usage_by_class(
    graph: &SchedulingGraph,
    cpm: &CpmSchedule,
    class_ids: &[ResourceId],
    skip: Option<&[Vec<bool>]>,
) -> Vec<Vec<u32>> {
    let len = cpm.project_end.max(0) as usize;

    class_ids
        .par_iter()
        .map(|class| {
            let mut diff = vec![0i64; len + 1];
            for (idx, task) in graph.tasks.iter().enumerate() {
                let r = cpm.get(idx);
                if r.duration == 0 {
                    continue;
                }
                for (d, demand) in task.demands.iter().enumerate() {
                    if demand.resource_id != *class || skip.map_or(false, |s| s[idx][d]) {
                        continue;
                    }
                    diff[r.es as usize] += i64::from(demand.units);
                    diff[r.ef as usize] -= i64::from(demand.units);
                }
            }
            let mut running = 0i64;
            diff.iter()
                .take(len)
                .map(|delta| {
                    running += delta;
                    running as u32
                })
                .collect()
        })
        .collect()
}
