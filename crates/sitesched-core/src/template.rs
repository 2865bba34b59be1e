//! Project templates: zones, floors and reusable task definitions
//!
//! A [`ProjectTemplate`] describes a building as a set of zones (each with a
//! number of floors) and a library of task templates. [`ProjectTemplate::instantiate`]
//! expands every included template into one concrete task per zone and floor
//! and derives the dependency edges from four rules:
//!
//! 1. Declared predecessors link templates within the same zone and floor.
//! 2. Cross-floor links make a template depend on another template one floor below.
//! 3. Vertical workflow makes a template depend on itself one floor below.
//! 4. Discipline sequences split zones into ordered groups: a template in group
//!    N+1 depends on the same template in every zone of group N, same floor.
//!
//! Generated task ids follow `{zone}-{template}-F{floor}`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    default_currency, CalendarSet, Dependency, DependencyType, DurationMethod, Project,
    Resource, ResourceRequirement, ScheduleError, Task, TaskId,
};

/// A building section with floors `0..=floors`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    /// Highest floor number (0 = ground only)
    #[serde(default)]
    pub floors: u32,
}

impl Zone {
    pub fn new(name: impl Into<String>, floors: u32) -> Self {
        Self {
            name: name.into(),
            floors,
        }
    }
}

/// Quantity override for a zone, a floor, or both
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateQuantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    pub quantity: f64,
}

impl TemplateQuantity {
    fn matches(&self, zone: &str, floor: u32) -> Option<u8> {
        match (&self.zone, self.floor) {
            (Some(z), Some(f)) if z == zone && f == floor => Some(3),
            (Some(z), None) if z == zone => Some(2),
            (None, Some(f)) if f == floor => Some(1),
            (None, None) => Some(0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRequirement {
    pub resource_id: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePredecessor {
    pub template: String,
    #[serde(default, rename = "type")]
    pub dep_type: DependencyType,
    #[serde(default)]
    pub lag: i64,
}

fn yes() -> bool {
    true
}

/// Reusable task definition, expanded per zone and floor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub discipline: String,
    #[serde(default)]
    pub method: DurationMethod,
    #[serde(default)]
    pub fixed_duration: Option<f64>,
    #[serde(default)]
    pub productivity_rate: Option<f64>,
    #[serde(default)]
    pub effort: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Quantity used when no override matches
    #[serde(default)]
    pub default_quantity: Option<f64>,
    #[serde(default)]
    pub quantities: Vec<TemplateQuantity>,
    #[serde(default)]
    pub requirements: Vec<TemplateRequirement>,
    #[serde(default)]
    pub predecessors: Vec<TemplatePredecessor>,
    /// Generate one task per floor; otherwise only floor 0
    #[serde(default = "yes")]
    pub repeat_on_floor: bool,
    /// Floor f waits for the same template on floor f-1
    #[serde(default = "yes")]
    pub vertical_workflow: bool,
    /// Excluded templates produce no tasks
    #[serde(default = "yes")]
    pub included: bool,
}

impl TaskTemplate {
    pub fn new(id: impl Into<String>, discipline: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            discipline: discipline.into(),
            method: DurationMethod::Fixed,
            fixed_duration: None,
            productivity_rate: None,
            effort: None,
            unit: None,
            default_quantity: None,
            quantities: Vec::new(),
            requirements: Vec::new(),
            predecessors: Vec::new(),
            repeat_on_floor: true,
            vertical_workflow: true,
            included: true,
        }
    }

    pub fn fixed(mut self, days: f64) -> Self {
        self.method = DurationMethod::Fixed;
        self.fixed_duration = Some(days);
        self
    }

    pub fn productivity(mut self, quantity: f64, rate: f64) -> Self {
        self.method = DurationMethod::QuantityProductivity;
        self.default_quantity = Some(quantity);
        self.productivity_rate = Some(rate);
        self
    }

    pub fn effort(mut self, unit_days: f64) -> Self {
        self.method = DurationMethod::EffortDriven;
        self.effort = Some(unit_days);
        self
    }

    pub fn after(mut self, template: impl Into<String>) -> Self {
        self.predecessors.push(TemplatePredecessor {
            template: template.into(),
            dep_type: DependencyType::FinishToStart,
            lag: 0,
        });
        self
    }

    pub fn requires(mut self, resource_id: impl Into<String>, quantity: u32) -> Self {
        self.requirements.push(TemplateRequirement {
            resource_id: resource_id.into(),
            quantity,
            max_quantity: None,
        });
        self
    }

    pub fn excluded(mut self) -> Self {
        self.included = false;
        self
    }

    fn quantity_for(&self, zone: &str, floor: u32) -> Option<f64> {
        self.quantities
            .iter()
            .filter_map(|q| q.matches(zone, floor).map(|rank| (rank, q.quantity)))
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, quantity)| quantity)
            .or(self.default_quantity)
    }

    fn floors(&self, zone: &Zone) -> Vec<u32> {
        if self.repeat_on_floor {
            (0..=zone.floors).collect()
        } else {
            vec![0]
        }
    }
}

/// A building-level project description
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub name: String,
    pub start: NaiveDate,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub zones: Vec<Zone>,
    pub templates: Vec<TaskTemplate>,
    /// Discipline -> ordered zone groups
    #[serde(default)]
    pub discipline_sequences: BTreeMap<String, Vec<Vec<String>>>,
    /// Template -> templates it waits for one floor below
    #[serde(default)]
    pub cross_floor_links: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub calendars: CalendarSet,
}

/// Placement of a generated task
struct Slot<'a> {
    template: &'a TaskTemplate,
    zone: &'a str,
    floor: u32,
    id: TaskId,
}

impl ProjectTemplate {
    pub fn new(name: impl Into<String>, start: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start,
            currency: default_currency(),
            zones: Vec::new(),
            templates: Vec::new(),
            discipline_sequences: BTreeMap::new(),
            cross_floor_links: BTreeMap::new(),
            resources: Vec::new(),
            calendars: CalendarSet::default(),
        }
    }

    /// Generated task id for a template placed in a zone and floor
    pub fn task_id(zone: &str, template: &str, floor: u32) -> TaskId {
        format!("{}-{}-F{}", zone, template, floor)
    }

    /// Expand into a concrete project
    pub fn instantiate(&self) -> Result<Project, ScheduleError> {
        self.validate()?;

        let template_pos: HashMap<&str, usize> = self
            .templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();
        let zone_pos: HashMap<&str, usize> = self
            .zones
            .iter()
            .enumerate()
            .map(|(i, z)| (z.name.as_str(), i))
            .collect();
        let all_zones: Vec<String> = self.zones.iter().map(|z| z.name.clone()).collect();
        let default_groups = vec![all_zones];

        let mut slots: Vec<Slot<'_>> = Vec::new();
        let mut index: HashMap<(usize, usize, u32), usize> = HashMap::new();

        for (ti, template) in self.templates.iter().enumerate() {
            if !template.included {
                continue;
            }
            let groups = self
                .discipline_sequences
                .get(&template.discipline)
                .unwrap_or(&default_groups);
            for zone_name in groups.iter().flatten() {
                let Some(&zi) = zone_pos.get(zone_name.as_str()) else {
                    continue;
                };
                let zone = &self.zones[zi];
                for floor in template.floors(zone) {
                    if index.contains_key(&(ti, zi, floor)) {
                        continue;
                    }
                    index.insert((ti, zi, floor), slots.len());
                    slots.push(Slot {
                        template,
                        zone: zone.name.as_str(),
                        floor,
                        id: Self::task_id(&zone.name, &template.id, floor),
                    });
                }
            }
        }

        let lookup = |template: &str, zone: &str, floor: u32| -> Option<usize> {
            let ti = template_pos.get(template)?;
            let zi = zone_pos.get(zone)?;
            index.get(&(*ti, *zi, floor)).copied()
        };

        let mut project = Project::new(self.name.clone(), self.start);
        project.currency = self.currency.clone();
        project.resources = self.resources.clone();
        project.calendars = self.calendars.clone();

        let mut seen: HashSet<(TaskId, TaskId, DependencyType, i64)> = HashSet::new();
        let mut link = |project: &mut Project, pred: &TaskId, succ: &TaskId, dep_type, lag| {
            if pred == succ {
                return;
            }
            if seen.insert((pred.clone(), succ.clone(), dep_type, lag)) {
                project.dependencies.push(
                    Dependency::new(pred.clone(), succ.clone(), dep_type).with_lag(lag),
                );
            }
        };

        for slot in &slots {
            let template = slot.template;
            let mut task = Task::new(slot.id.clone())
                .name(template.name.clone())
                .zone(slot.zone)
                .floor(slot.floor)
                .discipline(template.discipline.clone());
            task.method = template.method;
            task.fixed_duration = template.fixed_duration;
            task.productivity_rate = template.productivity_rate;
            task.effort = template.effort;
            task.unit = template.unit.clone();
            task.quantity = template.quantity_for(slot.zone, slot.floor);
            project.tasks.push(task);

            for req in &template.requirements {
                project.requirements.push(ResourceRequirement {
                    task_id: slot.id.clone(),
                    resource_id: req.resource_id.clone(),
                    quantity: req.quantity,
                    max_quantity: req.max_quantity,
                });
            }

            for pred in &template.predecessors {
                if let Some(pi) = lookup(&pred.template, slot.zone, slot.floor) {
                    link(&mut project, &slots[pi].id, &slot.id, pred.dep_type, pred.lag);
                }
            }

            if slot.floor > 0 {
                if let Some(below) = self.cross_floor_links.get(&template.id) {
                    for pred in below {
                        if let Some(pi) = lookup(pred, slot.zone, slot.floor - 1) {
                            link(&mut project, &slots[pi].id, &slot.id, DependencyType::FinishToStart, 0);
                        }
                    }
                }
                if template.vertical_workflow {
                    if let Some(pi) = lookup(&template.id, slot.zone, slot.floor - 1) {
                        link(&mut project, &slots[pi].id, &slot.id, DependencyType::FinishToStart, 0);
                    }
                }
            }

            if let Some(groups) = self.discipline_sequences.get(&template.discipline) {
                let group_index = groups
                    .iter()
                    .position(|g| g.iter().any(|z| z == slot.zone));
                if let Some(gi) = group_index.filter(|gi| *gi > 0) {
                    for prev_zone in &groups[gi - 1] {
                        if let Some(pi) = lookup(&template.id, prev_zone, slot.floor) {
                            link(&mut project, &slots[pi].id, &slot.id, DependencyType::FinishToStart, 0);
                        }
                    }
                }
            }
        }

        Ok(project)
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        let mut zone_names = HashSet::new();
        for zone in &self.zones {
            if !zone_names.insert(zone.name.as_str()) {
                return Err(ScheduleError::InvalidTemplate(format!(
                    "zone '{}' is defined twice",
                    zone.name
                )));
            }
        }

        let mut template_ids = HashSet::new();
        for template in &self.templates {
            if !template_ids.insert(template.id.as_str()) {
                return Err(ScheduleError::InvalidTemplate(format!(
                    "template '{}' is defined twice",
                    template.id
                )));
            }
        }

        let unknown_template = |id: &str, context: &str| {
            ScheduleError::InvalidTemplate(format!(
                "unknown template '{}' referenced by {}",
                id, context
            ))
        };

        for template in &self.templates {
            for pred in &template.predecessors {
                if !template_ids.contains(pred.template.as_str()) {
                    return Err(unknown_template(&pred.template, &template.id));
                }
            }
            for q in &template.quantities {
                if let Some(zone) = &q.zone {
                    if !zone_names.contains(zone.as_str()) {
                        return Err(ScheduleError::InvalidTemplate(format!(
                            "unknown zone '{}' in quantities of '{}'",
                            zone, template.id
                        )));
                    }
                }
            }
        }

        for (template, below) in &self.cross_floor_links {
            if !template_ids.contains(template.as_str()) {
                return Err(unknown_template(template, "cross_floor_links"));
            }
            if let Some(missing) = below.iter().find(|b| !template_ids.contains(b.as_str())) {
                return Err(unknown_template(missing, "cross_floor_links"));
            }
        }

        for (discipline, groups) in &self.discipline_sequences {
            if let Some(zone) = groups
                .iter()
                .flatten()
                .find(|z| !zone_names.contains(z.as_str()))
            {
                return Err(ScheduleError::InvalidTemplate(format!(
                    "unknown zone '{}' in sequence for discipline '{}'",
                    zone, discipline
                )));
            }
        }

        Ok(())
    }
}
