use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_KEY_FORMAT).to_string()
}

pub fn parse_day_key(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DAY_KEY_FORMAT).ok()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub custom: bool,
}

impl Task {
    pub fn system(title: &str) -> Self {
        Self {
            id: new_task_id(),
            title: title.to_string(),
            completed: false,
            custom: false,
        }
    }

    pub fn custom(title: &str) -> Self {
        Self {
            id: new_task_id(),
            title: title.to_string(),
            completed: false,
            custom: true,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.completed {
            "done"
        } else {
            "todo"
        }
    }

    pub fn kind_label(&self) -> &'static str {
        if self.custom {
            "custom"
        } else {
            "daily"
        }
    }
}

fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSet {
    pub date: String,
    pub tasks: Vec<Task>,
}

impl TaskSet {
    pub fn is_for(&self, day: NaiveDate) -> bool {
        parse_day_key(&self.date) == Some(day)
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tasks
            .iter()
            .any(|task| task.id == key || task.title == key)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.completed).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRecord {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepEvent {
    pub steps: u64,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepMetrics {
    pub steps: u64,
    pub distance_km: f64,
    pub calories: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepUpdate {
    Accepted { delta: u64, count: u64 },
    Dropped(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    BelowThreshold,
    TooSoon,
    Inactive,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelowThreshold => "below threshold",
            Self::TooSoon => "too soon",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(Task),
    Cancelled,
    NotDeletable,
    NotFound,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
}
