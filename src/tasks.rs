use std::sync::Arc;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::clock::Clock;
use crate::error::AppError;
use crate::model::{day_key, DeleteOutcome, Task, TaskSet};
use crate::prompt::Prompt;
use crate::store::{KeyValueStore, DAILY_TASKS_KEY};

pub const TASK_POOL: [&str; 11] = [
    "10 min warm-up jog",
    "Ab workout (15 reps x 3)",
    "Push-ups (20 reps x 3)",
    "Stretch and cooldown (5 min)",
    "30s jumping jacks",
    "Wall sit (1 min)",
    "Yoga pose (3 min)",
    "Plank hold (45 sec)",
    "Glute bridge (20 reps)",
    "Arm circles (1 min)",
    "Squats (20 reps x 2)",
];

/// Owns the single task set for "today".
///
/// The in-memory set is authoritative for the lifetime of the manager: a
/// failed write is logged and the session carries on, and the store is only
/// consulted again once the day changes or a new manager is built.
pub struct DailyTaskManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    daily_count: usize,
    current: Option<TaskSet>,
}

impl<S: KeyValueStore> DailyTaskManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, daily_count: usize) -> Self {
        Self {
            store,
            clock,
            rng: StdRng::from_entropy(),
            daily_count,
            current: None,
        }
    }

    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub async fn load(&mut self) -> TaskSet {
        let set = self.take_today().await;
        self.current = Some(set.clone());
        set
    }

    /// Flips `completed` on the task with `id`; unknown ids change nothing.
    pub async fn toggle_complete(&mut self, id: &str) -> Option<Task> {
        let mut set = self.take_today().await;
        let toggled = match set.tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => {
                task.completed = !task.completed;
                Some(task.clone())
            }
            None => {
                tracing::debug!(id, "toggle ignored; no such task");
                None
            }
        };
        if toggled.is_some() {
            persist(self.store.as_ref(), &set).await;
        }
        self.current = Some(set);
        toggled
    }

    pub async fn add_custom_task(&mut self, title: &str) -> Result<Task, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("task title is empty".to_string()));
        }

        let mut set = self.take_today().await;
        let result = if set.contains_key(title) {
            Err(AppError::DuplicateTask(format!(
                "\"{title}\" is already on today's list"
            )))
        } else {
            let task = Task::custom(title);
            set.tasks.push(task.clone());
            persist(self.store.as_ref(), &set).await;
            tracing::info!(id = %task.id, title, "custom task added");
            Ok(task)
        };
        self.current = Some(set);
        result
    }

    pub async fn delete_custom_task(&mut self, id: &str, prompt: &dyn Prompt) -> DeleteOutcome {
        let mut set = self.take_today().await;
        let outcome = match set.tasks.iter().position(|task| task.id == id) {
            None => DeleteOutcome::NotFound,
            Some(idx) if !set.tasks[idx].custom => DeleteOutcome::NotDeletable,
            Some(idx) => {
                let question = format!("Delete \"{}\"?", set.tasks[idx].title);
                if prompt.confirm("Delete Task", &question) {
                    let removed = set.tasks.remove(idx);
                    persist(self.store.as_ref(), &set).await;
                    tracing::info!(id = %removed.id, "custom task deleted");
                    DeleteOutcome::Deleted(removed)
                } else {
                    DeleteOutcome::Cancelled
                }
            }
        };
        self.current = Some(set);
        outcome
    }

    /// Current in-memory view; `None` until the set has been loaded.
    pub fn task_set(&self) -> Option<&TaskSet> {
        self.current.as_ref()
    }

    /// Looks a task up by id, then by exact title.
    pub async fn resolve(&mut self, key: &str) -> Option<Task> {
        let key = key.trim();
        self.load().await;
        let set = self.task_set()?;
        set.find(key)
            .or_else(|| set.tasks.iter().find(|task| task.title == key))
            .cloned()
    }

    /// `(completed, total)` for today's set.
    pub async fn summary(&mut self) -> (usize, usize) {
        let set = self.load().await;
        (set.completed_count(), set.tasks.len())
    }

    async fn take_today(&mut self) -> TaskSet {
        let today = self.clock.today();
        match self.current.take() {
            Some(set) if set.is_for(today) => set,
            Some(set) => {
                tracing::info!(stale = %set.date, "day rolled over; replacing task set");
                self.generate_and_store(today).await
            }
            None => self.fetch_or_generate(today).await,
        }
    }

    async fn fetch_or_generate(&mut self, today: NaiveDate) -> TaskSet {
        match self.store.get(DAILY_TASKS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<TaskSet>(&raw) {
                Ok(set) if set.is_for(today) => return set,
                Ok(set) => tracing::info!(stored = %set.date, "stored task set is stale"),
                Err(err) => tracing::warn!(error = %err, "stored task set is unreadable"),
            },
            Ok(None) => tracing::debug!("no stored task set"),
            Err(err) => tracing::warn!(error = %err, "failed to read task set"),
        }
        self.generate_and_store(today).await
    }

    async fn generate_and_store(&mut self, today: NaiveDate) -> TaskSet {
        let set = self.generate(today);
        persist(self.store.as_ref(), &set).await;
        set
    }

    fn generate(&mut self, today: NaiveDate) -> TaskSet {
        let mut pool = TASK_POOL;
        pool.shuffle(&mut self.rng);
        let tasks = pool
            .iter()
            .take(self.daily_count)
            .map(|title| Task::system(title))
            .collect();
        TaskSet {
            date: day_key(today),
            tasks,
        }
    }
}

async fn persist<S: KeyValueStore>(store: &S, set: &TaskSet) {
    let raw = match serde_json::to_string(set) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode task set");
            return;
        }
    };
    if let Err(err) = store.set(DAILY_TASKS_KEY, raw).await {
        tracing::warn!(error = %err, "failed to persist task set; keeping it in memory");
    }
}
