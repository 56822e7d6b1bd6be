use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::datetime::{compose_due, format_due_timestamp};
use crate::error::TaskError;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{Priority, StoredEntry, Task, TaskId};

/// What the task form submits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD`
    pub due_date: String,
    /// `HH:MM`; empty or absent means start of day.
    #[serde(default)]
    pub due_time: Option<String>,
    /// Defaults to medium.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Only honoured by update; `None` keeps the stored value.
    #[serde(default)]
    pub completed: Option<bool>,
}

struct Prepared {
    title: String,
    description: String,
    due: String,
    priority: Priority,
}

impl TaskInput {
    pub fn new(title: impl Into<String>, due_date: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            due_date: due_date.into(),
            ..Self::default()
        }
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.due_time = Some(time.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Prefill for editing an existing task. Submitting it unchanged through
    /// `update` leaves the task as it was.
    pub fn from_task(task: &Task, tz: Tz) -> Self {
        let (due_date, due_time) = match task.due(tz) {
            Some(due) => {
                let local = due.with_timezone(&tz);
                let time = (local.hour() != 0 || local.minute() != 0)
                    .then(|| local.format("%H:%M").to_string());
                (local.format("%Y-%m-%d").to_string(), time)
            }
            None => (String::new(), None),
        };

        Self {
            title: task.title_text().unwrap_or_default().to_string(),
            description: task.description_text().to_string(),
            due_date,
            due_time,
            priority: task.priority_level(),
            completed: None,
        }
    }

    fn prepare(&self, tz: Tz) -> Result<Prepared, TaskError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TaskError::validation("title", "must not be empty"));
        }
        if self.due_date.trim().is_empty() {
            return Err(TaskError::validation("dueDate", "must not be empty"));
        }

        let due = compose_due(&self.due_date, self.due_time.as_deref(), tz)
            .map_err(|err| TaskError::validation("dueDate", format!("{err:#}")))?;

        Ok(Prepared {
            title: title.to_string(),
            description: self.description.clone(),
            due: format_due_timestamp(due),
            priority: self.priority.unwrap_or_default(),
        })
    }
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Appends a new incomplete task and returns its id.
    #[instrument(skip(self, input, tz), fields(title = %input.title))]
    pub fn create(&mut self, input: &TaskInput, tz: Tz) -> Result<TaskId, TaskError> {
        let prepared = input.prepare(tz)?;
        let id = self.issue_id()?;

        self.commit(|entries| {
            let mut task = Task::new(id.clone(), prepared.title, prepared.due, prepared.priority);
            task.description = Some(prepared.description);
            entries.push(StoredEntry::Task(task));
            Ok(())
        })?;

        info!(id = %id, "task created");
        Ok(id)
    }

    /// Rewrites the editable fields in place. Position, id, unknown stored
    /// fields and (unless overridden) `completed` are kept.
    #[instrument(skip(self, input, tz))]
    pub fn update(&mut self, id: &TaskId, input: &TaskInput, tz: Tz) -> Result<(), TaskError> {
        let prepared = input.prepare(tz)?;

        self.commit(|entries| {
            let task = find_mut(entries, id)?;
            task.title = Some(prepared.title);
            task.description = Some(prepared.description);
            task.due_date = Some(prepared.due);
            task.priority = Some(prepared.priority.as_str().to_string());
            if let Some(completed) = input.completed {
                task.completed = completed;
            }
            Ok(())
        })?;

        info!(id = %id, "task updated");
        Ok(())
    }

    /// Flips completion and returns the new state. Unknown ids are an error.
    #[instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        let completed = self.commit(|entries| {
            let task = find_mut(entries, id)?;
            task.completed = !task.completed;
            Ok(task.completed)
        })?;

        info!(id = %id, completed, "task toggled");
        Ok(completed)
    }

    /// Removes the task. Unknown ids are a no-op returning `false`.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        let removed = self.commit(|entries| {
            let before = entries.len();
            entries.retain(|e| e.task().is_none_or(|t| &t.id != id));
            Ok(entries.len() != before)
        })?;

        info!(id = %id, removed, "task delete");
        Ok(removed)
    }
}

fn find_mut<'a>(entries: &'a mut [StoredEntry], id: &TaskId) -> Result<&'a mut Task, TaskError> {
    entries
        .iter_mut()
        .filter_map(StoredEntry::task_mut)
        .find(|t| &t.id == id)
        .ok_or_else(|| TaskError::NotFound(id.clone()))
}
