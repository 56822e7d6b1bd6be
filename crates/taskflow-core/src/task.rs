use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::datetime::parse_due_timestamp;

/// Stored ids are numbers for tasks created here; older data may carry
/// string ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum TaskId {
    Num(u64),
    Text(String),
}

impl TaskId {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            TaskId::Num(n) => Some(*n),
            TaskId::Text(_) => None,
        }
    }
}

impl From<u64> for TaskId {
    fn from(n: u64) -> Self {
        TaskId::Num(n)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId::Text(s.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Num(n) => write!(f, "{n}"),
            TaskId::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Calendar marker colour.
    pub fn color(self) -> &'static str {
        match self {
            Priority::Low => "#22c55e",
            Priority::Medium => "#eab308",
            Priority::High => "#ef4444",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low Priority",
            Priority::Medium => "Medium Priority",
            Priority::High => "High Priority",
        }
    }

    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::parse_loose(s).ok_or_else(|| anyhow!("unknown priority: {s}"))
    }
}

/// A stored task.
///
/// Fields that may be missing or malformed in persisted data are kept raw so
/// that a load/save cycle never loses them. Use [`Task::well_formed`] before
/// placing a task in any derived view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    #[serde(default, deserialize_with = "null_as_false")]
    pub completed: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

/// One element of the stored array. Elements that do not decode as a
/// [`Task`] are carried as raw JSON so they still count and are written
/// back unchanged.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StoredEntry {
    Task(Task),
    Raw(Value),
}

impl StoredEntry {
    pub fn from_value(value: Value) -> Self {
        match Task::deserialize(&value) {
            Ok(task) => StoredEntry::Task(task),
            Err(err) => {
                tracing::debug!(error = %err, "keeping undecodable entry as raw json");
                StoredEntry::Raw(value)
            }
        }
    }

    pub fn task(&self) -> Option<&Task> {
        match self {
            StoredEntry::Task(task) => Some(task),
            StoredEntry::Raw(_) => None,
        }
    }

    pub fn task_mut(&mut self) -> Option<&mut Task> {
        match self {
            StoredEntry::Task(task) => Some(task),
            StoredEntry::Raw(_) => None,
        }
    }

    /// Numeric id, read from the raw JSON when the entry did not decode.
    pub fn numeric_id(&self) -> Option<u64> {
        match self {
            StoredEntry::Task(task) => task.id.as_number(),
            StoredEntry::Raw(value) => value.get("id").and_then(Value::as_u64),
        }
    }

    /// Raw entries count as completed only for a literal `"completed": true`.
    pub fn is_completed(&self) -> bool {
        match self {
            StoredEntry::Task(task) => task.completed,
            StoredEntry::Raw(value) => value.get("completed") == Some(&Value::Bool(true)),
        }
    }
}

impl From<Task> for StoredEntry {
    fn from(task: Task) -> Self {
        StoredEntry::Task(task)
    }
}

/// Borrowed view of a task that has a title, a parseable due date and a
/// recognised priority.
#[derive(Debug, Clone, Copy)]
pub struct WellFormed<'a> {
    pub task: &'a Task,
    pub title: &'a str,
    pub due: DateTime<Utc>,
    pub priority: Priority,
}

impl Task {
    pub fn new(id: TaskId, title: String, due: String, priority: Priority) -> Self {
        Self {
            id,
            title: Some(title),
            description: Some(String::new()),
            due_date: Some(due),
            priority: Some(priority.as_str().to_string()),
            completed: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn title_text(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn priority_level(&self) -> Option<Priority> {
        self.priority.as_deref().and_then(Priority::parse_loose)
    }

    pub fn due(&self, tz: Tz) -> Option<DateTime<Utc>> {
        self.due_date
            .as_deref()
            .and_then(|raw| parse_due_timestamp(raw, tz))
    }

    pub fn well_formed(&self, tz: Tz) -> Option<WellFormed<'_>> {
        Some(WellFormed {
            task: self,
            title: self.title_text()?,
            due: self.due(tz)?,
            priority: self.priority_level()?,
        })
    }
}
