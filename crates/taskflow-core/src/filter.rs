use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};

use crate::datetime::is_overdue;
use crate::task::{
  Priority,
  Task,
  WellFormed
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed,
  Overdue
}

impl StatusFilter {
  pub const ALL: [StatusFilter; 4] = [
    StatusFilter::All,
    StatusFilter::Active,
    StatusFilter::Completed,
    StatusFilter::Overdue
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | StatusFilter::All => "all",
      | StatusFilter::Active => "active",
      | StatusFilter::Completed => {
        "completed"
      }
      | StatusFilter::Overdue => {
        "overdue"
      }
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | StatusFilter::All => "All Tasks",
      | StatusFilter::Active => "Active",
      | StatusFilter::Completed => {
        "Completed"
      }
      | StatusFilter::Overdue => {
        "Overdue"
      }
    }
  }

  fn matches(
    self,
    task: &WellFormed<'_>,
    now: DateTime<Utc>,
    tz: Tz
  ) -> bool {
    let completed = task.task.completed;
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Active => {
        !completed
      }
      | StatusFilter::Completed => {
        completed
      }
      | StatusFilter::Overdue => {
        is_overdue(
          task.due, completed, now, tz
        )
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(StatusFilter::All),
      | "active" => {
        Ok(StatusFilter::Active)
      }
      | "completed" => {
        Ok(StatusFilter::Completed)
      }
      | "overdue" => {
        Ok(StatusFilter::Overdue)
      }
      | _ => Err(anyhow!(
        "unknown status filter: {s}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum PriorityFilter {
  #[default]
  All,
  Only(Priority)
}

impl PriorityFilter {
  /// Sidebar order: "All" first, then
  /// high to low.
  pub fn options()
  -> impl Iterator<Item = PriorityFilter>
  {
    std::iter::once(PriorityFilter::All)
      .chain(
        Priority::ALL
          .into_iter()
          .map(PriorityFilter::Only)
      )
  }

  pub fn label(self) -> &'static str {
    match self {
      | PriorityFilter::All => "All",
      | PriorityFilter::Only(p) => {
        p.label()
      }
    }
  }

  /// Marker colour; `None` for "All".
  pub fn color(
    self
  ) -> Option<&'static str> {
    match self {
      | PriorityFilter::All => None,
      | PriorityFilter::Only(p) => {
        Some(p.color())
      }
    }
  }

  fn matches(
    self,
    priority: Priority
  ) -> bool {
    match self {
      | PriorityFilter::All => true,
      | PriorityFilter::Only(wanted) => {
        wanted == priority
      }
    }
  }
}

impl fmt::Display for PriorityFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | PriorityFilter::All => {
        f.write_str("all")
      }
      | PriorityFilter::Only(p) => {
        f.write_str(p.as_str())
      }
    }
  }
}

impl FromStr for PriorityFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(PriorityFilter::All);
    }
    Priority::parse_loose(s)
      .map(PriorityFilter::Only)
      .ok_or_else(|| {
        anyhow!(
          "unknown priority filter: {s}"
        )
      })
  }
}

/// Transient sidebar/header state.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FilterState {
  pub status:   StatusFilter,
  pub priority: PriorityFilter,
  pub search:   String
}

impl FilterState {
  pub fn matches(
    &self,
    task: &Task,
    now: DateTime<Utc>,
    tz: Tz
  ) -> bool {
    let Some(view) = task.well_formed(tz)
    else {
      trace!(id = %task.id, "skipping malformed task");
      return false;
    };

    self.status.matches(&view, now, tz)
      && self
        .priority
        .matches(view.priority)
      && search_matches(
        &view,
        &self.search.to_lowercase()
      )
  }
}

fn search_matches(
  view: &WellFormed<'_>,
  needle: &str
) -> bool {
  if needle.is_empty() {
    return true;
  }

  view
    .title
    .to_lowercase()
    .contains(needle)
    || view
      .task
      .description
      .as_deref()
      .is_some_and(|d| {
        d.to_lowercase()
          .contains(needle)
      })
}

/// Stable filter over the collection;
/// the result keeps collection order.
#[tracing::instrument(skip(
  tasks, now, tz
))]
pub fn filter_tasks<'a>(
  tasks: impl IntoIterator<
    Item = &'a Task
  >,
  state: &FilterState,
  now: DateTime<Utc>,
  tz: Tz
) -> Vec<&'a Task> {
  let mut total = 0_usize;
  let visible = tasks
    .into_iter()
    .inspect(|_| total += 1)
    .filter(|task| {
      state.matches(task, now, tz)
    })
    .collect::<Vec<_>>();

  debug!(
    total,
    visible = visible.len(),
    "filtered tasks"
  );
  visible
}
