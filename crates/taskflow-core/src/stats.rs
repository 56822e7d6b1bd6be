use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::datetime::is_overdue;
use crate::filter::StatusFilter;
use crate::task::StoredEntry;

/// Counters shared by the sidebar and
/// the stat cards.
///
/// `total` and `in_progress` count every
/// stored entry, malformed ones
/// included. `overdue` only looks at
/// entries whose due date parses.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
  pub total:       usize,
  pub completed:   usize,
  pub in_progress: usize,
  pub overdue:     usize
}

impl TaskStats {
  #[tracing::instrument(skip_all)]
  pub fn collect(
    entries: &[StoredEntry],
    now: DateTime<Utc>,
    tz: Tz
  ) -> Self {
    let total = entries.len();
    let completed = entries
      .iter()
      .filter(|e| e.is_completed())
      .count();
    let overdue = entries
      .iter()
      .filter_map(StoredEntry::task)
      .filter_map(|t| {
        t.due(tz).map(|due| (t, due))
      })
      .filter(|(t, due)| {
        is_overdue(
          *due,
          t.completed,
          now,
          tz
        )
      })
      .count();

    let stats = Self {
      total,
      completed,
      in_progress: total - completed,
      overdue
    };
    tracing::debug!(?stats, "collected task stats");
    stats
  }

  /// Sidebar "Active" counter.
  pub fn active(&self) -> usize {
    self.in_progress
  }

  /// Sidebar counter next to `status`.
  pub fn count_for(
    &self,
    status: StatusFilter
  ) -> usize {
    match status {
      | StatusFilter::All => self.total,
      | StatusFilter::Active => {
        self.in_progress
      }
      | StatusFilter::Completed => {
        self.completed
      }
      | StatusFilter::Overdue => {
        self.overdue
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::*;
  use crate::task::{
    Priority,
    Task,
    TaskId
  };

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2024, 3, 5, 10, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn task(id: u64, due: &str) -> Task {
    Task::new(
      TaskId::Num(id),
      format!("task {id}"),
      due.to_string(),
      Priority::High
    )
  }

  #[test]
  fn malformed_entries_count_in_totals()
  {
    let mut no_priority =
      task(1, "2024-03-01");
    no_priority.priority = None;
    let mut no_due = task(2, "");
    no_due.due_date = None;
    let mut done = task(3, "2024-02-01");
    done.completed = true;
    let earlier_today =
      task(4, "2024-03-05T08:00");

    let stats = TaskStats::collect(
      &[
        no_priority.into(),
        no_due.into(),
        done.into(),
        earlier_today.into(),
        StoredEntry::Raw(
          serde_json::json!({
            "id": 1.5,
            "completed": true
          })
        )
      ],
      now(),
      chrono_tz::UTC
    );

    assert_eq!(
      stats,
      TaskStats {
        total:       5,
        completed:   2,
        in_progress: 3,
        overdue:     1
      }
    );
    assert_eq!(stats.active(), 3);
    assert_eq!(
      StatusFilter::ALL.map(|s| {
        stats.count_for(s)
      }),
      [5, 3, 2, 1]
    );
  }

  #[test]
  fn counts_always_add_up() {
    for size in 0..12_u64 {
      let tasks = (0..size)
        .map(|id| {
          let mut t = task(
            id,
            &format!(
              "2024-03-{:02}",
              id + 1
            )
          );
          t.completed = id % 3 == 0;
          StoredEntry::from(t)
        })
        .collect::<Vec<_>>();
      let stats = TaskStats::collect(
        &tasks,
        now(),
        chrono_tz::UTC
      );
      assert_eq!(
        stats.completed
          + stats.in_progress,
        stats.total
      );
      assert!(
        stats.overdue
          <= stats.in_progress
      );
    }
  }

  #[test]
  fn empty_collection() {
    assert_eq!(
      TaskStats::collect(
        &[],
        now(),
        chrono_tz::UTC
      ),
      TaskStats::default()
    );
  }
}
