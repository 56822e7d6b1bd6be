use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::to_local_date;
use crate::task::{
  Priority,
  Task,
  TaskId
};

pub const WEEKDAY_LABELS: [&str; 7] = [
  "Mon", "Tue", "Wed", "Thu", "Fri",
  "Sat", "Sun"
];

const WEEK_START: Weekday = Weekday::Mon;

fn default_desktop_preview() -> usize {
  2
}

fn default_compact_preview() -> usize {
  3
}

/// How many entries a day cell shows
/// before collapsing the rest into
/// "+N more".
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct DisplayPolicy {
  #[serde(
    default = "default_desktop_preview"
  )]
  pub desktop_preview: usize,
  #[serde(
    default = "default_compact_preview"
  )]
  pub compact_preview: usize
}

impl Default for DisplayPolicy {
  fn default() -> Self {
    Self {
      desktop_preview:
        default_desktop_preview(),
      compact_preview:
        default_compact_preview()
    }
  }
}

impl DisplayPolicy {
  pub(crate) fn sanitize(&mut self) {
    if self.desktop_preview == 0 {
      self.desktop_preview =
        default_desktop_preview();
    }
    if self.compact_preview == 0 {
      self.compact_preview =
        default_compact_preview();
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct CalendarEntry {
  pub id:        TaskId,
  pub title:     String,
  pub due:       DateTime<Utc>,
  pub priority:  Priority,
  pub color:     &'static str,
  pub completed: bool
}

impl CalendarEntry {
  pub fn time_label(&self, tz: Tz) -> String {
    time_label(self.due, tz)
  }
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct CalendarDay {
  pub date:     NaiveDate,
  pub in_month: bool,
  pub is_today: bool,
  pub entries:  Vec<CalendarEntry>
}

impl CalendarDay {
  pub fn total(&self) -> usize {
    self.entries.len()
  }

  pub fn shown(
    &self,
    cap: usize
  ) -> &[CalendarEntry] {
    &self.entries
      [..cap.min(self.entries.len())]
  }

  pub fn overflow(
    &self,
    cap: usize
  ) -> usize {
    self.total() - self.shown(cap).len()
  }

  pub fn overflow_label(
    &self,
    cap: usize
  ) -> Option<String> {
    match self.overflow(cap) {
      | 0 => None,
      | n => Some(format!("+{n} more"))
    }
  }

  /// Priority dots for the compact
  /// layout.
  pub fn dot_colors(
    &self,
    cap: usize
  ) -> Vec<&'static str> {
    self
      .shown(cap)
      .iter()
      .map(|entry| entry.color)
      .collect()
  }
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct CalendarWeek {
  pub days: Vec<CalendarDay>
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
pub struct MonthGrid {
  pub month: NaiveDate,
  pub weeks: Vec<CalendarWeek>
}

impl MonthGrid {
  /// Lays out `month` (any date inside
  /// it) as Monday-first weeks and
  /// buckets well-formed tasks by local
  /// due day.
  #[tracing::instrument(skip(
    tasks, tz
  ))]
  pub fn build<'a>(
    month: NaiveDate,
    tasks: impl IntoIterator<
      Item = &'a Task
    >,
    today: NaiveDate,
    tz: Tz
  ) -> Self {
    let first = first_day_of_month(
      month.year(),
      month.month()
    );
    let last = last_day_of_month(
      month.year(),
      month.month()
    );
    let grid_start = start_of_week(first);
    let grid_end = add_days(
      start_of_week(last),
      6
    );

    let mut buckets = collect_entries(
      tasks, grid_start, grid_end, tz
    );

    let mut weeks = Vec::new();
    let mut day = grid_start;
    while day <= grid_end {
      let days = (0..7)
        .map(|offset| {
          let date =
            add_days(day, offset);
          CalendarDay {
            date,
            in_month: date.month()
              == first.month()
              && date.year()
                == first.year(),
            is_today: date == today,
            entries: buckets
              .remove(&date)
              .unwrap_or_default()
          }
        })
        .collect();
      weeks.push(CalendarWeek {
        days
      });
      day = add_days(day, 7);
    }

    tracing::debug!(
      month = %first.format("%Y-%m"),
      weeks = weeks.len(),
      "built month grid"
    );
    Self {
      month: first,
      weeks
    }
  }

  pub fn title(&self) -> String {
    month_title(self.month)
  }

  pub fn days(
    &self
  ) -> impl Iterator<Item = &CalendarDay>
  {
    self
      .weeks
      .iter()
      .flat_map(|week| week.days.iter())
  }

  pub fn day(
    &self,
    date: NaiveDate
  ) -> Option<&CalendarDay> {
    self.days().find(|d| d.date == date)
  }
}

/// Entries due on `day`, in cell order.
/// Backs the day-detail list.
pub fn day_tasks<'a>(
  tasks: impl IntoIterator<
    Item = &'a Task
  >,
  day: NaiveDate,
  tz: Tz
) -> Vec<CalendarEntry> {
  collect_entries(tasks, day, day, tz)
    .remove(&day)
    .unwrap_or_default()
}

fn collect_entries<'a>(
  tasks: impl IntoIterator<
    Item = &'a Task
  >,
  from: NaiveDate,
  to: NaiveDate,
  tz: Tz
) -> BTreeMap<NaiveDate, Vec<CalendarEntry>>
{
  let mut buckets =
    BTreeMap::<NaiveDate, Vec<_>>::new();

  for view in tasks
    .into_iter()
    .filter_map(|t| t.well_formed(tz))
  {
    let local = to_local_date(view.due, tz);
    if local < from || local > to {
      continue;
    }
    buckets.entry(local).or_default().push(
      CalendarEntry {
        id:        view.task.id.clone(),
        title:     view.title.to_string(),
        due:       view.due,
        priority:  view.priority,
        color:     view.priority.color(),
        completed: view.task.completed
      }
    );
  }

  // stable: equal instants keep collection order after priority
  for entries in buckets.values_mut() {
    entries.sort_by(|a, b| {
      a.due
        .cmp(&b.due)
        .then(b.priority.cmp(&a.priority))
    });
  }

  buckets
}

/// Displayed month, navigable one month
/// at a time.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct CalendarCursor {
  focus: NaiveDate
}

impl CalendarCursor {
  pub fn new(focus: NaiveDate) -> Self {
    Self {
      focus
    }
  }

  pub fn focus(&self) -> NaiveDate {
    self.focus
  }

  pub fn prev_month(&mut self) {
    self.focus =
      shift_months(self.focus, -1);
  }

  pub fn next_month(&mut self) {
    self.focus =
      shift_months(self.focus, 1);
  }

  pub fn title(&self) -> String {
    month_title(self.focus)
  }
}

/// Month arithmetic that keeps the day
/// of month, clamped to the target
/// month's length.
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

fn start_of_week(
  day: NaiveDate
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = WEEK_START
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

/// `March 2024`
pub fn month_title(
  date: NaiveDate
) -> String {
  date.format("%B %Y").to_string()
}

/// `March 10, 2024`
pub fn day_title(
  date: NaiveDate
) -> String {
  date.format("%B %-d, %Y").to_string()
}

/// `8:00 AM`
pub fn time_label(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%-I:%M %p")
    .to_string()
}
