use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::calendar::{CalendarCursor, CalendarEntry, DisplayPolicy, MonthGrid, day_tasks};
use crate::config::Config;
use crate::datetime::to_local_date;
use crate::error::TaskError;
use crate::filter::{FilterState, PriorityFilter, StatusFilter, filter_tasks};
use crate::mutator::TaskInput;
use crate::stats::TaskStats;
use crate::storage::KeyValueStore;
use crate::store::TaskStore;
use crate::task::{StoredEntry, Task, TaskId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Tasks,
    Calendar,
}

/// Sidebar status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRow {
    pub filter: StatusFilter,
    pub label: &'static str,
    pub count: usize,
    pub active: bool,
}

/// Sidebar priority row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityRow {
    pub filter: PriorityFilter,
    pub label: &'static str,
    pub color: Option<&'static str>,
    pub active: bool,
}

/// One user session: the task store plus the transient state the UI edits
/// (filters, search, displayed month, open day).
///
/// Every view is recomputed from the store on request.
#[derive(Debug)]
pub struct TaskBoard<S: KeyValueStore> {
    store: TaskStore<S>,
    tz: Tz,
    display: DisplayPolicy,
    filter: FilterState,
    cursor: CalendarCursor,
    view: ActiveView,
    selected_day: Option<NaiveDate>,
}

impl<S: KeyValueStore> TaskBoard<S> {
    #[instrument(skip(storage, cfg))]
    pub fn open(storage: S, cfg: &Config, now: DateTime<Utc>) -> Self {
        let tz = cfg.timezone();
        let store = TaskStore::open(storage, cfg.storage.key.clone());
        Self::with_store(store, tz, cfg.display_policy(), now)
    }

    pub fn with_store(store: TaskStore<S>, tz: Tz, display: DisplayPolicy, now: DateTime<Utc>) -> Self {
        Self {
            store,
            tz,
            display,
            filter: FilterState::default(),
            cursor: CalendarCursor::new(to_local_date(now, tz)),
            view: ActiveView::default(),
            selected_day: None,
        }
    }

    pub fn store(&self) -> &TaskStore<S> {
        &self.store
    }

    pub fn entries(&self) -> &[StoredEntry] {
        self.store.entries()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.store.tasks()
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn display_policy(&self) -> DisplayPolicy {
        self.display
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        debug!(%status, "status filter");
        self.filter.status = status;
    }

    pub fn set_priority_filter(&mut self, priority: PriorityFilter) {
        debug!(%priority, "priority filter");
        self.filter.priority = priority;
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.filter.search = term.into();
    }

    pub fn view(&self) -> ActiveView {
        self.view
    }

    pub fn set_view(&mut self, view: ActiveView) {
        self.view = view;
    }

    pub fn visible_tasks(&self, now: DateTime<Utc>) -> Vec<&Task> {
        filter_tasks(self.store.tasks(), &self.filter, now, self.tz)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> TaskStats {
        TaskStats::collect(self.store.entries(), now, self.tz)
    }

    pub fn status_rows(&self, now: DateTime<Utc>) -> Vec<StatusRow> {
        let stats = self.stats(now);
        StatusFilter::ALL
            .into_iter()
            .map(|filter| StatusRow {
                filter,
                label: filter.label(),
                count: stats.count_for(filter),
                active: self.filter.status == filter,
            })
            .collect()
    }

    pub fn priority_rows(&self) -> Vec<PriorityRow> {
        PriorityFilter::options()
            .map(|filter| PriorityRow {
                filter,
                label: filter.label(),
                color: filter.color(),
                active: self.filter.priority == filter,
            })
            .collect()
    }

    pub fn cursor(&self) -> CalendarCursor {
        self.cursor
    }

    pub fn prev_month(&mut self) {
        self.cursor.prev_month();
    }

    pub fn next_month(&mut self) {
        self.cursor.next_month();
    }

    /// Grid for the displayed month; the calendar ignores the list filters.
    pub fn calendar(&self, now: DateTime<Utc>) -> MonthGrid {
        MonthGrid::build(
            self.cursor.focus(),
            self.store.tasks(),
            to_local_date(now, self.tz),
            self.tz,
        )
    }

    pub fn open_day(&mut self, day: NaiveDate) {
        self.selected_day = Some(day);
    }

    pub fn close_day(&mut self) {
        self.selected_day = None;
    }

    pub fn selected_day(&self) -> Option<NaiveDate> {
        self.selected_day
    }

    /// Entries for the open day-detail list; empty when no day is open.
    pub fn selected_day_tasks(&self) -> Vec<CalendarEntry> {
        self.selected_day
            .map(|day| day_tasks(self.store.tasks(), day, self.tz))
            .unwrap_or_default()
    }

    /// Prefilled form for editing `id`.
    pub fn edit_form(&self, id: &TaskId) -> Option<TaskInput> {
        self.store.get(id).map(|task| TaskInput::from_task(task, self.tz))
    }

    pub fn create(&mut self, input: &TaskInput) -> Result<TaskId, TaskError> {
        self.store.create(input, self.tz)
    }

    pub fn update(&mut self, id: &TaskId, input: &TaskInput) -> Result<(), TaskError> {
        self.store.update(id, input, self.tz)
    }

    pub fn toggle_complete(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        self.store.toggle_complete(id)
    }

    pub fn delete(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        self.store.delete(id)
    }
}
