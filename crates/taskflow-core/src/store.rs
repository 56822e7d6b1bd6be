use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::storage::KeyValueStore;
use crate::task::{StoredEntry, Task, TaskId};

pub const DEFAULT_STORAGE_KEY: &str = "tasks";

/// Sole owner of the task collection.
///
/// Reads happen once at [`TaskStore::open`]; every change that alters the
/// collection is written back in full before the call returns.
#[derive(Debug)]
pub struct TaskStore<S: KeyValueStore> {
    storage: S,
    key: String,
    entries: Vec<StoredEntry>,
    version: u64,
    /// Highest id handed out this session, so a deleted id is not reissued.
    issued: u64,
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Never fails: unreadable or unparseable data yields an empty collection.
    #[tracing::instrument(skip(storage, key))]
    pub fn open(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let entries = match load_entries(&storage, &key) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(key = %key, error = ?err, "stored tasks unreadable; starting empty");
                Vec::new()
            }
        };

        info!(key = %key, count = entries.len(), "opened task store");
        Self {
            storage,
            key,
            entries,
            version: 0,
            issued: 0,
        }
    }

    /// Every stored element in collection order, undecodable ones included.
    pub fn entries(&self) -> &[StoredEntry] {
        &self.entries
    }

    /// Decoded tasks in collection order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.entries.iter().filter_map(StoredEntry::task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every committed change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks().find(|t| &t.id == id)
    }

    /// One past the highest numeric id stored (raw entries included) or
    /// issued this session.
    pub fn next_id(&self) -> Result<TaskId, TaskError> {
        let highest = self
            .entries
            .iter()
            .filter_map(StoredEntry::numeric_id)
            .max()
            .unwrap_or(0)
            .max(self.issued);
        highest
            .checked_add(1)
            .map(TaskId::Num)
            .ok_or(TaskError::IdsExhausted)
    }

    pub(crate) fn issue_id(&mut self) -> Result<TaskId, TaskError> {
        let id = self.next_id()?;
        if let Some(n) = id.as_number() {
            self.issued = n;
        }
        Ok(id)
    }

    /// Applies `change` and persists the result. If `change` errors or the
    /// write fails, the collection is restored and nothing is visible.
    pub(crate) fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut Vec<StoredEntry>) -> Result<T, TaskError>,
    ) -> Result<T, TaskError> {
        let before = self.entries.clone();

        let out = match change(&mut self.entries) {
            Ok(out) => out,
            Err(err) => {
                self.entries = before;
                return Err(err);
            }
        };

        if self.entries == before {
            debug!("no change to persist");
            return Ok(out);
        }

        if let Err(err) = self.persist() {
            self.entries = before;
            return Err(TaskError::Storage(err));
        }

        self.version += 1;
        Ok(out)
    }

    #[tracing::instrument(skip(self), fields(key = %self.key, count = self.entries.len()))]
    fn persist(&mut self) -> anyhow::Result<()> {
        let encoded = serde_json::to_string(&self.entries).context("failed to encode tasks")?;
        self.storage
            .write(&self.key, &encoded)
            .with_context(|| format!("failed to write key {}", self.key))
    }
}

/// Only a stored value that is not a JSON array fails; a bad element is kept
/// raw instead of sinking the rest.
fn load_entries<S: KeyValueStore>(storage: &S, key: &str) -> anyhow::Result<Vec<StoredEntry>> {
    let Some(raw) = storage.read(key)? else {
        debug!(key, "no stored tasks");
        return Ok(Vec::new());
    };
    if raw.trim().is_empty() || raw.trim() == "null" {
        return Ok(Vec::new());
    }

    let values: Vec<Value> =
        serde_json::from_str(&raw).with_context(|| format!("failed parsing stored key {key}"))?;
    let entries = values
        .into_iter()
        .map(StoredEntry::from_value)
        .collect::<Vec<_>>();

    let raw_count = entries.iter().filter(|e| e.task().is_none()).count();
    if raw_count > 0 {
        warn!(key, raw_count, "kept undecodable task entries as stored");
    }
    debug!(count = entries.len(), "decoded stored tasks");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::task::Priority;

    #[derive(Debug, Default)]
    struct ReadOnlyStorage;

    impl KeyValueStore for ReadOnlyStorage {
        fn read(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn write(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn sample(id: u64) -> Task {
        Task::new(
            TaskId::Num(id),
            format!("task {id}"),
            "2024-03-10T08:00:00.000Z".to_string(),
            Priority::Low,
        )
    }

    #[test]
    fn absent_key_is_empty() {
        let store = TaskStore::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY);
        assert!(store.is_empty());
        assert_eq!(store.next_id().expect("id"), TaskId::Num(1));
    }

    #[test]
    fn corrupt_data_degrades_to_empty() {
        let storage = MemoryStorage::with_entry(DEFAULT_STORAGE_KEY, "{not json");
        let store = TaskStore::open(storage, DEFAULT_STORAGE_KEY);
        assert!(store.is_empty());
    }

    #[test]
    fn bad_elements_are_kept_next_to_good_ones() {
        let storage = MemoryStorage::with_entry(
            DEFAULT_STORAGE_KEY,
            r#"[
                {"id": 1, "title": "Valid", "dueDate": "2024-03-10T08:00:00.000Z", "priority": "low", "completed": false},
                {"id": "abc", "title": "Legacy", "completed": false},
                {"id": 3, "title": "Nulls", "completed": null},
                {"id": 4, "title": ["not", "text"], "completed": true},
                17
            ]"#,
        );
        let mut store = TaskStore::open(storage, DEFAULT_STORAGE_KEY);

        assert_eq!(store.len(), 5);
        assert_eq!(store.tasks().count(), 3);
        assert!(store.get(&TaskId::from("abc")).is_some());
        assert_eq!(store.get(&TaskId::Num(3)).map(|t| t.completed), Some(false));

        store
            .commit(|entries| {
                entries.push(sample(5).into());
                Ok(())
            })
            .expect("commit");

        let stored = store
            .storage()
            .read(DEFAULT_STORAGE_KEY)
            .expect("read")
            .expect("stored value");
        let values: Vec<Value> = serde_json::from_str(&stored).expect("stored json");
        assert_eq!(values.len(), 6);
        assert_eq!(values[1]["id"], "abc");
        assert_eq!(values[3]["title"], serde_json::json!(["not", "text"]));
        assert_eq!(values[4], 17);
    }

    #[test]
    fn next_id_refuses_to_overflow() {
        let storage = MemoryStorage::with_entry(
            DEFAULT_STORAGE_KEY,
            r#"[{"id": 18446744073709551615, "title": "Last", "completed": false}]"#,
        );
        let store = TaskStore::open(storage, DEFAULT_STORAGE_KEY);

        assert!(matches!(store.next_id(), Err(TaskError::IdsExhausted)));
    }

    #[test]
    fn issued_ids_are_not_reused_after_delete() {
        let mut store = TaskStore::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY);
        let first = store.issue_id().expect("id");
        let second = store.issue_id().expect("id");
        store
            .commit(|entries| {
                entries.push(sample(1).into());
                entries.push(sample(2).into());
                Ok(())
            })
            .expect("commit");
        store
            .commit(|entries| {
                entries.retain(|e| e.task().is_none_or(|t| t.id != second));
                Ok(())
            })
            .expect("commit");

        assert_eq!(first, TaskId::Num(1));
        assert_eq!(store.next_id().expect("id"), TaskId::Num(3));
    }

    #[test]
    fn commit_persists_and_bumps_version() {
        let mut store = TaskStore::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY);
        store
            .commit(|tasks| {
                tasks.push(sample(7).into());
                Ok(())
            })
            .expect("commit");

        assert_eq!(store.version(), 1);
        assert_eq!(store.next_id().expect("id"), TaskId::Num(8));

        let reopened = TaskStore::open(store.into_storage(), DEFAULT_STORAGE_KEY);
        assert_eq!(reopened.tasks().cloned().collect::<Vec<_>>(), vec![sample(7)]);
    }

    #[test]
    fn unchanged_collection_is_not_written() {
        let mut store = TaskStore::open(ReadOnlyStorage, DEFAULT_STORAGE_KEY);
        store.commit(|_| Ok(())).expect("no-op commit");
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn failed_write_rolls_back() {
        let mut store = TaskStore::open(ReadOnlyStorage, DEFAULT_STORAGE_KEY);
        let err = store
            .commit(|tasks| {
                tasks.push(sample(1).into());
                Ok(())
            })
            .expect_err("write should fail");

        assert!(matches!(err, TaskError::Storage(_)));
        assert!(err.to_string().contains("quota exceeded"));
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn failed_change_rolls_back() {
        let mut store = TaskStore::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY);
        let result: Result<(), _> = store.commit(|tasks| {
            tasks.push(sample(1).into());
            Err(TaskError::NotFound(TaskId::Num(9)))
        });

        assert!(result.is_err());
        assert!(store.is_empty());
    }
}
