use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::datetime::format_date_key;
use crate::error::ValidationError;
use crate::task::{ClockTime, Importance, Task, validate_time_range};

/// Reduced row encoding for one task inside a persisted date bucket.
///
/// The bucket's date is not stored per row; it is reattached from the request
/// date on decode. `n` is absent on rows written before ids were persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactTask {
    pub t: String,
    pub s: ClockTime,
    pub e: ClockTime,
    #[serde(default)]
    pub c: bool,
    #[serde(default)]
    pub i: Importance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,
}

impl CompactTask {
    pub fn from_task(task: &Task) -> Self {
        Self {
            t: task.text.clone(),
            s: task.start_time,
            e: task.end_time,
            c: task.completed,
            i: task.importance,
            n: Some(task.id),
        }
    }

    pub fn into_task(self, date: NaiveDate, id: u64) -> Result<Task, ValidationError> {
        validate_time_range(self.s, self.e)?;
        Ok(Task {
            id,
            text: self.t,
            start_time: self.s,
            end_time: self.e,
            date,
            completed: self.c,
            importance: self.i,
        })
    }
}

/// Backend holding one row of compact tasks per (user, date).
pub trait RemoteStore {
    fn fetch_tasks(&self, date: NaiveDate, user_id: &str) -> anyhow::Result<Vec<CompactTask>>;

    /// Replaces the row for `date`. An empty slice deletes the row.
    fn save_tasks(
        &mut self,
        tasks: &[CompactTask],
        date: NaiveDate,
        user_id: &str,
    ) -> anyhow::Result<()>;

    /// The highest task id ever saved for `user_id`, on any date. Deleting a
    /// task never lowers it.
    fn highest_id(&self, user_id: &str) -> anyhow::Result<Option<u64>>;
}

fn highest_row_id<'a>(rows: impl IntoIterator<Item = &'a CompactTask>) -> Option<u64> {
    rows.into_iter().filter_map(|row| row.n).max()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DateRow {
    data: Vec<CompactTask>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserDocument {
    #[serde(default)]
    rows: BTreeMap<String, DateRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    highest_id: Option<u64>,
}

/// Local backend: one JSON document per user under `<data>/users/`.
#[derive(Debug)]
pub struct FileRemote {
    pub users_dir: PathBuf,
}

impl FileRemote {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let users_dir = data_dir.join("users");
        fs::create_dir_all(&users_dir)
            .with_context(|| format!("failed to create {}", users_dir.display()))?;

        info!(users_dir = %users_dir.display(), "opened file backend");
        Ok(Self { users_dir })
    }

    pub fn user_path(&self, user_id: &str) -> PathBuf {
        self.users_dir.join(format!("{}.json", sanitize_user_id(user_id)))
    }

    fn load_document(&self, user_id: &str) -> anyhow::Result<UserDocument> {
        let path = self.user_path(user_id);
        if !path.exists() {
            debug!(file = %path.display(), "no document for user yet");
            return Ok(UserDocument::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(UserDocument::default());
        }
        serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
    }

    fn save_document(&self, user_id: &str, doc: &UserDocument) -> anyhow::Result<()> {
        let path = self.user_path(user_id);
        debug!(file = %path.display(), rows = doc.rows.len(), "saving user document atomically");

        let mut temp = NamedTempFile::new_in(&self.users_dir)?;
        serde_json::to_writer_pretty(&mut temp, doc)?;
        writeln!(temp)?;
        temp.flush()?;

        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

impl RemoteStore for FileRemote {
    #[tracing::instrument(skip(self), fields(date = %date))]
    fn fetch_tasks(&self, date: NaiveDate, user_id: &str) -> anyhow::Result<Vec<CompactTask>> {
        let doc = self.load_document(user_id)?;
        let rows = doc
            .rows
            .get(&format_date_key(date))
            .map(|row| row.data.clone())
            .unwrap_or_default();
        debug!(count = rows.len(), "fetched compact tasks");
        Ok(rows)
    }

    #[tracing::instrument(skip(self, tasks), fields(date = %date, count = tasks.len()))]
    fn save_tasks(
        &mut self,
        tasks: &[CompactTask],
        date: NaiveDate,
        user_id: &str,
    ) -> anyhow::Result<()> {
        let mut doc = self.load_document(user_id)?;
        doc.highest_id = doc.highest_id.max(highest_row_id(tasks));
        let key = format_date_key(date);
        if tasks.is_empty() {
            doc.rows.remove(&key);
            debug!("deleted date row");
        } else {
            doc.rows.insert(
                key,
                DateRow {
                    data: tasks.to_vec(),
                    updated_at: Utc::now(),
                },
            );
        }
        self.save_document(user_id, &doc)
    }

    #[tracing::instrument(skip(self))]
    fn highest_id(&self, user_id: &str) -> anyhow::Result<Option<u64>> {
        let doc = self.load_document(user_id)?;
        let from_rows = highest_row_id(doc.rows.values().flat_map(|row| row.data.iter()));
        Ok(doc.highest_id.max(from_rows))
    }
}

/// In-process backend, used by tests and as a scratch store.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    rows: BTreeMap<(String, NaiveDate), Vec<CompactTask>>,
    highest_ids: BTreeMap<String, u64>,
    unavailable: bool,
    fetch_calls: Cell<usize>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails as if the backend were unreachable.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }

    pub fn has_row(&self, date: NaiveDate, user_id: &str) -> bool {
        self.rows.contains_key(&(user_id.to_string(), date))
    }

    pub fn insert_row(&mut self, date: NaiveDate, user_id: &str, tasks: Vec<CompactTask>) {
        self.rows.insert((user_id.to_string(), date), tasks);
    }
}

impl RemoteStore for MemoryRemote {
    fn fetch_tasks(&self, date: NaiveDate, user_id: &str) -> anyhow::Result<Vec<CompactTask>> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        if self.unavailable {
            return Err(anyhow!("backend unavailable"));
        }
        Ok(self
            .rows
            .get(&(user_id.to_string(), date))
            .cloned()
            .unwrap_or_default())
    }

    fn save_tasks(
        &mut self,
        tasks: &[CompactTask],
        date: NaiveDate,
        user_id: &str,
    ) -> anyhow::Result<()> {
        if self.unavailable {
            return Err(anyhow!("backend unavailable"));
        }
        if let Some(id) = highest_row_id(tasks) {
            let highest = self.highest_ids.entry(user_id.to_string()).or_insert(id);
            *highest = (*highest).max(id);
        }
        let key = (user_id.to_string(), date);
        if tasks.is_empty() {
            self.rows.remove(&key);
        } else {
            self.rows.insert(key, tasks.to_vec());
        }
        Ok(())
    }

    fn highest_id(&self, user_id: &str) -> anyhow::Result<Option<u64>> {
        if self.unavailable {
            return Err(anyhow!("backend unavailable"));
        }
        let from_rows = highest_row_id(
            self.rows
                .iter()
                .filter(|((owner, _), _)| owner == user_id)
                .flat_map(|(_, rows)| rows.iter()),
        );
        Ok(self.highest_ids.get(user_id).copied().max(from_rows))
    }
}

fn sanitize_user_id(user_id: &str) -> String {
    user_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
