use std::collections::BTreeMap;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::remote::{CompactTask, RemoteStore};
use crate::session::Session;
use crate::task::{Task, TaskDraft};

pub type TasksByDate = BTreeMap<NaiveDate, Vec<Task>>;

/// Hands out strictly increasing task ids for the session.
///
/// `next` becomes `None` once `u64::MAX` has been handed out or observed.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Option<u64>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: Some(1) }
    }
}

impl IdAllocator {
    /// An allocator whose first id is above `highest`.
    pub fn above(highest: Option<u64>) -> Self {
        let mut ids = Self::default();
        if let Some(id) = highest {
            ids.observe(id);
        }
        ids
    }

    pub fn allocate(&mut self) -> anyhow::Result<u64> {
        let id = self.next.ok_or_else(|| anyhow!("task id space exhausted"))?;
        self.next = id.checked_add(1);
        Ok(id)
    }

    /// Keeps future ids above one already in use.
    pub fn observe(&mut self, id: u64) {
        if let Some(next) = self.next
            && id >= next
        {
            self.next = id.checked_add(1);
        }
    }
}

/// Date-bucketed task cache in front of a remote backend.
///
/// A bucket is filled on first `load` and afterwards only replaced by a
/// successful `save`; there is no per-task update path.
#[derive(Debug)]
pub struct TaskStore<R> {
    remote: R,
    tasks_by_date: TasksByDate,
    ids: IdAllocator,
}

impl<R: RemoteStore> TaskStore<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            tasks_by_date: BTreeMap::new(),
            ids: IdAllocator::default(),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    pub fn tasks_by_date(&self) -> &TasksByDate {
        &self.tasks_by_date
    }

    pub fn cached(&self, date: NaiveDate) -> Option<&[Task]> {
        self.tasks_by_date.get(&date).map(Vec::as_slice)
    }

    #[tracing::instrument(skip(self, session), fields(date = %date))]
    pub fn load(&mut self, date: NaiveDate, session: &Session) -> anyhow::Result<Vec<Task>> {
        let Some(user_id) = session.user_id() else {
            debug!("no signed-in user; nothing to load");
            return Ok(vec![]);
        };

        if let Some(cached) = self.tasks_by_date.get(&date) {
            debug!(count = cached.len(), "bucket served from cache");
            return Ok(cached.clone());
        }

        let rows = self
            .remote
            .fetch_tasks(date, user_id)
            .with_context(|| format!("failed to fetch tasks for {date}"))?;
        let tasks = self.decode_rows(rows, date)?;

        debug!(count = tasks.len(), "bucket fetched from backend");
        self.tasks_by_date.insert(date, tasks.clone());
        Ok(tasks)
    }

    /// Loads every date in `dates` and returns their tasks in date order.
    #[tracing::instrument(skip(self, dates, session), fields(days = dates.len()))]
    pub fn load_range(
        &mut self,
        dates: &[NaiveDate],
        session: &Session,
    ) -> anyhow::Result<Vec<Task>> {
        let mut out = Vec::new();
        for date in dates {
            out.extend(self.load(*date, session)?);
        }
        Ok(out)
    }

    /// Replaces the whole bucket for `date`. An empty list deletes the
    /// backing row. The cache changes only after the backend accepts the
    /// write.
    #[tracing::instrument(skip(self, tasks, session), fields(date = %date, count = tasks.len()))]
    pub fn save(
        &mut self,
        tasks: Vec<Task>,
        date: NaiveDate,
        session: &Session,
    ) -> anyhow::Result<()> {
        let Some(user_id) = session.user_id() else {
            debug!("no signed-in user; save skipped");
            return Ok(());
        };

        if let Some(stray) = tasks.iter().find(|task| task.date != date) {
            return Err(anyhow!(
                "task {} belongs to {} and cannot be saved under {}",
                stray.id,
                stray.date,
                date
            ));
        }

        let rows: Vec<CompactTask> = tasks.iter().map(CompactTask::from_task).collect();
        self.remote
            .save_tasks(&rows, date, user_id)
            .with_context(|| format!("failed to save tasks for {date}"))?;

        for task in &tasks {
            self.ids.observe(task.id);
        }
        info!(count = tasks.len(), "saved bucket");
        self.tasks_by_date.insert(date, tasks);
        Ok(())
    }

    /// Appends a new task to `date`. Returns `None` when nobody is signed in.
    #[tracing::instrument(skip(self, draft, session), fields(date = %date))]
    pub fn add_task(
        &mut self,
        draft: TaskDraft,
        date: NaiveDate,
        session: &Session,
    ) -> anyhow::Result<Option<Task>> {
        if session.user_id().is_none() {
            return Ok(None);
        }

        let mut tasks = self.load(date, session)?;
        let task = draft.into_task(self.ids.allocate()?, date)?;
        tasks.push(task.clone());
        self.save(tasks, date, session)?;
        Ok(Some(task))
    }

    #[tracing::instrument(skip(self, session), fields(date = %date))]
    pub fn toggle_task(
        &mut self,
        id: u64,
        date: NaiveDate,
        session: &Session,
    ) -> anyhow::Result<Option<Task>> {
        if session.user_id().is_none() {
            return Ok(None);
        }

        let mut tasks = self.load(date, session)?;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(ValidationError::TaskNotFound { id, date })?;
        *task = task.toggled();
        let toggled = task.clone();

        self.save(tasks, date, session)?;
        Ok(Some(toggled))
    }

    #[tracing::instrument(skip(self, session), fields(date = %date))]
    pub fn delete_task(
        &mut self,
        id: u64,
        date: NaiveDate,
        session: &Session,
    ) -> anyhow::Result<Option<Task>> {
        if session.user_id().is_none() {
            return Ok(None);
        }

        let mut tasks = self.load(date, session)?;
        let idx = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(ValidationError::TaskNotFound { id, date })?;
        let removed = tasks.remove(idx);

        self.save(tasks, date, session)?;
        Ok(Some(removed))
    }

    /// Restarts id allocation above the highest id the backend has stored
    /// for the session's user.
    #[tracing::instrument(skip(self, session))]
    pub fn sync_ids(&mut self, session: &Session) -> anyhow::Result<()> {
        let highest = match session.user_id() {
            Some(user_id) => self
                .remote
                .highest_id(user_id)
                .with_context(|| format!("failed to read id high-water mark for {user_id}"))?,
            None => None,
        };
        debug!(?highest, "seeded id allocator");
        self.ids = IdAllocator::above(highest);
        Ok(())
    }

    pub fn clear(&mut self) {
        debug!(buckets = self.tasks_by_date.len(), "clearing task cache");
        self.tasks_by_date.clear();
    }

    fn decode_rows(&mut self, rows: Vec<CompactTask>, date: NaiveDate) -> anyhow::Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            let id = match row.n {
                Some(id) => {
                    self.ids.observe(id);
                    id
                }
                None => {
                    let id = self.ids.allocate()?;
                    warn!(row = idx, id, "row without persisted id; assigned a new one");
                    id
                }
            };
            let task = row
                .into_task(date, id)
                .with_context(|| format!("invalid task row {} on {date}", idx + 1))?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}
