use chrono::NaiveDate;
use tracing::info;

use crate::metrics::{MetricsSnapshot, TimeWindow, compute_metrics};
use crate::remote::RemoteStore;
use crate::session::{Session, User};
use crate::store::TaskStore;

/// Application state shared by every view: the session and the task cache.
///
/// Signing out clears the cache so a later user never sees stale buckets.
#[derive(Debug)]
pub struct Planner<R> {
    session: Session,
    store: TaskStore<R>,
}

impl<R: RemoteStore> Planner<R> {
    pub fn new(remote: R) -> Self {
        Self {
            session: Session::default(),
            store: TaskStore::new(remote),
        }
    }

    /// Signs `user` in and seeds id allocation from what the backend has
    /// already stored for them.
    pub fn initialize(&mut self, user: User) -> anyhow::Result<()> {
        info!(user = %user.id, "session initialized");
        self.store.clear();
        self.session.sign_in(user);
        self.store.sync_ids(&self.session)
    }

    pub fn sign_out(&mut self) -> anyhow::Result<()> {
        info!("session signed out");
        self.session.sign_out();
        self.store.clear();
        self.store.sync_ids(&self.session)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &TaskStore<R> {
        &self.store
    }

    /// Split borrow for store calls that also need the session.
    pub fn parts(&mut self) -> (&mut TaskStore<R>, &Session) {
        (&mut self.store, &self.session)
    }

    /// Loads every day of `window` and rolls up the cached buckets.
    #[tracing::instrument(skip(self))]
    pub fn metrics(
        &mut self,
        window: TimeWindow,
        today: NaiveDate,
    ) -> anyhow::Result<MetricsSnapshot> {
        let days = window.days(today);
        self.store.load_range(&days, &self.session)?;
        Ok(compute_metrics(self.store.tasks_by_date(), window, today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CompactTask, MemoryRemote};
    use crate::task::{Importance, TaskDraft};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date")
    }

    fn draft(text: &str) -> TaskDraft {
        TaskDraft {
            text: text.to_string(),
            start_time: "09:00".parse().expect("start"),
            end_time: "10:00".parse().expect("end"),
            importance: Importance::Important,
        }
    }

    #[test]
    fn sign_out_clears_cache() {
        let mut planner = Planner::new(MemoryRemote::new());
        planner.initialize(User::new("ana")).expect("initialize");

        let (store, session) = planner.parts();
        store.add_task(draft("plan"), today(), session).expect("add");
        assert_eq!(planner.store().tasks_by_date().len(), 1);

        planner.sign_out().expect("sign out");
        assert!(planner.store().tasks_by_date().is_empty());
        assert_eq!(planner.session().user_id(), None);

        let (store, session) = planner.parts();
        assert!(store.load(today(), session).expect("load").is_empty());
    }

    #[test]
    fn users_do_not_share_buckets() {
        let mut planner = Planner::new(MemoryRemote::new());
        planner.initialize(User::new("ana")).expect("initialize");
        let (store, session) = planner.parts();
        store.add_task(draft("ana's"), today(), session).expect("add");

        planner.initialize(User::new("bo")).expect("initialize");
        let (store, session) = planner.parts();
        assert!(store.load(today(), session).expect("load").is_empty());
    }

    #[test]
    fn initialize_continues_ids_from_other_dates() {
        let mut remote = MemoryRemote::new();
        let stored = CompactTask::from_task(&draft("old").into_task(41, today()).expect("valid"));
        remote.insert_row(today(), "ana", vec![stored]);

        let mut planner = Planner::new(remote);
        planner.initialize(User::new("ana")).expect("initialize");
        let (store, session) = planner.parts();
        let added = store
            .add_task(draft("new"), today().succ_opt().expect("tomorrow"), session)
            .expect("add")
            .expect("signed in");
        assert_eq!(added.id, 42);
    }

    #[test]
    fn initialize_fails_when_backend_is_down() {
        let mut remote = MemoryRemote::new();
        remote.set_unavailable(true);
        let mut planner = Planner::new(remote);
        assert!(planner.initialize(User::new("ana")).is_err());
    }

    #[test]
    fn metrics_load_the_window_first() {
        let mut planner = Planner::new(MemoryRemote::new());
        planner.initialize(User::new("ana")).expect("initialize");
        let (store, session) = planner.parts();
        let task = store
            .add_task(draft("plan"), today(), session)
            .expect("add")
            .expect("signed in");
        store.toggle_task(task.id, today(), session).expect("toggle");

        let snapshot = planner.metrics(TimeWindow::Week, today()).expect("metrics");
        assert_eq!(snapshot.total_tasks, 1);
        assert_eq!(snapshot.completion_rate, 100.0);
        assert_eq!(planner.store().tasks_by_date().len(), 8);
    }
}
