//! Per-session state and run supersession.
//!
//! Each session has at most one active run. Starting a run clears the session's
//! state and supersedes whatever run was in flight; the superseded run notices at
//! its next checkpoint, or immediately if it is awaiting a guarded future.
//! Results are only committed by the run that is still active.
//!
//! Sessions idle for longer than the configured TTL are evicted by a background sweep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::checklist::ChecklistItem;
use crate::analysis::models::AnalysisReport;
use crate::errors::PipelineError;

/// What a session currently holds. Cleared wholesale at the start of every run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub document_text: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub report: Option<AnalysisReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub active_run: Option<Uuid>,
    #[serde(flatten)]
    pub state: SessionState,
}

struct Session {
    created_at: DateTime<Utc>,
    last_touched: Instant,
    state: SessionState,
    active: watch::Sender<Option<Uuid>>,
}

impl Session {
    fn active_run(&self) -> Option<Uuid> {
        *self.active.borrow()
    }

    fn touch(&mut self) {
        self.last_touched = Instant::now();
    }
}

/// Handle for one run, passed into every pipeline stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    session_id: Uuid,
    run_id: Uuid,
    active: watch::Receiver<Option<Uuid>>,
}

impl RunContext {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_current(&self) -> bool {
        *self.active.borrow() == Some(self.run_id)
    }

    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(PipelineError::Superseded)
        }
    }

    /// Drives `fut` unless the run is superseded first, in which case `fut` is dropped.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, PipelineError> {
        self.checkpoint()?;
        let mut active = self.active.clone();
        tokio::select! {
            out = fut => Ok(out),
            _ = wait_until_superseded(&mut active, self.run_id) => Err(PipelineError::Superseded),
        }
    }
}

async fn wait_until_superseded(active: &mut watch::Receiver<Option<Uuid>>, run_id: Uuid) {
    loop {
        if *active.borrow_and_update() != Some(run_id) {
            return;
        }
        // Sender gone: the session was deleted.
        if active.changed().await.is_err() {
            return;
        }
    }
}

/// In-memory session registry shared by all handlers.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Uuid {
        let session_id = Uuid::new_v4();
        let (active, _) = watch::channel(None);
        self.sessions.insert(
            session_id,
            Session {
                created_at: Utc::now(),
                last_touched: Instant::now(),
                state: SessionState::default(),
                active,
            },
        );
        debug!("Created session {session_id}");
        session_id
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.sessions.contains_key(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn remove(&self, session_id: Uuid) -> bool {
        match self.sessions.remove(&session_id) {
            Some((_, session)) => {
                session.active.send_replace(None);
                true
            }
            None => false,
        }
    }

    /// Starts a new run: clears state and supersedes any in-flight run.
    pub fn begin_run(&self, session_id: Uuid) -> Option<RunContext> {
        let mut session = self.sessions.get_mut(&session_id)?;
        let run_id = Uuid::new_v4();
        session.touch();
        if let Some(previous) = session.active.send_replace(Some(run_id)) {
            info!("Run {previous} superseded by {run_id} in session {session_id}");
        }
        session.state = SessionState::default();
        Some(RunContext {
            session_id,
            run_id,
            active: session.active.subscribe(),
        })
    }

    /// Stores intermediate results of the active run. Ignored for stale runs.
    pub fn record_prepared(
        &self,
        ctx: &RunContext,
        document_text: &str,
        checklist: &[ChecklistItem],
    ) -> Result<(), PipelineError> {
        let mut session = self.current_session(ctx)?;
        session.state.document_text = Some(document_text.to_string());
        session.state.checklist = checklist.to_vec();
        Ok(())
    }

    /// Replaces the session's state with the final report if `ctx` is still active.
    pub fn commit(&self, ctx: &RunContext, report: AnalysisReport) -> Result<(), PipelineError> {
        let mut session = self.current_session(ctx)?;
        session.state = SessionState {
            document_text: None,
            checklist: report.checklist.clone(),
            report: Some(report),
        };
        session.active.send_replace(None);
        Ok(())
    }

    /// Discards everything the failing run produced. A stale run cannot touch the
    /// state of the run that replaced it.
    pub fn fail(&self, ctx: &RunContext) {
        if let Ok(mut session) = self.current_session(ctx) {
            session.state = SessionState::default();
            session.active.send_replace(None);
        }
    }

    /// Supersedes the active run, if any, and resets state.
    /// `None` when the session does not exist, otherwise whether a run was cancelled.
    pub fn cancel(&self, session_id: Uuid) -> Option<bool> {
        let mut session = self.sessions.get_mut(&session_id)?;
        session.touch();
        let cancelled = session.active.send_replace(None);
        if let Some(run_id) = cancelled {
            info!("Cancelled run {run_id} in session {session_id}");
            session.state = SessionState::default();
        }
        Some(cancelled.is_some())
    }

    pub fn snapshot(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let mut session = self.sessions.get_mut(&session_id)?;
        session.touch();
        Some(SessionSnapshot {
            session_id,
            created_at: session.created_at,
            active_run: session.active_run(),
            state: session.state.clone(),
        })
    }

    /// Drops sessions untouched for longer than `ttl`. Sessions with a run in
    /// flight are kept. Returns how many were evicted.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|session_id, session| {
            let keep = session.active_run().is_some()
                || now.duration_since(session.last_touched) <= ttl;
            if !keep {
                debug!("Evicting idle session {session_id}");
            }
            keep
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Runs `evict_idle` every `every` until the task is aborted.
    pub fn spawn_idle_sweeper(self: Arc<Self>, ttl: Duration, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle(ttl);
                if evicted > 0 {
                    info!("Evicted {evicted} idle sessions, {} remain", self.len());
                }
            }
        })
    }

    fn current_session(
        &self,
        ctx: &RunContext,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, Session>, PipelineError> {
        let mut session = self
            .sessions
            .get_mut(&ctx.session_id)
            .ok_or(PipelineError::Superseded)?;
        if session.active_run() != Some(ctx.run_id) {
            return Err(PipelineError::Superseded);
        }
        session.touch();
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str) -> ChecklistItem {
        ChecklistItem {
            label: label.to_string(),
            present: true,
        }
    }

    #[test]
    fn test_begin_run_on_unknown_session_is_none() {
        let store = SessionStore::new();
        assert!(store.begin_run(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_new_run_supersedes_old_and_clears_state() {
        let store = SessionStore::new();
        let id = store.create();

        let first = store.begin_run(id).unwrap();
        store.record_prepared(&first, "old text", &[item("Old")]).unwrap();

        let second = store.begin_run(id).unwrap();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(matches!(first.checkpoint(), Err(PipelineError::Superseded)));

        let snapshot = store.snapshot(id).unwrap();
        assert!(snapshot.state.document_text.is_none());
        assert!(snapshot.state.checklist.is_empty());
        assert_eq!(snapshot.active_run, Some(second.run_id()));
    }

    #[test]
    fn test_stale_run_cannot_record_or_clear() {
        let store = SessionStore::new();
        let id = store.create();
        let first = store.begin_run(id).unwrap();
        let second = store.begin_run(id).unwrap();
        store.record_prepared(&second, "new text", &[item("New")]).unwrap();

        assert!(matches!(
            store.record_prepared(&first, "old text", &[]),
            Err(PipelineError::Superseded)
        ));
        store.fail(&first);

        let snapshot = store.snapshot(id).unwrap();
        assert_eq!(snapshot.state.document_text.as_deref(), Some("new text"));
        assert_eq!(snapshot.active_run, Some(second.run_id()));
    }

    #[test]
    fn test_fail_discards_partial_state() {
        let store = SessionStore::new();
        let id = store.create();
        let run = store.begin_run(id).unwrap();
        store.record_prepared(&run, "text", &[item("A")]).unwrap();

        store.fail(&run);

        let snapshot = store.snapshot(id).unwrap();
        assert!(snapshot.state.document_text.is_none());
        assert!(snapshot.state.checklist.is_empty());
        assert!(snapshot.state.report.is_none());
        assert!(snapshot.active_run.is_none());
    }

    #[test]
    fn test_cancel_reports_whether_a_run_was_active() {
        let store = SessionStore::new();
        let id = store.create();
        assert_eq!(store.cancel(id), Some(false));

        let run = store.begin_run(id).unwrap();
        assert_eq!(store.cancel(id), Some(true));
        assert!(!run.is_current());
        assert_eq!(store.cancel(Uuid::new_v4()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_aborts_in_flight_future_on_supersession() {
        let store = Arc::new(SessionStore::new());
        let id = store.create();
        let run = store.begin_run(id).unwrap();

        let superseder = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.begin_run(id).unwrap()
            })
        };

        let result = run
            .guard(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "model reply"
            })
            .await;

        assert!(matches!(result, Err(PipelineError::Superseded)));
        let newer = superseder.await.unwrap();
        assert!(newer.is_current());
    }

    #[tokio::test]
    async fn test_guard_passes_output_through_for_current_run() {
        let store = SessionStore::new();
        let id = store.create();
        let run = store.begin_run(id).unwrap();
        assert_eq!(run.guard(async { 7 }).await.unwrap(), 7);
    }

    #[test]
    fn test_contains_tracks_create_and_remove() {
        let store = SessionStore::new();
        let id = store.create();
        assert!(store.contains(id));
        assert!(store.remove(id));
        assert!(!store.contains(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_evicted_after_ttl() {
        let store = SessionStore::new();
        let idle = store.create();
        let busy = store.create();
        let running = store.create();
        let run = store.begin_run(running).unwrap();

        tokio::time::advance(Duration::from_secs(40)).await;
        store.snapshot(busy).unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(store.evict_idle(Duration::from_secs(60)), 1);
        assert!(!store.contains(idle));
        assert!(store.contains(busy));
        assert!(store.contains(running));
        assert!(run.is_current());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweeper_runs_periodically() {
        let store = Arc::new(SessionStore::new());
        let id = store.create();
        let sweeper = store
            .clone()
            .spawn_idle_sweeper(Duration::from_secs(60), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(store.contains(id));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!store.contains(id));
        assert_eq!(store.len(), 0);
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_removed_session_supersedes_its_run() {
        let store = SessionStore::new();
        let id = store.create();
        let run = store.begin_run(id).unwrap();
        assert!(store.remove(id));
        assert!(!run.is_current());
        let result = run.guard(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(PipelineError::Superseded)));
    }
}
