//! Resume State Machine: per-resume sessions and operation sequencing.
//!
//! Each open resume has a session holding the latest `ResumeSnapshot` in a
//! `watch` channel. A mutating operation first moves the session out of
//! `Idle`; a second operation on the same resume is rejected with
//! `OperationInProgress` until the first one finishes. Different resumes
//! never contend: sessions live in a sharded map and no shard lock is held
//! across an await point.
//!
//! The in-flight marker is kept apart from the session, so closing a session
//! does not release the resume. Results are applied to the session only after
//! the store accepted them. If the session was closed meanwhile, the result
//! is dropped there; the store already holds it and the next `open` loads it.
//!
//! Sessions that sit idle with no subscribers are evicted by
//! `sweep_idle_sessions`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::keywords::editor::{DedupOutcome, KeywordEditor, KeywordLists, KeywordTarget};
use crate::keywords::ingest::ResumeIngestor;
use crate::keywords::reconciler::{KeywordReconciler, ReanalysisOutcome};
use crate::keywords::store::ResumeStore;
use crate::models::resume::{ResumeKey, ResumePatch, ResumeRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePhase {
    Idle,
    Analyzing,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    AnalysisStarted,
    EditStarted,
    Finished,
}

impl ResumePhase {
    /// Returns the next phase, or `None` when the event is not allowed now.
    pub fn apply(self, event: PhaseEvent) -> Option<ResumePhase> {
        match (self, event) {
            (ResumePhase::Idle, PhaseEvent::AnalysisStarted) => Some(ResumePhase::Analyzing),
            (ResumePhase::Idle, PhaseEvent::EditStarted) => Some(ResumePhase::Editing),
            (_, PhaseEvent::Finished) => Some(ResumePhase::Idle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeSnapshot {
    #[serde(flatten)]
    pub resume: ResumeRow,
    pub phase: ResumePhase,
}

struct Session {
    epoch: u64,
    owner_id: Uuid,
    last_used: Instant,
    state: watch::Sender<ResumeSnapshot>,
}

type Sessions = Arc<DashMap<Uuid, Session>>;

/// Resume ids with a mutating operation running, mapped to the epoch of the
/// session the operation started in. Entries outlive `close`.
type InFlight = Arc<DashMap<Uuid, u64>>;

fn not_found(key: &ResumeKey) -> AppError {
    AppError::NotFound(format!("Resume {} not found", key.resume_id))
}

/// Holds a resume out of `Idle` for the duration of one operation.
/// Dropping it returns the session to `Idle` and releases the resume.
struct OperationGuard {
    sessions: Sessions,
    in_flight: InFlight,
    resume_id: Uuid,
    epoch: u64,
    resume: ResumeRow,
}

impl OperationGuard {
    fn lists(&self) -> KeywordLists {
        KeywordLists::from(&self.resume)
    }

    /// Applies a persisted change to the session. Returns false when the
    /// session this operation started in is gone.
    fn apply(&self, update: impl FnOnce(&mut ResumeRow)) -> bool {
        match self.sessions.get(&self.resume_id) {
            Some(session) if session.epoch == self.epoch => {
                session.state.send_modify(|s| update(&mut s.resume));
                true
            }
            _ => {
                debug!(
                    "Session for resume {} closed mid-operation; result discarded",
                    self.resume_id
                );
                false
            }
        }
    }

    fn apply_lists(&self, lists: &KeywordLists) -> bool {
        self.apply(|r| {
            r.keywords = lists.keywords.clone();
            r.non_keywords = lists.non_keywords.clone();
        })
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let stale = match self.sessions.get_mut(&self.resume_id) {
            Some(mut session) if session.epoch == self.epoch => {
                session.last_used = Instant::now();
                session.state.send_modify(|s| {
                    s.phase = s.phase.apply(PhaseEvent::Finished).unwrap_or(ResumePhase::Idle)
                });
                false
            }
            Some(_) => true,
            None => false,
        };
        // A session opened after this one was closed was loaded before our
        // write landed; the next open reloads it from the store.
        if stale {
            let epoch = self.epoch;
            self.sessions.remove_if(&self.resume_id, |_, s| s.epoch != epoch);
        }
        self.in_flight.remove(&self.resume_id);
    }
}

#[derive(Clone)]
pub struct ResumeStateMachine {
    sessions: Sessions,
    in_flight: InFlight,
    next_epoch: Arc<AtomicU64>,
    store: Arc<dyn ResumeStore>,
    reconciler: KeywordReconciler,
    editor: KeywordEditor,
    ingestor: ResumeIngestor,
}

impl ResumeStateMachine {
    pub fn new(
        store: Arc<dyn ResumeStore>,
        reconciler: KeywordReconciler,
        editor: KeywordEditor,
        ingestor: ResumeIngestor,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            next_epoch: Arc::new(AtomicU64::new(1)),
            store,
            reconciler,
            editor,
            ingestor,
        }
    }

    fn session_snapshot(&self, key: &ResumeKey) -> Option<Result<ResumeSnapshot, AppError>> {
        self.sessions.get_mut(&key.resume_id).map(|mut session| {
            if session.owner_id == key.owner_id {
                session.last_used = Instant::now();
                Ok(session.state.borrow().clone())
            } else {
                Err(not_found(key))
            }
        })
    }

    /// Opens (or returns) the session for a resume, loading it from the store
    /// on first use. A resume whose session was closed while an operation was
    /// still running cannot be reopened until that operation finishes.
    pub async fn open(&self, key: &ResumeKey) -> Result<ResumeSnapshot, AppError> {
        if let Some(snapshot) = self.session_snapshot(key) {
            return snapshot;
        }

        let row = self.store.get(key).await?;
        if self.in_flight.contains_key(&key.resume_id) {
            return Err(AppError::OperationInProgress(key.resume_id));
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        self.sessions.entry(key.resume_id).or_insert_with(|| {
            debug!("Opened session for resume {} (epoch {})", key.resume_id, epoch);
            let (state, _) = watch::channel(ResumeSnapshot {
                resume: row,
                phase: ResumePhase::Idle,
            });
            Session {
                epoch,
                owner_id: key.owner_id,
                last_used: Instant::now(),
                state,
            }
        });

        self.session_snapshot(key)
            .unwrap_or_else(|| Err(not_found(key)))
    }

    /// Current state of an open session, without touching the store.
    pub fn snapshot(&self, key: &ResumeKey) -> Option<ResumeSnapshot> {
        self.session_snapshot(key).and_then(Result::ok)
    }

    /// Watches a resume's state. Every applied operation and phase change is published.
    pub async fn subscribe(&self, key: &ResumeKey) -> Result<watch::Receiver<ResumeSnapshot>, AppError> {
        self.open(key).await?;
        self.sessions
            .get(&key.resume_id)
            .filter(|s| s.owner_id == key.owner_id)
            .map(|s| s.state.subscribe())
            .ok_or_else(|| not_found(key))
    }

    /// Drops the session. An operation still in flight completes against the
    /// store and keeps the resume locked until it does.
    pub fn close(&self, key: &ResumeKey) -> bool {
        self.sessions
            .remove_if(&key.resume_id, |_, s| s.owner_id == key.owner_id)
            .is_some()
    }

    /// Drops sessions that are idle, have no subscribers and were not used
    /// for `max_idle`. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|resume_id, session| {
            let keep = session.state.borrow().phase != ResumePhase::Idle
                || session.state.receiver_count() > 0
                || session.last_used.elapsed() < max_idle
                || self.in_flight.contains_key(resume_id);
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Periodically evicts idle sessions. Runs until the task is dropped.
    pub async fn sweep_idle_sessions(self, max_idle: Duration) {
        let mut ticker = interval((max_idle / 2).max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = self.evict_idle(max_idle);
            if evicted > 0 {
                debug!("Evicted {} idle resume sessions", evicted);
            }
        }
    }

    async fn begin(&self, key: &ResumeKey, event: PhaseEvent) -> Result<OperationGuard, AppError> {
        self.open(key).await?;

        let epoch = self
            .sessions
            .get(&key.resume_id)
            .filter(|s| s.owner_id == key.owner_id)
            .map(|s| s.epoch)
            .ok_or_else(|| not_found(key))?;

        match self.in_flight.entry(key.resume_id) {
            Entry::Occupied(_) => return Err(AppError::OperationInProgress(key.resume_id)),
            Entry::Vacant(slot) => {
                slot.insert(epoch);
            }
        }

        let started = self
            .sessions
            .get(&key.resume_id)
            .filter(|s| s.epoch == epoch)
            .and_then(|session| {
                let mut started = None;
                session.state.send_if_modified(|s| match s.phase.apply(event) {
                    Some(next) => {
                        s.phase = next;
                        started = Some(s.resume.clone());
                        true
                    }
                    None => false,
                });
                started
            });

        match started {
            Some(resume) => Ok(OperationGuard {
                sessions: self.sessions.clone(),
                in_flight: self.in_flight.clone(),
                resume_id: key.resume_id,
                epoch,
                resume,
            }),
            None => {
                self.in_flight.remove(&key.resume_id);
                Err(AppError::OperationInProgress(key.resume_id))
            }
        }
    }

    pub async fn reanalyze(&self, key: &ResumeKey) -> Result<ReanalysisOutcome, AppError> {
        let guard = self.begin(key, PhaseEvent::AnalysisStarted).await?;
        let outcome = self.reconciler.reanalyze(&guard.resume).await?;
        guard.apply(|r| r.keywords = outcome.keywords.clone());
        Ok(outcome)
    }

    pub async fn rename(
        &self,
        key: &ResumeKey,
        target: &KeywordTarget,
        new_value: &str,
    ) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self
            .editor
            .rename(key, &guard.lists(), target, new_value)
            .await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    pub async fn delete_one(
        &self,
        key: &ResumeKey,
        target: &KeywordTarget,
    ) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self.editor.delete_one(key, &guard.lists(), target).await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    pub async fn delete_all(&self, key: &ResumeKey) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self.editor.delete_all(key).await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    pub async fn deduplicate(&self, key: &ResumeKey) -> Result<DedupOutcome, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let outcome = self.editor.deduplicate(key, &guard.lists()).await?;
        if let DedupOutcome::Removed { lists, .. } = &outcome {
            guard.apply_lists(lists);
        }
        Ok(outcome)
    }

    pub async fn demote(&self, key: &ResumeKey, keyword: &str) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self.editor.demote(key, &guard.lists(), keyword).await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    pub async fn add(&self, key: &ResumeKey, keyword: &str) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self.editor.add(key, &guard.lists(), keyword).await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    pub async fn exclude(&self, key: &ResumeKey, term: &str) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self.editor.exclude(key, &guard.lists(), term).await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    pub async fn restore(&self, key: &ResumeKey, non_keyword: &str) -> Result<KeywordLists, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let lists = self.editor.restore(key, &guard.lists(), non_keyword).await?;
        guard.apply_lists(&lists);
        Ok(lists)
    }

    /// Creates a resume from text typed in by the user and opens its session.
    pub async fn create_from_text(&self, owner_id: Uuid, text: &str) -> Result<ResumeSnapshot, AppError> {
        let row = self.ingestor.create_from_text(owner_id, text).await?;
        self.open(&row.key()).await
    }

    /// Creates a resume from an uploaded file and opens its session.
    pub async fn create_from_upload(
        &self,
        owner_id: Uuid,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<ResumeSnapshot, AppError> {
        let row = self
            .ingestor
            .create_from_upload(owner_id, file_name, content_type, bytes)
            .await?;
        self.open(&row.key()).await
    }

    pub async fn replace_text(&self, key: &ResumeKey, text: &str) -> Result<ResumeSnapshot, AppError> {
        let guard = self.begin(key, PhaseEvent::EditStarted).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Resume text cannot be empty".to_string()));
        }
        let row = self
            .store
            .update(key, ResumePatch::text(text.to_string()))
            .await?;
        guard.apply(|r| *r = row.clone());
        info!("Replaced text of resume {}", key.resume_id);
        Ok(ResumeSnapshot {
            resume: row,
            phase: ResumePhase::Idle,
        })
    }

    /// Deletes the resume and its uploaded file, then closes the session.
    pub async fn delete_resume(&self, key: &ResumeKey) -> Result<(), AppError> {
        let _guard = self.begin(key, PhaseEvent::EditStarted).await?;
        self.ingestor.delete(key).await?;
        self.close(key);
        Ok(())
    }
}
