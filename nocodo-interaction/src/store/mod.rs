use crate::error::{QuestionError, QuestionResult};
use crate::events::{LifecycleEmitter, QuestionEvent};
use crate::question::{NewQuestion, Question, QuestionState};
use chrono::{DateTime, Utc};
use shared_types::{QuestionStats, QuestionStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};


/// How long settled questions stay readable before the sweeper purges them
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// A question snapshot plus a receiver that observes its later transitions
pub struct QuestionSubscription {
    pub question: Question,
    pub status: watch::Receiver<QuestionState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<String>,
    pub purged: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.purged.is_empty()
    }
}

#[derive(Default)]
struct StoreInner {
    questions: HashMap<String, Question>,
    /// Live ids chosen by the caller rather than generated here
    supplied: HashSet<String>,
    /// Caller chosen ids that were purged; they stay unusable so a late reply
    /// reads as unknown. Generated ids are never reissued and are not kept.
    retired: HashSet<String>,
}

/// Authoritative registry of questions keyed by id.
///
/// Every transition goes through one mutex and leaves `Pending` at most once.
/// Lifecycle events are emitted while the lock is still held so that their
/// order matches the order of the mutations.
pub struct QuestionStore {
    inner: Mutex<StoreInner>,
    emitter: Arc<LifecycleEmitter>,
    creations: watch::Sender<u64>,
    retention: Duration,
}

impl Default for QuestionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self::with_emitter(Arc::new(LifecycleEmitter::new()), retention)
    }

    pub fn with_emitter(emitter: Arc<LifecycleEmitter>, retention: Duration) -> Self {
        let (creations, _) = watch::channel(0);
        Self {
            inner: Mutex::new(StoreInner::default()),
            emitter,
            creations,
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emitter(&self) -> &Arc<LifecycleEmitter> {
        &self.emitter
    }

    /// Shortcut for `emitter().subscribe_all()`
    pub fn subscribe_events(&self) -> broadcast::Receiver<QuestionEvent> {
        self.emitter.subscribe_all()
    }

    /// Register a new pending question under a fresh id
    pub fn create(
        &self,
        job_id: &str,
        prompt: &str,
        suggestions: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Question {
        let mut inner = self.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let new = NewQuestion {
            id: None,
            job_id: job_id.to_string(),
            prompt: prompt.to_string(),
            suggestions,
            format: Default::default(),
            expires_at,
        };
        self.insert_locked(&mut inner, id, new, false)
    }

    /// Register a new pending question, honouring a caller chosen id
    pub fn insert(&self, new: NewQuestion) -> QuestionResult<Question> {
        let mut inner = self.lock();
        let supplied = new.id.is_some();
        let id = match &new.id {
            Some(id) => {
                if id.trim().is_empty() {
                    return Err(QuestionError::validation("Question id is empty"));
                }
                if inner.questions.contains_key(id) || inner.retired.contains(id) {
                    return Err(QuestionError::Duplicate {
                        question_id: id.clone(),
                    });
                }
                id.clone()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok(self.insert_locked(&mut inner, id, new, supplied))
    }

    fn insert_locked(
        &self,
        inner: &mut StoreInner,
        id: String,
        new: NewQuestion,
        supplied: bool,
    ) -> Question {
        let question = Question {
            id: id.clone(),
            job_id: new.job_id,
            prompt: new.prompt,
            suggestions: new.suggestions,
            format: new.format,
            state: QuestionState::Pending,
            created_at: Utc::now(),
            expires_at: new.expires_at,
            settled_at: None,
        };

        self.emitter.open(&id);
        inner.questions.insert(id.clone(), question.clone());
        if supplied {
            inner.supplied.insert(id.clone());
        }
        self.emitter.emit(QuestionEvent::Created {
            question: question.clone(),
        });
        self.creations.send_modify(|generation| *generation += 1);

        info!(
            question_id = %id,
            job_id = %question.job_id,
            suggestions = question.suggestions.len(),
            "Question created"
        );
        question
    }

    pub fn resolve(&self, question_id: &str, answer: &str) -> QuestionResult<Question> {
        self.transition(
            question_id,
            QuestionState::Answered {
                answer: answer.to_string(),
            },
        )
    }

    pub fn cancel(&self, question_id: &str, reason: &str) -> QuestionResult<Question> {
        self.transition(
            question_id,
            QuestionState::Cancelled {
                reason: reason.to_string(),
            },
        )
    }

    pub fn expire(&self, question_id: &str) -> QuestionResult<Question> {
        self.transition(question_id, QuestionState::Expired)
    }

    fn transition(&self, question_id: &str, next: QuestionState) -> QuestionResult<Question> {
        let mut inner = self.lock();
        self.transition_locked(&mut inner, question_id, next, Utc::now())
    }

    fn transition_locked(
        &self,
        inner: &mut StoreInner,
        question_id: &str,
        next: QuestionState,
        at: DateTime<Utc>,
    ) -> QuestionResult<Question> {
        let question = inner
            .questions
            .get_mut(question_id)
            .ok_or_else(|| QuestionError::not_found(question_id))?;

        if question.state.is_terminal() {
            warn!(
                question_id = %question_id,
                status = %question.status(),
                attempted = %next.status(),
                "Rejected transition of settled question"
            );
            return Err(QuestionError::invalid_state(question_id, question.status()));
        }

        question.state = next;
        question.settled_at = Some(at);
        let snapshot = question.clone();

        if let Some(event) = QuestionEvent::settled(&snapshot) {
            self.emitter.emit(event);
        }

        info!(
            question_id = %question_id,
            job_id = %snapshot.job_id,
            status = %snapshot.status(),
            "Question settled"
        );
        Ok(snapshot)
    }

    pub fn get(&self, question_id: &str) -> Option<Question> {
        self.lock().questions.get(question_id).cloned()
    }

    /// Snapshot a question and watch it, atomically with respect to transitions
    pub fn subscribe(&self, question_id: &str) -> QuestionResult<QuestionSubscription> {
        let inner = self.lock();
        let question = inner
            .questions
            .get(question_id)
            .cloned()
            .ok_or_else(|| QuestionError::not_found(question_id))?;
        let status = self
            .emitter
            .subscribe(question_id)
            .ok_or_else(|| QuestionError::not_found(question_id))?;
        Ok(QuestionSubscription { question, status })
    }

    /// Like `subscribe`, but waits up to `grace` for the question to be created.
    ///
    /// Each creation bumps a generation counter, so the lookup is retried on
    /// every new question instead of after a fixed delay.
    pub async fn wait_for_creation(
        &self,
        question_id: &str,
        grace: Duration,
    ) -> QuestionResult<QuestionSubscription> {
        let mut created = self.creations.subscribe();
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            match self.subscribe(question_id) {
                Ok(subscription) => return Ok(subscription),
                Err(QuestionError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }

            if self.is_retired(question_id) {
                return Err(QuestionError::not_found(question_id));
            }

            match tokio::time::timeout_at(deadline, created.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    debug!(
                        question_id = %question_id,
                        grace_ms = grace.as_millis() as u64,
                        "Question did not appear within the lookup grace"
                    );
                    return Err(QuestionError::not_found(question_id));
                }
            }
        }
    }

    fn is_retired(&self, question_id: &str) -> bool {
        self.lock().retired.contains(question_id)
    }

    /// Pending questions of one job, oldest first
    pub fn list_pending(&self, job_id: &str) -> Vec<Question> {
        self.with_pending(job_id, |questions| questions)
    }

    /// Run `f` over the job's pending questions while holding the store lock.
    ///
    /// No lifecycle event can be emitted until `f` returns, so work done in `f`
    /// is ordered before every later event of the job. `f` must not call back
    /// into the store.
    pub fn with_pending<R>(&self, job_id: &str, f: impl FnOnce(Vec<Question>) -> R) -> R {
        let inner = self.lock();
        let mut questions: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.job_id == job_id && q.is_pending())
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        f(questions)
    }

    /// Every retained question of one job, oldest first
    pub fn list_job(&self, job_id: &str) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .lock()
            .questions
            .values()
            .filter(|q| q.job_id == job_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        questions
    }

    /// Cancel all pending questions of a job, returning the cancelled ids
    pub fn cancel_job(&self, job_id: &str, reason: &str) -> Vec<String> {
        let mut inner = self.lock();
        let pending: Vec<String> = inner
            .questions
            .values()
            .filter(|q| q.job_id == job_id && q.is_pending())
            .map(|q| q.id.clone())
            .collect();

        let now = Utc::now();
        let cancelled: Vec<String> = pending
            .into_iter()
            .filter(|id| {
                let next = QuestionState::Cancelled {
                    reason: reason.to_string(),
                };
                self.transition_locked(&mut inner, id, next, now).is_ok()
            })
            .collect();

        if !cancelled.is_empty() {
            info!(job_id = %job_id, count = cancelled.len(), "Cancelled pending questions of job");
        }
        cancelled
    }

    pub fn stats(&self) -> QuestionStats {
        let inner = self.lock();
        let mut stats = QuestionStats {
            total: inner.questions.len(),
            by_state: QuestionStatus::ALL.iter().map(|s| (*s, 0)).collect(),
        };
        for question in inner.questions.values() {
            *stats.by_state.entry(question.status()).or_insert(0) += 1;
        }
        stats
    }

    /// Expire overdue pending questions and purge settled ones past retention
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut inner = self.lock();
        let mut report = SweepReport::default();

        let overdue: Vec<String> = inner
            .questions
            .values()
            .filter(|q| q.is_overdue(now))
            .map(|q| q.id.clone())
            .collect();
        for id in overdue {
            if self
                .transition_locked(&mut inner, &id, QuestionState::Expired, now)
                .is_ok()
            {
                report.expired.push(id);
            }
        }

        let retention = self.retention;
        let stale: Vec<String> = inner
            .questions
            .values()
            .filter(|q| {
                q.settled_at
                    .and_then(|settled| (now - settled).to_std().ok())
                    .is_some_and(|age| age >= retention)
            })
            .map(|q| q.id.clone())
            .collect();
        for id in stale {
            inner.questions.remove(&id);
            if inner.supplied.remove(&id) {
                inner.retired.insert(id.clone());
            }
            self.emitter.close(&id);
            report.purged.push(id);
        }

        if !report.is_empty() {
            debug!(
                expired = report.expired.len(),
                purged = report.purged.len(),
                "Question sweep finished"
            );
        }
        report
    }

    /// Cancel everything still pending and forget all questions
    pub fn reset(&self) {
        let mut inner = self.lock();
        let pending: Vec<String> = inner
            .questions
            .values()
            .filter(|q| q.is_pending())
            .map(|q| q.id.clone())
            .collect();

        let now = Utc::now();
        for id in &pending {
            let next = QuestionState::Cancelled {
                reason: "store reset".to_string(),
            };
            let _ = self.transition_locked(&mut inner, id, next, now);
        }

        inner.questions.clear();
        inner.supplied.clear();
        inner.retired.clear();
        self.emitter.clear();
        info!(cancelled = pending.len(), "Question store reset");
    }
}
