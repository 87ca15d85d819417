use crate::error::{QuestionError, QuestionResult};
use crate::question::QuestionState;
use crate::store::QuestionStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

const ABANDONED: &str = "wait abandoned";

struct PendingWait {
    token: u64,
    reject: oneshot::Sender<String>,
}

/// Local waiters of one collector, at most one per question id
#[derive(Default)]
pub(crate) struct WaitRegistry {
    waits: Mutex<HashMap<String, PendingWait>>,
    next_token: AtomicU64,
}

/// Removes its registry entry on drop, unless a newer wait replaced it
struct Registration<'a> {
    registry: &'a WaitRegistry,
    question_id: String,
    token: u64,
    rejected: oneshot::Receiver<String>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut waits = self.registry.lock();
        if waits
            .get(&self.question_id)
            .is_some_and(|w| w.token == self.token)
        {
            waits.remove(&self.question_id);
        }
    }
}

impl WaitRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingWait>> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, question_id: &str) -> QuestionResult<Registration<'_>> {
        let mut waits = self.lock();
        if waits.contains_key(question_id) {
            return Err(QuestionError::AlreadyWaiting {
                question_id: question_id.to_string(),
            });
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (reject, rejected) = oneshot::channel();
        waits.insert(question_id.to_string(), PendingWait { token, reject });

        Ok(Registration {
            registry: self,
            question_id: question_id.to_string(),
            token,
            rejected,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_waiting(&self, question_id: &str) -> bool {
        self.lock().contains_key(question_id)
    }

    /// Wake the local waiter of a question with a cancellation
    pub(crate) fn reject(&self, question_id: &str, reason: &str) -> bool {
        match self.lock().remove(question_id) {
            Some(wait) => wait.reject.send(reason.to_string()).is_ok(),
            None => false,
        }
    }

    /// Wait for the store to settle `question_id`.
    ///
    /// `scope` limits the wait to questions of one job; other jobs' ids read
    /// as unknown. A question that is not in the store yet gets `grace` to
    /// appear before the wait fails with `NotFound`.
    pub(crate) async fn wait(
        &self,
        store: &QuestionStore,
        question_id: &str,
        scope: Option<&str>,
        grace: Duration,
    ) -> QuestionResult<String> {
        let mut registration = self.register(question_id)?;

        let subscription = match store.subscribe(question_id) {
            Ok(subscription) => subscription,
            Err(QuestionError::NotFound { .. }) if !grace.is_zero() => {
                debug!(question_id = %question_id, "Waiting for question to be created");
                tokio::select! {
                    biased;
                    found = store.wait_for_creation(question_id, grace) => found?,
                    reason = &mut registration.rejected => {
                        return Err(QuestionError::cancelled(
                            question_id,
                            reason.unwrap_or_else(|_| ABANDONED.to_string()),
                        ));
                    }
                }
            }
            Err(e) => return Err(e),
        };

        if let Some(job_id) = scope {
            if subscription.question.job_id != job_id {
                warn!(
                    question_id = %question_id,
                    job_id = %job_id,
                    owner = %subscription.question.job_id,
                    "Wait for a question owned by another job"
                );
                return Err(QuestionError::not_found(question_id));
            }
        }

        let mut status = subscription.status;
        loop {
            let current = status.borrow_and_update().clone();
            match current {
                QuestionState::Answered { answer } => return Ok(answer),
                QuestionState::Cancelled { reason } => {
                    return Err(QuestionError::cancelled(question_id, reason))
                }
                QuestionState::Expired => return Err(QuestionError::expired(question_id)),
                QuestionState::Pending => {}
            }

            tokio::select! {
                biased;
                changed = status.changed() => {
                    if changed.is_err() {
                        // Channel dropped without a terminal value: purged or reset
                        return Err(QuestionError::not_found(question_id));
                    }
                }
                reason = &mut registration.rejected => {
                    return Err(QuestionError::cancelled(
                        question_id,
                        reason.unwrap_or_else(|_| ABANDONED.to_string()),
                    ));
                }
            }
        }
    }

    /// Cancel in the store first, then wake the local waiter
    pub(crate) fn cancel(
        &self,
        store: &QuestionStore,
        question_id: &str,
        reason: &str,
    ) -> QuestionResult<()> {
        let result = store.cancel(question_id, reason).map(|_| ());
        self.reject(question_id, reason);
        result
    }

    /// Cancel every registered wait, used when the collector shuts down
    pub(crate) fn cancel_all(&self, store: &QuestionStore, reason: &str) {
        let drained: Vec<(String, PendingWait)> = self.lock().drain().collect();
        for (question_id, wait) in drained {
            if let Err(e) = store.cancel(&question_id, reason) {
                debug!(question_id = %question_id, error = %e, "Question already settled at cleanup");
            }
            let _ = wait.reject.send(reason.to_string());
        }
    }
}
