use crate::question::{Question, QuestionState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::debug;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Callback run inline with every lifecycle event.
///
/// Listeners run while the store lock is held, so they must not call back
/// into the store.
pub type EventListener = Arc<dyn Fn(&QuestionEvent) + Send + Sync>;

/// Lifecycle notification published after a store mutation commits
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionEvent {
    Created {
        question: Question,
    },
    Answered {
        question_id: String,
        job_id: String,
        answer: String,
    },
    Cancelled {
        question_id: String,
        job_id: String,
        reason: String,
    },
    Expired {
        question_id: String,
        job_id: String,
    },
}

impl QuestionEvent {
    /// Terminal event matching a settled question, `None` while it is pending
    pub fn settled(question: &Question) -> Option<Self> {
        let question_id = question.id.clone();
        let job_id = question.job_id.clone();
        match &question.state {
            QuestionState::Pending => None,
            QuestionState::Answered { answer } => Some(QuestionEvent::Answered {
                question_id,
                job_id,
                answer: answer.clone(),
            }),
            QuestionState::Cancelled { reason } => Some(QuestionEvent::Cancelled {
                question_id,
                job_id,
                reason: reason.clone(),
            }),
            QuestionState::Expired => Some(QuestionEvent::Expired {
                question_id,
                job_id,
            }),
        }
    }

    pub fn question_id(&self) -> &str {
        match self {
            QuestionEvent::Created { question } => &question.id,
            QuestionEvent::Answered { question_id, .. }
            | QuestionEvent::Cancelled { question_id, .. }
            | QuestionEvent::Expired { question_id, .. } => question_id,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            QuestionEvent::Created { question } => &question.job_id,
            QuestionEvent::Answered { job_id, .. }
            | QuestionEvent::Cancelled { job_id, .. }
            | QuestionEvent::Expired { job_id, .. } => job_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QuestionEvent::Created { .. } => "question_created",
            QuestionEvent::Answered { .. } => "question_answered",
            QuestionEvent::Cancelled { .. } => "question_cancelled",
            QuestionEvent::Expired { .. } => "question_expired",
        }
    }

    fn state(&self) -> Option<QuestionState> {
        match self {
            QuestionEvent::Created { .. } => None,
            QuestionEvent::Answered { answer, .. } => Some(QuestionState::Answered {
                answer: answer.clone(),
            }),
            QuestionEvent::Cancelled { reason, .. } => Some(QuestionState::Cancelled {
                reason: reason.clone(),
            }),
            QuestionEvent::Expired { .. } => Some(QuestionState::Expired),
        }
    }
}

/// Per question watch channels plus a broadcast of every lifecycle event.
///
/// The store calls `emit` while it still holds its own lock, right after the
/// mutation. A subscriber that registered under the same lock therefore either
/// sees the settled state when it first borrows, or is woken by the change.
/// Listeners see each event before the mutating call returns; broadcast
/// receivers see it whenever their task next runs and may lag.
pub struct LifecycleEmitter {
    channels: Mutex<HashMap<String, watch::Sender<QuestionState>>>,
    listeners: Mutex<Vec<EventListener>>,
    events: broadcast::Sender<QuestionEvent>,
}

impl Default for LifecycleEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleEmitter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            channels: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            events,
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<QuestionState>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn open(&self, question_id: &str) {
        let (tx, _) = watch::channel(QuestionState::Pending);
        self.channels().insert(question_id.to_string(), tx);
    }

    /// Watch one question. `None` when the id has no open channel.
    pub fn subscribe(&self, question_id: &str) -> Option<watch::Receiver<QuestionState>> {
        self.channels().get(question_id).map(watch::Sender::subscribe)
    }

    /// Run `listener` synchronously for every event from now on. Listeners
    /// stay registered for the emitter's lifetime, across store resets.
    pub fn add_listener(&self, listener: EventListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Every lifecycle event from now on, across all questions
    pub fn subscribe_all(&self) -> broadcast::Receiver<QuestionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: QuestionEvent) {
        if let Some(state) = event.state() {
            if let Some(tx) = self.channels().get(event.question_id()) {
                tx.send_replace(state);
            }
        }

        debug!(
            question_id = %event.question_id(),
            job_id = %event.job_id(),
            event = event.kind(),
            "Question lifecycle event"
        );

        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(&event);
        }

        // No receivers is fine, nobody is subscribed right now
        let _ = self.events.send(event);
    }

    pub(crate) fn close(&self, question_id: &str) {
        self.channels().remove(question_id);
    }

    pub(crate) fn clear(&self) {
        self.channels().clear();
    }
}
