use super::registry::WaitRegistry;
use super::{AnswerCollector, CollectorKind, DEFAULT_LOOKUP_GRACE};
use crate::error::QuestionResult;
use crate::question::Question;
use crate::store::QuestionStore;
use async_trait::async_trait;
use shared_types::AnswerMessage;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Collector fed by a message queue, e.g. replies posted back by an editor webview
pub struct MessageQueueCollector {
    store: Arc<QuestionStore>,
    registry: WaitRegistry,
    lookup_grace: Duration,
    sender: mpsc::Sender<AnswerMessage>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MessageQueueCollector {
    /// Must be called inside a tokio runtime, the queue pump is spawned here
    pub fn new(store: Arc<QuestionStore>) -> Self {
        Self::with_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(store: Arc<QuestionStore>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let pump = tokio::spawn(pump_messages(store.clone(), receiver));
        Self {
            store,
            registry: WaitRegistry::default(),
            lookup_grace: DEFAULT_LOOKUP_GRACE,
            sender,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn with_lookup_grace(mut self, grace: Duration) -> Self {
        self.lookup_grace = grace;
        self
    }

    /// Producer end of the queue
    pub fn sender(&self) -> mpsc::Sender<AnswerMessage> {
        self.sender.clone()
    }

    fn stop_pump(&self) {
        let pump = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

impl Drop for MessageQueueCollector {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// Apply one queued message to the store
pub fn apply_message(store: &QuestionStore, message: AnswerMessage) -> QuestionResult<Question> {
    match message {
        AnswerMessage::Answer {
            question_id,
            answer,
        } => store.resolve(&question_id, &answer),
        AnswerMessage::Cancel {
            question_id,
            reason,
        } => store.cancel(&question_id, &reason),
    }
}

async fn pump_messages(store: Arc<QuestionStore>, mut receiver: mpsc::Receiver<AnswerMessage>) {
    while let Some(message) = receiver.recv().await {
        let question_id = message.question_id().to_string();
        if let Err(e) = apply_message(&store, message) {
            warn!(question_id = %question_id, error = %e, "Dropped queued answer message");
        }
    }
    debug!("Answer queue closed");
}

#[async_trait]
impl AnswerCollector for MessageQueueCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::MessageQueue
    }

    async fn wait_for_answer(&self, question_id: &str) -> QuestionResult<String> {
        self.registry
            .wait(&self.store, question_id, None, self.lookup_grace)
            .await
    }

    fn cancel_question(&self, question_id: &str, reason: &str) -> QuestionResult<()> {
        self.registry.cancel(&self.store, question_id, reason)
    }

    fn cleanup(&self) {
        self.registry.cancel_all(&self.store, "collector shut down");
        self.stop_pump();
    }

    fn pending_waits(&self) -> usize {
        self.registry.len()
    }
}
