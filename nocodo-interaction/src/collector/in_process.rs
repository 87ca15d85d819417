use super::registry::WaitRegistry;
use super::{AnswerCollector, CollectorKind, DEFAULT_LOOKUP_GRACE};
use crate::error::QuestionResult;
use crate::store::QuestionStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Waits on a store shared with whatever resolves the question in the same process
pub struct InProcessCollector {
    store: Arc<QuestionStore>,
    registry: WaitRegistry,
    lookup_grace: Duration,
}

impl InProcessCollector {
    pub fn new(store: Arc<QuestionStore>) -> Self {
        Self {
            store,
            registry: WaitRegistry::default(),
            lookup_grace: DEFAULT_LOOKUP_GRACE,
        }
    }

    pub fn with_lookup_grace(mut self, grace: Duration) -> Self {
        self.lookup_grace = grace;
        self
    }

    pub fn is_waiting(&self, question_id: &str) -> bool {
        self.registry.is_waiting(question_id)
    }
}

#[async_trait]
impl AnswerCollector for InProcessCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::InProcess
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
    }

    fn pending_waits(&self) -> usize {
        self.registry.len()
    }
}
