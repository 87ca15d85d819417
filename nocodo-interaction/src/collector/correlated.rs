use super::registry::WaitRegistry;
use super::{AnswerCollector, CollectorKind, DEFAULT_LOOKUP_GRACE};
use crate::error::{QuestionError, QuestionResult};
use crate::question::Question;
use crate::store::QuestionStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Collector for answers submitted over HTTP, correlated by question id and
/// confined to a single job
pub struct CorrelatedHttpCollector {
    store: Arc<QuestionStore>,
    job_id: String,
    registry: WaitRegistry,
    lookup_grace: Duration,
}

impl CorrelatedHttpCollector {
    pub fn new(store: Arc<QuestionStore>, job_id: impl Into<String>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            registry: WaitRegistry::default(),
            lookup_grace: DEFAULT_LOOKUP_GRACE,
        }
    }

    pub fn with_lookup_grace(mut self, grace: Duration) -> Self {
        self.lookup_grace = grace;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Questions of this job a remote client still has to answer
    pub fn pending_questions(&self) -> Vec<Question> {
        self.store.list_pending(&self.job_id)
    }

    fn owns(&self, question_id: &str) -> bool {
        self.store
            .get(question_id)
            .is_some_and(|q| q.job_id == self.job_id)
    }
}

#[async_trait]
impl AnswerCollector for CorrelatedHttpCollector {
    fn kind(&self) -> CollectorKind {
        CollectorKind::CorrelatedHttp
    }

    async fn wait_for_answer(&self, question_id: &str) -> QuestionResult<String> {
        self.registry
            .wait(
                &self.store,
                question_id,
                Some(&self.job_id),
                self.lookup_grace,
            )
            .await
    }

    fn cancel_question(&self, question_id: &str, reason: &str) -> QuestionResult<()> {
        if !self.owns(question_id) {
            return Err(QuestionError::not_found(question_id));
        }
        self.registry.cancel(&self.store, question_id, reason)
    }

    fn cleanup(&self) {
        self.registry.cancel_all(&self.store, "collector shut down");
    }

    fn pending_waits(&self) -> usize {
        self.registry.len()
    }
}
