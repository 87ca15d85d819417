use super::{answered, open_question, prepare_question, QuestionHandler};
use crate::collector::{AnswerCollector, CorrelatedHttpCollector};
use crate::error::{QuestionError, QuestionResult};
use crate::store::QuestionStore;
use async_trait::async_trait;
use shared_types::{HandlerCapabilities, Platform, QuestionData, QuestionResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Queues the question for a remote client. The client discovers it on the
/// job stream or by polling, and answers over HTTP.
pub struct ApiQuestionHandler {
    store: Arc<QuestionStore>,
    collector: CorrelatedHttpCollector,
}

impl ApiQuestionHandler {
    pub fn new(store: Arc<QuestionStore>, job_id: impl Into<String>) -> Self {
        Self {
            collector: CorrelatedHttpCollector::new(store.clone(), job_id),
            store,
        }
    }

    pub fn with_lookup_grace(mut self, grace: Duration) -> Self {
        self.collector = self.collector.with_lookup_grace(grace);
        self
    }

    pub fn job_id(&self) -> &str {
        self.collector.job_id()
    }

    pub fn collector(&self) -> &CorrelatedHttpCollector {
        &self.collector
    }

    /// Ask under a caller chosen id, so the caller can cancel the question
    /// if it stops waiting
    pub async fn ask_with_id(
        &self,
        question_id: String,
        data: QuestionData,
    ) -> QuestionResult<QuestionResponse> {
        self.ask(Some(question_id), data).await
    }

    async fn ask(
        &self,
        question_id: Option<String>,
        data: QuestionData,
    ) -> QuestionResult<QuestionResponse> {
        self.validate_question(&data)
            .map_err(QuestionError::validation)?;
        let data = prepare_question(data, &self.capabilities());
        let (question, _expiry) = open_question(&self.store, &data, question_id)?;
        info!(question_id = %question.id, job_id = %question.job_id, "Question queued for remote answer");

        let answer = self.collector.wait_for_answer(&question.id).await?;
        Ok(answered(&question.id, answer))
    }
}

#[async_trait]
impl QuestionHandler for ApiQuestionHandler {
    fn platform(&self) -> Platform {
        Platform::Api
    }

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities {
            suggestions: true,
            rich_formatting: true,
            cancellation: true,
        }
    }

    fn validate_question(&self, data: &QuestionData) -> Result<(), String> {
        data.validate()?;
        if data.job_id != self.job_id() {
            return Err(format!(
                "Question belongs to job {} but this handler serves job {}",
                data.job_id,
                self.job_id()
            ));
        }
        Ok(())
    }

    async fn ask_question(&self, data: QuestionData) -> QuestionResult<QuestionResponse> {
        self.ask(None, data).await
    }
}
