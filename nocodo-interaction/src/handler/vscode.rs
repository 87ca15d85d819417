use super::{answered, open_question, prepare_question, QuestionHandler};
use crate::collector::{AnswerCollector, MessageQueueCollector};
use crate::error::{QuestionError, QuestionResult};
use crate::store::QuestionStore;
use async_trait::async_trait;
use shared_types::{
    AnswerMessage, HandlerCapabilities, Platform, QuestionData, QuestionResponse, WebviewMessage,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Posts questions to an editor webview and collects replies from its message queue
pub struct VsCodeQuestionHandler {
    store: Arc<QuestionStore>,
    collector: MessageQueueCollector,
    webview: mpsc::Sender<WebviewMessage>,
}

impl VsCodeQuestionHandler {
    pub fn new(store: Arc<QuestionStore>, webview: mpsc::Sender<WebviewMessage>) -> Self {
        Self {
            collector: MessageQueueCollector::new(store.clone()),
            store,
            webview,
        }
    }

    /// Where the extension host posts `AnswerMessage`s from the webview
    pub fn reply_sender(&self) -> mpsc::Sender<AnswerMessage> {
        self.collector.sender()
    }
}

#[async_trait]
impl QuestionHandler for VsCodeQuestionHandler {
    fn platform(&self) -> Platform {
        Platform::VsCode
    }

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities {
            suggestions: true,
            rich_formatting: true,
            cancellation: true,
        }
    }

    async fn ask_question(&self, data: QuestionData) -> QuestionResult<QuestionResponse> {
        self.validate_question(&data)
            .map_err(QuestionError::validation)?;
        let data = prepare_question(data, &self.capabilities());
        let (question, _expiry) = open_question(&self.store, &data, None)?;

        let show = WebviewMessage::ShowQuestion {
            question: question.to_view(),
        };
        if self.webview.send(show).await.is_err() {
            let _ = self.store.cancel(&question.id, "webview closed");
            return Err(QuestionError::surface("webview channel closed"));
        }
        info!(question_id = %question.id, job_id = %question.job_id, "Question posted to webview");

        let outcome = self.collector.wait_for_answer(&question.id).await;

        if let Err(e) = &outcome {
            if e.is_no_longer_valid() {
                let dismiss = WebviewMessage::DismissQuestion {
                    question_id: question.id.clone(),
                    reason: e.to_string(),
                };
                if self.webview.send(dismiss).await.is_err() {
                    warn!(question_id = %question.id, "Webview gone before dismiss");
                }
            }
        }

        outcome.map(|answer| answered(&question.id, answer))
    }
}
