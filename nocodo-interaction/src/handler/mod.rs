//! Question handlers render a question to a surface and block until it settles

mod api;
mod cli;
mod vscode;


pub use api::ApiQuestionHandler;
pub use cli::{interpret_answer, CliQuestionHandler};
pub use vscode::VsCodeQuestionHandler;

use crate::error::QuestionResult;
use crate::expiry::ExpiryTimer;
use crate::question::{NewQuestion, Question};
use crate::store::QuestionStore;
use async_trait::async_trait;
use chrono::Utc;
use shared_types::{
    HandlerCapabilities, HandlerFeature, Platform, PromptFormat, QuestionData, QuestionResponse,
};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait QuestionHandler: Send + Sync {
    fn platform(&self) -> Platform;

    fn capabilities(&self) -> HandlerCapabilities;

    fn supports_feature(&self, feature: HandlerFeature) -> bool {
        self.capabilities().supports(feature)
    }

    fn validate_question(&self, data: &QuestionData) -> Result<(), String> {
        data.validate()
    }

    /// Render the question and wait for its answer
    async fn ask_question(&self, data: QuestionData) -> QuestionResult<QuestionResponse>;
}

/// Strip what the surface cannot show instead of failing the question
pub fn prepare_question(mut data: QuestionData, capabilities: &HandlerCapabilities) -> QuestionData {
    if !capabilities.suggestions && !data.suggestions.is_empty() {
        debug!(
            job_id = %data.job_id,
            dropped = data.suggestions.len(),
            "Surface cannot show suggestions, asking free form"
        );
        data.suggestions.clear();
    }

    if !capabilities.rich_formatting && data.format != PromptFormat::Plain {
        data.format = PromptFormat::Plain;
    }

    data
}

/// Insert a validated question and arm its expiry timer
pub(crate) fn open_question(
    store: &Arc<QuestionStore>,
    data: &QuestionData,
    question_id: Option<String>,
) -> QuestionResult<(Question, ExpiryTimer)> {
    let mut new = NewQuestion::from_data(data, Utc::now());
    new.id = question_id;
    let question = store.insert(new)?;
    let timer = ExpiryTimer::schedule(store.clone(), &question);
    Ok((question, timer))
}

pub(crate) fn answered(question_id: &str, answer: String) -> QuestionResponse {
    QuestionResponse {
        question_id: question_id.to_string(),
        answer,
        answered_at: Utc::now().timestamp(),
    }
}
