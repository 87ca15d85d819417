use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub mod stream;
pub mod typescript_gen;
pub mod user_interaction;

pub use typescript_gen::generate_typescript_definitions;

pub use stream::{
    CompleteRequest, CompletionStatus, StreamEvent, StreamFrame, StreamHealthReport, StreamState,
    StreamSummary, ToolStatus,
};
pub use user_interaction::{
    AnswerMessage, AnswerRequest, AskQuestionRequest, CancelRequest, CreateQuestionRequest,
    HandlerCapabilities, HandlerFeature, PendingQuestionsResponse, Platform, PromptFormat,
    QuestionData, QuestionResponse, QuestionStats, QuestionStatus, QuestionView, WebviewMessage,
    MAX_QUESTION_TIMEOUT_SECS,
};

// Shared models for the interaction api, the editor extension and the cli

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
