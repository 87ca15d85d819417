// User interaction types shared between the question store, the api and the editor surfaces

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use ts_rs::TS;

/// Longest timeout a question may carry, one year
pub const MAX_QUESTION_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// A question a running job wants the operator to answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct QuestionData {
    /// Job (one agent task execution) that owns the question
    pub job_id: String,
    /// The question text to display to the operator
    pub prompt: String,
    /// Ordered list of suggested answers, may be empty
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// How the prompt text should be rendered
    #[serde(default)]
    pub format: PromptFormat,
    /// Seconds after which the question expires unanswered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Rendering hint for the prompt text
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PromptFormat {
    #[default]
    Plain,
    Markdown,
}

impl QuestionData {
    pub fn new(job_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            prompt: prompt.into(),
            suggestions: Vec::new(),
            format: PromptFormat::Plain,
            timeout_secs: None,
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_format(mut self, format: PromptFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// JSON schema handed to the model as the parameters of an ask-the-operator tool
    pub fn tool_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(QuestionData))
            .unwrap_or(serde_json::Value::Null)
    }

    /// Validate the question, returning a human readable rejection reason
    pub fn validate(&self) -> Result<(), String> {
        if self.job_id.trim().is_empty() {
            return Err("Question has empty job ID".to_string());
        }

        if self.prompt.trim().is_empty() {
            return Err("Question prompt is empty".to_string());
        }

        match self.timeout_secs {
            Some(0) => return Err("Question timeout must be greater than zero".to_string()),
            Some(secs) if secs > MAX_QUESTION_TIMEOUT_SECS => {
                return Err(format!(
                    "Question timeout of {}s exceeds the maximum of {}s",
                    secs, MAX_QUESTION_TIMEOUT_SECS
                ))
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        for (index, suggestion) in self.suggestions.iter().enumerate() {
            if suggestion.trim().is_empty() {
                return Err(format!("Suggestion at index {} is empty", index));
            }
            if !seen.insert(suggestion.as_str()) {
                return Err(format!("Duplicate suggestion: {}", suggestion));
            }
        }

        Ok(())
    }
}

/// Lifecycle state of a question
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
    Cancelled,
    Expired,
}

impl QuestionStatus {
    pub const ALL: [QuestionStatus; 4] = [
        QuestionStatus::Pending,
        QuestionStatus::Answered,
        QuestionStatus::Cancelled,
        QuestionStatus::Expired,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QuestionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Pending => "pending",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Cancelled => "cancelled",
            QuestionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire projection of a stored question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuestionView {
    pub id: String,
    pub job_id: String,
    pub prompt: String,
    pub suggestions: Vec<String>,
    pub format: PromptFormat,
    pub status: QuestionStatus,
    /// Present iff status is answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Cancellation reason, present iff status is cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Final answer delivered back to the asking job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuestionResponse {
    pub question_id: String,
    pub answer: String,
    pub answered_at: i64,
}

/// Body of a remote ask; the job comes from the request path
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AskQuestionRequest {
    pub prompt: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub format: PromptFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl AskQuestionRequest {
    pub fn into_data(self, job_id: impl Into<String>) -> QuestionData {
        QuestionData {
            job_id: job_id.into(),
            prompt: self.prompt,
            suggestions: self.suggestions,
            format: self.format,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Create a question without waiting for its answer
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateQuestionRequest {
    /// Client chosen id, lets the asker start waiting before creation lands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(flatten)]
    pub question: AskQuestionRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingQuestionsResponse {
    pub job_id: String,
    pub questions: Vec<QuestionView>,
}

/// Store counters for observability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuestionStats {
    pub total: usize,
    pub by_state: BTreeMap<QuestionStatus, usize>,
}

impl QuestionStats {
    pub fn count(&self, status: QuestionStatus) -> usize {
        self.by_state.get(&status).copied().unwrap_or(0)
    }
}

/// Surface a question handler renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Cli,
    VsCode,
    Api,
}

/// Optional handler features a caller can probe before asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HandlerFeature {
    Suggestions,
    RichFormatting,
    Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HandlerCapabilities {
    pub suggestions: bool,
    pub rich_formatting: bool,
    pub cancellation: bool,
}

impl HandlerCapabilities {
    pub fn supports(&self, feature: HandlerFeature) -> bool {
        match feature {
            HandlerFeature::Suggestions => self.suggestions,
            HandlerFeature::RichFormatting => self.rich_formatting,
            HandlerFeature::Cancellation => self.cancellation,
        }
    }
}

/// Messages posted from the host to the editor webview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WebviewMessage {
    ShowQuestion { question: QuestionView },
    DismissQuestion { question_id: String, reason: String },
}

/// Answer traffic arriving over a message queue (editor webview, bridges)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AnswerMessage {
    Answer { question_id: String, answer: String },
    Cancel { question_id: String, reason: String },
}

impl AnswerMessage {
    pub fn question_id(&self) -> &str {
        match self {
            AnswerMessage::Answer { question_id, .. } => question_id,
            AnswerMessage::Cancel { question_id, .. } => question_id,
        }
    }
}
