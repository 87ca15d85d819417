use chrono::{DateTime, Utc};
use shared_types::{
    PromptFormat, QuestionData, QuestionStatus, QuestionView, MAX_QUESTION_TIMEOUT_SECS,
};

/// Lifecycle state of a stored question, the answer only exists once answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionState {
    Pending,
    Answered { answer: String },
    Cancelled { reason: String },
    Expired,
}

impl QuestionState {
    pub fn status(&self) -> QuestionStatus {
        match self {
            QuestionState::Pending => QuestionStatus::Pending,
            QuestionState::Answered { .. } => QuestionStatus::Answered,
            QuestionState::Cancelled { .. } => QuestionStatus::Cancelled,
            QuestionState::Expired => QuestionStatus::Expired,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// A question as held by the store. Callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub job_id: String,
    pub prompt: String,
    pub suggestions: Vec<String>,
    pub format: PromptFormat,
    pub state: QuestionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// When the question left the pending state
    pub settled_at: Option<DateTime<Utc>>,
}

impl Question {
    pub fn status(&self) -> QuestionStatus {
        self.state.status()
    }

    pub fn is_pending(&self) -> bool {
        self.state == QuestionState::Pending
    }

    pub fn answer(&self) -> Option<&str> {
        match &self.state {
            QuestionState::Answered { answer } => Some(answer),
            _ => None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    pub fn to_view(&self) -> QuestionView {
        let reason = match &self.state {
            QuestionState::Cancelled { reason } => Some(reason.clone()),
            _ => None,
        };

        QuestionView {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            prompt: self.prompt.clone(),
            suggestions: self.suggestions.clone(),
            format: self.format,
            status: self.status(),
            answer: self.answer().map(str::to_string),
            reason,
            created_at: self.created_at.timestamp(),
            expires_at: self.expires_at.map(|deadline| deadline.timestamp()),
        }
    }
}

/// Input for `QuestionStore::insert`
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    /// Caller chosen id; a fresh uuid is generated when absent
    pub id: Option<String>,
    pub job_id: String,
    pub prompt: String,
    pub suggestions: Vec<String>,
    pub format: PromptFormat,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewQuestion {
    pub fn new(job_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            job_id: job_id.into(),
            prompt: prompt.into(),
            suggestions: Vec::new(),
            format: PromptFormat::Plain,
            expires_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_format(mut self, format: PromptFormat) -> Self {
        self.format = format;
        self
    }

    pub fn expires_at(mut self, deadline: DateTime<Utc>) -> Self {
        self.expires_at = Some(deadline);
        self
    }

    /// Build from a tool call payload, turning the relative timeout into a deadline.
    /// Timeouts past the accepted maximum are clamped to it.
    pub fn from_data(data: &QuestionData, now: DateTime<Utc>) -> Self {
        let expires_at = data
            .timeout_secs
            .map(|secs| secs.min(MAX_QUESTION_TIMEOUT_SECS))
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
            .and_then(|timeout| now.checked_add_signed(timeout));

        Self {
            id: None,
            job_id: data.job_id.clone(),
            prompt: data.prompt.clone(),
            suggestions: data.suggestions.clone(),
            format: data.format,
            expires_at,
        }
    }
}
