use shared_types::QuestionStatus;
use thiserror::Error;

/// Errors surfaced by the question store, collectors and handlers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuestionError {
    /// The id was never created here or has already been purged
    #[error("Question not found: {question_id}")]
    NotFound { question_id: String },

    /// Mutation of a question that already left the pending state
    #[error("Question {question_id} is {status}, not pending")]
    InvalidState {
        question_id: String,
        status: QuestionStatus,
    },

    #[error("Question {question_id} was cancelled: {reason}")]
    Cancelled { question_id: String, reason: String },

    #[error("Question {question_id} expired before it was answered")]
    Expired { question_id: String },

    /// A caller supplied id that was already used in this store
    #[error("Question id already in use: {question_id}")]
    Duplicate { question_id: String },

    /// A second concurrent wait on a question that already has a waiter
    #[error("Question {question_id} already has a pending wait")]
    AlreadyWaiting { question_id: String },

    #[error("Invalid question: {message}")]
    Validation { message: String },

    /// The surface the question is rendered to failed
    #[error("Question surface error: {message}")]
    Surface { message: String },
}

impl QuestionError {
    pub fn not_found<S: Into<String>>(question_id: S) -> Self {
        Self::NotFound {
            question_id: question_id.into(),
        }
    }

    pub fn invalid_state<S: Into<String>>(question_id: S, status: QuestionStatus) -> Self {
        Self::InvalidState {
            question_id: question_id.into(),
            status,
        }
    }

    pub fn cancelled<S: Into<String>, R: Into<String>>(question_id: S, reason: R) -> Self {
        Self::Cancelled {
            question_id: question_id.into(),
            reason: reason.into(),
        }
    }

    pub fn expired<S: Into<String>>(question_id: S) -> Self {
        Self::Expired {
            question_id: question_id.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn surface<S: Into<String>>(message: S) -> Self {
        Self::Surface {
            message: message.into(),
        }
    }

    /// Whether the question reached a terminal state other than answered
    pub fn is_no_longer_valid(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Expired { .. })
    }
}

impl From<std::io::Error> for QuestionError {
    fn from(err: std::io::Error) -> Self {
        QuestionError::surface(err.to_string())
    }
}

pub type QuestionResult<T> = Result<T, QuestionError>;
