use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use nocodo_interaction::QuestionError;
use nocodo_stream::StreamError;
use shared_types::ErrorResponse;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Question(#[from] QuestionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Question(e) => match e {
                QuestionError::NotFound { .. } => StatusCode::NOT_FOUND,
                QuestionError::InvalidState { .. }
                | QuestionError::Duplicate { .. }
                | QuestionError::AlreadyWaiting { .. } => StatusCode::CONFLICT,
                QuestionError::Cancelled { .. } | QuestionError::Expired { .. } => {
                    StatusCode::GONE
                }
                QuestionError::Validation { .. } => StatusCode::BAD_REQUEST,
                QuestionError::Surface { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Stream(e) => match e {
                StreamError::NotFound { .. } => StatusCode::NOT_FOUND,
                StreamError::Conflict { .. }
                | StreamError::Closed { .. }
                | StreamError::EndSignaled { .. }
                | StreamError::NotDraining { .. } => StatusCode::CONFLICT,
                StreamError::InvalidEvent { .. } => StatusCode::BAD_REQUEST,
                StreamError::Transport(_) | StreamError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            error: self.error_type(),
            message: self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(error_response)
    }
}

impl AppError {
    fn error_type(&self) -> String {
        let kind = match self {
            AppError::Question(e) => match e {
                QuestionError::NotFound { .. } => "question_not_found",
                QuestionError::InvalidState { .. } => "invalid_state",
                QuestionError::Cancelled { .. } => "question_cancelled",
                QuestionError::Expired { .. } => "question_expired",
                QuestionError::Duplicate { .. } => "duplicate_question",
                QuestionError::AlreadyWaiting { .. } => "already_waiting",
                QuestionError::Validation { .. } => "invalid_question",
                QuestionError::Surface { .. } => "surface_error",
            },
            AppError::Stream(e) => match e {
                StreamError::Conflict { .. } => "stream_conflict",
                StreamError::NotFound { .. } => "stream_not_found",
                StreamError::Closed { .. } => "stream_closed",
                StreamError::EndSignaled { .. } => "stream_end_signaled",
                StreamError::InvalidEvent { .. } => "invalid_event",
                StreamError::NotDraining { .. } => "stream_not_draining",
                StreamError::Transport(_) => "transport_error",
                StreamError::Serialization(_) => "serialization_error",
            },
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Timeout(_) => "timeout",
        };
        kind.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
